//! 镜头检测服务的 HTTP 客户端
//!
//! 供其他服务调用 `/detect-shots` 和 `/health`，带有超时和线性退避重试。

use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use crate::metadata::{DetectShotsRequest, Shot};

/// 默认服务地址
pub const DEFAULT_SERVICE_URL: &str = "http://localhost:5000";
/// 最大重试次数
pub const MAX_RETRIES: u32 = 3;

const DETECT_TIMEOUT: Duration = Duration::from_secs(60);
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);
const RETRY_BASE_DELAY: Duration = Duration::from_secs(1);

/// 客户端错误
#[derive(Debug, Error)]
pub enum ClientError {
    /// 无法连接到服务
    #[error("shot detection service is not available")]
    ServiceUnavailable,
    /// 服务返回的数据不符合预期格式
    #[error("invalid response from shot detection service: {0}")]
    InvalidResponse(String),
    /// 其他失败
    #[error("shot detection failed: {0}")]
    DetectionFailed(String),
}

/// 单次请求的失败：是否值得重试
enum AttemptError {
    Transient(ClientError),
    Fatal(ClientError),
}

#[derive(Deserialize)]
struct ShotsEnvelope {
    shots: Vec<Shot>,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// 镜头检测服务客户端
#[derive(Debug, Clone)]
pub struct ShotDetectionClient {
    http: reqwest::Client,
    base_url: String,
    max_retries: u32,
    retry_delay: Duration,
}

impl ShotDetectionClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http: reqwest::Client::new(),
            base_url,
            max_retries: MAX_RETRIES,
            retry_delay: RETRY_BASE_DELAY,
        }
    }

    /// 从环境变量 SHOT_DETECTION_URL 读取服务地址
    pub fn from_env() -> Self {
        let base_url = std::env::var("SHOT_DETECTION_URL")
            .unwrap_or_else(|_| DEFAULT_SERVICE_URL.to_string());
        Self::new(base_url)
    }

    /// 调整重试策略，第 n 次重试前等待 `base_delay * n`
    pub fn with_retry_policy(mut self, max_retries: u32, base_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = base_delay;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// 请求服务检测视频中的镜头
    ///
    /// 连接失败、超时和 5xx 会重试；4xx 和格式错误的响应直接返回。
    pub async fn detect_shot_boundaries(&self, video_path: &str) -> Result<Vec<Shot>, ClientError> {
        let mut retries = 0u32;
        loop {
            match self.try_detect(video_path).await {
                Ok(shots) => return Ok(shots),
                Err(AttemptError::Fatal(e)) => return Err(e),
                Err(AttemptError::Transient(e)) if retries < self.max_retries => {
                    retries += 1;
                    warn!("镜头检测请求失败，重试中 ({}/{}): {}", retries, self.max_retries, e);
                    tokio::time::sleep(self.retry_delay * retries).await;
                }
                Err(AttemptError::Transient(e)) => return Err(e),
            }
        }
    }

    async fn try_detect(&self, video_path: &str) -> Result<Vec<Shot>, AttemptError> {
        let request = DetectShotsRequest {
            video_path: Some(video_path.to_string()),
        };

        let response = self
            .http
            .post(format!("{}/detect-shots", self.base_url))
            .timeout(DETECT_TIMEOUT)
            .json(&request)
            .send()
            .await
            .map_err(classify_send_error)?;

        let status = response.status();
        if !status.is_success() {
            let message = match response.json::<ErrorBody>().await {
                Ok(body) => body.error,
                Err(_) => format!("unexpected status {}", status),
            };
            let err = ClientError::DetectionFailed(format!("{} ({})", message, status.as_u16()));
            return Err(if status.is_server_error() {
                AttemptError::Transient(err)
            } else {
                AttemptError::Fatal(err)
            });
        }

        let envelope: ShotsEnvelope = response
            .json()
            .await
            .map_err(|e| AttemptError::Fatal(ClientError::InvalidResponse(e.to_string())))?;

        debug!("收到 {} 个镜头", envelope.shots.len());
        Ok(envelope.shots)
    }

    /// 检查服务是否可用，任何错误都视为不可用
    pub async fn check_health(&self) -> bool {
        match self
            .http
            .get(format!("{}/health", self.base_url))
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response.status() == reqwest::StatusCode::OK,
            Err(e) => {
                debug!("健康检查失败: {}", e);
                false
            }
        }
    }
}

fn classify_send_error(err: reqwest::Error) -> AttemptError {
    if err.is_connect() {
        AttemptError::Transient(ClientError::ServiceUnavailable)
    } else if err.is_timeout() {
        AttemptError::Transient(ClientError::DetectionFailed("request timed out".to_string()))
    } else {
        AttemptError::Transient(ClientError::DetectionFailed(err.to_string()))
    }
}
