use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use thiserror::Error;
use crate::metadata::ErrorResponse;

/// HTTP 层错误
#[derive(Debug, Error)]
pub enum ApiError {
    /// 缺少 video_path
    #[error("video_path is required")]
    MissingParameter,
    /// 请求体无法解析
    #[error("invalid request body: {0}")]
    InvalidRequest(String),
    /// 视频文件不存在
    #[error("Video file not found")]
    NotFound,
    /// 其他所有错误，消息原样透传
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::MissingParameter | ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            success: false,
            error: self.to_string(),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(format!("{:#}", err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self.to_response())).into_response()
    }
}
