use serde::{Deserialize, Serialize};
use crate::scene_detector::SceneSpan;

/// 服务名称，出现在健康检查响应中
pub const SERVICE_NAME: &str = "shot-detection";

/// 镜头检测请求
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectShotsRequest {
    /// 视频文件路径
    #[serde(default)]
    pub video_path: Option<String>,
}

/// 单个镜头
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shot {
    /// 镜头编号（从 1 开始）
    pub shot: usize,
    /// 开始时间（秒，保留两位小数）
    pub start: f64,
    /// 结束时间（秒，保留两位小数）
    pub end: f64,
}

/// 镜头检测成功响应
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectShotsResponse {
    pub success: bool,
    pub shots: Vec<Shot>,
    pub total_shots: usize,
}

impl DetectShotsResponse {
    pub fn from_scenes(scenes: &[SceneSpan]) -> Self {
        let shots = shots_from_scenes(scenes);
        Self {
            success: true,
            total_shots: shots.len(),
            shots,
        }
    }
}

/// 失败响应
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

/// 健康检查响应
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            service: SERVICE_NAME.to_string(),
        }
    }
}

/// 将检测区间转换为编号从 1 开始、时间保留两位小数的镜头列表
pub fn shots_from_scenes(scenes: &[SceneSpan]) -> Vec<Shot> {
    scenes
        .iter()
        .enumerate()
        .map(|(i, scene)| Shot {
            shot: i + 1,
            start: round2(scene.start_secs),
            end: round2(scene.end_secs),
        })
        .collect()
}

/// 保留两位小数，恰好落在中点时取偶数（与 Python `round(x, 2)` 一致）
pub fn round2(value: f64) -> f64 {
    let scaled = value * 100.0;
    let rounded = if (scaled - scaled.trunc()).abs() == 0.5 {
        // 乘法本身可能把略高或略低于中点的值舍入成中点，用 FMA 取回精确误差
        let residual = value.mul_add(100.0, -scaled);
        if residual > 0.0 {
            scaled.ceil()
        } else if residual < 0.0 {
            scaled.floor()
        } else {
            scaled.round_ties_even()
        }
    } else {
        scaled.round()
    };
    rounded / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(start_secs: f64, end_secs: f64) -> SceneSpan {
        SceneSpan {
            start_frame: 0,
            end_frame: 0,
            start_secs,
            end_secs,
        }
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(2.133333), 2.13);
        assert_eq!(round2(4.999), 5.0);
        assert_eq!(round2(0.0), 0.0);
        assert_eq!(round2(1.0 / 3.0), 0.33);
    }

    #[test]
    fn test_round2_ties_to_even_at_24fps() {
        assert_eq!(round2(3.0 / 24.0), 0.12);
        assert_eq!(round2(15.0 / 24.0), 0.62);
        assert_eq!(round2(27.0 / 24.0), 1.12);
        assert_eq!(round2(9.0 / 24.0), 0.38);
        assert_eq!(round2(21.0 / 24.0), 0.88);
    }

    #[test]
    fn test_round2_uses_exact_binary_value() {
        // 2.675 实际略小于 2.675，1.005 同理
        assert_eq!(round2(2.675), 2.67);
        assert_eq!(round2(1.005), 1.0);
        assert_eq!(round2(0.115), 0.12);
    }

    #[test]
    fn test_response_matches_example_payload() {
        let scenes = [span(0.0, 2.133), span(2.133, 5.0)];
        let response = DetectShotsResponse::from_scenes(&scenes);

        let json = serde_json::to_value(&response).unwrap();
        let expected = serde_json::json!({
            "success": true,
            "shots": [
                {"shot": 1, "start": 0.0, "end": 2.13},
                {"shot": 2, "start": 2.13, "end": 5.0}
            ],
            "total_shots": 2
        });
        assert_eq!(json, expected);
    }

    #[test]
    fn test_shot_numbers_are_sequential() {
        let scenes: Vec<SceneSpan> = (0..7).map(|i| span(i as f64, i as f64 + 1.0)).collect();
        let response = DetectShotsResponse::from_scenes(&scenes);

        assert_eq!(response.total_shots, 7);
        assert_eq!(response.shots.len(), 7);
        let numbers: Vec<usize> = response.shots.iter().map(|s| s.shot).collect();
        assert_eq!(numbers, (1..=7).collect::<Vec<_>>());
    }

    #[test]
    fn test_empty_scene_list() {
        let response = DetectShotsResponse::from_scenes(&[]);
        assert!(response.success);
        assert_eq!(response.total_shots, 0);
        assert!(response.shots.is_empty());
    }

    #[test]
    fn test_missing_video_path_deserializes_to_none() {
        let request: DetectShotsRequest = serde_json::from_str("{}").unwrap();
        assert!(request.video_path.is_none());

        let request: DetectShotsRequest = serde_json::from_str(r#"{"video_path": null}"#).unwrap();
        assert!(request.video_path.is_none());
    }

    #[test]
    fn test_health_payload() {
        let json = serde_json::to_value(HealthResponse::default()).unwrap();
        assert_eq!(json, serde_json::json!({"status": "ok", "service": "shot-detection"}));
    }
}
