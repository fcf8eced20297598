pub mod scene_detector;
pub mod video_processor;
pub mod metadata;
pub mod error;
pub mod processor;
pub mod handler;
pub mod config;
pub mod client;

pub use video_processor::VideoSource;
pub use scene_detector::{ContentDetector, SceneSpan};
pub use metadata::{DetectShotsRequest, DetectShotsResponse, ErrorResponse, HealthResponse, Shot};
pub use error::ApiError;
pub use processor::{ContentShotDetector, DetectionConfig, ShotDetector, detect_shots};
pub use handler::{create_app, AppState};
pub use config::{ConfigLoader, ServiceConfig};
pub use client::{ClientError, ShotDetectionClient};
