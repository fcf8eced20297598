use anyhow::Result;
use std::path::Path;
use std::time::Instant;
use tracing::info;
use crate::scene_detector::{ContentDetector, SceneSpan, DEFAULT_MIN_SCENE_LEN, DEFAULT_THRESHOLD};
use crate::video_processor::VideoSource;

/// 镜头检测配置
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionConfig {
    /// 内容变化阈值，越低越敏感
    pub threshold: f64,
    /// 最小镜头长度（帧）
    pub min_scene_len: u64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            min_scene_len: DEFAULT_MIN_SCENE_LEN,
        }
    }
}

/// 镜头边界检测器
///
/// HTTP 层只依赖这个 trait，把检测当作返回有序时间区间的黑盒。
pub trait ShotDetector: Send + Sync {
    fn detect(&self, video_path: &Path) -> Result<Vec<SceneSpan>>;
}

/// 基于 FFmpeg 解码 + 内容变化检测的实现
#[derive(Debug, Clone, Default)]
pub struct ContentShotDetector {
    config: DetectionConfig,
}

impl ContentShotDetector {
    pub fn new(config: DetectionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }
}

impl ShotDetector for ContentShotDetector {
    fn detect(&self, video_path: &Path) -> Result<Vec<SceneSpan>> {
        detect_shots(video_path, &self.config)
    }
}

/// 检测视频中的镜头（阻塞调用）
pub fn detect_shots(video_path: impl AsRef<Path>, config: &DetectionConfig) -> Result<Vec<SceneSpan>> {
    let video_path = video_path.as_ref();
    let start_time = Instant::now();

    info!("🎬 [镜头检测] 开始: {} (threshold={:.1}, min_scene_len={})",
        video_path.display(), config.threshold, config.min_scene_len);

    // source 在函数返回时释放，包括下面 ? 提前返回的情况
    let mut source = VideoSource::open(video_path)?;
    let video_info = source.info();
    info!("  • 分辨率: {}x{}, 帧率: {:.2} fps, 时长: {:.2}秒",
        video_info.width, video_info.height, video_info.fps, video_info.duration);

    let mut detector = ContentDetector::new(config.threshold, config.min_scene_len);
    let total_frames = source.for_each_frame(|frame_num, frame| {
        detector.process_frame(frame_num, frame);
    })?;

    let scenes = detector.scene_list(total_frames, video_info.fps);

    info!("✅ [镜头检测] 完成，耗时: {:.2}秒", start_time.elapsed().as_secs_f64());
    info!("  • 解码帧数: {}, 切点数: {}, 镜头数: {}",
        total_frames, detector.cuts().len(), scenes.len());

    Ok(scenes)
}
