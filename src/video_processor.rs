use ffmpeg_next as ffmpeg;
use image::RgbImage;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// 无法从流中读取帧率时使用的默认值
const DEFAULT_FPS: f64 = 30.0;
/// 自动缩放的目标有效宽度（像素）
const EFFECTIVE_WIDTH: u32 = 256;

/// 视频基本信息
#[derive(Debug, Clone, Copy)]
pub struct VideoInfo {
    pub fps: f64,
    pub width: u32,
    pub height: u32,
    /// 容器声明的时长（秒），未知时为 0
    pub duration: f64,
}

/// 已打开的视频源
///
/// 持有解封装器和解码器，离开作用域时由 FFmpeg 的 Drop 实现释放，
/// 因此无论检测成功还是中途出错，资源都会被回收。
pub struct VideoSource {
    path: PathBuf,
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::decoder::Video,
    info: VideoInfo,
}

impl VideoSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        ffmpeg::init().context("failed to initialise FFmpeg")?;

        // 只保留 FFmpeg 的错误日志
        ffmpeg::util::log::set_level(ffmpeg::util::log::Level::Error);

        let path = path.as_ref().to_path_buf();
        let input = ffmpeg::format::input(&path)
            .with_context(|| format!("failed to open video file: {}", path.display()))?;

        let stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .context("no video stream found")?;
        let stream_index = stream.index();
        let fps = stream_fps(&stream);

        let decoder_context = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
            .context("failed to create decoder context")?;
        let decoder = decoder_context
            .decoder()
            .video()
            .context("failed to create video decoder")?;

        let duration = if input.duration() > 0 {
            input.duration() as f64 / ffmpeg::ffi::AV_TIME_BASE as f64
        } else {
            0.0
        };

        let info = VideoInfo {
            fps,
            width: decoder.width(),
            height: decoder.height(),
            duration,
        };

        debug!("打开视频: {} ({}x{}, {:.2} fps)", path.display(), info.width, info.height, info.fps);

        Ok(Self {
            path,
            input,
            stream_index,
            decoder,
            info,
        })
    }

    pub fn info(&self) -> VideoInfo {
        self.info
    }

    /// 按顺序解码所有帧，缩放为 RGB24 后交给回调
    ///
    /// 回调参数为帧序号（从 0 开始）和图像。返回解码得到的总帧数。
    /// 帧序号即时间轴，解码错误超过 [`MAX_DECODE_ERRORS`] 次时直接报错，
    /// 避免后续时间戳整体前移。
    pub fn for_each_frame<F>(&mut self, mut on_frame: F) -> Result<u64>
    where
        F: FnMut(u64, &RgbImage),
    {
        let mut converter = RgbConverter::new();
        let mut errors = DecodeErrors::default();
        let mut frame_count = 0u64;

        for (stream, packet) in self.input.packets() {
            if stream.index() != self.stream_index {
                continue;
            }

            if let Err(e) = self.decoder.send_packet(&packet) {
                errors.record(e)?;
                continue;
            }

            drain_frames(&mut self.decoder, &mut converter, &mut errors, &mut frame_count, &mut on_frame)?;
        }

        self.decoder.send_eof().context("failed to flush video decoder")?;
        drain_frames(&mut self.decoder, &mut converter, &mut errors, &mut frame_count, &mut on_frame)?;

        if errors.count > 0 {
            warn!("{}: 解码过程中出现 {} 次错误", self.path.display(), errors.count);
        }

        Ok(frame_count)
    }
}

impl Drop for VideoSource {
    fn drop(&mut self) {
        debug!("释放视频资源: {}", self.path.display());
    }
}

/// 取出解码器中已就绪的所有帧
fn drain_frames<F>(
    decoder: &mut ffmpeg::decoder::Video,
    converter: &mut RgbConverter,
    errors: &mut DecodeErrors,
    frame_count: &mut u64,
    on_frame: &mut F,
) -> Result<()>
where
    F: FnMut(u64, &RgbImage),
{
    let mut decoded = ffmpeg::frame::Video::empty();
    loop {
        match decoder.receive_frame(&mut decoded) {
            Ok(()) => {
                let img = converter.convert(&decoded)?;
                on_frame(*frame_count, &img);
                *frame_count += 1;
            }
            Err(e) if is_drained(&e) => return Ok(()),
            Err(e) => {
                errors.record(e)?;
                return Ok(());
            }
        }
    }
}

/// 解码器暂时没有帧（需要更多数据）或已经结束
fn is_drained(error: &ffmpeg::Error) -> bool {
    match error {
        ffmpeg::Error::Eof => true,
        ffmpeg::Error::Other { errno } => *errno == ffmpeg::util::error::EAGAIN,
        _ => false,
    }
}

/// 允许的解码错误次数，超过后整个检测失败
pub const MAX_DECODE_ERRORS: usize = 5;

/// 解码错误计数
#[derive(Debug, Default)]
struct DecodeErrors {
    count: usize,
}

impl DecodeErrors {
    fn record(&mut self, error: ffmpeg::Error) -> Result<()> {
        self.count += 1;
        debug!("解码错误 #{}: {}", self.count, error);
        if self.count > MAX_DECODE_ERRORS {
            anyhow::bail!("too many decode errors ({}), last error: {}", self.count, error);
        }
        Ok(())
    }
}

/// 解码帧 → 缩小后的 RGB24 图像
///
/// 缩放器在拿到第一帧后再创建，此时像素格式才确定；
/// 中途分辨率或像素格式变化时重新创建。
struct RgbConverter {
    scaler: Option<ffmpeg::software::scaling::Context>,
}

impl RgbConverter {
    fn new() -> Self {
        Self { scaler: None }
    }

    fn convert(&mut self, frame: &ffmpeg::frame::Video) -> Result<RgbImage> {
        let scaler = match self.scaler.take() {
            Some(scaler) if accepts(&scaler, frame) => scaler,
            previous => {
                if previous.is_some() {
                    debug!("输入帧变为 {}x{} {:?}，重建缩放器", frame.width(), frame.height(), frame.format());
                }
                build_scaler(frame)?
            }
        };
        let scaler = self.scaler.insert(scaler);

        let mut rgb_frame = ffmpeg::frame::Video::empty();
        scaler.run(frame, &mut rgb_frame).context("failed to scale frame")?;
        frame_to_image(&rgb_frame)
    }
}

fn accepts(scaler: &ffmpeg::software::scaling::Context, frame: &ffmpeg::frame::Video) -> bool {
    let input = scaler.input();
    input.format == frame.format() && input.width == frame.width() && input.height == frame.height()
}

fn build_scaler(frame: &ffmpeg::frame::Video) -> Result<ffmpeg::software::scaling::Context> {
    let factor = downscale_factor(frame.width());
    ffmpeg::software::scaling::Context::get(
        frame.format(),
        frame.width(),
        frame.height(),
        ffmpeg::format::Pixel::RGB24,
        (frame.width() / factor).max(1),
        (frame.height() / factor).max(1),
        ffmpeg::software::scaling::Flags::BILINEAR,
    )
    .context("failed to create frame scaler")
}

/// 整数缩放系数：宽度不足有效宽度时不缩放
pub fn downscale_factor(width: u32) -> u32 {
    if width < EFFECTIVE_WIDTH {
        1
    } else {
        width / EFFECTIVE_WIDTH
    }
}

fn stream_fps(stream: &ffmpeg::format::stream::Stream) -> f64 {
    for rate in [stream.avg_frame_rate(), stream.rate()] {
        if rate.numerator() > 0 && rate.denominator() > 0 {
            return rate.numerator() as f64 / rate.denominator() as f64;
        }
    }
    DEFAULT_FPS
}

/// 将 RGB24 帧按行拷贝为 RgbImage（跳过行尾填充）
fn frame_to_image(frame: &ffmpeg::frame::Video) -> Result<RgbImage> {
    let width = frame.width();
    let height = frame.height();
    let stride = frame.stride(0);
    let data = frame.data(0);
    let row_len = width as usize * 3;

    let mut buf = Vec::with_capacity(row_len * height as usize);
    for y in 0..height as usize {
        let start = y * stride;
        let row = data
            .get(start..start + row_len)
            .context("RGB frame buffer is truncated")?;
        buf.extend_from_slice(row);
    }

    RgbImage::from_raw(width, height, buf).context("failed to build RGB image from frame")
}
