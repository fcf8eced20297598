use image::RgbImage;
use serde::Serialize;

/// 默认内容变化阈值（与 PySceneDetect ContentDetector 的常用取值一致）
pub const DEFAULT_THRESHOLD: f64 = 27.0;
/// 默认最小镜头长度（帧）
pub const DEFAULT_MIN_SCENE_LEN: u64 = 15;

/// 检测器输出的一个镜头区间（未取整）
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SceneSpan {
    /// 起始帧（包含）
    pub start_frame: u64,
    /// 结束帧（不包含）
    pub end_frame: u64,
    /// 起始时间（秒）
    pub start_secs: f64,
    /// 结束时间（秒）
    pub end_secs: f64,
}

/// HSV 帧，通道取值范围与 8 位 OpenCV 一致：H ∈ [0,180)，S/V ∈ [0,255]
#[derive(Debug, Clone)]
pub struct HsvFrame {
    width: u32,
    height: u32,
    pixels: Vec<[u8; 3]>,
}

impl HsvFrame {
    pub fn from_rgb(img: &RgbImage) -> Self {
        let pixels = img
            .pixels()
            .map(|p| rgb_to_hsv(p[0], p[1], p[2]))
            .collect();

        Self {
            width: img.width(),
            height: img.height(),
            pixels,
        }
    }
}

/// 基于内容变化的镜头检测器
///
/// 逐帧比较相邻两帧在 HSV 空间的平均差异，差异达到阈值且距离上一个切点
/// 至少 `min_scene_len` 帧时记录一个切点。
pub struct ContentDetector {
    /// 内容变化阈值（0-255）
    threshold: f64,
    /// 最小镜头长度（帧）
    min_scene_len: u64,
    last_frame: Option<HsvFrame>,
    last_cut: Option<u64>,
    cuts: Vec<u64>,
}

impl ContentDetector {
    pub fn new(threshold: f64, min_scene_len: u64) -> Self {
        Self {
            threshold,
            min_scene_len,
            last_frame: None,
            last_cut: None,
            cuts: Vec::new(),
        }
    }

    /// 计算两帧之间的内容差异分数
    /// 返回 (ΔH + ΔS + ΔV) / 3，每个分量为该通道的平均绝对差
    pub fn calculate_frame_score(&self, prev: &HsvFrame, curr: &HsvFrame) -> f64 {
        if prev.width != curr.width || prev.height != curr.height {
            return 255.0;
        }

        let total_pixels = prev.pixels.len();
        if total_pixels == 0 {
            return 0.0;
        }

        let mut sums = [0u64; 3];
        for (a, b) in prev.pixels.iter().zip(curr.pixels.iter()) {
            for channel in 0..3 {
                sums[channel] += (a[channel] as i32 - b[channel] as i32).unsigned_abs() as u64;
            }
        }

        let total = total_pixels as f64;
        let delta_hue = sums[0] as f64 / total;
        let delta_sat = sums[1] as f64 / total;
        let delta_lum = sums[2] as f64 / total;

        (delta_hue + delta_sat + delta_lum) / 3.0
    }

    /// 处理一帧，如果在该帧检测到镜头切换则返回帧号
    pub fn process_frame(&mut self, frame_num: u64, frame: &RgbImage) -> Option<u64> {
        let hsv = HsvFrame::from_rgb(frame);

        // 第一帧视为镜头起点，后续切点都要与它保持最小间隔
        let last_cut = *self.last_cut.get_or_insert(frame_num);

        let mut cut = None;
        if let Some(prev) = &self.last_frame {
            let score = self.calculate_frame_score(prev, &hsv);
            tracing::trace!("帧 {} 内容差异: {:.3}", frame_num, score);

            if score >= self.threshold && frame_num - last_cut >= self.min_scene_len {
                self.cuts.push(frame_num);
                self.last_cut = Some(frame_num);
                cut = Some(frame_num);
            }
        }

        self.last_frame = Some(hsv);
        cut
    }

    /// 已检测到的切点（帧号，递增）
    pub fn cuts(&self) -> &[u64] {
        &self.cuts
    }

    /// 根据切点生成镜头列表
    pub fn scene_list(&self, total_frames: u64, fps: f64) -> Vec<SceneSpan> {
        scenes_from_cuts(&self.cuts, total_frames, fps)
    }
}

/// 将切点转换为连续、无间隙的镜头区间：[0, c1), [c1, c2), ..., [ck, total)
///
/// 没有切点时整段视频为一个镜头；没有任何帧时返回空列表。
pub fn scenes_from_cuts(cuts: &[u64], total_frames: u64, fps: f64) -> Vec<SceneSpan> {
    if total_frames == 0 {
        return Vec::new();
    }

    let to_secs = |frame: u64| if fps > 0.0 { frame as f64 / fps } else { 0.0 };

    let mut boundaries = Vec::with_capacity(cuts.len() + 2);
    boundaries.push(0);
    boundaries.extend(cuts.iter().copied().filter(|&c| c > 0 && c < total_frames));
    boundaries.push(total_frames);

    boundaries
        .windows(2)
        .map(|w| SceneSpan {
            start_frame: w[0],
            end_frame: w[1],
            start_secs: to_secs(w[0]),
            end_secs: to_secs(w[1]),
        })
        .collect()
}

/// RGB 转 HSV（8 位表示，H 范围 0-179）
pub fn rgb_to_hsv(r: u8, g: u8, b: u8) -> [u8; 3] {
    let rf = r as f32;
    let gf = g as f32;
    let bf = b as f32;

    let max = rf.max(gf.max(bf));
    let min = rf.min(gf.min(bf));
    let delta = max - min;

    let s = if max == 0.0 { 0.0 } else { delta * 255.0 / max };

    let mut h = if delta == 0.0 {
        0.0
    } else if max == rf {
        60.0 * (gf - bf) / delta
    } else if max == gf {
        120.0 + 60.0 * (bf - rf) / delta
    } else {
        240.0 + 60.0 * (rf - gf) / delta
    };
    if h < 0.0 {
        h += 360.0;
    }

    let mut h = (h / 2.0).round();
    if h >= 180.0 {
        h -= 180.0;
    }

    [h as u8, s.round() as u8, max as u8]
}
