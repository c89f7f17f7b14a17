use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_TARGET_DURATION: f64 = 45.0;
pub const DEFAULT_CLIP_DURATION: f64 = 2.5;
pub const DEFAULT_MAX_WORKERS: usize = 32;
pub const DEFAULT_TARGET_HEIGHT: u32 = 720;
/// libx264 CRF，數字越小品質越高
pub const DEFAULT_QUALITY: u8 = 20;
pub const DEFAULT_FRAME_RATE: f64 = 30.0;
pub const DEFAULT_ANIMATED_IMAGE_WIDTH: u32 = 480;
pub const DEFAULT_ANIMATED_IMAGE_FPS: f64 = 10.0;
pub const DEFAULT_AUDIO_PROBE_COUNT: usize = 40;
pub const DEFAULT_CLIMAX_PROBE_COUNT: usize = 20;
pub const DEFAULT_AUDIO_WINDOW: f64 = 1.0;
pub const DEFAULT_CLIP_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_SAMPLE_TIMEOUT_SECS: u64 = 30;

/// 預覽片段生成設定
///
/// 所有欄位皆可省略，省略時使用預設值。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    /// 預覽總長度（秒）
    pub target_duration: f64,
    /// 每個片段長度（秒）
    pub clip_duration: f64,
    /// 平行工作數上限
    pub max_workers: usize,
    /// 輸出高度（保持比例）
    pub target_height: u32,
    pub quality: u8,
    pub frame_rate: f64,
    pub create_animated_image: bool,
    pub animated_image_width: u32,
    pub animated_image_fps: f64,
    /// 未指定時輸出到來源旁的 `<stem>_preview.mp4`
    pub output_path: Option<PathBuf>,
    pub keep_temp_files: bool,
    /// 關閉時使用循序處理
    pub parallel: bool,
    /// 關鍵幀取樣數量，未指定時依影片長度決定
    pub sample_density: Option<usize>,
    pub audio_probe_count: usize,
    pub climax_probe_count: usize,
    /// 音量量測視窗寬度（秒）
    pub audio_window: f64,
    pub clip_timeout_secs: u64,
    /// 單次影格解碼或音量量測的逾時（秒）
    pub sample_timeout_secs: u64,
    /// 片段之間的交叉淡化長度（秒），未指定時為硬切
    pub transition_duration: Option<f64>,
    /// 暫存目錄的上層目錄，未指定時使用系統暫存目錄
    pub temp_dir: Option<PathBuf>,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            target_duration: DEFAULT_TARGET_DURATION,
            clip_duration: DEFAULT_CLIP_DURATION,
            max_workers: DEFAULT_MAX_WORKERS,
            target_height: DEFAULT_TARGET_HEIGHT,
            quality: DEFAULT_QUALITY,
            frame_rate: DEFAULT_FRAME_RATE,
            create_animated_image: false,
            animated_image_width: DEFAULT_ANIMATED_IMAGE_WIDTH,
            animated_image_fps: DEFAULT_ANIMATED_IMAGE_FPS,
            output_path: None,
            keep_temp_files: false,
            parallel: true,
            sample_density: None,
            audio_probe_count: DEFAULT_AUDIO_PROBE_COUNT,
            climax_probe_count: DEFAULT_CLIMAX_PROBE_COUNT,
            audio_window: DEFAULT_AUDIO_WINDOW,
            clip_timeout_secs: DEFAULT_CLIP_TIMEOUT_SECS,
            sample_timeout_secs: DEFAULT_SAMPLE_TIMEOUT_SECS,
            transition_duration: None,
            temp_dir: None,
        }
    }
}

impl PreviewConfig {
    /// 目標片段數量：`round(target_duration / clip_duration)`，至少 1
    #[must_use]
    pub fn target_clip_count(&self) -> usize {
        let count = (self.target_duration / self.clip_duration).round();
        if count.is_finite() && count >= 1.0 {
            count as usize
        } else {
            1
        }
    }

    /// 決定輸出路徑
    #[must_use]
    pub fn resolve_output_path(&self, input: &Path) -> PathBuf {
        self.output_path.clone().unwrap_or_else(|| {
            let file_stem = input
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("output");
            let parent = input.parent().unwrap_or(Path::new("."));
            parent.join(format!("{file_stem}_preview.mp4"))
        })
    }

    /// 動圖路徑與影片輸出同名，副檔名為 gif
    #[must_use]
    pub fn resolve_animated_image_path(output_path: &Path) -> PathBuf {
        output_path.with_extension("gif")
    }
}
