use crate::config::types::{
    DEFAULT_AUDIO_WINDOW, DEFAULT_CLIP_DURATION, DEFAULT_FRAME_RATE, DEFAULT_TARGET_DURATION,
    PreviewConfig,
};
use anyhow::{Context, Result};
use log::warn;
use std::fs;
use std::path::Path;

impl PreviewConfig {
    /// 從 JSON 檔案載入設定，檔案不存在時使用預設值
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;

        Ok(config.validated())
    }

    /// 修正超出範圍的設定值
    #[must_use]
    pub fn validated(mut self) -> Self {
        if !(self.clip_duration.is_finite() && self.clip_duration > 0.0) {
            warn!("片段長度無效 ({})，改用預設值", self.clip_duration);
            self.clip_duration = DEFAULT_CLIP_DURATION;
        }
        if !(self.target_duration.is_finite() && self.target_duration > 0.0) {
            warn!("預覽總長度無效 ({})，改用預設值", self.target_duration);
            self.target_duration = DEFAULT_TARGET_DURATION;
        }
        if !(self.frame_rate.is_finite() && self.frame_rate > 0.0) {
            warn!("幀率無效 ({})，改用預設值", self.frame_rate);
            self.frame_rate = DEFAULT_FRAME_RATE;
        }
        if !(self.audio_window.is_finite() && self.audio_window > 0.0) {
            warn!("音量視窗無效 ({})，改用預設值", self.audio_window);
            self.audio_window = DEFAULT_AUDIO_WINDOW;
        }
        if self.max_workers == 0 {
            warn!("工作數為 0，改為 1");
            self.max_workers = 1;
        }
        if self.target_height < 2 {
            warn!("輸出高度過小 ({})，改為 2", self.target_height);
            self.target_height = 2;
        }
        if self.quality > 51 {
            warn!("品質參數超出範圍 ({})，改為 51", self.quality);
            self.quality = 51;
        }
        if self.clip_timeout_secs == 0 {
            warn!("片段逾時為 0，改為 1 秒");
            self.clip_timeout_secs = 1;
        }
        if self.sample_timeout_secs == 0 {
            warn!("取樣逾時為 0，改為 1 秒");
            self.sample_timeout_secs = 1;
        }
        if let Some(fade) = self.transition_duration {
            // 淡化必須比片段短，否則 xfade 的位移會變成負數
            if !(fade.is_finite() && fade > 0.0 && fade < self.clip_duration) {
                warn!("交叉淡化長度無效 ({fade})，改為硬切");
                self.transition_duration = None;
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_missing_file_uses_default() {
        let config = PreviewConfig::load(Path::new("/nonexistent/preview.json")).unwrap();
        assert_eq!(config, PreviewConfig::default());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"target_duration": 30.0, "max_workers": 4}}"#).unwrap();

        let config = PreviewConfig::load(file.path()).unwrap();
        assert!((config.target_duration - 30.0).abs() < f64::EPSILON);
        assert_eq!(config.max_workers, 4);
    }

    #[test]
    fn test_load_invalid_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(PreviewConfig::load(file.path()).is_err());
    }

    #[test]
    fn test_validated_clamps_values() {
        let config = PreviewConfig {
            clip_duration: -1.0,
            max_workers: 0,
            quality: 80,
            sample_timeout_secs: 0,
            transition_duration: Some(10.0),
            ..PreviewConfig::default()
        }
        .validated();

        assert!((config.clip_duration - DEFAULT_CLIP_DURATION).abs() < f64::EPSILON);
        assert_eq!(config.max_workers, 1);
        assert_eq!(config.quality, 51);
        assert_eq!(config.sample_timeout_secs, 1);
        assert!(config.transition_duration.is_none());
    }

    #[test]
    fn test_validated_keeps_short_fade() {
        let config = PreviewConfig {
            transition_duration: Some(0.3),
            ..PreviewConfig::default()
        }
        .validated();
        assert_eq!(config.transition_duration, Some(0.3));
    }
}
