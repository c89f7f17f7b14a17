use crate::error::{PreviewError, PreviewResultOf};
use crate::tools::ffmpeg_runner::spawn_error;
use log::debug;
use serde::Deserialize;
use std::path::Path;
use std::process::Command;

/// 影片基本資訊，探測一次後不再變動
#[derive(Debug, Clone, PartialEq)]
pub struct VideoProfile {
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
    pub has_audio: bool,
}

#[derive(Deserialize)]
struct FfprobeOutput {
    format: Option<FormatInfo>,
    streams: Option<Vec<StreamInfo>>,
}

#[derive(Deserialize)]
struct FormatInfo {
    duration: Option<String>,
}

#[derive(Deserialize)]
struct StreamInfo {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    duration: Option<String>,
}

/// 使用 ffprobe 取得影片資訊
///
/// 不重試：任何非零結束碼或格式錯誤都視為整次執行失敗。
pub fn probe(path: &Path) -> PreviewResultOf<VideoProfile> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .output()
        .map_err(|e| spawn_error("ffprobe", &e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(PreviewError::unreadable(
            path,
            format!("ffprobe 執行失敗: {}", stderr.trim()),
        ));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let profile =
        parse_probe_output(&stdout).map_err(|reason| PreviewError::unreadable(path, reason))?;

    debug!(
        "影片資訊: {:.2}s, {}x{}, {:.2} fps, audio={}",
        profile.duration, profile.width, profile.height, profile.frame_rate, profile.has_audio
    );

    Ok(profile)
}

/// 解析 ffprobe 的 JSON 輸出
pub fn parse_probe_output(json: &str) -> Result<VideoProfile, String> {
    let probe: FfprobeOutput =
        serde_json::from_str(json).map_err(|e| format!("無法解析 ffprobe 輸出: {e}"))?;

    let streams = probe.streams.unwrap_or_default();

    // 找到視訊串流
    let video_stream = streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| "找不到視訊串流".to_string())?;

    let width = video_stream.width.ok_or("無法取得影片寬度")?;
    let height = video_stream.height.ok_or("無法取得影片高度")?;

    // 取得影片長度（優先從 format，其次從 stream）
    let duration = probe
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .and_then(|d| d.parse::<f64>().ok())
        .or_else(|| {
            video_stream
                .duration
                .as_deref()
                .and_then(|d| d.parse::<f64>().ok())
        })
        .filter(|d| d.is_finite() && *d > 0.0)
        .ok_or("無法取得影片長度")?;

    let frame_rate = video_stream
        .r_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .unwrap_or(30.0);

    let has_audio = streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("audio"));

    Ok(VideoProfile {
        duration,
        width,
        height,
        frame_rate,
        has_audio,
    })
}

/// 解析幀率字串（例如 "30/1" 或 "30000/1001"）
fn parse_frame_rate(rate: &str) -> Option<f64> {
    if let Some((num_str, den_str)) = rate.split_once('/') {
        let num: f64 = num_str.parse().ok()?;
        let den: f64 = den_str.parse().ok()?;
        if den > 0.0 && num > 0.0 {
            return Some(num / den);
        }
        return None;
    }
    rate.parse().ok().filter(|r: &f64| *r > 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_OUTPUT: &str = r#"{
        "streams": [
            {"codec_type": "video", "width": 1920, "height": 1080, "r_frame_rate": "30000/1001", "duration": "1199.5"},
            {"codec_type": "audio", "duration": "1200.0"}
        ],
        "format": {"duration": "1200.000000"}
    }"#;

    #[test]
    fn test_parse_probe_output() {
        let profile = parse_probe_output(SAMPLE_OUTPUT).unwrap();
        assert!((profile.duration - 1200.0).abs() < 0.001);
        assert_eq!(profile.width, 1920);
        assert_eq!(profile.height, 1080);
        assert!((profile.frame_rate - 29.97).abs() < 0.01);
        assert!(profile.has_audio);
    }

    #[test]
    fn test_parse_probe_output_stream_duration_fallback() {
        let json = r#"{
            "streams": [{"codec_type": "video", "width": 640, "height": 360, "r_frame_rate": "24/1", "duration": "12.5"}],
            "format": {}
        }"#;
        let profile = parse_probe_output(json).unwrap();
        assert!((profile.duration - 12.5).abs() < 0.001);
        assert!(!profile.has_audio);
    }

    #[test]
    fn test_parse_probe_output_zero_duration() {
        let json = r#"{
            "streams": [{"codec_type": "video", "width": 640, "height": 360}],
            "format": {"duration": "0.000"}
        }"#;
        assert!(parse_probe_output(json).is_err());
    }

    #[test]
    fn test_parse_probe_output_no_video() {
        let json = r#"{"streams": [{"codec_type": "audio"}], "format": {"duration": "10"}}"#;
        assert!(parse_probe_output(json).is_err());
    }

    #[test]
    fn test_parse_probe_output_malformed() {
        assert!(parse_probe_output("garbage").is_err());
    }

    #[test]
    fn test_parse_frame_rate_fraction() {
        assert!((parse_frame_rate("30/1").unwrap() - 30.0).abs() < 0.01);
        assert!((parse_frame_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
    }

    #[test]
    fn test_parse_frame_rate_invalid() {
        assert!((parse_frame_rate("29.97").unwrap() - 29.97).abs() < 0.01);
        assert!(parse_frame_rate("invalid").is_none());
        assert!(parse_frame_rate("30/0").is_none());
        assert!(parse_frame_rate("0/0").is_none());
    }
}
