use crate::tools::{ProcessOutcome, WorkerPool, run_with_timeout};
use log::{debug, error, info};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// 所有片段共用的編碼參數（相同參數才能直接串接）
#[derive(Debug, Clone, PartialEq)]
pub struct ClipEncoding {
    pub target_height: u32,
    pub frame_rate: f64,
    /// libx264 CRF
    pub quality: u8,
}

/// 片段擷取規格
#[derive(Debug, Clone, PartialEq)]
pub struct ClipSpec {
    pub index: usize,
    pub start: f64,
    pub duration: f64,
    pub target_height: u32,
    pub frame_rate: f64,
    pub quality: u8,
}

/// 片段擷取結果，與規格一一對應
#[derive(Debug, Clone)]
pub struct ClipResult {
    pub spec: ClipSpec,
    pub success: bool,
    /// 只有成功時存在
    pub output_path: Option<PathBuf>,
    /// 只有失敗時存在
    pub error: Option<String>,
}

impl ClipResult {
    #[must_use]
    pub fn succeeded(spec: ClipSpec, output_path: PathBuf) -> Self {
        Self {
            spec,
            success: true,
            output_path: Some(output_path),
            error: None,
        }
    }

    #[must_use]
    pub fn failed(spec: ClipSpec, error: String) -> Self {
        Self {
            spec,
            success: false,
            output_path: None,
            error: Some(error),
        }
    }
}

/// 片段擷取器
///
/// 每個片段是獨立的 ffmpeg 轉檔程序，寫入各自的暫存檔；
/// 單一片段失敗（含逾時）只記錄在該片段的結果中，不重試。
pub struct ClipExtractor<'a> {
    video_path: &'a Path,
    output_dir: &'a Path,
    include_audio: bool,
    timeout: Duration,
    shutdown_signal: &'a AtomicBool,
}

impl<'a> ClipExtractor<'a> {
    #[must_use]
    pub const fn new(
        video_path: &'a Path,
        output_dir: &'a Path,
        include_audio: bool,
        timeout: Duration,
        shutdown_signal: &'a AtomicBool,
    ) -> Self {
        Self {
            video_path,
            output_dir,
            include_audio,
            timeout,
            shutdown_signal,
        }
    }

    #[must_use]
    pub fn clip_path(&self, spec: &ClipSpec) -> PathBuf {
        self.output_dir.join(format!("clip_{:03}.mp4", spec.index))
    }

    /// 建立單一片段的 ffmpeg 參數
    #[must_use]
    pub fn build_args(&self, spec: &ClipSpec, output_path: &Path) -> Vec<String> {
        // 寬度 -2 保持比例並確保為偶數
        let filter = format!(
            "scale=-2:{},fps={},setsar=1,format=yuv420p",
            spec.target_height, spec.frame_rate
        );

        let mut args = vec![
            "-hide_banner".to_string(),
            "-nostdin".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-ss".to_string(),
            format!("{:.3}", spec.start),
            "-i".to_string(),
            self.video_path.to_string_lossy().to_string(),
            "-t".to_string(),
            format!("{:.3}", spec.duration),
            "-map".to_string(),
            "0:v:0".to_string(),
        ];

        if self.include_audio {
            args.extend(["-map".to_string(), "0:a:0".to_string()]);
        }

        args.extend([
            "-sn".to_string(),
            "-dn".to_string(),
            "-vf".to_string(),
            filter,
            "-c:v".to_string(),
            "libx264".to_string(),
            "-preset".to_string(),
            "veryfast".to_string(),
            "-crf".to_string(),
            spec.quality.to_string(),
            "-threads".to_string(),
            "1".to_string(),
        ]);

        if self.include_audio {
            args.extend([
                "-c:a".to_string(),
                "aac".to_string(),
                "-b:a".to_string(),
                "128k".to_string(),
                "-ar".to_string(),
                "48000".to_string(),
                "-ac".to_string(),
                "2".to_string(),
            ]);
        } else {
            args.push("-an".to_string());
        }

        args.extend([
            "-avoid_negative_ts".to_string(),
            "make_zero".to_string(),
            "-movflags".to_string(),
            "+faststart".to_string(),
            "-y".to_string(),
            output_path.to_string_lossy().to_string(),
        ]);

        args
    }

    /// 擷取單一片段
    #[must_use]
    pub fn extract(&self, spec: &ClipSpec) -> ClipResult {
        let output_path = self.clip_path(spec);
        let args = self.build_args(spec, &output_path);

        debug!(
            "擷取片段 {}: start={:.2}s, duration={:.2}s",
            spec.index, spec.start, spec.duration
        );

        let mut command = Command::new("ffmpeg");
        command.args(&args);

        let outcome = match run_with_timeout(command, self.timeout, self.shutdown_signal) {
            Ok(outcome) => outcome,
            Err(e) => return ClipResult::failed(spec.clone(), format!("無法執行 ffmpeg: {e}")),
        };

        match outcome {
            ProcessOutcome::Success => {
                let non_empty = std::fs::metadata(&output_path).is_ok_and(|m| m.len() > 0);
                if non_empty {
                    ClipResult::succeeded(spec.clone(), output_path)
                } else {
                    ClipResult::failed(
                        spec.clone(),
                        format!("片段檔案未建立: {}", output_path.display()),
                    )
                }
            }
            other => {
                // 留下的殘缺檔案也在暫存目錄內，一併隨目錄清理
                let diagnostic = other.diagnostic().unwrap_or_default();
                ClipResult::failed(spec.clone(), diagnostic)
            }
        }
    }

    /// 平行擷取所有片段，結果順序與輸入相同
    #[must_use]
    pub fn extract_all(&self, specs: &[ClipSpec], pool: &WorkerPool) -> Vec<ClipResult> {
        let results = pool.map(specs, |spec| {
            if self.shutdown_signal.load(Ordering::SeqCst) {
                return ClipResult::failed(spec.clone(), "操作已取消".to_string());
            }

            let result = self.extract(spec);

            if let Some(msg) = result.error.as_ref().filter(|_| !result.success) {
                error!(
                    "片段擷取失敗 [{}] {:.2}s: {}",
                    spec.index, spec.start, msg
                );
            }

            result
        });

        let success_count = results.iter().filter(|r| r.success).count();
        info!(
            "片段擷取完成: 成功 {}, 失敗 {}",
            success_count,
            results.len() - success_count
        );

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(index: usize, start: f64) -> ClipSpec {
        ClipSpec {
            index,
            start,
            duration: 2.5,
            target_height: 720,
            frame_rate: 30.0,
            quality: 20,
        }
    }

    #[test]
    fn test_clip_path() {
        let shutdown = AtomicBool::new(false);
        let extractor = ClipExtractor::new(
            Path::new("/test/video.mp4"),
            Path::new("/tmp/scratch"),
            true,
            Duration::from_secs(10),
            &shutdown,
        );
        assert_eq!(
            extractor.clip_path(&spec(7, 1.0)),
            PathBuf::from("/tmp/scratch/clip_007.mp4")
        );
    }

    #[test]
    fn test_build_args_with_audio() {
        let shutdown = AtomicBool::new(false);
        let extractor = ClipExtractor::new(
            Path::new("/test/video.mp4"),
            Path::new("/tmp/scratch"),
            true,
            Duration::from_secs(10),
            &shutdown,
        );
        let args = extractor.build_args(&spec(0, 12.5), Path::new("/tmp/scratch/clip_000.mp4"));

        let position = |flag: &str| args.iter().position(|a| a == flag).unwrap();
        assert_eq!(args[position("-ss") + 1], "12.500");
        assert_eq!(args[position("-t") + 1], "2.500");
        assert_eq!(args[position("-crf") + 1], "20");
        assert!(args[position("-vf") + 1].contains("scale=-2:720"));
        assert!(args[position("-vf") + 1].contains("fps=30"));
        assert!(args.contains(&"0:a:0".to_string()));
        assert!(!args.contains(&"-an".to_string()));
        // -ss 在 -i 之前
        assert!(position("-ss") < position("-i"));
        assert_eq!(args.last().unwrap(), "/tmp/scratch/clip_000.mp4");
    }

    #[test]
    fn test_build_args_without_audio() {
        let shutdown = AtomicBool::new(false);
        let extractor = ClipExtractor::new(
            Path::new("/test/video.mp4"),
            Path::new("/tmp/scratch"),
            false,
            Duration::from_secs(10),
            &shutdown,
        );
        let args = extractor.build_args(&spec(0, 0.0), Path::new("/tmp/out.mp4"));
        assert!(args.contains(&"-an".to_string()));
        assert!(!args.contains(&"0:a:0".to_string()));
        assert!(!args.contains(&"aac".to_string()));
    }

    #[test]
    fn test_extract_all_cancelled_preserves_correspondence() {
        let shutdown = AtomicBool::new(true);
        let extractor = ClipExtractor::new(
            Path::new("/test/video.mp4"),
            Path::new("/tmp/scratch"),
            true,
            Duration::from_secs(10),
            &shutdown,
        );
        let specs: Vec<ClipSpec> = (0..5).map(|i| spec(i, i as f64 * 10.0)).collect();
        let pool = WorkerPool::new(3, true);

        let results = extractor.extract_all(&specs, &pool);
        assert_eq!(results.len(), specs.len());
        for (result, spec) in results.iter().zip(&specs) {
            assert_eq!(&result.spec, spec);
            assert!(!result.success);
            assert!(result.output_path.is_none());
            assert!(result.error.is_some());
        }
    }

    #[test]
    fn test_clip_result_constructors() {
        let ok = ClipResult::succeeded(spec(0, 1.0), PathBuf::from("/tmp/a.mp4"));
        assert!(ok.success && ok.output_path.is_some() && ok.error.is_none());

        let failed = ClipResult::failed(spec(1, 2.0), "boom".to_string());
        assert!(!failed.success && failed.output_path.is_none());
        assert_eq!(failed.error.as_deref(), Some("boom"));
    }
}
