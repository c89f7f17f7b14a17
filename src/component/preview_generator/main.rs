use super::backend::{BackendContext, FfmpegBackend, MediaBackend};
use super::candidate_selector::{SamplingParams, TimelinePlan, select_clips, to_clip_specs};
use super::clip_extractor::{ClipEncoding, ClipResult};
use crate::config::PreviewConfig;
use crate::error::{PreviewError, PreviewResultOf};
use crate::tools::{ScratchDir, WorkerPool, ensure_directory_exists, validate_file_exists};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// 各階段耗時（毫秒）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTimings {
    pub probe_ms: u64,
    pub analysis_ms: u64,
    pub extraction_ms: u64,
    pub assembly_ms: u64,
    pub image_ms: u64,
    pub total_ms: u64,
}

/// 單一片段的擷取失敗
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipFailure {
    pub index: usize,
    pub timestamp: f64,
    pub error: String,
}

/// 致命錯誤的結構化描述
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReport {
    pub kind: String,
    pub message: String,
}

impl From<&PreviewError> for FailureReport {
    fn from(error: &PreviewError) -> Self {
        Self {
            kind: error.kind().to_string(),
            message: error.to_string(),
        }
    }
}

/// 預覽片段生成結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewResult {
    pub success: bool,
    pub output_path: Option<PathBuf>,
    pub image_path: Option<PathBuf>,
    /// 動圖產生失敗的原因，不影響 `success`
    pub image_error: Option<String>,
    /// 輸出影片長度（秒）
    pub duration: f64,
    pub clips_used: usize,
    pub clips_requested: usize,
    /// 輸出影片大小（位元組）
    pub file_size: u64,
    pub failed_clips: Vec<ClipFailure>,
    pub timings: StageTimings,
    pub error: Option<FailureReport>,
}

/// 執行過程中已知的資訊，失敗時仍能回報
#[derive(Debug)]
struct RunProgress {
    started: Instant,
    timings: StageTimings,
    clips_requested: usize,
    /// 擷取成功的片段數，串接失敗時回報
    clips_extracted: usize,
    failed_clips: Vec<ClipFailure>,
}

impl RunProgress {
    fn new() -> Self {
        Self {
            started: Instant::now(),
            timings: StageTimings::default(),
            clips_requested: 0,
            clips_extracted: 0,
            failed_clips: Vec::new(),
        }
    }

    fn finish_timing(&mut self) {
        self.timings.total_ms = elapsed_ms(self.started);
    }

    fn into_failure(mut self, error: &PreviewError) -> PreviewResult {
        self.finish_timing();
        PreviewResult {
            success: false,
            output_path: None,
            image_path: None,
            image_error: None,
            duration: 0.0,
            clips_used: self.clips_extracted,
            clips_requested: self.clips_requested,
            file_size: 0,
            failed_clips: self.failed_clips,
            timings: self.timings,
            error: Some(FailureReport::from(error)),
        }
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    u64::try_from(since.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn clip_failures(results: &[ClipResult]) -> Vec<ClipFailure> {
    results
        .iter()
        .filter(|r| !r.success)
        .map(|r| ClipFailure {
            index: r.spec.index,
            timestamp: r.spec.start,
            error: r.error.clone().unwrap_or_default(),
        })
        .collect()
}

/// 預覽片段生成引擎
///
/// 流程：
/// 1. 探測影片資訊（ffprobe）
/// 2. 平行取樣並評分候選時間點
/// 3. 選出片段（高潮區保留名額 + 一般區各區段至少一個）
/// 4. 平行擷取片段
/// 5. 依時間順序串接，選擇性產生動圖
///
/// 每次執行使用獨立的暫存目錄，結束時（含失敗）自動清理。
/// 媒體操作透過 `MediaBackend` 進行，預設為 ffmpeg。
pub struct PreviewEngine<B: MediaBackend = FfmpegBackend> {
    config: PreviewConfig,
    shutdown_signal: Arc<AtomicBool>,
    backend: B,
}

impl PreviewEngine {
    #[must_use]
    pub fn new(config: PreviewConfig, shutdown_signal: Arc<AtomicBool>) -> Self {
        Self::with_backend(config, shutdown_signal, FfmpegBackend)
    }
}

impl<B: MediaBackend> PreviewEngine<B> {
    #[must_use]
    pub fn with_backend(config: PreviewConfig, shutdown_signal: Arc<AtomicBool>, backend: B) -> Self {
        Self {
            config: config.validated(),
            shutdown_signal,
            backend,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &PreviewConfig {
        &self.config
    }

    /// 產生預覽片段，致命錯誤以 `Err` 回傳
    pub fn generate(&self, input: &Path) -> PreviewResultOf<PreviewResult> {
        let mut progress = RunProgress::new();
        self.run(input, &mut progress)
    }

    /// 產生預覽片段，永遠回傳結構化結果
    ///
    /// 失敗時 `success` 為 false，`error` 帶有錯誤代碼與訊息。
    #[must_use]
    pub fn generate_report(&self, input: &Path) -> PreviewResult {
        let mut progress = RunProgress::new();
        match self.run(input, &mut progress) {
            Ok(result) => result,
            Err(e) => {
                error!("預覽產生失敗 {}: {}", input.display(), e);
                progress.into_failure(&e)
            }
        }
    }

    fn check_shutdown(&self) -> PreviewResultOf<()> {
        if self.shutdown_signal.load(Ordering::SeqCst) {
            warn!("收到中斷訊號，停止處理");
            return Err(PreviewError::Cancelled);
        }
        Ok(())
    }

    fn run(&self, input: &Path, progress: &mut RunProgress) -> PreviewResultOf<PreviewResult> {
        let config = &self.config;
        info!("開始產生預覽: {}", input.display());

        validate_file_exists(input).map_err(|e| PreviewError::unreadable(input, format!("{e:#}")))?;
        self.backend.check_tools()?;

        // 探測影片資訊
        let stage = Instant::now();
        let profile = self.backend.probe(input)?;
        progress.timings.probe_ms = elapsed_ms(stage);
        info!(
            "影片資訊: {:.1}s, {}x{}, {:.2} fps, 音訊: {}",
            profile.duration,
            profile.width,
            profile.height,
            profile.frame_rate,
            if profile.has_audio { "有" } else { "無" }
        );

        let plan = TimelinePlan::new(&profile, config.clip_duration, config.target_clip_count())?;
        progress.clips_requested = plan.clip_count;
        self.check_shutdown()?;

        let scratch = ScratchDir::create(config.temp_dir.as_deref(), config.keep_temp_files)?;
        let pool = WorkerPool::new(config.max_workers, config.parallel);
        debug!(
            "暫存目錄: {}, 平行處理: {}",
            scratch.path().display(),
            pool.is_parallel()
        );

        let ctx = BackendContext {
            input,
            profile: &profile,
            config,
            scratch_dir: scratch.path(),
            shutdown_signal: &self.shutdown_signal,
        };

        // 取樣、評分、選取
        let stage = Instant::now();
        let sampler = self.backend.sampler(&ctx);
        let selected = select_clips(
            &plan,
            &SamplingParams::from_config(config),
            &sampler,
            &pool,
            &self.shutdown_signal,
        )?;
        progress.timings.analysis_ms = elapsed_ms(stage);

        // 擷取片段
        let stage = Instant::now();
        let encoding = ClipEncoding {
            target_height: config.target_height,
            frame_rate: config.frame_rate,
            quality: config.quality,
        };
        let specs = to_clip_specs(&plan, &selected, &encoding);
        let results = self.backend.extract_clips(&ctx, &specs, &pool);
        progress.timings.extraction_ms = elapsed_ms(stage);
        progress.failed_clips = clip_failures(&results);
        progress.clips_extracted = results.len() - progress.failed_clips.len();
        self.check_shutdown()?;

        // 串接
        let stage = Instant::now();
        let output_path = config.resolve_output_path(input);
        if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            ensure_directory_exists(parent)
                .map_err(|e| PreviewError::Io(io::Error::other(format!("{e:#}"))))?;
        }

        let assembled = self.backend.assemble(&ctx, &results, &output_path)?;
        progress.timings.assembly_ms = elapsed_ms(stage);

        // 動圖
        let (image_path, image_error) = if config.create_animated_image {
            let stage = Instant::now();
            let path = PreviewConfig::resolve_animated_image_path(&output_path);
            let outcome = self.backend.create_animated_image(&ctx, &assembled, &path);
            progress.timings.image_ms = elapsed_ms(stage);
            match outcome {
                Ok(()) => {
                    info!("動圖已建立: {}", path.display());
                    (Some(path), None)
                }
                Err(e) => {
                    warn!("動圖產生失敗: {e:#}");
                    (None, Some(format!("{e:#}")))
                }
            }
        } else {
            (None, None)
        };

        let file_size = fs::metadata(&output_path)?.len();
        let duration = match self.backend.probe(&output_path) {
            Ok(output_profile) => output_profile.duration,
            Err(e) => {
                debug!("無法探測輸出長度，使用預估值: {e}");
                assembled.expected_duration
            }
        };

        progress.finish_timing();
        info!(
            "預覽已建立: {} ({:.1}s, {} 個片段, {:.2} MB, 耗時 {} ms)",
            output_path.display(),
            duration,
            assembled.clips_used,
            file_size as f64 / 1024.0 / 1024.0,
            progress.timings.total_ms
        );

        Ok(PreviewResult {
            success: true,
            output_path: Some(output_path),
            image_path,
            image_error,
            duration,
            clips_used: assembled.clips_used,
            clips_requested: progress.clips_requested,
            file_size,
            failed_clips: std::mem::take(&mut progress.failed_clips),
            timings: progress.timings.clone(),
            error: None,
        })
    }
}
