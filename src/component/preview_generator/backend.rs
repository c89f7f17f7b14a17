use super::clip_assembler::{AssembledPreview, ClipAssembler};
use super::clip_extractor::{ClipExtractor, ClipResult, ClipSpec};
use super::signal_sampler::{FfmpegSampler, SignalSampler};
use crate::config::PreviewConfig;
use crate::error::PreviewResultOf;
use crate::tools::{VideoProfile, WorkerPool, ensure_tools_available, probe};
use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

/// 單次執行中各媒體操作共用的資訊
pub struct BackendContext<'a> {
    pub input: &'a Path,
    pub profile: &'a VideoProfile,
    pub config: &'a PreviewConfig,
    pub scratch_dir: &'a Path,
    pub shutdown_signal: &'a Arc<AtomicBool>,
}

/// 引擎依賴的媒體操作
///
/// 選取邏輯、結果彙整與清理都在引擎內，實作只負責實際讀寫媒體。
pub trait MediaBackend {
    type Sampler: SignalSampler;

    fn check_tools(&self) -> PreviewResultOf<()>;

    fn probe(&self, path: &Path) -> PreviewResultOf<VideoProfile>;

    fn sampler(&self, ctx: &BackendContext<'_>) -> Self::Sampler;

    /// 每個 spec 對應一個結果，單一片段失敗不中斷其他片段
    fn extract_clips(
        &self,
        ctx: &BackendContext<'_>,
        specs: &[ClipSpec],
        pool: &WorkerPool,
    ) -> Vec<ClipResult>;

    fn assemble(
        &self,
        ctx: &BackendContext<'_>,
        results: &[ClipResult],
        output_path: &Path,
    ) -> PreviewResultOf<AssembledPreview>;

    fn create_animated_image(
        &self,
        ctx: &BackendContext<'_>,
        assembled: &AssembledPreview,
        image_path: &Path,
    ) -> Result<()>;
}

/// 以 ffmpeg / ffprobe 子程序實作
#[derive(Debug, Clone, Copy, Default)]
pub struct FfmpegBackend;

impl FfmpegBackend {
    fn assembler<'a>(ctx: &'a BackendContext<'_>) -> ClipAssembler<'a> {
        ClipAssembler::new(
            ctx.scratch_dir,
            ctx.profile.has_audio,
            ctx.config.transition_duration,
            ctx.config.quality,
            ctx.shutdown_signal,
        )
    }
}

impl MediaBackend for FfmpegBackend {
    type Sampler = FfmpegSampler;

    fn check_tools(&self) -> PreviewResultOf<()> {
        ensure_tools_available()
    }

    fn probe(&self, path: &Path) -> PreviewResultOf<VideoProfile> {
        probe(path)
    }

    fn sampler(&self, ctx: &BackendContext<'_>) -> FfmpegSampler {
        FfmpegSampler::new(
            ctx.input,
            ctx.profile.has_audio,
            ctx.config.audio_window,
            Duration::from_secs(ctx.config.sample_timeout_secs),
            Arc::clone(ctx.shutdown_signal),
        )
    }

    fn extract_clips(
        &self,
        ctx: &BackendContext<'_>,
        specs: &[ClipSpec],
        pool: &WorkerPool,
    ) -> Vec<ClipResult> {
        ClipExtractor::new(
            ctx.input,
            ctx.scratch_dir,
            ctx.profile.has_audio,
            Duration::from_secs(ctx.config.clip_timeout_secs),
            ctx.shutdown_signal,
        )
        .extract_all(specs, pool)
    }

    fn assemble(
        &self,
        ctx: &BackendContext<'_>,
        results: &[ClipResult],
        output_path: &Path,
    ) -> PreviewResultOf<AssembledPreview> {
        Self::assembler(ctx).assemble(results, output_path)
    }

    fn create_animated_image(
        &self,
        ctx: &BackendContext<'_>,
        assembled: &AssembledPreview,
        image_path: &Path,
    ) -> Result<()> {
        Self::assembler(ctx).create_animated_image(
            assembled,
            image_path,
            ctx.config.animated_image_width,
            ctx.config.animated_image_fps,
        )
    }
}
