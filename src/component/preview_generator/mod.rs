//! 影片預覽片段生成元件
//!
//! 從長影片中挑出最精彩的多個短片段，串接成一部預覽影片：
//! A. 取得影片資訊（ffprobe）
//! B. 平行取樣候選時間點（膚色、動態、音量、畫面複雜度）
//! C. 評分並選取（高潮區保留名額，一般區逐段覆蓋）
//! D. 平行擷取片段
//! E. 依時間順序串接，選擇性產生動圖

mod backend;
mod candidate_selector;
mod clip_assembler;
mod clip_extractor;
mod main;
mod scene_scorer;
mod signal_sampler;
mod timestamp_spreader;

pub use backend::{BackendContext, FfmpegBackend, MediaBackend};
pub use candidate_selector::{
    CLIMAX_QUOTA_RATIO, CLIMAX_START_RATIO, MIN_CLIMAX_CLIPS, Region, SamplingParams,
    ScoredCandidate, TimelinePlan, climax_quota, select_clips, select_from_signals,
    to_clip_specs,
};
pub use clip_assembler::{
    AssembledPreview, ClipAssembler, build_animated_image_args, build_concat_args,
    build_crossfade_args, build_crossfade_filter, expected_duration, usable_clips,
};
pub use clip_extractor::{ClipEncoding, ClipExtractor, ClipResult, ClipSpec};
pub use main::{ClipFailure, FailureReport, PreviewEngine, PreviewResult, StageTimings};
pub use scene_scorer::{
    AUDIO_WEIGHT, COMPLEXITY_WEIGHT, MOTION_WEIGHT, SKIN_TONE_WEIGHT, score,
};
pub use signal_sampler::{
    AudioSample, FfmpegSampler, SampleSignal, SignalSampler, VisualSample, analyze_frame,
    collect_signals, motion_between,
};
pub use timestamp_spreader::{SNAP_RESOLUTION, snap_and_dedup, snap_timestamp, spread_timestamps};
