use super::clip_extractor::{ClipEncoding, ClipSpec};
use super::scene_scorer::score;
use super::signal_sampler::{SampleSignal, SignalSampler, collect_signals};
use super::timestamp_spreader::{
    SNAP_RESOLUTION, snap_and_dedup, snap_timestamp, spread_timestamps,
};
use crate::config::PreviewConfig;
use crate::error::{PreviewError, PreviewResultOf};
use crate::tools::{VideoProfile, WorkerPool};
use log::{debug, info};
use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicBool, Ordering};

/// 高潮區從影片 80% 處開始
pub const CLIMAX_START_RATIO: f64 = 0.8;
/// 高潮區保留的片段比例
pub const CLIMAX_QUOTA_RATIO: f64 = 0.2;
pub const MIN_CLIMAX_CLIPS: usize = 2;

/// 關鍵幀取樣間隔（秒）
const KEYFRAME_INTERVAL: f64 = 8.0;
const MAX_KEYFRAME_SAMPLES: usize = 400;

/// 可分析的最短影片長度（秒）
const MIN_ANALYZABLE_DURATION: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Normal,
    Climax,
}

/// 已評分的候選時間點
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredCandidate {
    pub timestamp: f64,
    pub score: f64,
    pub region: Region,
}

/// 分數高者優先，同分時較早的時間點優先
fn by_score_then_time(a: &ScoredCandidate, b: &ScoredCandidate) -> CmpOrdering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.timestamp.total_cmp(&b.timestamp))
}

/// 取樣密度設定
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingParams {
    /// 關鍵幀取樣數量，`None` 時依影片長度決定
    pub keyframe_samples: Option<usize>,
    pub audio_probes: usize,
    pub climax_probes: usize,
}

impl SamplingParams {
    #[must_use]
    pub fn from_config(config: &PreviewConfig) -> Self {
        Self {
            keyframe_samples: config.sample_density,
            audio_probes: config.audio_probe_count,
            climax_probes: config.climax_probe_count,
        }
    }
}

/// 依影片長度規劃的時間軸
///
/// 所有候選時間點都是片段起點，範圍在 `[0, duration - clip_duration]`。
#[derive(Debug, Clone, PartialEq)]
pub struct TimelinePlan {
    pub duration: f64,
    pub clip_duration: f64,
    /// 最晚的片段起點
    pub max_start: f64,
    /// 高潮區起點（不超過 `max_start`）
    pub climax_start: f64,
    /// 實際要選取的片段數
    pub clip_count: usize,
}

impl TimelinePlan {
    /// 建立時間軸規劃
    ///
    /// 影片太短時會把片段數降到不重疊可容納的數量。
    pub fn new(
        profile: &VideoProfile,
        clip_duration: f64,
        requested_clips: usize,
    ) -> PreviewResultOf<Self> {
        let duration = profile.duration;
        if !(duration.is_finite() && duration >= MIN_ANALYZABLE_DURATION) {
            return Err(PreviewError::InsufficientContent(format!(
                "影片太短（{duration:.2}s）"
            )));
        }
        if !(clip_duration.is_finite() && clip_duration > 0.0) || duration < clip_duration {
            return Err(PreviewError::InsufficientContent(format!(
                "影片長度 {duration:.2}s 不足一個 {clip_duration:.2}s 的片段"
            )));
        }

        let max_start = duration - clip_duration;
        let climax_start = (duration * CLIMAX_START_RATIO).min(max_start);

        let capacity = ((duration / clip_duration).floor() as usize).max(1);
        let clip_count = requested_clips.max(1).min(capacity);
        if clip_count < requested_clips {
            info!("影片長度只容納 {clip_count} 個片段（要求 {requested_clips} 個）");
        }

        Ok(Self {
            duration,
            clip_duration,
            max_start,
            climax_start,
            clip_count,
        })
    }

    #[must_use]
    pub fn region_of(&self, timestamp: f64) -> Region {
        if timestamp >= self.climax_start {
            Region::Climax
        } else {
            Region::Normal
        }
    }

    #[must_use]
    pub fn climax_quota(&self) -> usize {
        climax_quota(self.clip_count)
    }

    /// 產生所有候選時間點：關鍵幀、音量探測點、高潮區密集取樣
    ///
    /// 高潮區取樣點對齊後不會落到 `climax_start` 之前。
    #[must_use]
    pub fn candidate_timestamps(&self, params: &SamplingParams) -> Vec<f64> {
        let keyframe_count = params.keyframe_samples.unwrap_or_else(|| {
            let by_interval = (self.max_start / KEYFRAME_INTERVAL).ceil() as usize;
            let wanted = by_interval.max(self.clip_count * 2);
            if wanted > MAX_KEYFRAME_SAMPLES {
                debug!("關鍵幀取樣數 {wanted} 超過上限，改為 {MAX_KEYFRAME_SAMPLES}");
            }
            wanted.min(MAX_KEYFRAME_SAMPLES)
        });

        let keyframes = spread_timestamps(0.0, self.max_start, keyframe_count);
        let audio_probes = spread_timestamps(0.0, self.max_start, params.audio_probes);
        let climax = spread_timestamps(
            self.climax_start,
            self.max_start,
            params.climax_probes.max(1),
        );

        debug!(
            "候選時間點: 關鍵幀 {}, 音量 {}, 高潮區 {}",
            keyframes.len(),
            audio_probes.len(),
            climax.len()
        );

        let climax_start = self.climax_start;
        let mut timestamps = snap_and_dedup(keyframes.into_iter().chain(audio_probes), self.max_start);
        timestamps.extend(
            climax
                .into_iter()
                .map(|t| snap_timestamp(t, self.max_start).max(climax_start)),
        );
        timestamps.sort_by(f64::total_cmp);
        // 重複時保留高潮區的那一個
        timestamps.dedup_by(|later, earlier| {
            let duplicate = (*later - *earlier).abs() < SNAP_RESOLUTION / 2.0;
            if duplicate && *later >= climax_start && *earlier < climax_start {
                *earlier = *later;
            }
            duplicate
        });
        timestamps
    }

    /// 把一般區 `[0, climax_start)` 切成等寬區段
    #[must_use]
    pub fn normal_sections(&self, count: usize) -> Vec<(f64, f64)> {
        if count == 0 {
            return Vec::new();
        }
        let width = self.climax_start / count as f64;
        (0..count)
            .map(|i| (width * i as f64, width * (i + 1) as f64))
            .collect()
    }
}

/// 高潮區保留數量：`max(2, round(0.2 * n))`，不超過 n
#[must_use]
pub fn climax_quota(clip_count: usize) -> usize {
    let by_ratio = (CLIMAX_QUOTA_RATIO * clip_count as f64).round() as usize;
    by_ratio.max(MIN_CLIMAX_CLIPS).min(clip_count)
}

/// 從已評分的訊號中選出片段起點
///
/// 1. 高潮區取分數最高的 K 個，之後不會被替換
/// 2. 剩餘名額平均分給一般區的各區段，每段取最高分者
///    （沒有正分候選時取區段中點，確保涵蓋整部影片）
/// 3. 依時間排序
pub fn select_from_signals(
    plan: &TimelinePlan,
    signals: &[SampleSignal],
) -> PreviewResultOf<Vec<ScoredCandidate>> {
    let candidates: Vec<ScoredCandidate> = signals
        .iter()
        .filter(|s| {
            s.timestamp.is_finite() && s.timestamp >= 0.0 && s.timestamp <= plan.max_start
        })
        .map(|s| ScoredCandidate {
            timestamp: s.timestamp,
            score: score(s),
            region: plan.region_of(s.timestamp),
        })
        .collect();

    if candidates.is_empty() {
        return Err(PreviewError::InsufficientContent(
            "沒有可評分的候選時間點".to_string(),
        ));
    }

    let mut climax: Vec<ScoredCandidate> = candidates
        .iter()
        .filter(|c| c.region == Region::Climax)
        .copied()
        .collect();
    climax.sort_by(by_score_then_time);
    climax.truncate(plan.climax_quota());

    let fill_slots = plan.clip_count - climax.len();
    let sections = plan.normal_sections(fill_slots);

    let fill = sections.iter().map(|&(start, end)| {
        candidates
            .iter()
            .filter(|c| {
                c.region == Region::Normal
                    && c.timestamp >= start
                    && c.timestamp < end
                    && c.score > 0.0
            })
            .min_by(|a, b| by_score_then_time(a, b))
            .copied()
            .unwrap_or_else(|| {
                let midpoint = f64::midpoint(start, end).min(plan.max_start);
                debug!("區段 [{start:.1}, {end:.1}) 沒有正分候選，使用中點 {midpoint:.1}s");
                ScoredCandidate {
                    timestamp: midpoint,
                    score: 0.0,
                    region: Region::Normal,
                }
            })
    });

    let mut selected: Vec<ScoredCandidate> = climax.iter().copied().chain(fill).collect();
    selected.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));

    info!(
        "選取 {} 個片段（高潮區 {}，一般區 {}），候選 {} 個",
        selected.len(),
        climax.len(),
        fill_slots,
        candidates.len()
    );

    Ok(selected)
}

/// 取樣、評分並選出片段起點
///
/// 取樣在工作池中平行執行，是整個流程最耗時的部分。
pub fn select_clips<S: SignalSampler>(
    plan: &TimelinePlan,
    params: &SamplingParams,
    sampler: &S,
    pool: &WorkerPool,
    shutdown_signal: &AtomicBool,
) -> PreviewResultOf<Vec<ScoredCandidate>> {
    let timestamps = plan.candidate_timestamps(params);
    if timestamps.is_empty() {
        return Err(PreviewError::InsufficientContent(
            "無法產生候選時間點".to_string(),
        ));
    }

    let signals = collect_signals(sampler, &timestamps, pool, shutdown_signal);
    if shutdown_signal.load(Ordering::SeqCst) {
        return Err(PreviewError::Cancelled);
    }

    select_from_signals(plan, &signals)
}

/// 將選取結果轉換為擷取規格
#[must_use]
pub fn to_clip_specs(
    plan: &TimelinePlan,
    selected: &[ScoredCandidate],
    encoding: &ClipEncoding,
) -> Vec<ClipSpec> {
    selected
        .iter()
        .enumerate()
        .map(|(index, candidate)| ClipSpec {
            index,
            start: candidate.timestamp.clamp(0.0, plan.max_start),
            duration: plan.clip_duration,
            target_height: encoding.target_height,
            frame_rate: encoding.frame_rate,
            quality: encoding.quality,
        })
        .collect()
}
