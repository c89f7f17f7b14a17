use crate::tools::{ProcessOutput, WorkerPool, run_capturing_output};
use anyhow::Context;
use log::{debug, warn};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

/// 分析用影格尺寸（縮小以加速解碼與統計）
pub const FRAME_WIDTH: usize = 160;
pub const FRAME_HEIGHT: usize = 90;

/// 兩段式 seek 的前置緩衝時間（秒）
const SEEK_MARGIN: f64 = 2.0;

/// ffmpeg volumedetect 對數位靜音回報約 -91 dB
const SILENCE_DB: f64 = -90.0;

/// 亮度平均絕對差達到此值即視為最大動態
const MOTION_FULL_SCALE: f64 = 48.0;

// 格式: [Parsed_volumedetect_0 @ 0x...] mean_volume: -23.4 dB
static REGEX_MEAN_VOLUME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"mean_volume:\s*(-?(?:inf|[0-9]+(?:\.[0-9]+)?))\s*dB").expect("Invalid regex")
});

static REGEX_MAX_VOLUME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"max_volume:\s*(-?(?:inf|[0-9]+(?:\.[0-9]+)?))\s*dB").expect("Invalid regex")
});

/// 邊緣判定的亮度梯度門檻
const EDGE_THRESHOLD: i32 = 24;

/// 單一時間點的訊號，所有數值皆在 [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SampleSignal {
    pub timestamp: f64,
    pub skin_tone: f64,
    pub motion: f64,
    pub complexity: f64,
    pub audio_mean: f64,
    pub audio_peak: f64,
}

impl SampleSignal {
    /// 解碼失敗時使用的中性訊號
    #[must_use]
    pub fn neutral(timestamp: f64) -> Self {
        Self {
            timestamp,
            ..Self::default()
        }
    }
}

/// 單張影格的視覺統計
#[derive(Debug, Clone, PartialEq)]
pub struct VisualSample {
    pub skin_tone: f64,
    pub complexity: f64,
    /// 灰階影格，用於事後計算動態
    pub luma: Vec<u8>,
}

/// 音量視窗的量測結果（dB）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioSample {
    pub mean_db: f64,
    pub max_db: f64,
}

/// 對單一時間點取樣
///
/// 實作必須是無狀態的，失敗時回傳 `None` 而不是錯誤。
pub trait SignalSampler: Sync {
    fn sample_visual(&self, timestamp: f64) -> Option<VisualSample>;
    fn sample_audio(&self, timestamp: f64) -> Option<AudioSample>;
}

/// 以 ffmpeg 解碼影格與音訊的取樣器
///
/// 每次取樣都是獨立的 ffmpeg 程序，受單次逾時與中斷信號限制。
pub struct FfmpegSampler {
    video_path: PathBuf,
    has_audio: bool,
    audio_window: f64,
    timeout: Duration,
    shutdown_signal: Arc<AtomicBool>,
    binary: PathBuf,
}

impl FfmpegSampler {
    #[must_use]
    pub fn new(
        video_path: &Path,
        has_audio: bool,
        audio_window: f64,
        timeout: Duration,
        shutdown_signal: Arc<AtomicBool>,
    ) -> Self {
        Self {
            video_path: video_path.to_path_buf(),
            has_audio,
            audio_window,
            timeout,
            shutdown_signal,
            binary: PathBuf::from("ffmpeg"),
        }
    }

    /// 指定 ffmpeg 執行檔路徑
    #[must_use]
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    fn run(&self, command: Command) -> anyhow::Result<ProcessOutput> {
        let output = run_capturing_output(command, self.timeout, &self.shutdown_signal)
            .with_context(|| format!("無法執行 {}", self.binary.display()))?;
        if let Some(diagnostic) = output.outcome.diagnostic() {
            anyhow::bail!("{diagnostic}");
        }
        Ok(output)
    }

    fn decode_frame(&self, timestamp: f64) -> anyhow::Result<Vec<u8>> {
        let t0 = (timestamp - SEEK_MARGIN).max(0.0);
        let delta = timestamp - t0;

        let mut command = Command::new(&self.binary);
        command.args(["-hide_banner", "-nostdin", "-loglevel", "error"]);
        if t0 > 0.0 {
            command.args(["-ss", &format!("{t0:.3}")]);
        }
        command.arg("-i").arg(&self.video_path);
        if delta > 0.0 {
            command.args(["-ss", &format!("{delta:.3}")]);
        }
        command.args([
            "-frames:v",
            "1",
            "-an",
            "-sn",
            "-dn",
            "-threads",
            "1",
            "-vf",
            &format!("scale={FRAME_WIDTH}:{FRAME_HEIGHT}"),
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgb24",
            "pipe:1",
        ]);

        let output = self.run(command).context("ffmpeg 解碼失敗")?;

        let expected = FRAME_WIDTH * FRAME_HEIGHT * 3;
        if output.stdout.len() < expected {
            anyhow::bail!(
                "影格資料不完整: {} / {} bytes",
                output.stdout.len(),
                expected
            );
        }

        let mut frame = output.stdout;
        frame.truncate(expected);
        Ok(frame)
    }

    fn measure_volume(&self, timestamp: f64) -> anyhow::Result<AudioSample> {
        let start = (timestamp - self.audio_window / 2.0).max(0.0);

        let mut command = Command::new(&self.binary);
        command
            .args(["-hide_banner", "-nostdin", "-nostats", "-loglevel", "info"])
            .args(["-ss", &format!("{start:.3}")])
            .args(["-t", &format!("{:.3}", self.audio_window)])
            .arg("-i")
            .arg(&self.video_path)
            .args([
                "-vn", "-sn", "-dn", "-threads", "1", "-af", "volumedetect", "-f", "null", "-",
            ]);

        let output = self.run(command).context("ffmpeg 音量量測失敗")?;

        // volumedetect 輸出在 stderr
        parse_volumedetect(&output.stderr).ok_or_else(|| anyhow::anyhow!("找不到 volumedetect 輸出"))
    }
}

impl SignalSampler for FfmpegSampler {
    fn sample_visual(&self, timestamp: f64) -> Option<VisualSample> {
        if self.shutdown_signal.load(Ordering::SeqCst) {
            return None;
        }
        match self.decode_frame(timestamp) {
            Ok(frame) => Some(analyze_frame(&frame, FRAME_WIDTH, FRAME_HEIGHT)),
            Err(e) => {
                warn!("影格取樣失敗 [{timestamp:.2}s]: {e:#}");
                None
            }
        }
    }

    fn sample_audio(&self, timestamp: f64) -> Option<AudioSample> {
        if !self.has_audio || self.shutdown_signal.load(Ordering::SeqCst) {
            return None;
        }
        match self.measure_volume(timestamp) {
            Ok(sample) => Some(sample),
            Err(e) => {
                warn!("音量取樣失敗 [{timestamp:.2}s]: {e:#}");
                None
            }
        }
    }
}

/// 解析 volumedetect 的 mean_volume / max_volume
fn parse_volumedetect(output: &str) -> Option<AudioSample> {
    let capture = |regex: &Regex| {
        regex
            .captures(output)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<f64>().ok())
            .map(|db| db.max(-91.0))
    };

    Some(AudioSample {
        mean_db: capture(&REGEX_MEAN_VOLUME)?,
        max_db: capture(&REGEX_MAX_VOLUME)?,
    })
}

/// 計算 RGB24 影格的膚色比例、複雜度與灰階影格
#[must_use]
pub fn analyze_frame(rgb: &[u8], width: usize, height: usize) -> VisualSample {
    let pixel_count = width * height;
    if pixel_count == 0 || rgb.len() < pixel_count * 3 {
        return VisualSample {
            skin_tone: 0.0,
            complexity: 0.0,
            luma: Vec::new(),
        };
    }

    let mut skin_pixels = 0usize;
    let mut luma = Vec::with_capacity(pixel_count);

    for px in rgb.chunks_exact(3).take(pixel_count) {
        let (r, g, b) = (px[0], px[1], px[2]);
        if is_skin_tone(r, g, b) {
            skin_pixels += 1;
        }
        // ITU-R BT.601
        let y = 0.299 * f64::from(r) + 0.587 * f64::from(g) + 0.114 * f64::from(b);
        luma.push(y.round().clamp(0.0, 255.0) as u8);
    }

    VisualSample {
        skin_tone: skin_pixels as f64 / pixel_count as f64,
        complexity: visual_complexity(&luma, width, height),
        luma,
    }
}

/// RGB 空間的經驗膚色範圍
fn is_skin_tone(r: u8, g: u8, b: u8) -> bool {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    r > 95
        && g > 40
        && b > 20
        && max - min > 15
        && r.abs_diff(g) > 15
        && r > g
        && r > b
}

/// 亮度熵與邊緣密度各佔一半
fn visual_complexity(luma: &[u8], width: usize, height: usize) -> f64 {
    if luma.is_empty() {
        return 0.0;
    }

    let mut histogram = [0usize; 256];
    for &y in luma {
        histogram[y as usize] += 1;
    }
    let total = luma.len() as f64;
    let entropy: f64 = histogram
        .iter()
        .filter(|&&count| count > 0)
        .map(|&count| {
            let p = count as f64 / total;
            -p * p.log2()
        })
        .sum();
    let entropy_norm = (entropy / 8.0).clamp(0.0, 1.0);

    let edge_density = if width > 1 && height > 1 {
        let mut edges = 0usize;
        for row in 0..height - 1 {
            for col in 0..width - 1 {
                let i = row * width + col;
                let gx = i32::from(luma[i + 1]) - i32::from(luma[i]);
                let gy = i32::from(luma[i + width]) - i32::from(luma[i]);
                if gx.abs() + gy.abs() > EDGE_THRESHOLD {
                    edges += 1;
                }
            }
        }
        edges as f64 / ((width - 1) * (height - 1)) as f64
    } else {
        0.0
    };

    (0.5 * entropy_norm + 0.5 * edge_density).clamp(0.0, 1.0)
}

/// 兩張灰階影格的正規化平均絕對差
#[must_use]
pub fn motion_between(previous: &[u8], current: &[u8]) -> f64 {
    if previous.is_empty() || previous.len() != current.len() {
        return 0.0;
    }
    let total: u64 = previous
        .iter()
        .zip(current)
        .map(|(&a, &b)| u64::from(a.abs_diff(b)))
        .sum();
    let mean = total as f64 / previous.len() as f64;
    (mean / MOTION_FULL_SCALE).clamp(0.0, 1.0)
}

/// 音量正規化到串流自身的動態範圍
fn normalize_db(db: f64, floor: f64, ceiling: f64) -> f64 {
    if db <= SILENCE_DB || ceiling - floor < 1e-6 {
        return 0.0;
    }
    ((db - floor) / (ceiling - floor)).clamp(0.0, 1.0)
}

fn db_range(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    values
        .filter(|&db| db > SILENCE_DB)
        .fold(None, |range, db| match range {
            None => Some((db, db)),
            Some((lo, hi)) => Some((lo.min(db), hi.max(db))),
        })
}

/// 平行取樣所有時間點並組成完整訊號
///
/// 各工作單元互不相依；動態與音量正規化在全部完成後依時間順序計算。
/// 收到中斷信號後，尚未開始的時間點直接回傳中性訊號。
pub fn collect_signals<S: SignalSampler>(
    sampler: &S,
    timestamps: &[f64],
    pool: &WorkerPool,
    shutdown_signal: &AtomicBool,
) -> Vec<SampleSignal> {
    let mut ordered: Vec<f64> = timestamps.to_vec();
    ordered.sort_by(f64::total_cmp);

    let raw: Vec<(f64, Option<VisualSample>, Option<AudioSample>)> =
        pool.map(&ordered, |&timestamp| {
            if shutdown_signal.load(Ordering::SeqCst) {
                return (timestamp, None, None);
            }
            (
                timestamp,
                sampler.sample_visual(timestamp),
                sampler.sample_audio(timestamp),
            )
        });

    let visual_failures = raw.iter().filter(|(_, v, _)| v.is_none()).count();
    debug!(
        "取樣完成: {} 個時間點，影格失敗 {}",
        raw.len(),
        visual_failures
    );

    let mean_range = db_range(raw.iter().filter_map(|(_, _, a)| a.map(|a| a.mean_db)));
    let peak_range = db_range(raw.iter().filter_map(|(_, _, a)| a.map(|a| a.max_db)));

    let mut previous_luma: Option<&[u8]> = None;
    raw.iter()
        .map(|(timestamp, visual, audio)| {
            let mut signal = SampleSignal::neutral(*timestamp);

            if let Some(visual) = visual {
                signal.skin_tone = visual.skin_tone;
                signal.complexity = visual.complexity;
                signal.motion =
                    previous_luma.map_or(0.0, |prev| motion_between(prev, &visual.luma));
                previous_luma = Some(visual.luma.as_slice());
            }

            if let Some(audio) = audio {
                if let Some((lo, hi)) = mean_range {
                    signal.audio_mean = normalize_db(audio.mean_db, lo, hi);
                }
                if let Some((lo, hi)) = peak_range {
                    signal.audio_peak = normalize_db(audio.max_db, lo, hi);
                }
            }

            signal
        })
        .collect()
}
