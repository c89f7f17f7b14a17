//! 場景評分
//!
//! 權重是固定的領域常數：膚色與動態為主，音量與畫面複雜度為輔。

use super::signal_sampler::SampleSignal;

pub const SKIN_TONE_WEIGHT: f64 = 0.4;
pub const MOTION_WEIGHT: f64 = 0.3;
pub const AUDIO_WEIGHT: f64 = 0.2;
pub const COMPLEXITY_WEIGHT: f64 = 0.1;

/// 計算加權綜合分數，結果在 [0, 1]
///
/// 音量項取平均音量與峰值音量中較高者。
#[must_use]
pub fn score(signal: &SampleSignal) -> f64 {
    let audio = unit(signal.audio_mean).max(unit(signal.audio_peak));

    let total = SKIN_TONE_WEIGHT * unit(signal.skin_tone)
        + MOTION_WEIGHT * unit(signal.motion)
        + AUDIO_WEIGHT * audio
        + COMPLEXITY_WEIGHT * unit(signal.complexity);

    total.clamp(0.0, 1.0)
}

/// 非有限值視為 0
fn unit(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}
