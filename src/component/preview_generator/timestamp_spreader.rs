//! 均勻時間點分布
//!
//! 關鍵幀取樣、音量探測點與高潮區密集取樣都用同一個公式：
//! 在每個時段的中間位置取樣，`start + (end - start) * (i + 0.5) / count`。

/// 取樣解析度（秒）
pub const SNAP_RESOLUTION: f64 = 0.1;

/// 在 `[start, end]` 內選取均勻分布的時間點
#[must_use]
pub fn spread_timestamps(start: f64, end: f64, count: usize) -> Vec<f64> {
    if count == 0 || !start.is_finite() || !end.is_finite() || end < start {
        return Vec::new();
    }

    let span = end - start;
    (0..count)
        .map(|i| {
            let ratio = (i as f64 + 0.5) / count as f64;
            (start + span * ratio).clamp(start, end)
        })
        .collect()
}

/// 對齊到取樣解析度並限制在 `[0, max]`
#[must_use]
pub fn snap_timestamp(timestamp: f64, max: f64) -> f64 {
    let snapped = (timestamp / SNAP_RESOLUTION).round() * SNAP_RESOLUTION;
    snapped.min(max).max(0.0)
}

/// 對齊、排序並去除重複的時間點
#[must_use]
pub fn snap_and_dedup(timestamps: impl IntoIterator<Item = f64>, max: f64) -> Vec<f64> {
    let mut snapped: Vec<f64> = timestamps
        .into_iter()
        .filter(|t| t.is_finite())
        .map(|t| snap_timestamp(t, max))
        .collect();

    snapped.sort_by(f64::total_cmp);
    snapped.dedup_by(|a, b| (*a - *b).abs() < SNAP_RESOLUTION / 2.0);
    snapped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spread_timestamps_basic() {
        let timestamps = spread_timestamps(0.0, 100.0, 5);
        assert_eq!(timestamps.len(), 5);
        assert!((timestamps[0] - 10.0).abs() < 1e-9);
        assert!((timestamps[2] - 50.0).abs() < 1e-9);
        assert!((timestamps[4] - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_spread_timestamps_offset_range() {
        let timestamps = spread_timestamps(960.0, 1197.5, 20);
        assert_eq!(timestamps.len(), 20);
        for t in &timestamps {
            assert!(*t >= 960.0 && *t <= 1197.5);
        }
        for i in 1..timestamps.len() {
            assert!(timestamps[i] > timestamps[i - 1]);
        }
    }

    #[test]
    fn test_spread_timestamps_zero_width() {
        let timestamps = spread_timestamps(7.5, 7.5, 3);
        assert_eq!(timestamps, vec![7.5, 7.5, 7.5]);
    }

    #[test]
    fn test_spread_timestamps_edge_cases() {
        assert!(spread_timestamps(0.0, 10.0, 0).is_empty());
        assert!(spread_timestamps(10.0, 0.0, 5).is_empty());
        assert!(spread_timestamps(0.0, f64::NAN, 5).is_empty());
    }

    #[test]
    fn test_snap_timestamp() {
        assert!((snap_timestamp(12.34, 100.0) - 12.3).abs() < 1e-9);
        assert!((snap_timestamp(12.36, 100.0) - 12.4).abs() < 1e-9);
        assert!((snap_timestamp(99.99, 97.5) - 97.5).abs() < 1e-9);
        assert!(snap_timestamp(-0.3, 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_snap_and_dedup() {
        let result = snap_and_dedup([5.02, 1.0, 4.98, 1.04, 9.0], 8.0);
        assert_eq!(result.len(), 3);
        assert!((result[0] - 1.0).abs() < 1e-9);
        assert!((result[1] - 5.0).abs() < 1e-9);
        assert!((result[2] - 8.0).abs() < 1e-9);
    }
}
