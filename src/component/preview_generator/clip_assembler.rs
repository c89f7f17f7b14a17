use super::clip_extractor::ClipResult;
use crate::error::{PreviewError, PreviewResultOf};
use crate::tools::{ProcessOutcome, run_ffmpeg};
use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;

/// 串接清單檔名（位於暫存目錄）
const CONCAT_LIST_NAME: &str = "concat_list.txt";

/// 組裝完成的預覽影片
#[derive(Debug, Clone)]
pub struct AssembledPreview {
    pub output_path: PathBuf,
    pub clips_used: usize,
    /// 依片段長度與淡化計算的預期長度
    pub expected_duration: f64,
    /// 串接清單，動圖會重用
    pub concat_list: PathBuf,
}

/// 篩選成功的片段並依時間排序
///
/// 全部失敗時回傳 `NoUsableClips`。
pub fn usable_clips(results: &[ClipResult]) -> PreviewResultOf<Vec<&ClipResult>> {
    let mut usable: Vec<&ClipResult> = results
        .iter()
        .filter(|r| r.success && r.output_path.is_some())
        .collect();

    if usable.is_empty() {
        return Err(PreviewError::NoUsableClips {
            attempted: results.len(),
        });
    }

    usable.sort_by(|a, b| a.spec.start.total_cmp(&b.spec.start));
    Ok(usable)
}

/// 預期輸出長度：片段總長扣掉每個交界的淡化重疊
#[must_use]
pub fn expected_duration(durations: &[f64], transition: Option<f64>) -> f64 {
    let total: f64 = durations.iter().sum();
    match transition {
        Some(fade) if durations.len() > 1 => total - fade * (durations.len() - 1) as f64,
        _ => total,
    }
}

/// 建立 concat demuxer 清單內容
fn build_concat_list(paths: &[&Path]) -> String {
    let mut content = String::new();
    for path in paths {
        // concat 清單以單引號包住路徑，路徑中的單引號需跳脫
        let escaped = path.to_string_lossy().replace('\'', r"'\''");
        let _ = writeln!(content, "file '{escaped}'");
    }
    content
}

fn concat_input_args(list_path: &Path) -> Vec<String> {
    vec![
        "-hide_banner".to_string(),
        "-nostdin".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-f".to_string(),
        "concat".to_string(),
        "-safe".to_string(),
        "0".to_string(),
        "-i".to_string(),
        list_path.to_string_lossy().to_string(),
    ]
}

/// 直接串接（不重新編碼）
#[must_use]
pub fn build_concat_args(list_path: &Path, output_path: &Path) -> Vec<String> {
    let mut args = concat_input_args(list_path);
    args.extend([
        "-c".to_string(),
        "copy".to_string(),
        "-movflags".to_string(),
        "+faststart".to_string(),
        "-y".to_string(),
        output_path.to_string_lossy().to_string(),
    ]);
    args
}

/// 建立 xfade / acrossfade 濾鏡鏈
///
/// 第 k 個交界的 offset 為目前累積長度減去淡化長度。
/// 最終輸出標籤為 `[vout]` 與 `[aout]`。
#[must_use]
pub fn build_crossfade_filter(durations: &[f64], fade: f64, with_audio: bool) -> String {
    let mut parts = Vec::with_capacity(durations.len() * 4);

    for i in 0..durations.len() {
        parts.push(format!("[{i}:v]settb=AVTB,setpts=PTS-STARTPTS[v{i}]"));
        if with_audio {
            parts.push(format!("[{i}:a]asetpts=PTS-STARTPTS[a{i}]"));
        }
    }

    let last = durations.len().saturating_sub(1);
    let mut video_prev = "v0".to_string();
    let mut audio_prev = "a0".to_string();
    let mut length = durations.first().copied().unwrap_or(0.0);

    for (i, duration) in durations.iter().enumerate().skip(1) {
        let offset = (length - fade).max(0.0);
        let (video_out, audio_out) = if i == last {
            ("vout".to_string(), "aout".to_string())
        } else {
            (format!("vx{i}"), format!("ax{i}"))
        };

        parts.push(format!(
            "[{video_prev}][v{i}]xfade=transition=fade:duration={fade:.3}:offset={offset:.3}[{video_out}]"
        ));
        if with_audio {
            parts.push(format!(
                "[{audio_prev}][a{i}]acrossfade=d={fade:.3}[{audio_out}]"
            ));
        }

        video_prev = video_out;
        audio_prev = audio_out;
        length += duration - fade;
    }

    parts.join(";")
}

/// 交叉淡化串接（需要重新編碼）
#[must_use]
pub fn build_crossfade_args(
    inputs: &[&Path],
    filter: &str,
    with_audio: bool,
    quality: u8,
    output_path: &Path,
) -> Vec<String> {
    let mut args = vec![
        "-hide_banner".to_string(),
        "-nostdin".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
    ];

    for input in inputs {
        args.push("-i".to_string());
        args.push(input.to_string_lossy().to_string());
    }

    args.extend([
        "-filter_complex".to_string(),
        filter.to_string(),
        "-map".to_string(),
        "[vout]".to_string(),
    ]);
    if with_audio {
        args.extend(["-map".to_string(), "[aout]".to_string()]);
    }

    args.extend([
        "-c:v".to_string(),
        "libx264".to_string(),
        "-preset".to_string(),
        "veryfast".to_string(),
        "-crf".to_string(),
        quality.to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
    ]);
    if with_audio {
        args.extend([
            "-c:a".to_string(),
            "aac".to_string(),
            "-b:a".to_string(),
            "128k".to_string(),
        ]);
    }

    args.extend([
        "-movflags".to_string(),
        "+faststart".to_string(),
        "-y".to_string(),
        output_path.to_string_lossy().to_string(),
    ]);
    args
}

/// 以調色盤產生 GIF
#[must_use]
pub fn build_animated_image_args(
    list_path: &Path,
    width: u32,
    fps: f64,
    output_path: &Path,
) -> Vec<String> {
    let filter = format!(
        "fps={fps},scale={width}:-1:flags=lanczos,split[s0][s1];[s0]palettegen[p];[s1][p]paletteuse"
    );

    let mut args = concat_input_args(list_path);
    args.extend([
        "-vf".to_string(),
        filter,
        "-loop".to_string(),
        "0".to_string(),
        "-y".to_string(),
        output_path.to_string_lossy().to_string(),
    ]);
    args
}

/// 片段組裝器
pub struct ClipAssembler<'a> {
    scratch_dir: &'a Path,
    include_audio: bool,
    transition: Option<f64>,
    quality: u8,
    shutdown_signal: &'a AtomicBool,
}

impl<'a> ClipAssembler<'a> {
    #[must_use]
    pub const fn new(
        scratch_dir: &'a Path,
        include_audio: bool,
        transition: Option<f64>,
        quality: u8,
        shutdown_signal: &'a AtomicBool,
    ) -> Self {
        Self {
            scratch_dir,
            include_audio,
            transition,
            quality,
            shutdown_signal,
        }
    }

    /// 依時間順序串接成功的片段
    pub fn assemble(
        &self,
        results: &[ClipResult],
        output_path: &Path,
    ) -> PreviewResultOf<AssembledPreview> {
        let clips = usable_clips(results)?;
        let paths: Vec<&Path> = clips
            .iter()
            .filter_map(|c| c.output_path.as_deref())
            .collect();
        let durations: Vec<f64> = clips.iter().map(|c| c.spec.duration).collect();

        info!(
            "串接 {} 個片段（共 {} 個）: {}",
            clips.len(),
            results.len(),
            output_path.display()
        );

        let concat_list = self.scratch_dir.join(CONCAT_LIST_NAME);
        fs::write(&concat_list, build_concat_list(&paths))?;

        let transition = self.transition.filter(|_| clips.len() > 1);
        let args = match transition {
            Some(fade) => {
                let filter = build_crossfade_filter(&durations, fade, self.include_audio);
                debug!("交叉淡化濾鏡: {filter}");
                build_crossfade_args(&paths, &filter, self.include_audio, self.quality, output_path)
            }
            None => build_concat_args(&concat_list, output_path),
        };

        let outcome = run_ffmpeg(&args, self.shutdown_signal)?;
        if !outcome.is_success() {
            remove_partial_output(output_path);
            if matches!(outcome, ProcessOutcome::Cancelled) {
                return Err(PreviewError::Cancelled);
            }
            return Err(PreviewError::AssemblyFailed(
                outcome.diagnostic().unwrap_or_default(),
            ));
        }

        if !output_path.exists() {
            return Err(PreviewError::AssemblyFailed(format!(
                "輸出檔案未建立: {}",
                output_path.display()
            )));
        }

        Ok(AssembledPreview {
            output_path: output_path.to_path_buf(),
            clips_used: clips.len(),
            expected_duration: expected_duration(&durations, transition),
            concat_list,
        })
    }

    /// 從片段集合產生低解析度動圖
    ///
    /// 失敗只影響動圖本身，不影響影片結果。
    pub fn create_animated_image(
        &self,
        assembled: &AssembledPreview,
        image_path: &Path,
        width: u32,
        fps: f64,
    ) -> Result<()> {
        let args = build_animated_image_args(&assembled.concat_list, width, fps, image_path);
        let outcome = run_ffmpeg(&args, self.shutdown_signal).context("無法執行 ffmpeg 產生動圖")?;

        if !outcome.is_success() {
            remove_partial_output(image_path);
            anyhow::bail!(
                "ffmpeg 產生動圖失敗: {}",
                outcome.diagnostic().unwrap_or_default()
            );
        }

        if !image_path.exists() {
            anyhow::bail!("動圖未建立: {}", image_path.display());
        }

        debug!("動圖已建立: {}", image_path.display());
        Ok(())
    }
}

fn remove_partial_output(path: &Path) {
    if path.exists() {
        if let Err(e) = fs::remove_file(path) {
            warn!("無法刪除殘缺的輸出檔案 {}: {}", path.display(), e);
        } else {
            debug!("已刪除殘缺的輸出檔案: {}", path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::preview_generator::clip_extractor::ClipSpec;

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

    fn results_with_failure(count: usize, failed_index: usize) -> Vec<ClipResult> {
        // 故意打亂時間順序
        (0..count)
            .rev()
            .map(|i| {
                let s = spec(i, i as f64 * 30.0);
                if i == failed_index {
                    ClipResult::failed(s, "timeout".to_string())
                } else {
                    ClipResult::succeeded(s, PathBuf::from(format!("/tmp/clip_{i:03}.mp4")))
                }
            })
            .collect()
    }

    #[test]
    fn test_usable_clips_skips_single_failure() {
        let results = results_with_failure(18, 7);
        let usable = usable_clips(&results).unwrap();

        assert_eq!(usable.len(), 17);
        assert!(usable.iter().all(|c| c.success));
        assert!(usable.iter().all(|c| c.spec.index != 7));
        for pair in usable.windows(2) {
            assert!(pair[1].spec.start > pair[0].spec.start);
        }
    }

    #[test]
    fn test_usable_clips_all_failed() {
        let results: Vec<ClipResult> = (0..4)
            .map(|i| ClipResult::failed(spec(i, i as f64), "boom".to_string()))
            .collect();
        let err = usable_clips(&results).unwrap_err();
        assert_eq!(err.kind(), "no_usable_clips");
        assert!(matches!(err, PreviewError::NoUsableClips { attempted: 4 }));
    }

    #[test]
    fn test_expected_duration() {
        assert!((expected_duration(&[2.5; 18], None) - 45.0).abs() < 1e-9);
        assert!((expected_duration(&[2.5; 4], Some(0.5)) - 8.5).abs() < 1e-9);
        assert!((expected_duration(&[2.5], Some(0.5)) - 2.5).abs() < 1e-9);
        assert!(expected_duration(&[], None).abs() < 1e-9);
    }

    #[test]
    fn test_build_concat_list_escapes_quotes() {
        let content = build_concat_list(&[
            Path::new("/tmp/clip_000.mp4"),
            Path::new("/tmp/it's/clip_001.mp4"),
        ]);
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "file '/tmp/clip_000.mp4'");
        assert_eq!(lines[1], r"file '/tmp/it'\''s/clip_001.mp4'");
    }

    #[test]
    fn test_build_concat_args() {
        let args = build_concat_args(Path::new("/tmp/list.txt"), Path::new("/out/p.mp4"));
        assert!(args.windows(2).any(|w| w[0] == "-f" && w[1] == "concat"));
        assert!(args.windows(2).any(|w| w[0] == "-c" && w[1] == "copy"));
        assert!(args.contains(&"+faststart".to_string()));
        assert_eq!(args.last().unwrap(), "/out/p.mp4");
    }

    #[test]
    fn test_build_crossfade_filter_offsets() {
        let filter = build_crossfade_filter(&[2.5, 2.5, 2.5], 0.5, true);
        assert!(filter.contains("[v0][v1]xfade=transition=fade:duration=0.500:offset=2.000[vx1]"));
        assert!(filter.contains("[vx1][v2]xfade=transition=fade:duration=0.500:offset=4.000[vout]"));
        assert!(filter.contains("[a0][a1]acrossfade=d=0.500[ax1]"));
        assert!(filter.contains("[ax1][a2]acrossfade=d=0.500[aout]"));
    }

    #[test]
    fn test_build_crossfade_filter_video_only() {
        let filter = build_crossfade_filter(&[2.5, 2.5], 0.3, false);
        assert!(filter.contains("xfade"));
        assert!(filter.contains("[vout]"));
        assert!(!filter.contains("acrossfade"));
        assert!(!filter.contains(":a]"));
    }

    #[test]
    fn test_build_crossfade_args_maps_outputs() {
        let inputs = [Path::new("/tmp/a.mp4"), Path::new("/tmp/b.mp4")];
        let args = build_crossfade_args(&inputs, "f", true, 23, Path::new("/out/p.mp4"));
        assert_eq!(args.iter().filter(|a| *a == "-i").count(), 2);
        assert!(args.contains(&"[vout]".to_string()));
        assert!(args.contains(&"[aout]".to_string()));
        assert!(args.windows(2).any(|w| w[0] == "-crf" && w[1] == "23"));
    }

    #[test]
    fn test_build_animated_image_args() {
        let args = build_animated_image_args(
            Path::new("/tmp/list.txt"),
            480,
            10.0,
            Path::new("/out/p.gif"),
        );
        let filter = &args[args.iter().position(|a| a == "-vf").unwrap() + 1];
        assert!(filter.contains("scale=480:-1"));
        assert!(filter.contains("fps=10"));
        assert!(filter.contains("palettegen"));
        assert_eq!(args.last().unwrap(), "/out/p.gif");
    }

    #[test]
    fn test_assemble_without_successes_writes_nothing() {
        let scratch = tempfile::tempdir().unwrap();
        let output = scratch.path().join("preview.mp4");
        let shutdown = AtomicBool::new(false);
        let assembler = ClipAssembler::new(scratch.path(), true, None, 20, &shutdown);

        let results = vec![ClipResult::failed(spec(0, 0.0), "boom".to_string())];
        let err = assembler.assemble(&results, &output).unwrap_err();

        assert_eq!(err.kind(), "no_usable_clips");
        assert!(!output.exists());
    }
}
