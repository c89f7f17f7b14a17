use anyhow::{Context, Result};
use log::{info, warn};
use preview_clip_engine::PreviewEngine;
use preview_clip_engine::config::PreviewConfig;
use preview_clip_engine::init;
use preview_clip_engine::signal::setup_shutdown_signal;
use serde::Deserialize;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::ExitCode;

/// 從 stdin 讀入的工作描述
#[derive(Debug, Deserialize)]
struct PreviewJob {
    input: PathBuf,
    #[serde(flatten)]
    config: PreviewConfig,
}

fn read_job() -> Result<PreviewJob> {
    let mut content = String::new();
    io::stdin()
        .read_to_string(&mut content)
        .context("無法讀取 stdin")?;
    serde_json::from_str(&content).context("無法解析工作描述 JSON")
}

fn main() -> Result<ExitCode> {
    init::init();
    let shutdown_signal = setup_shutdown_signal()?;

    let job = read_job()?;
    let engine = PreviewEngine::new(job.config, shutdown_signal);
    let result = engine.generate_report(&job.input);

    println!(
        "{}",
        serde_json::to_string_pretty(&result).context("無法輸出結果 JSON")?
    );

    if result.success {
        info!("完成");
        Ok(ExitCode::SUCCESS)
    } else {
        warn!("預覽產生失敗");
        Ok(ExitCode::FAILURE)
    }
}
