use crate::error::{PreviewError, PreviewResultOf};
use log::{debug, warn};
use std::io::{self, Read};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// 外部程序的執行結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    Success,
    Failed { code: Option<i32>, stderr: String },
    TimedOut { stderr: String },
    Cancelled,
}

impl ProcessOutcome {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// 失敗時的診斷訊息
    #[must_use]
    pub fn diagnostic(&self) -> Option<String> {
        match self {
            Self::Success => None,
            Self::Failed { code, stderr } => Some(match code {
                Some(code) => format!("結束碼 {code}: {}", stderr.trim()),
                None => format!("程序被終止: {}", stderr.trim()),
            }),
            Self::TimedOut { stderr } => Some(format!("執行逾時: {}", stderr.trim())),
            Self::Cancelled => Some("操作已取消".to_string()),
        }
    }
}

/// 將程序啟動失敗轉換為工具不可用錯誤
#[must_use]
pub fn spawn_error(tool: &str, error: &io::Error) -> PreviewError {
    if error.kind() == io::ErrorKind::NotFound {
        PreviewError::tool_unavailable(tool, "找不到執行檔")
    } else {
        PreviewError::tool_unavailable(tool, error)
    }
}

/// 確認 ffmpeg 與 ffprobe 可以執行
pub fn ensure_tools_available() -> PreviewResultOf<()> {
    for tool in ["ffmpeg", "ffprobe"] {
        let output = Command::new(tool)
            .arg("-version")
            .stdin(Stdio::null())
            .output()
            .map_err(|e| spawn_error(tool, &e))?;

        if !output.status.success() {
            return Err(PreviewError::tool_unavailable(
                tool,
                format!("-version 回傳 {}", output.status),
            ));
        }
    }
    Ok(())
}

/// 擷取輸出的執行結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub outcome: ProcessOutcome,
    pub stdout: Vec<u8>,
    /// 成功時也保留，部分濾鏡把結果寫在 stderr
    pub stderr: String,
}

/// 執行外部程序，逾時或收到中斷信號時終止
///
/// stderr 由獨立執行緒讀取，避免管線緩衝區填滿時程序卡住。
pub fn run_with_timeout(
    command: Command,
    timeout: Duration,
    shutdown_signal: &AtomicBool,
) -> io::Result<ProcessOutcome> {
    spawn_and_wait(command, timeout, shutdown_signal, false).map(|output| output.outcome)
}

/// 同 `run_with_timeout`，另外收集 stdout 與 stderr
pub fn run_capturing_output(
    command: Command,
    timeout: Duration,
    shutdown_signal: &AtomicBool,
) -> io::Result<ProcessOutput> {
    spawn_and_wait(command, timeout, shutdown_signal, true)
}

fn spawn_and_wait(
    mut command: Command,
    timeout: Duration,
    shutdown_signal: &AtomicBool,
    capture_stdout: bool,
) -> io::Result<ProcessOutput> {
    if shutdown_signal.load(Ordering::SeqCst) {
        return Ok(ProcessOutput {
            outcome: ProcessOutcome::Cancelled,
            stdout: Vec::new(),
            stderr: String::new(),
        });
    }

    command
        .stdin(Stdio::null())
        .stdout(if capture_stdout {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stderr(Stdio::piped());

    let mut child = command.spawn()?;
    let pid = child.id();

    let stdout_reader = child.stdout.take().map(|mut stdout| {
        thread::spawn(move || {
            let mut buffer = Vec::new();
            let _ = stdout.read_to_end(&mut buffer);
            buffer
        })
    });
    let stderr_reader = child.stderr.take().map(|mut stderr| {
        thread::spawn(move || {
            let mut buffer = String::new();
            let _ = stderr.read_to_string(&mut buffer);
            buffer
        })
    });

    // 正常結束時等待管線讀完；被終止時子程序的子程序可能仍持有管線，不等待
    let finish = |outcome: ProcessOutcome, collect: bool| {
        if !collect {
            return ProcessOutput {
                outcome,
                stdout: Vec::new(),
                stderr: String::new(),
            };
        }
        let stdout = stdout_reader
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();
        let stderr = stderr_reader
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();
        let outcome = match outcome {
            ProcessOutcome::Failed { code, .. } => ProcessOutcome::Failed {
                code,
                stderr: stderr.clone(),
            },
            other => other,
        };
        ProcessOutput {
            outcome,
            stdout,
            stderr,
        }
    };

    let started = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                if status.success() {
                    return Ok(finish(ProcessOutcome::Success, true));
                }
                return Ok(finish(
                    ProcessOutcome::Failed {
                        code: status.code(),
                        stderr: String::new(),
                    },
                    true,
                ));
            }
            Ok(None) => {}
            Err(e) => {
                warn!("無法檢查程序狀態 [{pid}]: {e}");
                let _ = child.kill();
                let _ = child.wait();
                return Err(e);
            }
        }

        if shutdown_signal.load(Ordering::SeqCst) {
            warn!("終止程序 [{pid}]");
            let _ = child.kill();
            let _ = child.wait();
            return Ok(finish(ProcessOutcome::Cancelled, false));
        }

        if started.elapsed() >= timeout {
            warn!("程序逾時 [{pid}]，已執行 {:.1}s", started.elapsed().as_secs_f64());
            let _ = child.kill();
            let _ = child.wait();
            return Ok(finish(
                ProcessOutcome::TimedOut {
                    stderr: String::new(),
                },
                false,
            ));
        }

        thread::sleep(POLL_INTERVAL);
    }
}

/// 執行 ffmpeg 並等待完成（無逾時），用於組裝階段
pub fn run_ffmpeg(
    args: &[String],
    shutdown_signal: &AtomicBool,
) -> PreviewResultOf<ProcessOutcome> {
    debug!("執行: ffmpeg {}", args.join(" "));
    let mut command = Command::new("ffmpeg");
    command.args(args);
    run_with_timeout(command, Duration::MAX, shutdown_signal)
        .map_err(|e| spawn_error("ffmpeg", &e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_diagnostic() {
        assert!(ProcessOutcome::Success.diagnostic().is_none());
        assert!(ProcessOutcome::Success.is_success());

        let failed = ProcessOutcome::Failed {
            code: Some(1),
            stderr: "Invalid data found\n".to_string(),
        };
        let message = failed.diagnostic().unwrap();
        assert!(message.contains('1'));
        assert!(message.contains("Invalid data found"));
        assert!(!failed.is_success());

        let timed_out = ProcessOutcome::TimedOut {
            stderr: String::new(),
        };
        assert!(timed_out.diagnostic().unwrap().contains("逾時"));
    }

    #[test]
    fn test_spawn_error_not_found() {
        let error = io::Error::new(io::ErrorKind::NotFound, "no such file");
        let mapped = spawn_error("ffmpeg", &error);
        assert_eq!(mapped.kind(), "tool_unavailable");
    }

    #[test]
    fn test_run_missing_binary() {
        let command = Command::new("definitely-not-a-real-binary-for-preview-tests");
        let shutdown = AtomicBool::new(false);
        let result = run_with_timeout(command, Duration::from_secs(1), &shutdown);
        assert!(result.is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_capture_stdout_and_stderr() {
        let mut command = Command::new("sh");
        command.args(["-c", "printf rgb; printf 'mean_volume: -20.0 dB' >&2"]);
        let shutdown = AtomicBool::new(false);

        let output = run_capturing_output(command, Duration::from_secs(5), &shutdown).unwrap();
        assert!(output.outcome.is_success());
        assert_eq!(output.stdout, b"rgb");
        assert!(output.stderr.contains("mean_volume"));
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_kills_child() {
        let mut command = Command::new("sleep");
        command.arg("5");
        let shutdown = AtomicBool::new(false);

        let started = Instant::now();
        let output =
            run_capturing_output(command, Duration::from_millis(200), &shutdown).unwrap();
        assert!(matches!(output.outcome, ProcessOutcome::TimedOut { .. }));
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[cfg(unix)]
    #[test]
    fn test_shutdown_kills_running_child() {
        let mut command = Command::new("sleep");
        command.arg("5");
        let shutdown = std::sync::Arc::new(AtomicBool::new(false));
        let trigger = std::sync::Arc::clone(&shutdown);
        let setter = thread::spawn(move || {
            thread::sleep(Duration::from_millis(200));
            trigger.store(true, Ordering::SeqCst);
        });

        let started = Instant::now();
        let outcome = run_with_timeout(command, Duration::MAX, &shutdown).unwrap();
        setter.join().unwrap();

        assert_eq!(outcome, ProcessOutcome::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn test_shutdown_before_spawn_skips_child() {
        let command = Command::new("definitely-not-a-real-binary-for-preview-tests");
        let shutdown = AtomicBool::new(true);
        let output = run_capturing_output(command, Duration::from_secs(1), &shutdown).unwrap();
        assert_eq!(output.outcome, ProcessOutcome::Cancelled);
    }
}
