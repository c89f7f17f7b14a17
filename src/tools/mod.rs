mod ffmpeg_runner;
mod ffprobe_info;
mod path_validator;
mod scratch_dir;
mod worker_pool;

pub use ffmpeg_runner::{
    ProcessOutcome, ProcessOutput, ensure_tools_available, run_capturing_output, run_ffmpeg,
    run_with_timeout, spawn_error,
};
pub use ffprobe_info::{VideoProfile, parse_probe_output, probe};
pub use path_validator::{ensure_directory_exists, validate_file_exists};
pub use scratch_dir::ScratchDir;
pub use worker_pool::WorkerPool;
