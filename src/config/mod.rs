pub mod load;
pub mod types;

pub use types::{
    DEFAULT_ANIMATED_IMAGE_FPS, DEFAULT_ANIMATED_IMAGE_WIDTH, DEFAULT_CLIP_DURATION,
    DEFAULT_FRAME_RATE, DEFAULT_MAX_WORKERS, DEFAULT_QUALITY, DEFAULT_TARGET_DURATION,
    DEFAULT_TARGET_HEIGHT, PreviewConfig,
};
