use std::path::PathBuf;

use crate::core_modules::frame::{FrameShape, PixelFormat};

/// Fatal, setup-time failures. Once one of these is returned the engine has not
/// committed any grid, mask or baseline state.
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("cell divisor must be greater than zero")]
    ZeroDivisor,
    #[error("frame {width}x{height} is too small for a {divisor}x{divisor} cell grid")]
    FrameSmallerThanGrid { width: u32, height: u32, divisor: u32 },
    #[error("unsupported pixel format {0:?}: expected an interleaved RGB-family layout")]
    UnsupportedPixelFormat(PixelFormat),
    #[error("{format:?} frames carry {expected} bytes per pixel, got {got}")]
    BytesPerPixelMismatch {
        format: PixelFormat,
        expected: usize,
        got: usize,
    },
    #[error("stride of {stride} bytes is shorter than a {row_bytes}-byte row")]
    StrideTooShort { stride: usize, row_bytes: usize },
    #[error("failed to load motion mask {path}: {source}")]
    MaskLoad {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error(
        "motion mask {mask_width}x{mask_height} @ {mask_bpp} bpp must match frame {frame_width}x{frame_height} @ {frame_bpp} bpp"
    )]
    MaskMismatch {
        mask_width: u32,
        mask_height: u32,
        mask_bpp: usize,
        frame_width: u32,
        frame_height: u32,
        frame_bpp: usize,
    },
    #[error("motion mask buffer holds {got} bytes, expected at least {expected}")]
    MaskBufferSize { expected: usize, got: usize },
    #[error("frame shape changed mid-stream from {expected:?} to {got:?}")]
    ShapeChanged {
        expected: FrameShape,
        got: FrameShape,
    },
    #[error("invalid motion configuration: {0}")]
    Invalid(String),
    #[error("failed to read config file {0}: {1}")]
    ReadFile(String, #[source] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("failed to build worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    /// The ingest side handed over a partially filled buffer. Nothing about the
    /// engine's state changes when this is returned.
    #[error("incomplete frame: got {got} bytes, expected at least {expected}")]
    IncompleteFrame { expected: usize, got: usize },
    #[error("failed to write image: {0}")]
    Image(#[from] image::ImageError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
