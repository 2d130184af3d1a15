// THEORY:
// This file is the main entry point for the `motion_diff` library crate.
// It follows the standard Rust convention of using `lib.rs` to define the public
// API that will be exposed to external consumers (like the `visual_tester` binary or
// a camera capture loop).
//
// The primary goal is to export the `MotionEngine` and its associated data
// structures (`MotionConfig`, `Report`, `DetectionResult`, the frame types) as the
// clean, high-level interface for the whole engine. The internal modules
// (`core_modules`) stay public for callers that want a single stage, such as the
// grid partitioner or the PNG helper, but nothing requires touching them.

pub mod config;
pub mod core_modules;
pub mod error;
pub mod parallel_aggregator;
pub mod pipeline;

pub use crate::config::MotionConfig;
pub use crate::core_modules::baseline::BaselineState;
pub use crate::core_modules::diff_algorithm::{AlgorithmKind, CellDiffResult, DetectionResult};
pub use crate::core_modules::frame::{Frame, FrameShape, FrameView, PixelFormat};
pub use crate::core_modules::grid_manager::Cell;
pub use crate::core_modules::mask::Mask;
pub use crate::error::{ConfigurationError, Error, Result};
pub use crate::parallel_aggregator::EXCEEDED;
pub use crate::pipeline::{MotionEngine, PassStats, Report};
