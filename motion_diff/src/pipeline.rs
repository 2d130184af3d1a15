// THEORY:
// The `pipeline` module is the top-level API of the motion engine. It wires the grid,
// the mask, the baseline state machine, the diff algorithm and the worker pool into a
// single `MotionEngine` that a frame-ingest collaborator feeds one complete frame at a
// time.
//
// Key architectural principles:
// 1.  **Lazy, all-or-nothing setup**: the stream's shape is unknown until its first
//     frame arrives. That frame builds the session (grid, mask, resolved metrics and
//     the result scratch). If any step fails nothing is kept, and the next frame
//     tries again from scratch.
// 2.  **Shape lock**: once a session exists every frame must have the same shape. A
//     different one is a configuration error, not something to silently adapt to.
// 3.  **No callbacks**: `apply` returns a `Report` describing what the pass did. A
//     `Report::Analyzed` borrows the engine's scratch buffers, so the caller reads it
//     before handing in the next frame.
// 4.  **Borrowed frames**: the engine never keeps a `FrameView` past the call. The
//     baseline is the only pixel data it retains, and it is an owned copy.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::MotionConfig;
use crate::core_modules::baseline::{BaselineManager, BaselineState, BaselineStep, RefreshPolicy};
use crate::core_modules::diff_algorithm::{
    CellDiffResult, DiffAlgorithm, Execution, FrameMetrics, PassContext,
};
use crate::core_modules::frame::FrameView;
use crate::core_modules::grid_manager::{Cell, GridManager};
use crate::core_modules::mask::Mask;
use crate::error::{ConfigurationError, Error, Result};
use crate::parallel_aggregator::ParallelAggregator;

// Re-export key data structures for the public API.
pub use crate::core_modules::diff_algorithm::DetectionResult;

/// What a single call to `apply` did with its frame.
#[derive(Debug, Clone, Copy)]
pub enum Report<'a> {
    /// The frame became the first baseline; nothing was compared.
    BaselineCaptured,
    /// The frame replaced a stale baseline; nothing was compared.
    BaselineRefreshed,
    Analyzed(DetectionResult<'a>),
}

impl<'a> Report<'a> {
    pub fn detection(&self) -> Option<&DetectionResult<'a>> {
        match self {
            Report::Analyzed(result) => Some(result),
            _ => None,
        }
    }

    pub fn motion_detected(&self) -> bool {
        self.detection().is_some_and(|result| result.detected)
    }
}

/// Running counters, kept for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassStats {
    /// Complete frames accepted.
    pub frames: u64,
    /// Comparison passes run.
    pub passes: u64,
    pub detections: u64,
    pub refreshes: u64,
    /// Wall time spent inside comparison passes.
    pub analysis_time: Duration,
}

impl PassStats {
    pub fn mean_pass_time(&self) -> Duration {
        if self.passes == 0 {
            return Duration::ZERO;
        }
        self.analysis_time.div_f64(self.passes as f64)
    }
}

/// Per-stream state built from the first frame.
#[derive(Debug)]
struct Session {
    grid: GridManager,
    mask: Option<Mask>,
    metrics: FrameMetrics,
    results: Vec<CellDiffResult>,
}

/// The main, top-level struct for the motion engine.
#[derive(Debug)]
pub struct MotionEngine {
    config: MotionConfig,
    aggregator: ParallelAggregator,
    algorithm: DiffAlgorithm,
    baseline: BaselineManager,
    preset_mask: Option<Mask>,
    session: Option<Session>,
    stats: PassStats,
}

impl MotionEngine {
    pub fn new(config: MotionConfig) -> Result<Self> {
        config.validate()?;
        let aggregator = ParallelAggregator::new(config.workers)?;
        let algorithm = DiffAlgorithm::new(config.algorithm, config.visualize);
        let baseline = BaselineManager::new(RefreshPolicy {
            interval: config.test_frame_interval,
            cooldown: config.test_frame_cooldown,
        });

        debug!(
            algorithm = %config.algorithm,
            divisor = config.cell_divisor,
            workers = aggregator.workers(),
            "motion engine created"
        );

        Ok(Self {
            config,
            aggregator,
            algorithm,
            baseline,
            preset_mask: None,
            session: None,
            stats: PassStats::default(),
        })
    }

    /// Uses an in-memory mask instead of `mask_path`. Its shape must match the
    /// stream's, which is checked on the first frame.
    pub fn with_mask(mut self, mask: Mask) -> Self {
        self.preset_mask = Some(mask);
        self
    }

    pub fn apply(&mut self, frame: FrameView<'_>) -> Result<Report<'_>> {
        self.apply_at(frame, Instant::now())
    }

    /// Runs one pass with `now` as the frame's timestamp.
    pub fn apply_at(&mut self, frame: FrameView<'_>, now: Instant) -> Result<Report<'_>> {
        if !frame.is_complete() {
            let expected = frame.shape.required_len();
            let got = frame.data.len();
            warn!(expected, got, "rejecting incomplete frame");
            return Err(Error::IncompleteFrame { expected, got });
        }

        let session = match self.session.take() {
            Some(session) if session.metrics.shape != frame.shape => {
                let expected = session.metrics.shape;
                self.session = Some(session);
                warn!(?expected, got = ?frame.shape, "rejecting frame with a new shape");
                return Err(ConfigurationError::ShapeChanged {
                    expected,
                    got: frame.shape,
                }
                .into());
            }
            Some(session) => session,
            None => self.setup(frame)?,
        };
        let session = self.session.insert(session);
        self.stats.frames += 1;

        let refresh_toggle = self.baseline.refresh_toggle();
        let baseline = match self.baseline.advance(frame, now) {
            BaselineStep::Captured => {
                debug!(frame = self.stats.frames, "baseline captured");
                return Ok(Report::BaselineCaptured);
            }
            BaselineStep::Refreshed => {
                self.stats.refreshes += 1;
                debug!(frame = self.stats.frames, refreshes = self.stats.refreshes, "baseline refreshed");
                return Ok(Report::BaselineRefreshed);
            }
            BaselineStep::Compare(baseline) => baseline,
        };

        let context = PassContext {
            grid: &session.grid,
            mask: session.mask.as_ref(),
            metrics: &session.metrics,
            aggregator: &self.aggregator,
            execution: Execution::Parallel,
        };
        let started = Instant::now();
        let result = self
            .algorithm
            .analyze(baseline, frame, &context, &mut session.results, refresh_toggle);
        let elapsed = started.elapsed();

        self.baseline.record_pass(result.detected, now);
        self.stats.passes += 1;
        self.stats.analysis_time += elapsed;

        if result.detected {
            self.stats.detections += 1;
            info!(
                aggregate_diff = result.aggregate_diff,
                changed_cells = result.changed_cells(),
                exceeded = result.exceeded(),
                "motion detected"
            );
        }
        debug!(
            pass = self.stats.passes,
            aggregate_diff = result.aggregate_diff,
            elapsed_us = elapsed.as_micros() as u64,
            mean_us = self.stats.mean_pass_time().as_micros() as u64,
            "pass complete"
        );

        Ok(Report::Analyzed(result))
    }

    /// Convenience wrapper for callers that only need the decision.
    pub fn motion_detected(&mut self, frame: FrameView<'_>) -> Result<bool> {
        Ok(self.apply(frame)?.motion_detected())
    }

    /// Drops the baseline so the next frame is captured afresh. The grid and
    /// mask stay, and so does the shape lock.
    pub fn reset(&mut self) {
        self.baseline.reset();
        if let Some(session) = self.session.as_mut() {
            for result in &mut session.results {
                *result = CellDiffResult {
                    cell_index: result.cell_index,
                    ..Default::default()
                };
            }
        }
        self.algorithm.reset();
        debug!("motion engine reset");
    }

    pub fn state(&self) -> BaselineState {
        self.baseline.state()
    }

    /// The grid cells, empty before the first frame.
    pub fn cells(&self) -> &[Cell] {
        self.session
            .as_ref()
            .map(|session| session.grid.cells())
            .unwrap_or_default()
    }

    /// Results of the most recent comparison pass.
    pub fn last_results(&self) -> &[CellDiffResult] {
        self.session
            .as_ref()
            .map(|session| session.results.as_slice())
            .unwrap_or_default()
    }

    pub fn metrics(&self) -> Option<&FrameMetrics> {
        self.session.as_ref().map(|session| &session.metrics)
    }

    pub fn baseline(&self) -> Option<FrameView<'_>> {
        self.baseline.baseline().map(|frame| frame.view())
    }

    pub fn stats(&self) -> PassStats {
        self.stats
    }

    pub fn config(&self) -> &MotionConfig {
        &self.config
    }

    fn setup(&mut self, frame: FrameView<'_>) -> Result<Session> {
        let shape = frame.shape;
        shape.validate()?;
        let grid = GridManager::new(shape.width, shape.height, self.config.cell_divisor)?;

        let mask = match (&self.preset_mask, self.config.mask_path.as_deref()) {
            (Some(mask), _) => {
                let mask_shape = mask.shape();
                if mask_shape != shape {
                    return Err(ConfigurationError::MaskMismatch {
                        mask_width: mask_shape.width,
                        mask_height: mask_shape.height,
                        mask_bpp: mask_shape.bytes_per_pixel,
                        frame_width: shape.width,
                        frame_height: shape.height,
                        frame_bpp: shape.bytes_per_pixel,
                    }
                    .into());
                }
                Some(mask.clone())
            }
            (None, Some(path)) => Some(Mask::load(path, shape)?),
            (None, None) => None,
        };

        let metrics = FrameMetrics::new(&self.config, shape, &grid, mask.as_ref())?;
        let results = (0..grid.len())
            .map(|cell_index| CellDiffResult {
                cell_index,
                ..Default::default()
            })
            .collect();
        self.algorithm.on_first_frame(frame, &metrics);

        info!(
            width = shape.width,
            height = shape.height,
            format = ?shape.format,
            cells = grid.len(),
            cell_width = grid.cell_width(),
            cell_height = grid.cell_height(),
            masked = mask.is_some(),
            "stream session initialized"
        );

        Ok(Session {
            grid,
            mask,
            metrics,
            results,
        })
    }
}
