// THEORY:
// The `diff_algorithm` module is the comparison layer. Given the baseline and the
// current frame it produces one `CellDiffResult` per grid cell and a frame-level
// decision.
//
// Key architectural principles:
// 1.  **One engine, closed family**: the variants differ only in how two pixels are
//     compared and in how cell counts are scored. `AlgorithmKind` names the variant;
//     the per-pixel comparison is a `PixelDelta` kernel implemented by a zero-sized
//     type, so `scan_cell::<D>` is monomorphized and the hot loop has no dispatch.
// 2.  **Two scoring scales**: `SummedRgb` counts changed pixels across the whole frame
//     and compares that count to `threshold`. Every other variant first turns each cell
//     into a 0/1 "changed" flag (changed pixels >= the cell pixel threshold) and then
//     compares the number of changed cells to `cell_count_threshold`.
// 3.  **Masking everywhere**: every variant skips masked-out pixels before reading
//     either frame.
// 4.  **Scratch reuse**: the cell result slice is owned by the engine and handed in
//     mutably, so a pass never allocates.
//
// | Variant            | Per-pixel delta                    | Gate           |
// |--------------------|------------------------------------|----------------|
// | SummedRgb          | |sum(rgb2) - sum(rgb1)|            | > threshold    |
// | SummedRgbCells     | |3*gray2 - 3*gray1|                | > threshold    |
// | NormalizedRgbCells | sum of |chroma2 - chroma1|         | > threshold    |
// | Hsv                | circular hue distance              | > hue_variance |
// | Proximity          | |sum(rgb2) - sum(rgb1)|            | > threshold    |

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use tracing::debug;

use crate::config::MotionConfig;
use crate::core_modules::cluster_detector::cluster_detector;
use crate::core_modules::frame::{ChannelOffsets, FrameShape, FrameView};
use crate::core_modules::grid_manager::{Cell, GridManager};
use crate::core_modules::mask::Mask;
use crate::core_modules::pixel::Rgb;
use crate::core_modules::visualizer::{Annotation, Visualizer};
use crate::error::ConfigurationError;
use crate::parallel_aggregator::{Aggregate, EarlyExit, ParallelAggregator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlgorithmKind {
    /// Frame-wide changed-pixel count on summed channels.
    #[default]
    SummedRgb,
    /// Changed-cell count on grayscale.
    SummedRgbCells,
    /// Changed-cell count on brightness-independent chromaticity.
    NormalizedRgbCells,
    /// Changed-cell count on hue.
    Hsv,
    /// Changed-cell count on summed channels, optionally scored by the largest
    /// connected group of changed cells.
    Proximity,
}

/// What the aggregate counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scoring {
    PixelCount,
    CellCount,
}

impl AlgorithmKind {
    pub const ALL: [AlgorithmKind; 5] = [
        AlgorithmKind::SummedRgb,
        AlgorithmKind::SummedRgbCells,
        AlgorithmKind::NormalizedRgbCells,
        AlgorithmKind::Hsv,
        AlgorithmKind::Proximity,
    ];

    pub fn name(self) -> &'static str {
        match self {
            AlgorithmKind::SummedRgb => "summed_rgb",
            AlgorithmKind::SummedRgbCells => "summed_rgb_cells",
            AlgorithmKind::NormalizedRgbCells => "normalized_rgb_cells",
            AlgorithmKind::Hsv => "hsv",
            AlgorithmKind::Proximity => "proximity",
        }
    }

    pub fn scoring(self) -> Scoring {
        match self {
            AlgorithmKind::SummedRgb => Scoring::PixelCount,
            _ => Scoring::CellCount,
        }
    }
}

impl fmt::Display for AlgorithmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown diff algorithm `{0}` (expected summed_rgb, summed_rgb_cells, normalized_rgb_cells, hsv or proximity)")]
pub struct UnknownAlgorithm(pub String);

impl FromStr for AlgorithmKind {
    type Err = UnknownAlgorithm;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        AlgorithmKind::ALL
            .into_iter()
            .find(|kind| kind.name() == normalized)
            .ok_or_else(|| UnknownAlgorithm(s.to_string()))
    }
}

/// Everything a pass needs to know about the stream, resolved once on the
/// first frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameMetrics {
    pub shape: FrameShape,
    pub channels: ChannelOffsets,
    pub threshold: u32,
    pub cell_pixel_threshold: u32,
    pub cell_count_threshold: u32,
    pub hue_variance: f32,
    pub early_exit: bool,
    pub proximity_clustering: bool,
    pub grid_divisor: u32,
    /// Pixels inside the grid that the mask lets through.
    pub included_pixels: u64,
}

impl FrameMetrics {
    pub fn new(
        config: &MotionConfig,
        shape: FrameShape,
        grid: &GridManager,
        mask: Option<&Mask>,
    ) -> Result<Self, ConfigurationError> {
        let channels = shape.validate()?;
        let included_pixels = match mask {
            Some(mask) => grid.cells().iter().map(|cell| mask.included_pixels(cell)).sum(),
            None => grid.covered_area(),
        };

        Ok(Self {
            shape,
            channels,
            threshold: config.threshold,
            cell_pixel_threshold: config.resolve_cell_pixel_threshold(grid.pixels_per_cell()),
            cell_count_threshold: config.cell_count_threshold,
            hue_variance: config.hue_variance,
            early_exit: config.early_exit,
            proximity_clustering: config.proximity_clustering,
            grid_divisor: grid.divisor(),
            included_pixels,
        })
    }
}

/// Outcome for one cell, recomputed from scratch every pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CellDiffResult {
    pub cell_index: usize,
    /// The cell's contribution to the aggregate: the changed-pixel count in
    /// pixel-count mode, 1 or 0 in cell-count mode.
    pub diff_score: u64,
    pub changed_pixels: u64,
    pub changed: bool,
}

impl CellDiffResult {
    pub fn scored(cell_index: usize, changed_pixels: u64, scoring: Scoring, cell_pixel_threshold: u32) -> Self {
        let changed = changed_pixels >= cell_pixel_threshold as u64;
        let diff_score = match scoring {
            Scoring::PixelCount => changed_pixels,
            Scoring::CellCount => changed as u64,
        };
        Self {
            cell_index,
            diff_score,
            changed_pixels,
            changed,
        }
    }
}

/// Frame-level outcome of a comparison pass. Borrows the engine's scratch.
#[derive(Debug, Clone, Copy)]
pub struct DetectionResult<'a> {
    pub detected: bool,
    /// Changed pixels, changed cells or largest cluster depending on the
    /// variant; `EXCEEDED` when the pass stopped early.
    pub aggregate_diff: u64,
    pub cells: &'a [CellDiffResult],
    pub visualization: Option<FrameView<'a>>,
}

impl<'a> DetectionResult<'a> {
    pub fn per_cell_diff(&self) -> impl Iterator<Item = u64> {
        self.cells.iter().map(|cell| cell.diff_score)
    }

    pub fn changed_cells(&self) -> usize {
        self.cells.iter().filter(|cell| cell.changed).count()
    }

    pub fn exceeded(&self) -> bool {
        self.aggregate_diff == crate::parallel_aggregator::EXCEEDED
    }
}

/// Compares one pixel of the baseline with the same pixel of the current frame.
pub trait PixelDelta {
    type Delta: PartialOrd + Copy;

    /// Deltas strictly above this value mark the pixel as changed.
    fn gate(metrics: &FrameMetrics) -> Self::Delta;

    fn delta(baseline: Rgb, current: Rgb) -> Self::Delta;
}

pub struct SummedDelta;
pub struct GrayscaleDelta;
pub struct ChromaticityDelta;
pub struct HueDelta;

impl PixelDelta for SummedDelta {
    type Delta = u32;

    fn gate(metrics: &FrameMetrics) -> u32 {
        metrics.threshold
    }

    #[inline]
    fn delta(baseline: Rgb, current: Rgb) -> u32 {
        (baseline.sum() as u32).abs_diff(current.sum() as u32)
    }
}

impl PixelDelta for GrayscaleDelta {
    type Delta = u32;

    fn gate(metrics: &FrameMetrics) -> u32 {
        metrics.threshold
    }

    #[inline]
    fn delta(baseline: Rgb, current: Rgb) -> u32 {
        (baseline.grayscale() as u32 * 3).abs_diff(current.grayscale() as u32 * 3)
    }
}

impl PixelDelta for ChromaticityDelta {
    type Delta = f32;

    fn gate(metrics: &FrameMetrics) -> f32 {
        metrics.threshold as f32
    }

    #[inline]
    fn delta(baseline: Rgb, current: Rgb) -> f32 {
        let before = baseline.chromaticity();
        let after = current.chromaticity();
        before
            .iter()
            .zip(after.iter())
            .map(|(b, a)| (a - b).abs())
            .sum()
    }
}

impl PixelDelta for HueDelta {
    type Delta = f32;

    fn gate(metrics: &FrameMetrics) -> f32 {
        metrics.hue_variance
    }

    #[inline]
    fn delta(baseline: Rgb, current: Rgb) -> f32 {
        baseline.hsv().hue_distance(&current.hsv())
    }
}

/// Counts the included pixels of `cell` whose delta exceeds the kernel's gate.
/// With an early-exit flag the scan publishes its count after every row and
/// stops before starting a new row once the flag is raised.
pub fn scan_cell<D: PixelDelta>(
    cell: &Cell,
    baseline: &[u8],
    current: &[u8],
    mask: Option<&Mask>,
    metrics: &FrameMetrics,
    early_exit: Option<&EarlyExit>,
) -> u64 {
    let gate = D::gate(metrics);
    let shape = metrics.shape;
    let channels = metrics.channels;
    let mut changed = 0u64;

    for y in cell.y..cell.bottom() {
        if early_exit.is_some_and(EarlyExit::is_stopped) {
            break;
        }

        let mut row_changed = 0u64;
        let mut offset = shape.pixel_offset(cell.x, y);
        for _ in cell.x..cell.right() {
            let excluded = mask.is_some_and(|mask| mask.is_excluded(offset));
            if !excluded {
                let before = Rgb::read(baseline, offset, channels);
                let after = Rgb::read(current, offset, channels);
                if D::delta(before, after) > gate {
                    row_changed += 1;
                }
            }
            offset += shape.bytes_per_pixel;
        }

        changed += row_changed;
        if let Some(early_exit) = early_exit {
            early_exit.publish(row_changed);
        }
    }

    changed
}

/// How a pass spreads its cells over threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Execution {
    #[default]
    Parallel,
    Sequential,
}

/// Read-only state shared by every pass of a session.
#[derive(Debug, Clone, Copy)]
pub struct PassContext<'s> {
    pub grid: &'s GridManager,
    pub mask: Option<&'s Mask>,
    pub metrics: &'s FrameMetrics,
    pub aggregator: &'s ParallelAggregator,
    pub execution: Execution,
}

#[derive(Debug)]
pub struct DiffAlgorithm {
    kind: AlgorithmKind,
    visualize: bool,
    visualizer: Option<Visualizer>,
}

impl DiffAlgorithm {
    pub fn new(kind: AlgorithmKind, visualize: bool) -> Self {
        Self {
            kind,
            visualize,
            visualizer: None,
        }
    }

    pub fn kind(&self) -> AlgorithmKind {
        self.kind
    }

    /// One-time setup once the stream's first frame is known.
    pub fn on_first_frame(&mut self, baseline: FrameView<'_>, metrics: &FrameMetrics) {
        if self.visualize && self.visualizer.is_none() {
            self.visualizer = Some(Visualizer::new(baseline.shape, metrics.channels));
        }
        debug!(
            algorithm = %self.kind,
            cell_pixel_threshold = metrics.cell_pixel_threshold,
            included_pixels = metrics.included_pixels,
            visualize = self.visualize,
            "diff algorithm ready"
        );
    }

    pub fn analyze<'a>(
        &'a mut self,
        baseline: FrameView<'_>,
        current: FrameView<'_>,
        context: &PassContext<'_>,
        results: &'a mut [CellDiffResult],
        refresh_toggle: bool,
    ) -> DetectionResult<'a> {
        let metrics = context.metrics;
        let scoring = self.kind.scoring();
        let early_exit = (metrics.early_exit && scoring == Scoring::PixelCount)
            .then(|| EarlyExit::new(metrics.threshold as u64));
        let early_exit = early_exit.as_ref();
        let before = baseline.pixels();
        let after = current.pixels();

        let aggregate = match self.kind {
            AlgorithmKind::SummedRgb | AlgorithmKind::Proximity => execute(
                context,
                results,
                early_exit,
                cell_scanner::<SummedDelta>(before, after, context, scoring),
            ),
            AlgorithmKind::SummedRgbCells => execute(
                context,
                results,
                early_exit,
                cell_scanner::<GrayscaleDelta>(before, after, context, scoring),
            ),
            AlgorithmKind::NormalizedRgbCells => execute(
                context,
                results,
                early_exit,
                cell_scanner::<ChromaticityDelta>(before, after, context, scoring),
            ),
            AlgorithmKind::Hsv => execute(
                context,
                results,
                early_exit,
                cell_scanner::<HueDelta>(before, after, context, scoring),
            ),
        };

        let results: &'a [CellDiffResult] = results;
        let aggregate_diff = if self.kind == AlgorithmKind::Proximity && metrics.proximity_clustering {
            cluster_detector::largest_cluster(results, metrics.grid_divisor)
        } else {
            aggregate.total
        };

        let detected = aggregate.exceeded
            || match scoring {
                Scoring::PixelCount => aggregate_diff > metrics.threshold as u64,
                Scoring::CellCount => aggregate_diff > metrics.cell_count_threshold as u64,
            };

        let max_aggregate = match scoring {
            Scoring::PixelCount => metrics.included_pixels,
            Scoring::CellCount => results.len() as u64,
        };
        let annotation = Annotation {
            aggregate_diff,
            max_aggregate,
            detected,
            refresh_toggle,
        };
        let visualization = self
            .visualizer
            .as_mut()
            .map(|visualizer| visualizer.render(current, context.grid, results, &annotation));

        DetectionResult {
            detected,
            aggregate_diff,
            cells: results,
            visualization,
        }
    }

    /// Clears per-stream scratch. The visualization buffer keeps its allocation.
    pub fn reset(&mut self) {
        if let Some(visualizer) = self.visualizer.as_mut() {
            visualizer.clear();
        }
    }

    pub fn visualizer(&self) -> Option<&Visualizer> {
        self.visualizer.as_ref()
    }
}

fn cell_scanner<'f, D: PixelDelta>(
    baseline: &'f [u8],
    current: &'f [u8],
    context: &PassContext<'f>,
    scoring: Scoring,
) -> impl Fn(usize, &Cell, Option<&EarlyExit>) -> CellDiffResult + Sync {
    let mask = context.mask;
    let metrics = *context.metrics;
    move |cell_index, cell, early_exit| {
        let changed_pixels = scan_cell::<D>(cell, baseline, current, mask, &metrics, early_exit);
        CellDiffResult::scored(cell_index, changed_pixels, scoring, metrics.cell_pixel_threshold)
    }
}

fn execute<F>(
    context: &PassContext<'_>,
    results: &mut [CellDiffResult],
    early_exit: Option<&EarlyExit>,
    cell_fn: F,
) -> Aggregate
where
    F: Fn(usize, &Cell, Option<&EarlyExit>) -> CellDiffResult + Sync,
{
    let cells = context.grid.cells();
    match context.execution {
        Execution::Parallel => context.aggregator.aggregate(cells, results, early_exit, cell_fn),
        Execution::Sequential => context
            .aggregator
            .aggregate_sequential(cells, results, early_exit, cell_fn),
    }
}
