// THEORY:
// The `Visualizer` is a purely diagnostic layer. It paints an annotated copy of the
// current frame so a human can see what the detector saw: which cells changed, how
// close the frame came to the detection threshold, whether motion was declared and
// when the baseline was last refreshed. Nothing it does feeds back into a decision.
//
// Layout of the overlay:
// - Cells that did not change are dimmed to gray; changed cells keep their color and
//   get a magenta border.
// - A bar across the top rows grows with the aggregate diff, red when motion was
//   detected and green otherwise. It is skipped entirely when nothing changed.
// - A red/green square near the bottom-left repeats the detection decision.
// - Next to it a magenta/cyan square flips color on every baseline refresh.
//
// The output buffer is allocated once, when the first frame arrives, and overwritten
// on every pass.

use crate::core_modules::diff_algorithm::CellDiffResult;
use crate::core_modules::frame::{ChannelOffsets, Frame, FrameShape, FrameView};
use crate::core_modules::grid_manager::{Cell, GridManager};
use crate::core_modules::pixel::Rgb;

const RED: [u8; 3] = [255, 0, 0];
const GREEN: [u8; 3] = [0, 255, 0];
const MAGENTA: [u8; 3] = [255, 0, 255];
const CYAN: [u8; 3] = [0, 255, 255];

const BAR_HEIGHT: u32 = 10;
const MARKER_SIZE: u32 = 20;
const DETECT_MARKER_X: u32 = 108;
const REFRESH_MARKER_X: u32 = 148;

/// Per-pass values the overlay needs besides the cell results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Annotation {
    pub aggregate_diff: u64,
    /// Largest value `aggregate_diff` can take; the bar is full at this value.
    pub max_aggregate: u64,
    pub detected: bool,
    pub refresh_toggle: bool,
}

#[derive(Debug)]
pub struct Visualizer {
    frame: Frame,
    channels: ChannelOffsets,
}

impl Visualizer {
    pub fn new(shape: FrameShape, channels: ChannelOffsets) -> Self {
        Self {
            frame: Frame::filled(shape, 0),
            channels,
        }
    }

    pub fn view(&self) -> FrameView<'_> {
        self.frame.view()
    }

    pub fn clear(&mut self) {
        self.frame.data.fill(0);
    }

    pub fn render(
        &mut self,
        current: FrameView<'_>,
        grid: &GridManager,
        results: &[CellDiffResult],
        annotation: &Annotation,
    ) -> FrameView<'_> {
        self.frame.overwrite_from(current);

        for (cell, result) in grid.cells().iter().zip(results) {
            if result.changed {
                self.outline(cell, MAGENTA);
            } else {
                self.dim(cell);
            }
        }

        let decision_color = if annotation.detected { RED } else { GREEN };
        if annotation.aggregate_diff > 0 {
            let width = self.frame.shape.width;
            let ratio = if annotation.max_aggregate == 0 {
                1.0
            } else {
                (annotation.aggregate_diff as f64 / annotation.max_aggregate as f64).min(1.0)
            };
            let length = ((ratio * (width - 1) as f64) as u32).max(1);
            self.fill(0, 0, length, BAR_HEIGHT, decision_color);
        }

        let height = self.frame.shape.height;
        let marker_y = height.saturating_sub(MARKER_SIZE);
        self.fill(DETECT_MARKER_X, marker_y, MARKER_SIZE, MARKER_SIZE, decision_color);
        let refresh_color = if annotation.refresh_toggle { CYAN } else { MAGENTA };
        self.fill(REFRESH_MARKER_X, marker_y, MARKER_SIZE, MARKER_SIZE, refresh_color);

        self.frame.view()
    }

    fn dim(&mut self, cell: &Cell) {
        let shape = self.frame.shape;
        for y in cell.y..cell.bottom() {
            for x in cell.x..cell.right() {
                let original = Rgb::read(&self.frame.data, shape.pixel_offset(x, y), self.channels);
                let gray = original.grayscale() / 3;
                self.frame.put_rgb(x, y, self.channels, [gray; 3]);
            }
        }
    }

    fn outline(&mut self, cell: &Cell, color: [u8; 3]) {
        let (left, top) = (cell.x, cell.y);
        let (right, bottom) = (cell.right() - 1, cell.bottom() - 1);
        for x in left..=right {
            self.frame.put_rgb(x, top, self.channels, color);
            self.frame.put_rgb(x, bottom, self.channels, color);
        }
        for y in top..=bottom {
            self.frame.put_rgb(left, y, self.channels, color);
            self.frame.put_rgb(right, y, self.channels, color);
        }
    }

    /// Fills a rectangle, clipped to the frame.
    fn fill(&mut self, x: u32, y: u32, width: u32, height: u32, color: [u8; 3]) {
        let shape = self.frame.shape;
        let right = x.saturating_add(width).min(shape.width);
        let bottom = y.saturating_add(height).min(shape.height);
        for row in y..bottom {
            for col in x..right {
                self.frame.put_rgb(col, row, self.channels, color);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::frame::PixelFormat;

    fn setup(width: u32, height: u32, divisor: u32) -> (FrameShape, ChannelOffsets, GridManager) {
        let shape = FrameShape::packed(PixelFormat::Rgb24, width, height);
        let channels = shape.validate().unwrap();
        let grid = GridManager::new(width, height, divisor).unwrap();
        (shape, channels, grid)
    }

    fn pixel(view: &FrameView<'_>, x: u32, y: u32) -> [u8; 3] {
        let offset = view.shape.pixel_offset(x, y);
        [view.data[offset], view.data[offset + 1], view.data[offset + 2]]
    }

    fn results(len: usize, changed: &[usize]) -> Vec<CellDiffResult> {
        (0..len)
            .map(|cell_index| CellDiffResult {
                cell_index,
                changed: changed.contains(&cell_index),
                ..Default::default()
            })
            .collect()
    }

    #[test]
    fn dims_unchanged_cells_and_outlines_changed_ones() {
        let (shape, channels, grid) = setup(200, 200, 4);
        let current = vec![90u8; shape.required_len()];
        let mut visualizer = Visualizer::new(shape, channels);
        let annotation = Annotation {
            aggregate_diff: 0,
            max_aggregate: 16,
            detected: false,
            refresh_toggle: false,
        };

        let view = visualizer.render(FrameView::new(shape, &current), &grid, &results(16, &[5]), &annotation);

        let gray = Rgb::new(90, 90, 90).grayscale() / 3;
        assert_eq!(pixel(&view, 10, 60), [gray; 3]);
        // cell 5 is row 1, col 1: origin (50, 50)
        assert_eq!(pixel(&view, 50, 50), MAGENTA);
        assert_eq!(pixel(&view, 99, 70), MAGENTA);
        assert_eq!(pixel(&view, 70, 70), [90, 90, 90]);
    }

    #[test]
    fn bar_is_skipped_when_nothing_changed() {
        let (shape, channels, grid) = setup(200, 200, 4);
        let current = vec![0u8; shape.required_len()];
        let mut visualizer = Visualizer::new(shape, channels);
        let annotation = Annotation {
            aggregate_diff: 0,
            max_aggregate: 16,
            detected: false,
            refresh_toggle: false,
        };
        let view = visualizer.render(FrameView::new(shape, &current), &grid, &results(16, &[]), &annotation);
        assert_eq!(pixel(&view, 0, 0), [0, 0, 0]);
    }

    #[test]
    fn bar_length_tracks_aggregate_and_color_tracks_decision() {
        let (shape, channels, grid) = setup(201, 200, 4);
        let current = vec![0u8; shape.required_len()];
        let mut visualizer = Visualizer::new(shape, channels);
        let annotation = Annotation {
            aggregate_diff: 8,
            max_aggregate: 16,
            detected: true,
            refresh_toggle: true,
        };

        let view = visualizer.render(FrameView::new(shape, &current), &grid, &results(16, &[]), &annotation);

        assert_eq!(pixel(&view, 0, 0), RED);
        assert_eq!(pixel(&view, 99, 9), RED);
        assert_ne!(pixel(&view, 100, 0), RED);
        assert_eq!(pixel(&view, DETECT_MARKER_X, 199), RED);
        assert_eq!(pixel(&view, REFRESH_MARKER_X + 5, 190), CYAN);
    }

    #[test]
    fn refresh_marker_is_magenta_before_the_first_refresh() {
        let (shape, channels, grid) = setup(200, 200, 4);
        let current = vec![0u8; shape.required_len()];
        let mut visualizer = Visualizer::new(shape, channels);
        let annotation = Annotation {
            aggregate_diff: 1,
            max_aggregate: 16,
            detected: false,
            refresh_toggle: false,
        };
        let view = visualizer.render(FrameView::new(shape, &current), &grid, &results(16, &[]), &annotation);
        assert_eq!(pixel(&view, 0, 0), GREEN);
        assert_eq!(pixel(&view, REFRESH_MARKER_X, 180), MAGENTA);
        assert_eq!(pixel(&view, DETECT_MARKER_X, 180), GREEN);
    }

    #[test]
    fn markers_are_clipped_on_small_frames() {
        let (shape, channels, grid) = setup(16, 8, 2);
        let current = vec![0u8; shape.required_len()];
        let mut visualizer = Visualizer::new(shape, channels);
        let annotation = Annotation {
            aggregate_diff: u64::MAX,
            max_aggregate: 128,
            detected: true,
            refresh_toggle: false,
        };
        let view = visualizer.render(FrameView::new(shape, &current), &grid, &results(4, &[0, 3]), &annotation);
        assert_eq!(pixel(&view, 14, 0), RED);
    }
}
