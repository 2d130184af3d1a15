// THEORY:
// The `GridManager` turns a frame shape into the fixed set of rectangular cells that
// every later stage works on. A cell is the unit of parallel comparison: each worker
// scans exactly one cell and writes exactly one result slot.
//
// Key architectural principles:
// 1.  **Computed once**: the grid depends only on (width, height, divisor), so it is
//     built on the first complete frame and never touched again.
// 2.  **Integer division, cropped edges**: `cell_width = width / divisor`. When the
//     frame does not divide evenly the leftover columns on the right and rows at the
//     bottom belong to no cell and are never compared. That is intentional; a
//     640x482 stream simply ignores its last two rows.
// 3.  **Row-major indexing**: cell `(row, col)` lives at `row * divisor + col`. Result
//     arrays, the proximity flood fill and the visualizer all rely on that mapping.

use crate::error::ConfigurationError;

/// One rectangular region of the frame, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cell {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Cell {
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// One past the last column.
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    /// One past the last row.
    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        (self.x..self.right()).contains(&x) && (self.y..self.bottom()).contains(&y)
    }

    pub fn overlaps(&self, other: &Cell) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }
}

/// Splits a `width` x `height` frame into `divisor²` cells, row-major.
pub fn partition(width: u32, height: u32, divisor: u32) -> Result<Vec<Cell>, ConfigurationError> {
    if divisor == 0 {
        return Err(ConfigurationError::ZeroDivisor);
    }
    if width < divisor || height < divisor {
        return Err(ConfigurationError::FrameSmallerThanGrid {
            width,
            height,
            divisor,
        });
    }

    let cell_width = width / divisor;
    let cell_height = height / divisor;
    let num_cells = (divisor * divisor) as usize;

    let cells = (0..num_cells)
        .map(|cell_index| {
            let row = cell_index as u32 / divisor;
            let col = cell_index as u32 % divisor;
            Cell {
                x: col * cell_width,
                y: row * cell_height,
                width: cell_width,
                height: cell_height,
            }
        })
        .collect();

    Ok(cells)
}

/// The immutable cell layout for one frame shape.
#[derive(Debug, Clone)]
pub struct GridManager {
    /// Number of cells along each axis.
    divisor: u32,
    /// The width of a single cell in pixels.
    cell_width: u32,
    /// The height of a single cell in pixels.
    cell_height: u32,
    cells: Vec<Cell>,
}

impl GridManager {
    pub fn new(width: u32, height: u32, divisor: u32) -> Result<Self, ConfigurationError> {
        let cells = partition(width, height, divisor)?;
        Ok(Self {
            divisor,
            cell_width: width / divisor,
            cell_height: height / divisor,
            cells,
        })
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn divisor(&self) -> u32 {
        self.divisor
    }

    pub fn cell_width(&self) -> u32 {
        self.cell_width
    }

    pub fn cell_height(&self) -> u32 {
        self.cell_height
    }

    pub fn pixels_per_cell(&self) -> u64 {
        self.cell_width as u64 * self.cell_height as u64
    }

    /// Total pixels covered by all cells; the cropped remainder is excluded.
    pub fn covered_area(&self) -> u64 {
        self.pixels_per_cell() * self.cells.len() as u64
    }

    pub fn index_of(&self, row: u32, col: u32) -> usize {
        (row * self.divisor + col) as usize
    }

    /// `(row, col)` of a cell index.
    pub fn position_of(&self, cell_index: usize) -> (u32, u32) {
        let index = cell_index as u32;
        (index / self.divisor, index % self.divisor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vga_with_divisor_32_yields_1024_cells_of_20_by_15() {
        let grid = GridManager::new(640, 480, 32).unwrap();
        assert_eq!(grid.len(), 1024);
        assert_eq!(grid.cell_width(), 20);
        assert_eq!(grid.cell_height(), 15);
        assert_eq!(grid.pixels_per_cell(), 300);
        assert!(grid.cells().iter().all(|c| c.width == 20 && c.height == 15));
    }

    #[test]
    fn cells_are_row_major() {
        let grid = GridManager::new(640, 480, 32).unwrap();
        let cells = grid.cells();
        assert_eq!(cells[0], Cell { x: 0, y: 0, width: 20, height: 15 });
        assert_eq!(cells[1], Cell { x: 20, y: 0, width: 20, height: 15 });
        assert_eq!(cells[32], Cell { x: 0, y: 15, width: 20, height: 15 });
        assert_eq!(cells[3 * 32 + 1], Cell { x: 20, y: 45, width: 20, height: 15 });
        assert_eq!(grid.index_of(5, 7), 5 * 32 + 7);
        assert_eq!(grid.position_of(5 * 32 + 7), (5, 7));
    }

    #[test]
    fn remainder_is_cropped_not_covered() {
        for (width, height, divisor) in [(641, 483, 32), (100, 100, 7), (9, 5, 4), (64, 48, 1), (33, 33, 33)] {
            let cells = partition(width, height, divisor).unwrap();
            assert_eq!(cells.len(), (divisor * divisor) as usize);

            let covered: u64 = cells.iter().map(Cell::area).sum();
            let expected = (width - width % divisor) as u64 * (height - height % divisor) as u64;
            assert_eq!(covered, expected, "{width}x{height}/{divisor}");

            for cell in &cells {
                assert!(cell.right() <= width - width % divisor);
                assert!(cell.bottom() <= height - height % divisor);
            }
        }
    }

    #[test]
    fn cells_never_overlap() {
        let cells = partition(50, 30, 5).unwrap();
        for (i, a) in cells.iter().enumerate() {
            for b in &cells[i + 1..] {
                assert!(!a.overlaps(b), "{a:?} overlaps {b:?}");
            }
        }
    }

    #[test]
    fn zero_divisor_is_a_configuration_error() {
        assert!(matches!(partition(640, 480, 0), Err(ConfigurationError::ZeroDivisor)));
    }

    #[test]
    fn frame_smaller_than_grid_is_a_configuration_error() {
        assert!(matches!(
            partition(16, 480, 32),
            Err(ConfigurationError::FrameSmallerThanGrid { width: 16, height: 480, divisor: 32 })
        ));
        assert!(matches!(
            GridManager::new(640, 31, 32),
            Err(ConfigurationError::FrameSmallerThanGrid { .. })
        ));
    }
}
