// THEORY:
// The `cluster_detector` groups changed cells into spatially connected clusters. It is
// what lets the Proximity variant tell a single moving object (one dense patch of
// changed cells) apart from sensor noise (many isolated cells scattered around the
// frame) even when both change the same number of cells.
//
// Key architectural principles & algorithm steps:
// 1.  **Binary occupancy grid**: the row-major `CellDiffResult` slice is read as a
//     `divisor x divisor` grid where a cell is "hot" iff it is flagged `changed`.
// 2.  **Region growing**: every unvisited hot cell seeds a flood fill over its 8
//     neighbours. An explicit stack replaces recursion so a fully changed 64x64 grid
//     cannot overflow the worker's stack.
// 3.  **Stateless utility**: one call per frame, no memory of earlier frames. Only the
//     size of the largest cluster is reported.

use crate::core_modules::diff_algorithm::CellDiffResult;

pub mod cluster_detector {
    use super::*;

    /// Returns the number of cells in the largest 8-connected group of changed cells.
    pub fn largest_cluster(results: &[CellDiffResult], divisor: u32) -> u64 {
        let side = divisor as usize;
        let mut visited = vec![false; results.len()];
        let mut stack: Vec<(usize, usize)> = Vec::new();
        let mut largest = 0u64;

        for seed in 0..results.len() {
            if visited[seed] || !results[seed].changed {
                continue;
            }

            visited[seed] = true;
            stack.push((seed / side, seed % side));
            let mut size = 0u64;

            while let Some((row, col)) = stack.pop() {
                size += 1;
                for dy in -1i64..=1 {
                    for dx in -1i64..=1 {
                        if dy == 0 && dx == 0 {
                            continue;
                        }
                        let ny = row as i64 + dy;
                        let nx = col as i64 + dx;
                        if ny < 0 || nx < 0 || ny >= side as i64 || nx >= side as i64 {
                            continue;
                        }
                        let neighbour = ny as usize * side + nx as usize;
                        if !visited[neighbour] && results[neighbour].changed {
                            visited[neighbour] = true;
                            stack.push((ny as usize, nx as usize));
                        }
                    }
                }
            }

            largest = largest.max(size);
        }

        largest
    }
}

#[cfg(test)]
mod tests {
    use super::cluster_detector::largest_cluster;
    use super::*;

    fn grid(divisor: u32, changed: &[(usize, usize)]) -> Vec<CellDiffResult> {
        let side = divisor as usize;
        let mut results: Vec<CellDiffResult> = (0..side * side)
            .map(|cell_index| CellDiffResult {
                cell_index,
                ..Default::default()
            })
            .collect();
        for &(row, col) in changed {
            results[row * side + col].changed = true;
        }
        results
    }

    #[test]
    fn empty_grid_has_no_cluster() {
        assert_eq!(largest_cluster(&grid(4, &[]), 4), 0);
    }

    #[test]
    fn diagonal_neighbours_are_connected() {
        let results = grid(4, &[(0, 0), (1, 1), (2, 2), (3, 3)]);
        assert_eq!(largest_cluster(&results, 4), 4);
    }

    #[test]
    fn scattered_cells_form_separate_clusters() {
        let results = grid(8, &[(0, 0), (0, 4), (4, 0), (7, 7), (4, 4), (4, 5), (5, 4)]);
        assert_eq!(largest_cluster(&results, 8), 3);
    }

    #[test]
    fn clusters_do_not_wrap_across_rows() {
        let results = grid(4, &[(0, 3), (1, 0)]);
        assert_eq!(largest_cluster(&results, 4), 1);
    }

    #[test]
    fn fully_changed_grid_is_one_cluster() {
        let side = 64usize;
        let all: Vec<(usize, usize)> = (0..side * side).map(|i| (i / side, i % side)).collect();
        assert_eq!(largest_cluster(&grid(64, &all), 64), (side * side) as u64);
    }
}
