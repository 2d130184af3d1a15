// THEORY:
// The `ParallelAggregator` fans per-cell work out across a worker pool and folds the
// results back into a single frame-level number.
//
// Key architectural principles:
// 1.  **Slot-per-cell, no locks**: the result slice has exactly one slot per cell and
//     each worker writes only the slot for the cell it was handed. Workers read the two
//     frame buffers, which are immutable for the duration of the pass.
// 2.  **Owned pool**: the engine owns its `rayon` pool, sized from configuration or
//     from `num_cpus`. No global pool is touched, so two engines in one process do not
//     contend over the same threads.
// 3.  **Deterministic reduction**: the join is followed by a plain sequential sum. The
//     total is identical whether cells ran in parallel or one after another.
// 4.  **Advisory early exit**: in pixel-count mode workers may publish their running
//     counts into a shared atomic. Once the cumulative count passes the limit every
//     worker stops at its next row boundary and the total is reported as `EXCEEDED`.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use rayon::prelude::*;

use crate::core_modules::diff_algorithm::CellDiffResult;
use crate::core_modules::grid_manager::Cell;
use crate::error::ConfigurationError;

/// Sentinel total reported when a pass stopped early.
pub const EXCEEDED: u64 = u64::MAX;

/// Shared stop flag for one pass.
#[derive(Debug)]
pub struct EarlyExit {
    limit: u64,
    cumulative: AtomicU64,
    stopped: AtomicBool,
}

impl EarlyExit {
    pub fn new(limit: u64) -> Self {
        Self {
            limit,
            cumulative: AtomicU64::new(0),
            stopped: AtomicBool::new(false),
        }
    }

    /// Adds a worker's freshly counted pixels and returns whether scanning should stop.
    pub fn publish(&self, count: u64) -> bool {
        if count > 0 {
            let total = self.cumulative.fetch_add(count, Ordering::Relaxed) + count;
            if total > self.limit {
                self.stopped.store(true, Ordering::Relaxed);
            }
        }
        self.is_stopped()
    }

    #[inline]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Relaxed)
    }
}

/// Outcome of one fan-out/join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Aggregate {
    pub total: u64,
    pub exceeded: bool,
}

pub struct ParallelAggregator {
    pool: rayon::ThreadPool,
    workers: usize,
}

impl ParallelAggregator {
    /// Builds a pool with `workers` threads, or one per logical CPU.
    pub fn new(workers: Option<usize>) -> Result<Self, ConfigurationError> {
        let workers = workers.unwrap_or_else(num_cpus::get).max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|index| format!("motion-diff-{index}"))
            .build()?;
        Ok(Self { pool, workers })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Runs `cell_fn` for every cell on the pool, writing `results[i]` for `cells[i]`.
    pub fn aggregate<F>(
        &self,
        cells: &[Cell],
        results: &mut [CellDiffResult],
        early_exit: Option<&EarlyExit>,
        cell_fn: F,
    ) -> Aggregate
    where
        F: Fn(usize, &Cell, Option<&EarlyExit>) -> CellDiffResult + Sync,
    {
        self.pool.install(|| {
            results
                .par_iter_mut()
                .zip(cells.par_iter())
                .enumerate()
                .for_each(|(cell_index, (slot, cell))| {
                    *slot = cell_fn(cell_index, cell, early_exit);
                });
        });
        reduce(results, early_exit)
    }

    /// Same contract as `aggregate`, on the calling thread.
    pub fn aggregate_sequential<F>(
        &self,
        cells: &[Cell],
        results: &mut [CellDiffResult],
        early_exit: Option<&EarlyExit>,
        cell_fn: F,
    ) -> Aggregate
    where
        F: Fn(usize, &Cell, Option<&EarlyExit>) -> CellDiffResult,
    {
        for (cell_index, (slot, cell)) in results.iter_mut().zip(cells).enumerate() {
            *slot = cell_fn(cell_index, cell, early_exit);
        }
        reduce(results, early_exit)
    }
}

impl std::fmt::Debug for ParallelAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParallelAggregator")
            .field("workers", &self.workers)
            .finish()
    }
}

fn reduce(results: &[CellDiffResult], early_exit: Option<&EarlyExit>) -> Aggregate {
    if early_exit.is_some_and(EarlyExit::is_stopped) {
        return Aggregate {
            total: EXCEEDED,
            exceeded: true,
        };
    }
    Aggregate {
        total: results.iter().map(|result| result.diff_score).sum(),
        exceeded: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::grid_manager::partition;

    fn score_by_index(cell_index: usize, _: &Cell, _: Option<&EarlyExit>) -> CellDiffResult {
        CellDiffResult {
            cell_index,
            diff_score: cell_index as u64 % 7,
            changed_pixels: cell_index as u64,
            changed: cell_index % 7 != 0,
        }
    }

    #[test]
    fn results_are_index_addressed() {
        let cells = partition(640, 480, 32).unwrap();
        let mut results = vec![CellDiffResult::default(); cells.len()];
        let aggregator = ParallelAggregator::new(Some(4)).unwrap();

        aggregator.aggregate(&cells, &mut results, None, score_by_index);

        for (index, result) in results.iter().enumerate() {
            assert_eq!(result.cell_index, index);
            assert_eq!(result.changed_pixels, index as u64);
        }
    }

    #[test]
    fn parallel_total_matches_sequential_total() {
        let cells = partition(640, 480, 32).unwrap();
        let aggregator = ParallelAggregator::new(None).unwrap();
        let mut parallel = vec![CellDiffResult::default(); cells.len()];
        let mut sequential = vec![CellDiffResult::default(); cells.len()];

        let a = aggregator.aggregate(&cells, &mut parallel, None, score_by_index);
        let b = aggregator.aggregate_sequential(&cells, &mut sequential, None, score_by_index);

        assert_eq!(a, b);
        assert_eq!(parallel, sequential);
        assert!(!a.exceeded);
    }

    #[test]
    fn zero_workers_falls_back_to_one() {
        assert_eq!(ParallelAggregator::new(Some(0)).unwrap().workers(), 1);
    }

    #[test]
    fn early_exit_reports_exceeded_sentinel() {
        let cells = partition(64, 64, 8).unwrap();
        let mut results = vec![CellDiffResult::default(); cells.len()];
        let aggregator = ParallelAggregator::new(Some(2)).unwrap();
        let early_exit = EarlyExit::new(10);

        let aggregate = aggregator.aggregate(&cells, &mut results, Some(&early_exit), |cell_index, _, exit| {
            if let Some(exit) = exit {
                exit.publish(4);
            }
            CellDiffResult {
                cell_index,
                diff_score: 4,
                changed_pixels: 4,
                changed: true,
            }
        });

        assert!(aggregate.exceeded);
        assert_eq!(aggregate.total, EXCEEDED);
    }

    #[test]
    fn early_exit_below_limit_keeps_the_real_total() {
        let early_exit = EarlyExit::new(10);
        assert!(!early_exit.publish(6));
        assert!(!early_exit.publish(4));
        assert!(early_exit.publish(1));
        assert!(early_exit.publish(0));
    }
}
