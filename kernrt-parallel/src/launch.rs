use std::ops::Range;
use std::time::Instant;

use kernrt_base::iter::BlockRanges;
use rayon::prelude::*;

use crate::config::parallel_config;
use crate::partition::Partition;
use crate::pool::thread_pool;
use crate::search::{SearchPlan, SearchSlot};

/// Policy for dividing a launch into blocks.
#[derive(Clone, Copy, Debug)]
pub enum Split<'a> {
    /// One block per pool thread, with no block smaller than the configured
    /// [`min_block_len`](crate::ParallelConfig::min_block_len).
    Even,

    /// One block per pool thread, with no block smaller than the given number
    /// of units. Useful when each unit is expensive (eg. a whole row).
    EvenMin(usize),

    /// Fixed block size.
    Block(usize),

    /// Block size chosen by timing successive launches. See
    /// [`ParallelSearchState`](crate::ParallelSearchState).
    Auto(&'a SearchSlot),
}

/// Block size and, for auto-search trials, the candidate being timed.
struct Plan<'a> {
    block_size: usize,
    trial: Option<(&'a SearchSlot, u32)>,
}

impl<'a> Split<'a> {
    fn plan(self, count: usize) -> Plan<'a> {
        let config = parallel_config();
        let even = |min_block: usize| {
            let threads = thread_pool().num_threads();
            count.div_ceil(threads).max(min_block).max(1)
        };
        let block_size = |block_size| Plan {
            block_size,
            trial: None,
        };

        match self {
            Split::Even => block_size(even(config.min_block_len)),
            Split::EvenMin(min_block) => block_size(even(min_block)),
            Split::Block(size) => block_size(size.max(1)),
            Split::Auto(_) if !config.auto_search => block_size(even(config.min_block_len)),
            Split::Auto(slot) => {
                let plan = slot.plan(count);
                let trial = match plan {
                    SearchPlan::Trial { pow, .. } => Some((slot, pow)),
                    SearchPlan::Settled { .. } => None,
                };
                Plan {
                    block_size: plan.block_size(),
                    trial,
                }
            }
        }
    }
}

/// Run `task` over blocks which together cover `0..count` exactly once.
///
/// Blocks run in parallel on the [`thread_pool`]. This returns once every
/// block has completed, or with the first error a block returned. Panics in
/// a block are propagated to the caller. A single block runs directly on the
/// calling thread.
///
/// `task` receives the half-open range of indices it is responsible for.
pub fn parallel_launch<E, F>(count: usize, split: Split<'_>, task: F) -> Result<(), E>
where
    E: Send,
    F: Fn(Range<usize>) -> Result<(), E> + Sync,
{
    if count == 0 {
        return Ok(());
    }

    let plan = split.plan(count);
    let blocks = BlockRanges::new(count, plan.block_size);

    let start = Instant::now();
    let result = if blocks.len() <= 1 {
        task(0..count)
    } else {
        thread_pool().run(|| blocks.into_par_iter().try_for_each(&task))
    };
    record_trial(&plan, start, &result);

    result
}

/// Variant of [`parallel_launch`] that also divides an output partition.
///
/// `out` is split into disjoint parts that line up with the blocks, so each
/// invocation of `task` receives the unit range it covers together with
/// exclusive access to those units of `out`. The number of units in `out`
/// determines the launch size.
pub fn parallel_launch_mut<P, E, F>(out: P, split: Split<'_>, task: F) -> Result<(), E>
where
    P: Partition,
    E: Send,
    F: Fn(Range<usize>, P) -> Result<(), E> + Sync,
{
    let count = out.units();
    if count == 0 {
        return Ok(());
    }

    let plan = split.plan(count);
    let blocks = BlockRanges::new(count, plan.block_size);

    let start = Instant::now();
    let result = if blocks.len() <= 1 {
        task(0..count, out)
    } else {
        let mut parts = Vec::with_capacity(blocks.len());
        let mut rest = out;
        for range in blocks {
            let (head, tail) = rest.split_at(range.len());
            parts.push((range, head));
            rest = tail;
        }
        thread_pool().run(|| {
            parts
                .into_par_iter()
                .try_for_each(|(range, part)| task(range, part))
        })
    };
    record_trial(&plan, start, &result);

    result
}

/// Report the duration of a successful auto-search trial.
fn record_trial<E>(plan: &Plan, start: Instant, result: &Result<(), E>) {
    if let (Some((slot, pow)), Ok(())) = (plan.trial, result) {
        slot.record(pow, start.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use kernrt_testing::TestCases;

    use super::{Split, parallel_launch, parallel_launch_mut};
    use crate::partition::Rows;
    use crate::search::SearchSlot;

    fn visit_counts(count: usize, split: Split) -> Vec<u32> {
        let visits: Vec<AtomicU32> = (0..count).map(|_| AtomicU32::new(0)).collect();
        parallel_launch(count, split, |range| {
            for i in range {
                visits[i].fetch_add(1, Ordering::Relaxed);
            }
            Ok::<_, ()>(())
        })
        .unwrap();
        visits.into_iter().map(|v| v.into_inner()).collect()
    }

    #[test]
    fn test_parallel_launch_visits_each_index_once() {
        #[derive(Debug)]
        struct Case {
            count: usize,
            block: usize,
        }

        let cases = [
            Case { count: 1, block: 1 },
            Case { count: 7, block: 1 },
            Case { count: 100, block: 3 },
            Case { count: 100, block: 100 },
            Case { count: 100, block: 1000 },
            Case { count: 4097, block: 64 },
        ];

        cases.test_each(|&Case { count, block }| {
            let visits = visit_counts(count, Split::Block(block));
            assert!(visits.iter().all(|&v| v == 1));

            let visits = visit_counts(count, Split::EvenMin(1));
            assert!(visits.iter().all(|&v| v == 1));

            let visits = visit_counts(count, Split::Even);
            assert!(visits.iter().all(|&v| v == 1));
        });
    }

    #[test]
    fn test_parallel_launch_zero_count() {
        let calls = AtomicU32::new(0);
        parallel_launch(0, Split::Block(1), |_| {
            calls.fetch_add(1, Ordering::Relaxed);
            Ok::<_, ()>(())
        })
        .unwrap();
        assert_eq!(calls.into_inner(), 0);
    }

    #[test]
    fn test_parallel_launch_propagates_error() {
        let result = parallel_launch(1000, Split::Block(10), |range| {
            if range.contains(&555) {
                Err(format!("failed at block {:?}", range))
            } else {
                Ok(())
            }
        });
        assert_eq!(result, Err("failed at block 550..560".to_string()));
    }

    #[test]
    fn test_parallel_launch_propagates_panic() {
        let result = std::panic::catch_unwind(|| {
            parallel_launch(100, Split::Block(10), |range| {
                if range.start == 50 {
                    panic!("block failed");
                }
                Ok::<_, ()>(())
            })
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_parallel_launch_mut_slices() {
        let mut out = vec![0usize; 1000];
        parallel_launch_mut(&mut out[..], Split::Block(33), |range, part: &mut [usize]| {
            assert_eq!(range.len(), part.len());
            for (i, x) in range.zip(part.iter_mut()) {
                *x = i * 2;
            }
            Ok::<_, ()>(())
        })
        .unwrap();
        assert!(out.iter().enumerate().all(|(i, &x)| x == i * 2));
    }

    #[test]
    fn test_parallel_launch_mut_rows_and_pairs() {
        let mut sums = vec![0i32; 6];
        let mut rows = vec![0i32; 6 * 4];
        parallel_launch_mut(
            (&mut sums[..], Rows::new(&mut rows, 4)),
            Split::Block(2),
            |range, (sums, mut rows): (&mut [i32], Rows<i32>)| {
                for (k, row) in range.zip(0..) {
                    rows.row_mut(row).fill(k as i32);
                    sums[row] = 4 * k as i32;
                }
                Ok::<_, ()>(())
            },
        )
        .unwrap();
        assert_eq!(sums, [0, 4, 8, 12, 16, 20]);
        assert_eq!(&rows[8..12], &[2, 2, 2, 2]);
    }

    #[test]
    fn test_auto_search_reuses_decision() {
        let slot = SearchSlot::new();
        let total = AtomicU32::new(0);

        for _ in 0..40 {
            parallel_launch(512, Split::Auto(&slot), |range| {
                total.fetch_add(range.len() as u32, Ordering::Relaxed);
                Ok::<_, ()>(())
            })
            .unwrap();
        }

        assert_eq!(total.into_inner(), 512 * 40);
        let state = slot.state();
        assert!(state.is_settled());
        let trials = state.trials();

        // Further launches don't add trials.
        parallel_launch(512, Split::Auto(&slot), |_| Ok::<_, ()>(())).unwrap();
        assert_eq!(slot.state().trials(), trials);
    }

    #[test]
    fn test_concurrent_launches() {
        let results = Mutex::new(Vec::new());
        std::thread::scope(|s| {
            for t in 0..4u32 {
                let results = &results;
                s.spawn(move || {
                    for _ in 0..20 {
                        let sum = AtomicU32::new(0);
                        parallel_launch(256, Split::Block(16), |range| {
                            let partial: u32 = range.map(|i| i as u32).sum();
                            sum.fetch_add(partial + t, Ordering::Relaxed);
                            Ok::<_, ()>(())
                        })
                        .unwrap();
                        results.lock().unwrap().push((t, sum.into_inner()));
                    }
                });
            }
        });

        let results = results.into_inner().unwrap();
        assert_eq!(results.len(), 80);
        for (t, sum) in results {
            // 16 blocks each add `t` once.
            assert_eq!(sum, 255 * 256 / 2 + 16 * t);
        }
    }

    #[test]
    fn test_nested_launch() {
        let total = AtomicU32::new(0);
        parallel_launch(8, Split::Block(1), |_| {
            parallel_launch(100, Split::Block(10), |range| {
                total.fetch_add(range.len() as u32, Ordering::Relaxed);
                Ok::<_, ()>(())
            })
        })
        .unwrap();
        assert_eq!(total.into_inner(), 800);
    }
}
