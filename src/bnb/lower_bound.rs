//! Background lower-bound engine.
//!
//! Seeds the bounds table with one relaxed matching per adjacent round pair,
//! then solves windowed sub-problems of increasing size, feeding every proven
//! optimum back into the table and promoting the edges of improving
//! sub-solutions. Runs concurrently with the main search: the table is
//! monotone, so the search can read it at any moment.

use crate::bnb::bounds::Bounds;
use crate::bnb::edge_priority::EdgePriority;
use crate::bnb::executor::{Executor, FuturePool};
use crate::bnb::partial_matching::{forbidden_pair, PartialMatchingCache};
use crate::bnb::window_search::WindowSearch;
use crate::matching::{assignment_cost, solve_assignment};
use crate::problem::{Problem, Round};
use crate::utils::Timer;
use log::{info, warn};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering::Relaxed};
use std::sync::Arc;

pub struct LowerBoundEngine {
    problem: Arc<Problem>,
    bounds: Arc<Bounds>,
    edges: Arc<EdgePriority>,
    cache: Arc<PartialMatchingCache>,
    cancel: Arc<AtomicBool>,
    nodes: Arc<AtomicU64>,
    timer: Timer,
    use_time_windows: bool,
}

impl LowerBoundEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        problem: Arc<Problem>,
        bounds: Arc<Bounds>,
        edges: Arc<EdgePriority>,
        cache: Arc<PartialMatchingCache>,
        cancel: Arc<AtomicBool>,
        nodes: Arc<AtomicU64>,
        timer: Timer,
        use_time_windows: bool,
    ) -> Arc<LowerBoundEngine> {
        Arc::new(LowerBoundEngine {
            problem,
            bounds,
            edges,
            cache,
            cancel,
            nodes,
            timer,
            use_time_windows,
        })
    }

    /// Seed every adjacent round pair with a relaxed matching bound: each
    /// game of one round must connect to some game of the next, subject only
    /// to the direct q1/q2 pairing rules.
    pub fn seed(&self) {
        let p = &*self.problem;
        let m = p.n_umpires;
        for round in 1..p.n_rounds {
            let costs: Vec<Vec<i64>> = (p.first_game(round - 1)..p.first_game(round - 1) + m)
                .map(|g| {
                    (p.first_game(round)..p.first_game(round) + m)
                        .map(|h| {
                            if forbidden_pair(p, g, h) {
                                crate::matching::FORBIDDEN
                            } else {
                                p.game_dist(g, h)
                            }
                        })
                        .collect()
                })
                .collect();
            match solve_assignment(&costs) {
                Some(a) => {
                    let lb = assignment_cost(&costs, &a);
                    if lb > 0 {
                        self.bounds.set(round - 1, round, lb);
                    }
                }
                None => {
                    warn!("no window-feasible transition between rounds {} and {}",
                        round - 1, round);
                }
            }
        }
    }

    /// Schedule and join every window. Small windows go in first and at
    /// higher priority, so their bounds are available while the larger ones
    /// still run.
    pub fn run(self: Arc<Self>, executor: &Arc<dyn Executor>) {
        let n = self.problem.n_rounds;
        let futures = FuturePool::new();
        let mut priority = 0i64;

        let submit = |first: Round, last: Round, priority: i64| {
            let engine = Arc::clone(&self);
            let executor_inner = Arc::clone(executor);
            futures.push(executor.submit(
                priority,
                Box::new(move || engine.solve_window(&executor_inner, first, last, priority)),
            ));
        };

        if self.use_time_windows {
            let mut seen = HashSet::new();
            for size in 2..n {
                let mut last = n - 1;
                loop {
                    let first = last.saturating_sub(size);
                    if seen.insert((first, last)) {
                        submit(first, last, priority);
                        priority -= 1;
                    }
                    if first == 0 {
                        break;
                    }
                    last = first;
                }
            }
        } else {
            for size in 2..n {
                submit(n - 1 - size, n - 1, priority);
                priority -= 1;
            }
        }

        futures.join(executor.as_ref());
    }

    fn solve_window(
        &self,
        executor: &Arc<dyn Executor>,
        first: Round,
        last: Round,
        priority: i64,
    ) {
        if self.cancel.load(Relaxed) || self.timer.is_over() {
            return;
        }
        let search = WindowSearch::new(
            Arc::clone(&self.problem),
            first,
            last,
            Arc::clone(&self.bounds),
            Arc::clone(&self.edges),
            Arc::clone(&self.cache),
            Arc::clone(&self.cancel),
            self.timer,
            Arc::clone(&self.nodes),
            priority,
        );
        let outcome = match search.solve(executor) {
            Some(o) => o,
            None => return,
        };

        if outcome.cost > self.bounds.get(first, last) {
            self.bounds.set(first, last, outcome.cost);
            info!(
                "round {:02}-{:02}: lb improved to {} (total {})",
                first,
                last,
                outcome.cost,
                self.bounds.get(0, self.problem.n_rounds - 1)
            );
            for umpire in 0..self.problem.n_umpires {
                for pair in outcome.assignment.windows(2) {
                    self.edges.improve(pair[0][umpire], pair[1][umpire]);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bnb::executor::SequentialExecutor;
    use crate::problem::fixtures::opponents4;

    fn engine_for(problem: Arc<Problem>, use_time_windows: bool) -> Arc<LowerBoundEngine> {
        let n_rounds = problem.n_rounds;
        LowerBoundEngine::new(
            Arc::clone(&problem),
            Arc::new(Bounds::new(n_rounds)),
            Arc::new(EdgePriority::new(&problem)),
            Arc::new(PartialMatchingCache::new()),
            Arc::new(AtomicBool::new(false)),
            Arc::new(AtomicU64::new(0)),
            Timer::unlimited(),
            use_time_windows,
        )
    }

    fn test_problem() -> Arc<Problem> {
        let dist = vec![
            vec![0, 4, 7, 2],
            vec![4, 0, 3, 6],
            vec![7, 3, 0, 5],
            vec![2, 6, 5, 0],
        ];
        Arc::new(Problem::new(4, dist, opponents4(), 2, 1, "lbtest"))
    }

    #[test]
    fn seeding_produces_positive_adjacent_bounds() {
        let problem = test_problem();
        let engine = engine_for(Arc::clone(&problem), true);
        engine.seed();
        let mut chained = 0;
        for round in 1..problem.n_rounds {
            let lb = engine.bounds.get(round - 1, round);
            assert!(lb > 0, "round {}-{} should have a positive bound", round - 1, round);
            chained += lb;
        }
        // Propagation has already chained the adjacent pairs.
        assert!(engine.bounds.get(0, problem.n_rounds - 1) >= chained);
    }

    #[test]
    fn run_strengthens_the_full_horizon_bound() {
        let problem = test_problem();
        let executor: Arc<dyn Executor> = Arc::new(SequentialExecutor);

        let engine = engine_for(Arc::clone(&problem), true);
        engine.seed();
        let seeded = engine.bounds.get(0, problem.n_rounds - 1);
        Arc::clone(&engine).run(&executor);
        let finished = engine.bounds.get(0, problem.n_rounds - 1);
        assert!(finished >= seeded);

        // Without time windows the suffix schedule ends at the same proven
        // full-horizon window, so the final bound agrees.
        let suffix = engine_for(Arc::clone(&problem), false);
        suffix.seed();
        Arc::clone(&suffix).run(&executor);
        assert_eq!(suffix.bounds.get(0, problem.n_rounds - 1), finished);
    }

    #[test]
    fn cancelled_engine_leaves_bounds_untouched() {
        let problem = test_problem();
        let executor: Arc<dyn Executor> = Arc::new(SequentialExecutor);
        let engine = engine_for(Arc::clone(&problem), true);
        engine.cancel.store(true, Relaxed);
        Arc::clone(&engine).run(&executor);
        assert_eq!(engine.bounds.get(0, problem.n_rounds - 1), 0);
    }
}
