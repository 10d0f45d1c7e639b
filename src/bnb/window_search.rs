//! Exact search over a window of consecutive rounds.
//!
//! Solves the sub-problem restricted to `[first_round, last_round]` with the
//! same branch-and-bound discipline as the full search, minus the all-venues
//! constraint. Its optimum feeds the shared bounds table, so on timeout or
//! cancellation the whole run is discarded: an unproven value must never be
//! installed as a bound.

use crate::bnb::bounds::Bounds;
use crate::bnb::branch::WindowBranchState;
use crate::bnb::edge_priority::EdgePriority;
use crate::bnb::executor::{Executor, FuturePool};
use crate::bnb::partial_matching::PartialMatchingCache;
use crate::descent::steepest_descent;
use crate::problem::{Game, Problem, Round, UNASSIGNED};
use crate::utils::Timer;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering::Relaxed};
use std::sync::{Arc, Mutex};

/// Initial incumbent value before anything is found.
pub const UNBOUNDED: i64 = i64::MAX / 4;

/// Best assignment found for a window, `assignment[round - first_round][umpire]`.
#[derive(Clone, Debug)]
pub struct WindowOutcome {
    pub cost: i64,
    pub assignment: Vec<Vec<Game>>,
}

pub struct WindowSearch {
    problem: Arc<Problem>,
    pub first_round: Round,
    pub last_round: Round,
    bounds: Arc<Bounds>,
    edges: Arc<EdgePriority>,
    cache: Arc<PartialMatchingCache>,
    cancel: Arc<AtomicBool>,
    timer: Timer,
    nodes: Arc<AtomicU64>,
    fork_priority: i64,

    ub: AtomicI64,
    best: Mutex<Option<WindowOutcome>>,
    interrupted: AtomicBool,
}

struct ForkCtx<'a> {
    search: &'a Arc<WindowSearch>,
    executor: &'a Arc<dyn Executor>,
    futures: &'a FuturePool,
}

impl WindowSearch {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        problem: Arc<Problem>,
        first_round: Round,
        last_round: Round,
        bounds: Arc<Bounds>,
        edges: Arc<EdgePriority>,
        cache: Arc<PartialMatchingCache>,
        cancel: Arc<AtomicBool>,
        timer: Timer,
        nodes: Arc<AtomicU64>,
        fork_priority: i64,
    ) -> Arc<WindowSearch> {
        debug_assert!(first_round < last_round && last_round < problem.n_rounds);
        Arc::new(WindowSearch {
            problem,
            first_round,
            last_round,
            bounds,
            edges,
            cache,
            cancel,
            timer,
            nodes,
            fork_priority,
            ub: AtomicI64::new(UNBOUNDED),
            best: Mutex::new(None),
            interrupted: AtomicBool::new(false),
        })
    }

    /// Exhaust the window. Returns `None` when interrupted by the deadline
    /// or the cancel flag, even if an incumbent exists.
    pub fn solve(self: Arc<Self>, executor: &Arc<dyn Executor>) -> Option<WindowOutcome> {
        let mut state =
            WindowBranchState::new(&self.problem, self.first_round, self.last_round);
        let futures = FuturePool::new();
        {
            let ctx = ForkCtx {
                search: &self,
                executor,
                futures: &futures,
            };
            self.recurse(&mut state, 0, self.first_round + 1, Some(&ctx));
        }
        futures.join(executor.as_ref());

        if self.interrupted.load(Relaxed) || self.cancel.load(Relaxed) {
            return None;
        }
        let best = self.best.lock().unwrap().clone();
        best
    }

    fn recurse(
        &self,
        state: &mut WindowBranchState,
        umpire: usize,
        round: Round,
        fork: Option<&ForkCtx>,
    ) {
        if self.cancel.load(Relaxed) || self.timer.is_over() {
            self.interrupted.store(true, Relaxed);
            return;
        }
        self.nodes.fetch_add(1, Relaxed);

        let problem = &*self.problem;
        let m = problem.n_umpires;
        let prev = state.games[umpire][round - 1];

        let mut candidates: Vec<Game> = (problem.first_game(round)
            ..problem.first_game(round) + m)
            .filter(|&g| self.candidate_ok(state, g, umpire, round))
            .collect();
        candidates.sort_by_key(|&g| self.edges.get(prev, g));

        for game in candidates {
            state.assign(problem, game, umpire);
            if !self.can_prune(state, umpire, round) {
                if round == self.last_round && umpire == m - 1 {
                    self.check_solution(state);
                } else {
                    let (next_umpire, next_round) = if umpire + 1 < m {
                        (umpire + 1, round)
                    } else {
                        (0, round + 1)
                    };
                    let forked = fork
                        .filter(|ctx| {
                            next_umpire == 0
                                && next_round == self.first_round + 2
                                && ctx.executor.has_empty_slot()
                        })
                        .map(|ctx| {
                            let search = Arc::clone(ctx.search);
                            let mut subtree = state.clone();
                            ctx.futures.push(ctx.executor.submit(
                                self.fork_priority,
                                Box::new(move || {
                                    search.recurse(&mut subtree, 0, next_round, None);
                                }),
                            ));
                        })
                        .is_some();
                    if !forked {
                        self.recurse(state, next_umpire, next_round, fork);
                    }
                }
            }
            state.unassign(problem, game);
        }
    }

    fn candidate_ok(
        &self,
        state: &WindowBranchState,
        game: Game,
        umpire: usize,
        round: Round,
    ) -> bool {
        if state.assigned[game] != UNASSIGNED {
            return false;
        }
        let problem = &*self.problem;
        let venue = problem.venue(game);
        let q1_from = (round + 1).saturating_sub(problem.q1).max(self.first_round);
        for r in q1_from..round {
            if problem.venue(state.games[umpire][r]) == venue {
                return false;
            }
        }
        let teams = problem.games[game].teams();
        let q2_from = (round + 1).saturating_sub(problem.q2).max(self.first_round);
        for r in q2_from..round {
            let seen = problem.games[state.games[umpire][r]].teams();
            if teams.iter().any(|t| seen.contains(t)) {
                return false;
            }
        }
        true
    }

    fn can_prune(&self, state: &WindowBranchState, umpire: usize, round: Round) -> bool {
        let ub = self.ub.load(Relaxed);
        let lb = self.bounds.get(round, self.last_round);
        if state.cost + lb >= ub {
            return true;
        }
        if umpire + 1 < self.problem.n_umpires {
            let (used, used_next) = state.used_masks(&self.problem, round, umpire);
            let pm = self.cache.bound(&self.problem, round, umpire, used, used_next);
            if state.cost + lb + pm >= ub {
                return true;
            }
        }
        false
    }

    fn check_solution(&self, state: &WindowBranchState) {
        let mut solution = state.to_solution(&self.problem);
        steepest_descent(&mut solution);
        let score = solution.objective();

        let mut best = self.best.lock().unwrap();
        if score < self.ub.load(Relaxed) {
            self.ub.store(score, Relaxed);
            let assignment = (self.first_round..=self.last_round)
                .map(|round| {
                    (0..self.problem.n_umpires)
                        .map(|umpire| solution.get(round, umpire))
                        .collect()
                })
                .collect();
            *best = Some(WindowOutcome { cost: score, assignment });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bnb::executor::SequentialExecutor;
    use crate::problem::fixtures::{ones_dist, opponents4};
    use itertools::Itertools;

    fn search_for(
        problem: Arc<Problem>,
        first: Round,
        last: Round,
        timer: Timer,
    ) -> Arc<WindowSearch> {
        let n_rounds = problem.n_rounds;
        WindowSearch::new(
            Arc::clone(&problem),
            first,
            last,
            Arc::new(Bounds::new(n_rounds)),
            Arc::new(EdgePriority::new(&problem)),
            Arc::new(PartialMatchingCache::new()),
            Arc::new(AtomicBool::new(false)),
            timer,
            Arc::new(AtomicU64::new(0)),
            0,
        )
    }

    /// Exhaustive reference optimum over all window assignments with the
    /// first round pinned, penalized like the search.
    fn brute_force(problem: &Problem, first: Round, last: Round) -> i64 {
        let m = problem.n_umpires;
        let rounds: Vec<Round> = (first + 1..=last).collect();
        let mut best = i64::MAX;
        let perms: Vec<Vec<usize>> = (0..m).permutations(m).collect();
        let mut stack = vec![0usize; rounds.len()];
        'outer: loop {
            let mut s = crate::solution::Solution::windowed(problem, first, last);
            for u in 0..m {
                s.set(first, u, problem.first_game(first) + u);
            }
            for (i, &r) in rounds.iter().enumerate() {
                for u in 0..m {
                    s.set(r, u, problem.first_game(r) + perms[stack[i]][u]);
                }
            }
            best = best.min(s.objective());
            for i in 0..stack.len() {
                stack[i] += 1;
                if stack[i] < perms.len() {
                    continue 'outer;
                }
                stack[i] = 0;
            }
            break;
        }
        best
    }

    #[test]
    fn finds_window_optimum() {
        let dist = vec![
            vec![0, 4, 7, 2],
            vec![4, 0, 3, 6],
            vec![7, 3, 0, 5],
            vec![2, 6, 5, 0],
        ];
        let problem = Arc::new(Problem::new(4, dist, opponents4(), 2, 1, "win"));
        let executor: Arc<dyn Executor> = Arc::new(SequentialExecutor);

        for (first, last) in [(0, 2), (2, 5), (4, 5)] {
            let search = search_for(Arc::clone(&problem), first, last, Timer::unlimited());
            let outcome = search.solve(&executor).unwrap();
            assert_eq!(outcome.cost, brute_force(&problem, first, last));
        }
    }

    #[test]
    fn expired_timer_yields_none() {
        let problem = Arc::new(Problem::new(4, ones_dist(4), opponents4(), 2, 1, "win2"));
        let executor: Arc<dyn Executor> = Arc::new(SequentialExecutor);
        let search = search_for(
            Arc::clone(&problem),
            0,
            5,
            Timer::started(std::time::Duration::ZERO),
        );
        assert!(search.solve(&executor).is_none());
    }

    #[test]
    fn repeated_runs_agree() {
        let problem = Arc::new(Problem::new(4, ones_dist(4), opponents4(), 3, 2, "win3"));
        let executor: Arc<dyn Executor> = Arc::new(SequentialExecutor);
        let a = search_for(Arc::clone(&problem), 1, 4, Timer::unlimited())
            .solve(&executor)
            .unwrap();
        let b = search_for(Arc::clone(&problem), 1, 4, Timer::unlimited())
            .solve(&executor)
            .unwrap();
        assert_eq!(a.cost, b.cost);
    }
}
