//! Full-problem branch-and-bound.
//!
//! Depth-first over (round, umpire) cells in round-major order, with round 0
//! pinned for symmetry. Pruning combines the shared bounds table with the
//! memoized partial-matching strengthener; leaves are refined by steepest
//! descent before challenging the incumbent. A background thread runs the
//! lower-bound engine on its own workers and hands them to the main pool
//! when it finishes.

use crate::bnb::bounds::Bounds;
use crate::bnb::branch::BranchState;
use crate::bnb::edge_priority::EdgePriority;
use crate::bnb::executor::{Executor, FuturePool, SequentialExecutor, ThreadPool};
use crate::bnb::lower_bound::LowerBoundEngine;
use crate::bnb::partial_matching::PartialMatchingCache;
pub use crate::bnb::window_search::UNBOUNDED;
use crate::descent::steepest_descent;
use crate::problem::{Game, Problem, Round, UNASSIGNED};
use crate::solution::Solution;
use crate::utils::Timer;
use log::info;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering::Relaxed};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct SolverOptions {
    /// Starting incumbent value; solutions must beat it strictly.
    pub initial_ub: i64,
    pub threads: usize,
    pub time_limit: Option<Duration>,
    /// Decompose the lower-bound schedule into sliding windows.
    pub use_time_windows: bool,
    /// When false, every consulted lower bound is 0 and the
    /// partial-matching test is skipped; only the incumbent prunes.
    pub use_pruning: bool,
}

impl Default for SolverOptions {
    fn default() -> SolverOptions {
        SolverOptions {
            initial_ub: UNBOUNDED,
            threads: 1,
            time_limit: None,
            use_time_windows: true,
            use_pruning: true,
        }
    }
}

/// Best assignment found, `assignment[round][umpire]`.
#[derive(Clone, Debug)]
pub struct BestAssignment {
    pub cost: i64,
    pub assignment: Vec<Vec<Game>>,
}

impl BestAssignment {
    pub fn to_solution<'a>(&self, problem: &'a Problem) -> Solution<'a> {
        let mut solution = Solution::full(problem);
        for (round, row) in self.assignment.iter().enumerate() {
            for (umpire, &game) in row.iter().enumerate() {
                solution.set(round, umpire, game);
            }
        }
        solution
    }
}

#[derive(Debug)]
pub struct SolveResult {
    pub best: Option<BestAssignment>,
    pub nodes: u64,
    pub leaves: u64,
    pub lower_bound: i64,
    pub upper_bound: i64,
    pub proved_optimal: bool,
    pub elapsed: Duration,
}

pub struct Solver {
    problem: Arc<Problem>,
}

impl Solver {
    pub fn new(problem: Arc<Problem>) -> Solver {
        Solver { problem }
    }

    pub fn solve(&self, options: &SolverOptions) -> SolveResult {
        let timer = match options.time_limit {
            Some(limit) => Timer::started(limit),
            None => Timer::unlimited(),
        };

        let core = if options.threads >= 4 {
            options.threads / 2
        } else {
            1
        };
        let executor: Arc<dyn Executor> = if options.threads >= 4 {
            Arc::new(ThreadPool::new(core))
        } else {
            Arc::new(SequentialExecutor)
        };

        let search = Arc::new(Search {
            problem: Arc::clone(&self.problem),
            bounds: Arc::new(Bounds::new(self.problem.n_rounds)),
            edges: Arc::new(EdgePriority::new(&self.problem)),
            cache: Arc::new(PartialMatchingCache::new()),
            timer,
            use_pruning: options.use_pruning,
            nodes: AtomicU64::new(0),
            leaves: AtomicU64::new(0),
            ub: AtomicI64::new(options.initial_ub),
            best: Mutex::new(None),
            interrupted: AtomicBool::new(false),
        });

        let cancel = Arc::new(AtomicBool::new(false));
        let lb_handle = if options.use_pruning {
            Some(self.start_lower_bound(&search, &executor, &cancel, options))
        } else {
            None
        };

        let mut state = BranchState::new(&self.problem);
        let futures = FuturePool::new();
        {
            let ctx = ForkCtx {
                search: &search,
                executor: &executor,
                futures: &futures,
            };
            search.recurse(&mut state, 0, 1, Some(&ctx));
        }
        futures.join(executor.as_ref());

        cancel.store(true, Relaxed);
        if let Some(handle) = lb_handle {
            let _ = handle.join();
        }

        let proved_optimal = !search.interrupted.load(Relaxed);
        search.report(if proved_optimal { "opt" } else { "time" }, "");

        let best = search.best.lock().unwrap().clone();
        let upper_bound = search.ub.load(Relaxed);
        SolveResult {
            best,
            nodes: search.nodes.load(Relaxed),
            leaves: search.leaves.load(Relaxed),
            lower_bound: search.bounds.get(0, self.problem.n_rounds - 1),
            upper_bound,
            proved_optimal,
            elapsed: timer.elapsed(),
        }
    }

    fn start_lower_bound(
        &self,
        search: &Arc<Search>,
        executor: &Arc<dyn Executor>,
        cancel: &Arc<AtomicBool>,
        options: &SolverOptions,
    ) -> thread::JoinHandle<()> {
        let core = if options.threads >= 4 {
            options.threads / 2
        } else {
            1
        };
        let lb_threads = options.threads.saturating_sub(core + 1);

        let engine = LowerBoundEngine::new(
            Arc::clone(&self.problem),
            Arc::clone(&search.bounds),
            Arc::clone(&search.edges),
            Arc::clone(&search.cache),
            Arc::clone(cancel),
            // The engine keeps its own node total; `SolveResult::nodes`
            // counts full-search nodes only.
            Arc::new(AtomicU64::new(0)),
            search.timer,
            options.use_time_windows,
        );
        engine.seed();

        let main_executor = Arc::clone(executor);
        thread::spawn(move || {
            let lb_executor: Arc<dyn Executor> = if lb_threads >= 1 {
                Arc::new(ThreadPool::new(lb_threads))
            } else {
                Arc::new(SequentialExecutor)
            };
            engine.run(&lb_executor);
            // The bound workers are idle from here on; hand their share
            // (plus this driver thread) to the main search.
            main_executor.grow(lb_threads + 1);
        })
    }
}

struct Search {
    problem: Arc<Problem>,
    bounds: Arc<Bounds>,
    edges: Arc<EdgePriority>,
    cache: Arc<PartialMatchingCache>,
    timer: Timer,
    use_pruning: bool,

    nodes: AtomicU64,
    leaves: AtomicU64,
    ub: AtomicI64,
    best: Mutex<Option<BestAssignment>>,
    interrupted: AtomicBool,
}

struct ForkCtx<'a> {
    search: &'a Arc<Search>,
    executor: &'a Arc<dyn Executor>,
    futures: &'a FuturePool,
}

impl Search {
    fn recurse(&self, state: &mut BranchState, umpire: usize, round: Round, fork: Option<&ForkCtx>) {
        if self.timer.is_over() {
            self.interrupted.store(true, Relaxed);
            return;
        }
        self.nodes.fetch_add(1, Relaxed);

        let problem = &*self.problem;
        let m = problem.n_umpires;
        let last_round = problem.n_rounds - 1;
        let prev = state.games[umpire][round - 1];

        let mut candidates: Vec<Game> = (problem.first_game(round)
            ..problem.first_game(round) + m)
            .filter(|&g| self.candidate_ok(state, g, umpire, round))
            .collect();
        candidates.sort_by_key(|&g| problem.game_dist(prev, g));

        for game in candidates {
            state.assign(problem, game, umpire);
            if !self.can_prune(state, umpire, round) {
                if round == last_round && umpire == m - 1 {
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
                                && next_round == 2
                                && ctx.executor.has_empty_slot()
                        })
                        .map(|ctx| {
                            let search = Arc::clone(ctx.search);
                            let mut subtree = state.clone();
                            ctx.futures.push(ctx.executor.submit(
                                0,
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

    fn candidate_ok(&self, state: &BranchState, game: Game, umpire: usize, round: Round) -> bool {
        if state.assigned[game] != UNASSIGNED {
            return false;
        }
        let problem = &*self.problem;
        let venue = problem.venue(game);

        // An umpire that cannot reach its missing venues in the remaining
        // rounds can never finish without an unvisited venue.
        let new_venue = !state.has_visited(umpire, venue) as usize;
        if problem.n_teams - (state.visited(umpire) + new_venue) > problem.n_rounds - round {
            return false;
        }
        if round + 1 < problem.n_rounds {
            let reachable = &problem.possible_visits[round + 1];
            for team in 0..problem.n_teams {
                if team != venue && !state.has_visited(umpire, team) && !reachable[team] {
                    return false;
                }
            }
        }

        for r in (round + 1).saturating_sub(problem.q1)..round {
            if problem.venue(state.games[umpire][r]) == venue {
                return false;
            }
        }
        let teams = problem.games[game].teams();
        for r in (round + 1).saturating_sub(problem.q2)..round {
            let seen = problem.games[state.games[umpire][r]].teams();
            if teams.iter().any(|t| seen.contains(t)) {
                return false;
            }
        }
        true
    }

    fn can_prune(&self, state: &BranchState, umpire: usize, round: Round) -> bool {
        let ub = self.ub.load(Relaxed);
        let last_round = self.problem.n_rounds - 1;
        let lb = if self.use_pruning {
            self.bounds.get(round, last_round)
        } else {
            0
        };
        if state.cost + lb >= ub {
            return true;
        }
        // The cheap adjacent bound gates the partial-matching lookup.
        if self.use_pruning
            && umpire + 1 < self.problem.n_umpires
            && state.cost + lb + self.bounds.get(round - 1, round) >= ub
        {
            let (used, used_next) = state.used_masks(&self.problem, round, umpire);
            let pm = self.cache.bound(&self.problem, round, umpire, used, used_next);
            if state.cost + lb + pm >= ub {
                return true;
            }
        }
        false
    }

    fn check_solution(&self, state: &BranchState) {
        self.leaves.fetch_add(1, Relaxed);
        let mut solution = state.to_solution(&self.problem);
        let raw = solution.objective();
        steepest_descent(&mut solution);
        let score = solution.objective();

        let mut best = self.best.lock().unwrap();
        if score < self.ub.load(Relaxed) {
            self.ub.store(score, Relaxed);
            let assignment = (0..self.problem.n_rounds)
                .map(|round| {
                    (0..self.problem.n_umpires)
                        .map(|umpire| solution.get(round, umpire))
                        .collect()
                })
                .collect();
            *best = Some(BestAssignment { cost: score, assignment });
            drop(best);
            self.report("ub", if score < raw { "* H" } else { "*" });
        }
    }

    fn report(&self, tag: &str, annotation: &str) {
        let ub = self.ub.load(Relaxed);
        let lb = self.bounds.get(0, self.problem.n_rounds - 1);
        let ub_text = if ub >= UNBOUNDED {
            "inf".to_string()
        } else {
            ub.to_string()
        };
        info!(
            "{:>4} {:>8.1}s {:>12} nodes  lb {:>10}  ub {:>10}  gap {:>6}  {}",
            tag,
            self.timer.elapsed().as_secs_f64(),
            self.nodes.load(Relaxed),
            lb,
            ub_text,
            gap_text(ub, lb),
            annotation
        );
    }
}

/// Relative optimality gap for the status line. The incumbent can briefly
/// trail a freshly installed bound, so the gap clamps at zero.
fn gap_text(ub: i64, lb: i64) -> String {
    if ub > 0 && ub < UNBOUNDED {
        format!("{:.1}%", 100.0 * (ub - lb).max(0) as f64 / ub as f64)
    } else {
        "-".to_string()
    }
}
