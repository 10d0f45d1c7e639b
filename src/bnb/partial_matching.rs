use crate::matching::{assignment_cost, solve_assignment, FORBIDDEN};
use crate::problem::{Problem, Round};
use log::debug;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering::Relaxed};
use std::sync::Mutex;

/// Default capacity of the memo, in entries.
pub const CACHE_LIMIT: usize = 10_000_000;

const SHARDS: usize = 64;

/// Memoized lower bound on the cost of connecting the still-unassigned
/// umpires across one round boundary.
///
/// At a node where umpires `0..=umpire` of `round` are fixed, the remaining
/// umpires each hold a known game in `round - 1` and must take one of the
/// unused games of `round`. The minimum-cost matching between those two game
/// sets, with pairings that would violate the q1/q2 windows forbidden, is a
/// valid bound: it relaxes every constraint except the direct transition.
///
/// The result depends only on which games are used, so it is cached under a
/// packed (round, umpire, used, used-next) key and shared by all search
/// threads. Once the memo is full, uncached queries yield 0 (no
/// strengthening) rather than growing without bound.
pub struct PartialMatchingCache {
    shards: Vec<Mutex<HashMap<u64, i64>>>,
    entries: AtomicUsize,
    limit: usize,
    overflow_logged: AtomicBool,
}

impl PartialMatchingCache {
    pub fn new() -> PartialMatchingCache {
        PartialMatchingCache::with_limit(CACHE_LIMIT)
    }

    pub fn with_limit(limit: usize) -> PartialMatchingCache {
        PartialMatchingCache {
            shards: (0..SHARDS).map(|_| Mutex::new(HashMap::new())).collect(),
            entries: AtomicUsize::new(0),
            limit,
            overflow_logged: AtomicBool::new(false),
        }
    }

    /// Bound for the boundary `round - 1` -> `round`, with `used` the slot
    /// mask of `round - 1` games taken by the fixed umpires and `used_next`
    /// the slot mask of `round` games taken so far.
    pub fn bound(
        &self,
        problem: &Problem,
        round: Round,
        umpire: usize,
        used: u32,
        used_next: u32,
    ) -> i64 {
        debug_assert!(round >= 1);
        debug_assert!(problem.n_umpires <= 24, "slot masks are 24 bits wide");
        debug_assert_eq!(used.count_ones(), used_next.count_ones());

        let key = (round as u64) << 56
            | (umpire as u64) << 48
            | (used as u64) << 24
            | used_next as u64;
        let shard = &self.shards[(key % SHARDS as u64) as usize];

        if let Some(&cached) = shard.lock().unwrap().get(&key) {
            return cached;
        }
        if self.entries.load(Relaxed) >= self.limit {
            if !self.overflow_logged.swap(true, Relaxed) {
                debug!("partial matching memo full ({} entries)", self.limit);
            }
            return 0;
        }

        let value = self.compute(problem, round, used, used_next);
        shard.lock().unwrap().insert(key, value);
        self.entries.fetch_add(1, Relaxed);
        value
    }

    fn compute(&self, problem: &Problem, round: Round, used: u32, used_next: u32) -> i64 {
        let m = problem.n_umpires;
        let rows: Vec<usize> = (0..m)
            .filter(|slot| used & (1 << slot) == 0)
            .map(|slot| problem.first_game(round - 1) + slot)
            .collect();
        let cols: Vec<usize> = (0..m)
            .filter(|slot| used_next & (1 << slot) == 0)
            .map(|slot| problem.first_game(round) + slot)
            .collect();
        if rows.is_empty() {
            return 0;
        }

        let costs: Vec<Vec<i64>> = rows
            .iter()
            .map(|&g| {
                cols.iter()
                    .map(|&h| {
                        if forbidden_pair(problem, g, h) {
                            FORBIDDEN
                        } else {
                            problem.game_dist(g, h)
                        }
                    })
                    .collect()
            })
            .collect();

        match solve_assignment(&costs) {
            Some(assignment) => assignment_cost(&costs, &assignment),
            // No transition satisfies the windows; any node asking is dead.
            None => FORBIDDEN,
        }
    }
}

impl Default for PartialMatchingCache {
    fn default() -> Self {
        PartialMatchingCache::new()
    }
}

/// Whether officiating `from` then `to` in consecutive rounds violates the
/// q1 (venue) or q2 (team) window on its own.
pub fn forbidden_pair(problem: &Problem, from: usize, to: usize) -> bool {
    if problem.q1 > 1 && problem.venue(from) == problem.venue(to) {
        return true;
    }
    if problem.q2 > 1 {
        let t = problem.games[to].teams();
        if problem.games[from].teams().iter().any(|x| t.contains(x)) {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::fixtures::four_teams;
    use itertools::Itertools;

    /// Brute-force minimum over all pairings of the free games.
    fn brute_force(problem: &Problem, round: Round, used: u32, used_next: u32) -> i64 {
        let m = problem.n_umpires;
        let rows: Vec<usize> = (0..m)
            .filter(|s| used & (1 << s) == 0)
            .map(|s| problem.first_game(round - 1) + s)
            .collect();
        let cols: Vec<usize> = (0..m)
            .filter(|s| used_next & (1 << s) == 0)
            .map(|s| problem.first_game(round) + s)
            .collect();
        cols.iter()
            .permutations(cols.len())
            .map(|perm| {
                rows.iter()
                    .zip(perm)
                    .map(|(&g, &h)| {
                        if forbidden_pair(problem, g, h) {
                            FORBIDDEN
                        } else {
                            problem.game_dist(g, h)
                        }
                    })
                    .sum::<i64>()
            })
            .min()
            .unwrap_or(0)
    }

    #[test]
    fn matches_brute_force_on_all_masks() {
        let p = four_teams(1, 1);
        let cache = PartialMatchingCache::new();
        for round in 1..p.n_rounds {
            // Umpire 0 fixed in every combination of slots.
            for (a, b) in (0..p.n_umpires).cartesian_product(0..p.n_umpires) {
                let used = 1u32 << a;
                let used_next = 1u32 << b;
                let got = cache.bound(&p, round, 0, used, used_next);
                assert_eq!(got, brute_force(&p, round, used, used_next));
            }
        }
    }

    #[test]
    fn second_query_hits_the_cache() {
        let p = four_teams(2, 1);
        let cache = PartialMatchingCache::new();
        let first = cache.bound(&p, 1, 0, 0b01, 0b10);
        let second = cache.bound(&p, 1, 0, 0b01, 0b10);
        assert_eq!(first, second);
        assert_eq!(cache.entries.load(Relaxed), 1);
    }

    #[test]
    fn full_memo_returns_zero_uncached() {
        let p = four_teams(2, 1);
        let cache = PartialMatchingCache::with_limit(0);
        assert_eq!(cache.bound(&p, 1, 0, 0b01, 0b10), 0);
        assert_eq!(cache.entries.load(Relaxed), 0);
    }

    #[test]
    fn empty_row_set_costs_nothing() {
        let p = four_teams(2, 1);
        let cache = PartialMatchingCache::new();
        assert_eq!(cache.bound(&p, 1, 1, 0b11, 0b11), 0);
    }
}
