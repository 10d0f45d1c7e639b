use crate::problem::{Game, Problem, Round, Team, UNASSIGNED};

/// Weight of one constraint violation in the exact objective.
pub const PENALTY_WEIGHT: i64 = 100_000;
/// Weight used inside local-search cost matrices. Deliberately smaller so the
/// refinement step trades violations against distance more willingly.
pub const PENALTY_WEIGHT_HEURISTIC: i64 = 1_000;

/// An umpire assignment over a range of rounds, with all cost aggregates
/// maintained incrementally.
///
/// `Solution::full` covers the whole tournament and counts unvisited venues;
/// `Solution::windowed` covers `[first_round, last_round]` and drops that
/// term (a window cannot know which venues are visited outside it). Every
/// `set` updates travel distance, per-umpire distance, visit counts and the
/// q1/q2 sliding-window occurrence tables in O(q1 + q2), and every update is
/// reversed exactly by re-setting the previous value.
#[derive(Clone)]
pub struct Solution<'a> {
    problem: &'a Problem,
    first_round: Round,
    last_round: Round,
    count_unvisited: bool,

    assignment: Vec<Vec<Game>>,

    travel: i64,
    umpire_distance: Vec<i64>,

    /// `[umpire][team]` -> number of home games of `team` officiated.
    visits: Vec<Vec<u32>>,
    /// Umpire-team pairs with zero visits (full horizon only).
    unvisited: i64,

    /// `[slot][umpire][team]` -> occurrences of venue `team` for `umpire`
    /// within the q1 window ending at `slot`.
    home_seen: Vec<Vec<Vec<u8>>>,
    home_violations: i64,
    /// Same shape for the q2 window, counting both teams of each game.
    team_seen: Vec<Vec<Vec<u8>>>,
    team_violations: i64,
}

impl<'a> Solution<'a> {
    pub fn full(problem: &'a Problem) -> Solution<'a> {
        Solution::windowed_impl(problem, 0, problem.n_rounds - 1, true)
    }

    pub fn windowed(problem: &'a Problem, first_round: Round, last_round: Round) -> Solution<'a> {
        Solution::windowed_impl(problem, first_round, last_round, false)
    }

    fn windowed_impl(
        problem: &'a Problem,
        first_round: Round,
        last_round: Round,
        count_unvisited: bool,
    ) -> Solution<'a> {
        debug_assert!(first_round <= last_round && last_round < problem.n_rounds);
        let n_rounds = problem.n_rounds;
        let m = problem.n_umpires;
        let n = problem.n_teams;
        Solution {
            problem,
            first_round,
            last_round,
            count_unvisited,
            assignment: vec![vec![UNASSIGNED; m]; n_rounds],
            travel: 0,
            umpire_distance: vec![0; m],
            visits: vec![vec![0; n]; m],
            unvisited: if count_unvisited { (m * n) as i64 } else { 0 },
            home_seen: vec![vec![vec![0; n]; m]; n_rounds],
            home_violations: 0,
            team_seen: vec![vec![vec![0; n]; m]; n_rounds],
            team_violations: 0,
        }
    }

    pub fn problem(&self) -> &'a Problem {
        self.problem
    }

    pub fn first_round(&self) -> Round {
        self.first_round
    }

    pub fn last_round(&self) -> Round {
        self.last_round
    }

    /// Whether the unvisited-venue term is part of the objective.
    pub fn counts_unvisited(&self) -> bool {
        self.count_unvisited
    }

    pub fn get(&self, round: Round, umpire: usize) -> Game {
        self.assignment[round][umpire]
    }

    pub fn travel(&self) -> i64 {
        self.travel
    }

    pub fn umpire_distance(&self, umpire: usize) -> i64 {
        self.umpire_distance[umpire]
    }

    pub fn visit_count(&self, umpire: usize, team: Team) -> u32 {
        self.visits[umpire][team]
    }

    pub fn home_seen(&self, slot: Round, umpire: usize, team: Team) -> u8 {
        self.home_seen[slot][umpire][team]
    }

    pub fn team_seen(&self, slot: Round, umpire: usize, team: Team) -> u8 {
        self.team_seen[slot][umpire][team]
    }

    pub fn violations(&self) -> i64 {
        self.home_violations + self.team_violations + if self.count_unvisited { self.unvisited } else { 0 }
    }

    /// Travel distance plus weighted violations. O(1): the aggregates are
    /// kept current by every `set`.
    pub fn objective(&self) -> i64 {
        self.travel + PENALTY_WEIGHT * self.violations()
    }

    /// Assign `game` (or `UNASSIGNED` to clear) to `umpire` in `round`,
    /// adjusting all aggregates.
    pub fn set(&mut self, round: Round, umpire: usize, game: Game) {
        debug_assert!(round >= self.first_round && round <= self.last_round);
        let old = self.assignment[round][umpire];
        if old == game {
            return;
        }
        if old != UNASSIGNED {
            self.remove(round, umpire, old);
        }
        self.assignment[round][umpire] = game;
        if game != UNASSIGNED {
            self.add(round, umpire, game);
        }
    }

    fn neighbor_games(&self, round: Round, umpire: usize) -> (Game, Game) {
        let prev = if round > self.first_round {
            self.assignment[round - 1][umpire]
        } else {
            UNASSIGNED
        };
        let next = if round < self.last_round {
            self.assignment[round + 1][umpire]
        } else {
            UNASSIGNED
        };
        (prev, next)
    }

    fn remove(&mut self, round: Round, umpire: usize, game: Game) {
        let p = self.problem;
        let (prev, next) = self.neighbor_games(round, umpire);
        let mut delta = 0;
        if prev != UNASSIGNED {
            delta -= p.game_dist(prev, game);
        }
        if next != UNASSIGNED {
            delta -= p.game_dist(game, next);
        }
        if prev != UNASSIGNED && next != UNASSIGNED {
            delta += p.game_dist(prev, next);
        }
        self.travel += delta;
        self.umpire_distance[umpire] += delta;

        let venue = p.venue(game);
        self.visits[umpire][venue] -= 1;
        if self.count_unvisited && self.visits[umpire][venue] == 0 {
            self.unvisited += 1;
        }

        for slot in round..(round + p.q1).min(self.last_round + 1) {
            let seen = &mut self.home_seen[slot][umpire][venue];
            *seen -= 1;
            if *seen == 1 {
                self.home_violations -= 1;
            }
        }
        for team in p.games[game].teams() {
            for slot in round..(round + p.q2).min(self.last_round + 1) {
                let seen = &mut self.team_seen[slot][umpire][team];
                *seen -= 1;
                if *seen == 1 {
                    self.team_violations -= 1;
                }
            }
        }
    }

    fn add(&mut self, round: Round, umpire: usize, game: Game) {
        let p = self.problem;
        let (prev, next) = self.neighbor_games(round, umpire);
        let mut delta = 0;
        if prev != UNASSIGNED {
            delta += p.game_dist(prev, game);
        }
        if next != UNASSIGNED {
            delta += p.game_dist(game, next);
        }
        if prev != UNASSIGNED && next != UNASSIGNED {
            delta -= p.game_dist(prev, next);
        }
        self.travel += delta;
        self.umpire_distance[umpire] += delta;

        let venue = p.venue(game);
        if self.count_unvisited && self.visits[umpire][venue] == 0 {
            self.unvisited -= 1;
        }
        self.visits[umpire][venue] += 1;

        for slot in round..(round + p.q1).min(self.last_round + 1) {
            let seen = &mut self.home_seen[slot][umpire][venue];
            *seen += 1;
            if *seen == 2 {
                self.home_violations += 1;
            }
        }
        for team in p.games[game].teams() {
            for slot in round..(round + p.q2).min(self.last_round + 1) {
                let seen = &mut self.team_seen[slot][umpire][team];
                *seen += 1;
                if *seen == 2 {
                    self.team_violations += 1;
                }
            }
        }
    }

    /// All window cells assigned, each game exactly once per round, and no
    /// violations.
    pub fn is_feasible(&self) -> bool {
        for round in self.first_round..=self.last_round {
            let row = &self.assignment[round];
            if row.iter().any(|&g| g == UNASSIGNED) {
                return false;
            }
            for (i, &g) in row.iter().enumerate() {
                if self.problem.game_round[g] != round || row[..i].contains(&g) {
                    return false;
                }
            }
        }
        self.violations() == 0
    }

    /// Recompute the objective from the assignment alone. Used to cross-check
    /// the incremental aggregates.
    pub fn recomputed_objective(&self) -> i64 {
        let p = self.problem;
        let mut travel = 0;
        for umpire in 0..p.n_umpires {
            for round in self.first_round..self.last_round {
                let a = self.assignment[round][umpire];
                let b = self.assignment[round + 1][umpire];
                if a != UNASSIGNED && b != UNASSIGNED {
                    travel += p.game_dist(a, b);
                }
            }
        }

        let mut violations = 0;
        for umpire in 0..p.n_umpires {
            if self.count_unvisited {
                for team in 0..p.n_teams {
                    let visited = (self.first_round..=self.last_round).any(|r| {
                        let g = self.assignment[r][umpire];
                        g != UNASSIGNED && p.venue(g) == team
                    });
                    if !visited {
                        violations += 1;
                    }
                }
            }
            // Pairs of assignments too close together in the q1/q2 windows,
            // counted per window slot like the incremental tables do.
            for slot in self.first_round..=self.last_round {
                for team in 0..p.n_teams {
                    let home = (slot.saturating_sub(p.q1 - 1).max(self.first_round)..=slot)
                        .filter(|&r| {
                            let g = self.assignment[r][umpire];
                            g != UNASSIGNED && p.venue(g) == team
                        })
                        .count();
                    if home >= 2 {
                        violations += 1;
                    }
                    let seen = (slot.saturating_sub(p.q2 - 1).max(self.first_round)..=slot)
                        .filter(|&r| {
                            let g = self.assignment[r][umpire];
                            g != UNASSIGNED && p.games[g].teams().contains(&team)
                        })
                        .count();
                    if seen >= 2 {
                        violations += 1;
                    }
                }
            }
        }
        travel + PENALTY_WEIGHT * violations
    }
}
