use crate::problem::{Game, Problem, Round, Team, UNASSIGNED};
use crate::solution::Solution;

/// DFS-local state of the full-problem search: game-to-umpire coloring with
/// incremental travel cost and per-umpire venue-visit counts (the all-venues
/// feasibility cut needs the distinct-visit count).
///
/// Cheap to clone: forked subtrees take a copy and never touch the parent.
#[derive(Clone)]
pub struct BranchState {
    /// `[game]` -> umpire.
    pub assigned: Vec<usize>,
    /// `[umpire][round]` -> game.
    pub games: Vec<Vec<Game>>,
    pub cost: i64,
    visits: Vec<Vec<u32>>,
    visited_count: Vec<usize>,
}

impl BranchState {
    /// Empty state with round 0 fixed to the identity assignment. Umpire
    /// identities are interchangeable, so pinning the first round discards
    /// only mirror solutions.
    pub fn new(problem: &Problem) -> BranchState {
        let m = problem.n_umpires;
        let mut state = BranchState {
            assigned: vec![UNASSIGNED; problem.n_games],
            games: vec![vec![UNASSIGNED; problem.n_rounds]; m],
            cost: 0,
            visits: vec![vec![0; problem.n_teams]; m],
            visited_count: vec![0; m],
        };
        for umpire in 0..m {
            state.assign(problem, umpire, umpire);
        }
        state
    }

    pub fn assign(&mut self, problem: &Problem, game: Game, umpire: usize) {
        debug_assert_eq!(self.assigned[game], UNASSIGNED);
        let round = problem.game_round[game];
        if round > 0 {
            self.cost += problem.game_dist(self.games[umpire][round - 1], game);
        }
        self.assigned[game] = umpire;
        self.games[umpire][round] = game;

        let venue = problem.venue(game);
        if self.visits[umpire][venue] == 0 {
            self.visited_count[umpire] += 1;
        }
        self.visits[umpire][venue] += 1;
    }

    pub fn unassign(&mut self, problem: &Problem, game: Game) {
        let umpire = self.assigned[game];
        debug_assert_ne!(umpire, UNASSIGNED);
        let round = problem.game_round[game];
        if round > 0 {
            self.cost -= problem.game_dist(self.games[umpire][round - 1], game);
        }
        self.assigned[game] = UNASSIGNED;
        self.games[umpire][round] = UNASSIGNED;

        let venue = problem.venue(game);
        self.visits[umpire][venue] -= 1;
        if self.visits[umpire][venue] == 0 {
            self.visited_count[umpire] -= 1;
        }
    }

    /// Number of distinct venues `umpire` has visited so far.
    pub fn visited(&self, umpire: usize) -> usize {
        self.visited_count[umpire]
    }

    pub fn has_visited(&self, umpire: usize, venue: Team) -> bool {
        self.visits[umpire][venue] > 0
    }

    pub fn used_masks(&self, problem: &Problem, round: Round, upto_umpire: usize) -> (u32, u32) {
        used_masks(&self.games, problem, round, upto_umpire)
    }

    /// Expand a complete coloring into a full [`Solution`].
    pub fn to_solution<'a>(&self, problem: &'a Problem) -> Solution<'a> {
        let mut solution = Solution::full(problem);
        for (umpire, games) in self.games.iter().enumerate() {
            for (round, &game) in games.iter().enumerate() {
                debug_assert_ne!(game, UNASSIGNED);
                solution.set(round, umpire, game);
            }
        }
        solution
    }
}

/// Branch state of a windowed sub-search over `[first_round, last_round]`.
/// Same coloring discipline as [`BranchState`] without venue tracking: a
/// window does not carry the all-venues constraint.
#[derive(Clone)]
pub struct WindowBranchState {
    pub assigned: Vec<usize>,
    pub games: Vec<Vec<Game>>,
    pub cost: i64,
    pub first_round: Round,
    pub last_round: Round,
}

impl WindowBranchState {
    pub fn new(problem: &Problem, first_round: Round, last_round: Round) -> WindowBranchState {
        debug_assert!(first_round < last_round && last_round < problem.n_rounds);
        let m = problem.n_umpires;
        let mut state = WindowBranchState {
            assigned: vec![UNASSIGNED; problem.n_games],
            games: vec![vec![UNASSIGNED; problem.n_rounds]; m],
            cost: 0,
            first_round,
            last_round,
        };
        for umpire in 0..m {
            state.assign(problem, problem.first_game(first_round) + umpire, umpire);
        }
        state
    }

    pub fn assign(&mut self, problem: &Problem, game: Game, umpire: usize) {
        debug_assert_eq!(self.assigned[game], UNASSIGNED);
        let round = problem.game_round[game];
        if round > self.first_round {
            self.cost += problem.game_dist(self.games[umpire][round - 1], game);
        }
        self.assigned[game] = umpire;
        self.games[umpire][round] = game;
    }

    pub fn unassign(&mut self, problem: &Problem, game: Game) {
        let umpire = self.assigned[game];
        debug_assert_ne!(umpire, UNASSIGNED);
        let round = problem.game_round[game];
        if round > self.first_round {
            self.cost -= problem.game_dist(self.games[umpire][round - 1], game);
        }
        self.assigned[game] = UNASSIGNED;
        self.games[umpire][round] = UNASSIGNED;
    }

    pub fn used_masks(&self, problem: &Problem, round: Round, upto_umpire: usize) -> (u32, u32) {
        used_masks(&self.games, problem, round, upto_umpire)
    }

    pub fn to_solution<'a>(&self, problem: &'a Problem) -> Solution<'a> {
        let mut solution = Solution::windowed(problem, self.first_round, self.last_round);
        for (umpire, games) in self.games.iter().enumerate() {
            for round in self.first_round..=self.last_round {
                debug_assert_ne!(games[round], UNASSIGNED);
                solution.set(round, umpire, games[round]);
            }
        }
        solution
    }
}

/// Slot masks of the `round - 1` and `round` games held by umpires
/// `0..=upto_umpire`, for the partial-matching memo key.
fn used_masks(
    games: &[Vec<Game>],
    problem: &Problem,
    round: Round,
    upto_umpire: usize,
) -> (u32, u32) {
    debug_assert!(round >= 1);
    let mut used = 0;
    let mut used_next = 0;
    for colored in games.iter().take(upto_umpire + 1) {
        used |= 1 << problem.slot(colored[round - 1]);
        used_next |= 1 << problem.slot(colored[round]);
    }
    (used, used_next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::fixtures::four_teams;

    #[test]
    fn first_round_is_pinned_to_identity() {
        let p = four_teams(2, 1);
        let s = BranchState::new(&p);
        for umpire in 0..p.n_umpires {
            assert_eq!(s.games[umpire][0], umpire);
            assert_eq!(s.assigned[umpire], umpire);
        }
        assert_eq!(s.cost, 0);
    }

    #[test]
    fn assign_unassign_restores_everything() {
        let p = four_teams(2, 1);
        let mut s = BranchState::new(&p);
        let baseline_cost = s.cost;
        let baseline_visited: Vec<usize> = (0..p.n_umpires).map(|u| s.visited(u)).collect();

        let game = p.first_game(1);
        s.assign(&p, game, 0);
        assert_eq!(s.assigned[game], 0);
        assert_eq!(s.cost, p.game_dist(0, game));

        s.unassign(&p, game);
        assert_eq!(s.assigned[game], UNASSIGNED);
        assert_eq!(s.cost, baseline_cost);
        let visited: Vec<usize> = (0..p.n_umpires).map(|u| s.visited(u)).collect();
        assert_eq!(visited, baseline_visited);
    }

    #[test]
    fn clone_is_independent() {
        let p = four_teams(2, 1);
        let mut a = BranchState::new(&p);
        let b = a.clone();
        a.assign(&p, p.first_game(1), 0);
        assert_eq!(b.assigned[p.first_game(1)], UNASSIGNED);
        assert_ne!(a.cost, b.cost);
    }

    #[test]
    fn window_cost_ignores_rounds_before_the_window() {
        let p = four_teams(2, 1);
        let mut s = WindowBranchState::new(&p, 2, 4);
        // First window round is pinned and costs nothing.
        assert_eq!(s.cost, 0);
        let game = p.first_game(3);
        s.assign(&p, game, 0);
        assert_eq!(s.cost, p.game_dist(p.first_game(2), game));
        s.unassign(&p, game);
        assert_eq!(s.cost, 0);
    }

    #[test]
    fn used_masks_cover_colored_umpires_only() {
        let p = four_teams(2, 1);
        let mut s = BranchState::new(&p);
        s.assign(&p, p.first_game(1) + 1, 0);
        let (used, used_next) = s.used_masks(&p, 1, 0);
        assert_eq!(used, 0b01);
        assert_eq!(used_next, 0b10);
    }

    #[test]
    fn complete_state_expands_to_feasible_solution() {
        let p = four_teams(1, 1);
        let mut s = BranchState::new(&p);
        // Slot choices for umpire 0 that make both umpires visit all four
        // venues; umpire 1 takes the complement.
        let slots0 = [0, 1, 1, 0, 0, 0];
        for round in 1..p.n_rounds {
            s.assign(&p, p.first_game(round) + slots0[round], 0);
            s.assign(&p, p.first_game(round) + 1 - slots0[round], 1);
        }
        let solution = s.to_solution(&p);
        assert!(solution.is_feasible());
        assert_eq!(solution.travel(), s.cost);
    }
}
