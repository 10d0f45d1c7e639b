use crate::problem::{Game, Problem};
use itertools::Itertools;
use std::sync::atomic::{AtomicI32, Ordering::Relaxed};

/// Advisory branching priorities for consecutive-round game pairs.
///
/// Lower value sorts first. Initially each edge gets its rank by pairwise
/// distance among the valid targets of the next round; edges that appear in
/// improving sub-solutions are pushed further ahead by [`EdgePriority::improve`].
/// Purely advisory: readers may see an edge mid-update and only order
/// candidates differently for one node.
pub struct EdgePriority {
    n_games: usize,
    n_umpires: i32,
    cells: Vec<AtomicI32>,
}

impl EdgePriority {
    pub fn new(problem: &Problem) -> EdgePriority {
        let n_games = problem.n_games;
        let m = problem.n_umpires;
        // Targets never ranked (same venue) sort after every ranked edge.
        let cells: Vec<AtomicI32> =
            (0..n_games * n_games).map(|_| AtomicI32::new(m as i32)).collect();

        for round in 0..problem.n_rounds - 1 {
            for from in problem.first_game(round)..problem.first_game(round) + m {
                let ranked = (problem.first_game(round + 1)..problem.first_game(round + 1) + m)
                    .filter(|&to| problem.venue(to) != problem.venue(from))
                    .sorted_by_key(|&to| problem.game_dist(from, to));
                for (rank, to) in ranked.enumerate() {
                    cells[from * n_games + to].store(rank as i32, Relaxed);
                }
            }
        }

        EdgePriority {
            n_games,
            n_umpires: m as i32,
            cells,
        }
    }

    pub fn get(&self, from: Game, to: Game) -> i32 {
        self.cells[from * self.n_games + to].load(Relaxed)
    }

    /// Promote an edge that occurred in an improving sub-solution.
    pub fn improve(&self, from: Game, to: Game) {
        self.cells[from * self.n_games + to].fetch_sub(self.n_umpires, Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::fixtures::{opponents4, four_teams};
    use crate::problem::Problem;

    #[test]
    fn initial_ranks_follow_distance() {
        // Distances chosen so that from venue 0 the closest other venue is 2.
        let dist = vec![
            vec![0, 9, 1, 5],
            vec![9, 0, 2, 4],
            vec![1, 2, 0, 3],
            vec![5, 4, 3, 0],
        ];
        let p = Problem::new(4, dist, opponents4(), 2, 1, "ranked");
        let ep = EdgePriority::new(&p);

        // Round 0: g0 = 0v3, g1 = 1v2. Round 1: g2 = 0v2, g3 = 3v1.
        // From g1 (venue 1) both next-round venues differ; venue 3 (dist 4)
        // beats venue 0 (dist 9).
        assert_eq!(ep.get(1, 3), 0);
        assert_eq!(ep.get(1, 2), 1);
        // From g0 (venue 0) the same-venue target g2 keeps the default rank.
        assert_eq!(ep.get(0, 2), p.n_umpires as i32);
        assert_eq!(ep.get(0, 3), 0);
    }

    #[test]
    fn improve_steps_down_by_umpire_count() {
        let p = four_teams(2, 1);
        let ep = EdgePriority::new(&p);
        let before = ep.get(1, 3);
        ep.improve(1, 3);
        assert_eq!(ep.get(1, 3), before - p.n_umpires as i32);
        ep.improve(1, 3);
        assert_eq!(ep.get(1, 3), before - 2 * p.n_umpires as i32);
    }
}
