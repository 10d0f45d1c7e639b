//! Steepest-descent refinement over whole-round reassignments.
//!
//! Each sweep builds an umpire-by-game cost matrix per round and solves it
//! as an assignment problem to propose a reassignment. The matrix weighs
//! violations with [`PENALTY_WEIGHT_HEURISTIC`], so it only proposes: each
//! proposal is trial-applied and scored with the exact objective, and the
//! single round with the largest exact gain is committed. Sweeps repeat
//! until no round improves, so the exact objective never increases.

use crate::matching::solve_assignment;
use crate::problem::{Game, Round};
use crate::solution::{Solution, PENALTY_WEIGHT_HEURISTIC};

pub fn steepest_descent(solution: &mut Solution) {
    let problem = solution.problem();
    let m = problem.n_umpires;

    loop {
        let current = solution.objective();
        let mut best: Option<(Round, Vec<usize>, i64)> = None;
        for round in solution.first_round()..=solution.last_round() {
            let matrix = move_matrix(solution, round);
            // The matrix has no forbidden cells, so a matching always exists.
            let assignment = match solve_assignment(&matrix) {
                Some(a) => a,
                None => continue,
            };
            // Trial-apply the proposed round; the exact objective decides.
            let saved: Vec<Game> = (0..m).map(|u| solution.get(round, u)).collect();
            for (umpire, &slot) in assignment.iter().enumerate() {
                solution.set(round, umpire, problem.first_game(round) + slot);
            }
            let gain = current - solution.objective();
            for (umpire, &game) in saved.iter().enumerate() {
                solution.set(round, umpire, game);
            }
            if gain > 0 && best.as_ref().map_or(true, |&(_, _, g)| gain > g) {
                best = Some((round, assignment, gain));
            }
        }

        match best {
            Some((round, assignment, _)) => {
                for (umpire, &slot) in assignment.iter().enumerate() {
                    solution.set(round, umpire, problem.first_game(round) + slot);
                }
            }
            None => return,
        }
    }
}

/// Cost of giving each umpire (row) each game of `round` (column), with the
/// current assignments in place.
///
/// The violation terms read the occurrence tables with a threshold: for the
/// umpire's current game the table already contains this round's
/// contribution, so a repeat shows as a count of 2; for any other game the
/// venue and teams differ from the current ones (a round is a perfect
/// matching on teams), so a count of 1 already means the move would create a
/// repeat.
fn move_matrix(solution: &Solution, round: Round) -> Vec<Vec<i64>> {
    let problem = solution.problem();
    let m = problem.n_umpires;
    let first = solution.first_round();
    let last = solution.last_round();

    (0..m)
        .map(|umpire| {
            let current = solution.get(round, umpire);
            let prev = if round > first {
                Some(solution.get(round - 1, umpire))
            } else {
                None
            };
            let next = if round < last {
                Some(solution.get(round + 1, umpire))
            } else {
                None
            };

            (problem.first_game(round)..problem.first_game(round) + m)
                .map(|game| {
                    let mut dist = 0;
                    if let Some(p) = prev {
                        dist += problem.game_dist(p, game);
                    }
                    if let Some(n) = next {
                        dist += problem.game_dist(game, n);
                    }

                    let threshold = if game == current { 2 } else { 1 };
                    let venue = problem.venue(game);
                    let mut violations = 0i64;
                    for slot in round..(round + problem.q1).min(last + 1) {
                        if solution.home_seen(slot, umpire, venue) >= threshold {
                            violations += 1;
                        }
                    }
                    for team in problem.games[game].teams() {
                        for slot in round..(round + problem.q2).min(last + 1) {
                            if solution.team_seen(slot, umpire, team) >= threshold {
                                violations += 1;
                            }
                        }
                    }
                    if solution.counts_unvisited() {
                        // Credit a game whose venue this umpire would
                        // otherwise never visit.
                        let unique = if game == current { 1 } else { 0 };
                        if solution.visit_count(umpire, venue) == unique {
                            violations -= 1;
                        }
                    }

                    dist + PENALTY_WEIGHT_HEURISTIC * violations
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::fixtures::opponents4;
    use crate::problem::Problem;

    fn fill_identity(solution: &mut Solution) {
        let p = solution.problem();
        for round in solution.first_round()..=solution.last_round() {
            for umpire in 0..p.n_umpires {
                solution.set(round, umpire, p.first_game(round) + umpire);
            }
        }
    }

    #[test]
    fn descent_never_worsens_the_matrix_cost() {
        let dist = vec![
            vec![0, 10, 2, 8],
            vec![10, 0, 7, 3],
            vec![2, 7, 0, 9],
            vec![8, 3, 9, 0],
        ];
        let p = Problem::new(4, dist, opponents4(), 1, 1, "descent");
        let mut s = Solution::full(&p);
        fill_identity(&mut s);

        let before = s.objective();
        steepest_descent(&mut s);
        assert!(s.objective() <= before);
        assert_eq!(s.objective(), s.recomputed_objective());
    }

    #[test]
    fn descent_repairs_venue_coverage() {
        // The identity fill leaves each umpire one venue short, which the
        // unique-visit credit in the move matrix repairs.
        let dist = vec![
            vec![0, 100, 1, 100],
            vec![100, 0, 100, 1],
            vec![1, 100, 0, 100],
            vec![100, 1, 100, 0],
        ];
        let p = Problem::new(4, dist, opponents4(), 1, 1, "descent2");
        let mut s = Solution::full(&p);
        fill_identity(&mut s);
        let before = s.objective();
        assert!(s.violations() > 0);

        steepest_descent(&mut s);
        assert!(s.objective() < before);
        assert_eq!(s.objective(), s.recomputed_objective());
    }

    #[test]
    fn descent_never_worsens_the_exact_objective() {
        // The 0-2 leg is so long that the heuristic matrix happily trades it
        // for a window violation (1,000 per violation in the matrix versus
        // 100,000 in the exact objective). Acceptance must veto such moves.
        let dist = vec![
            vec![0, 10, 3000, 10],
            vec![10, 0, 10, 10],
            vec![3000, 10, 0, 10],
            vec![10, 10, 10, 0],
        ];
        let p = Problem::new(4, dist, opponents4(), 2, 1, "descent4");
        let mut s = Solution::full(&p);
        fill_identity(&mut s);
        let before = s.objective();
        steepest_descent(&mut s);
        assert!(s.objective() <= before);
        assert_eq!(s.objective(), s.recomputed_objective());
    }

    #[test]
    fn descent_terminates_on_a_window() {
        let p = Problem::new(
            4,
            crate::problem::fixtures::ones_dist(4),
            opponents4(),
            2,
            2,
            "descent3",
        );
        let mut s = Solution::windowed(&p, 1, 4);
        fill_identity(&mut s);
        let before = s.objective();
        steepest_descent(&mut s);
        assert!(s.objective() <= before);
    }
}
