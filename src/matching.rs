//! Dense linear assignment solver (Hungarian algorithm, O(n^3)).
//!
//! Cost matrices here are small (one row per umpire), so a dense
//! implementation over integer costs is the right tool. Cells set to
//! [`FORBIDDEN`] are never part of a returned matching.

/// Cost of a disallowed pairing. Callers compare against this value; the
/// solver internally rescales it so potentials stay far from overflow.
pub const FORBIDDEN: i64 = i64::MAX / 4;

/// Minimum-cost perfect matching on a square cost matrix.
///
/// Returns `assignment[row] = col`, or `None` when every perfect matching
/// would use a [`FORBIDDEN`] cell.
pub fn solve_assignment(costs: &[Vec<i64>]) -> Option<Vec<usize>> {
    let n = costs.len();
    if n == 0 {
        return Some(Vec::new());
    }

    debug_assert!(costs.iter().all(|row| row.len() == n));

    // One more than any feasible total, so a matching through a forbidden
    // cell can never beat a matching that avoids them all.
    let big: i64 = costs
        .iter()
        .map(|row| row.iter().copied().filter(|&c| c < FORBIDDEN).max().unwrap_or(0))
        .sum::<i64>()
        + 1;
    let cost = |i: usize, j: usize| -> i64 {
        if costs[i][j] >= FORBIDDEN {
            big
        } else {
            costs[i][j]
        }
    };

    let inf = i64::MAX / 4;
    let mut u = vec![0i64; n + 1];
    let mut v = vec![0i64; n + 1];
    let mut p = vec![0usize; n + 1];
    let mut way = vec![0usize; n + 1];

    for i in 1..=n {
        p[0] = i;
        let mut j0 = 0usize;
        let mut minv = vec![inf; n + 1];
        let mut used = vec![false; n + 1];

        loop {
            used[j0] = true;
            let i0 = p[j0];
            let mut delta = inf;
            let mut j1 = 0usize;

            for j in 1..=n {
                if used[j] {
                    continue;
                }
                let cur = cost(i0 - 1, j - 1) - u[i0] - v[j];
                if cur < minv[j] {
                    minv[j] = cur;
                    way[j] = j0;
                }
                if minv[j] < delta {
                    delta = minv[j];
                    j1 = j;
                }
            }

            for j in 0..=n {
                if used[j] {
                    u[p[j]] += delta;
                    v[j] -= delta;
                } else {
                    minv[j] -= delta;
                }
            }

            j0 = j1;
            if p[j0] == 0 {
                break;
            }
        }

        loop {
            let j1 = way[j0];
            p[j0] = p[j1];
            j0 = j1;
            if j0 == 0 {
                break;
            }
        }
    }

    let mut assignment = vec![0usize; n];
    for j in 1..=n {
        if p[j] > 0 {
            assignment[p[j] - 1] = j - 1;
        }
    }

    if assignment
        .iter()
        .enumerate()
        .any(|(i, &j)| costs[i][j] >= FORBIDDEN)
    {
        return None;
    }
    Some(assignment)
}

/// Total cost of a matching returned by [`solve_assignment`].
pub fn assignment_cost(costs: &[Vec<i64>], assignment: &[usize]) -> i64 {
    assignment
        .iter()
        .enumerate()
        .map(|(i, &j)| costs[i][j])
        .sum()
}
