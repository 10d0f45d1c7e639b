use itertools::Itertools;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use crate::bnb::search::BestAssignment;
use crate::problem::Problem;

/// Reads an instance in the `umps*.txt` format: `nTeams=N;`, a `dist`
/// matrix of N rows and an `opponents` matrix of 2N-2 rows, in brackets.
///
/// The window lengths q1/q2 are solver parameters, not part of the file.
pub fn read_problem<P: AsRef<Path>>(path: P, q1: usize, q2: usize) -> Problem {
    let path = path.as_ref();
    let text = fs::read_to_string(path)
        .unwrap_or_else(|_| panic!("Cannot open: {}", path.display()));
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("instance")
        .to_string();

    // Brackets, semicolons and '=' only delimit; whitespace-split the rest.
    let cleaned: String = text
        .chars()
        .map(|c| if matches!(c, '[' | ']' | ';' | '=') { ' ' } else { c })
        .collect();
    let mut tokens = cleaned.split_whitespace();

    let mut n_teams = None;
    let mut dist = None;
    let mut opponents = None;

    fn next_int(tokens: &mut std::str::SplitWhitespace, what: &str, path: &Path) -> i64 {
        tokens
            .next()
            .and_then(|t| t.parse().ok())
            .unwrap_or_else(|| panic!("Cannot parse {} in '{}'", what, path.display()))
    }

    while let Some(token) = tokens.next() {
        match token {
            "nTeams" => n_teams = Some(next_int(&mut tokens, "nTeams", path) as usize),
            "dist" => {
                let n = n_teams
                    .unwrap_or_else(|| panic!("'{}': dist before nTeams", path.display()));
                dist = Some(
                    (0..n)
                        .map(|_| (0..n).map(|_| next_int(&mut tokens, "dist", path)).collect())
                        .collect::<Vec<Vec<i64>>>(),
                );
            }
            "opponents" => {
                let n = n_teams
                    .unwrap_or_else(|| panic!("'{}': opponents before nTeams", path.display()));
                opponents = Some(
                    (0..2 * n - 2)
                        .map(|_| {
                            (0..n)
                                .map(|_| next_int(&mut tokens, "opponents", path) as i32)
                                .collect()
                        })
                        .collect::<Vec<Vec<i32>>>(),
                );
            }
            other => panic!("Unexpected token '{}' in '{}'", other, path.display()),
        }
    }

    let n_teams =
        n_teams.unwrap_or_else(|| panic!("'{}' does not define nTeams", path.display()));
    let dist = dist.unwrap_or_else(|| panic!("'{}' does not define dist", path.display()));
    let opponents =
        opponents.unwrap_or_else(|| panic!("'{}' does not define opponents", path.display()));
    Problem::new(n_teams, dist, opponents, q1, q2, name)
}

/// Per-game umpire numbers (1-based), in game id order.
fn umpires_by_game(problem: &Problem, best: &BestAssignment) -> Vec<usize> {
    let mut by_game = vec![0; problem.n_games];
    for row in &best.assignment {
        for (umpire, &game) in row.iter().enumerate() {
            by_game[game] = umpire + 1;
        }
    }
    by_game
}

/// Human-readable round-by-round table of venues per umpire.
pub fn render_solution(problem: &Problem, best: &BestAssignment) -> String {
    let mut out = String::new();
    out.push_str("round");
    for umpire in 0..problem.n_umpires {
        out.push_str(&format!("{:>9}", format!("ump{}", umpire + 1)));
    }
    out.push('\n');
    for (round, row) in best.assignment.iter().enumerate() {
        out.push_str(&format!("{:>5}", round + 1));
        for &game in row {
            let g = &problem.games[game];
            out.push_str(&format!("{:>9}", format!("{}-{}", g.home + 1, g.away + 1)));
        }
        out.push('\n');
    }
    out
}

/// Writes the assignment line (`u1,u2,...,` over game ids), a `---`
/// separator and the rendered table.
pub fn write_solution<P: AsRef<Path>>(path: P, problem: &Problem, best: &BestAssignment) {
    let path = path.as_ref();
    let mut file = File::create(path)
        .unwrap_or_else(|_| panic!("Cannot create: {}", path.display()));
    let line = umpires_by_game(problem, best)
        .iter()
        .map(|u| u.to_string())
        .join(",");
    writeln!(file, "{},", line)
        .and_then(|_| writeln!(file, "---"))
        .and_then(|_| write!(file, "{}", render_solution(problem, best)))
        .unwrap_or_else(|_| panic!("Cannot write: {}", path.display()));
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Result;

    const INSTANCE: &str = r#"
nTeams=4;

dist= [0 745 665 929
 745 0 80 337
 665 80 0 380
 929 337 380 0];

opponents=[ 4 3 -2 -1
 3 -4 -1 2
 2 -1 4 -3
 -4 -3 2 1
 -3 4 1 -2
 -2 1 -4 3];
"#;

    #[test]
    fn reads_a_full_instance() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("umps4.txt");
        fs::write(&path, INSTANCE)?;

        let p = read_problem(&path, 2, 1);
        assert_eq!(p.name, "umps4");
        assert_eq!(p.n_teams, 4);
        assert_eq!(p.n_rounds, 6);
        assert_eq!(p.dist[0][1], 745);
        assert_eq!(p.dist[3][2], 380);
        assert_eq!(p.opponents[0], vec![4, 3, -2, -1]);
        assert_eq!(p.opponents[5], vec![-2, 1, -4, 3]);
        Ok(())
    }

    #[test]
    #[should_panic(expected = "does not define nTeams")]
    fn rejects_instance_without_team_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.txt");
        fs::write(&path, "dist=[0];").unwrap();
        read_problem(&path, 2, 1);
    }

    #[test]
    fn writes_assignment_line_and_table() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let instance = dir.path().join("umps4.txt");
        fs::write(&instance, INSTANCE)?;
        let p = read_problem(&instance, 1, 1);

        // Identity assignment: umpire u takes slot u every round.
        let assignment = (0..p.n_rounds)
            .map(|r| (0..p.n_umpires).map(|u| p.first_game(r) + u).collect())
            .collect();
        let best = BestAssignment { cost: 0, assignment };

        let out = dir.path().join("umps4_solution.txt");
        write_solution(&out, &p, &best);
        let text = fs::read_to_string(&out)?;
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("1,2,1,2,1,2,1,2,1,2,1,2,"));
        assert_eq!(lines.next(), Some("---"));
        assert!(lines.next().unwrap().starts_with("round"));
        Ok(())
    }
}
