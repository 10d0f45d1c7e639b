use fixedbitset::FixedBitSet;
use itertools::Itertools;
use std::fmt;

pub type Team = usize;
pub type Game = usize;
pub type Round = usize;

/// Marks an empty cell in assignment and branch-state tables.
pub const UNASSIGNED: usize = usize::MAX;

/// An ordered (home, away) pair of teams scheduled in some round.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Matchup {
    pub home: Team,
    pub away: Team,
}

impl Matchup {
    pub fn teams(&self) -> [Team; 2] {
        [self.home, self.away]
    }
}

/// A double round-robin tournament instance for the Traveling Umpire Problem.
///
/// All derived tables are computed once in [`Problem::new`]; nothing is
/// mutated afterwards. Teams, games and rounds are 0-based indices. The raw
/// `opponents` matrix keeps the input encoding (1-based, positive = plays at
/// home against that team, negative = plays away).
pub struct Problem {
    pub name: String,
    pub q1: usize,
    pub q2: usize,

    pub n_teams: usize,
    pub n_umpires: usize,
    pub n_rounds: usize,
    pub n_games: usize,

    pub dist: Vec<Vec<i64>>,
    pub opponents: Vec<Vec<i32>>,

    pub games: Vec<Matchup>,
    pub game_round: Vec<Round>,
    /// Game-to-game distance: distance between the two home venues.
    pub dist_games: Vec<Vec<i64>>,

    /// `[round][team]` -> game in which `team` plays at home, if any.
    home_game: Vec<Vec<Option<Game>>>,
    /// `[round][team]` -> the game `team` is involved in (every team plays
    /// every round of a double round-robin).
    team_game: Vec<Vec<Game>>,

    /// `[round]` -> set of venues that can still be visited at `round` or
    /// later. Used by the all-venues feasibility cut of the full search.
    pub possible_visits: Vec<FixedBitSet>,

    /// Total distance traveled by the teams themselves; reported for context.
    pub team_travel_distance: i64,
}

impl Problem {
    pub fn new(
        n_teams: usize,
        dist: Vec<Vec<i64>>,
        opponents: Vec<Vec<i32>>,
        q1: usize,
        q2: usize,
        name: impl Into<String>,
    ) -> Problem {
        assert!(n_teams >= 4 && n_teams % 2 == 0, "nTeams must be even and >= 4");
        assert!(q1 >= 1 && q2 >= 1, "q1 and q2 must be at least 1");

        let n_umpires = n_teams / 2;
        let n_rounds = 2 * n_teams - 2;
        let n_games = n_rounds * n_umpires;

        assert_eq!(dist.len(), n_teams, "distance matrix must be {n_teams}x{n_teams}");
        assert!(dist.iter().all(|row| row.len() == n_teams));
        assert_eq!(opponents.len(), n_rounds, "opponents must have {n_rounds} rounds");
        assert!(opponents.iter().all(|row| row.len() == n_teams));

        let mut games = Vec::with_capacity(n_games);
        let mut game_round = Vec::with_capacity(n_games);
        let mut home_game = vec![vec![None; n_teams]; n_rounds];
        let mut team_game = vec![vec![0; n_teams]; n_rounds];

        // Games are numbered round by round, by ascending home team, so that
        // games of round r occupy ids r*m..(r+1)*m.
        for (round, row) in opponents.iter().enumerate() {
            let mut in_round = 0;
            for (team, &opp) in row.iter().enumerate() {
                if opp > 0 {
                    let away = (opp - 1) as Team;
                    assert!(
                        away < n_teams && opponents[round][away] == -(team as i32 + 1),
                        "opponents matrix is not symmetric at round {round}, team {}",
                        team + 1
                    );
                    home_game[round][team] = Some(games.len());
                    games.push(Matchup { home: team, away });
                    game_round.push(round);
                    in_round += 1;
                }
            }
            assert_eq!(
                in_round, n_umpires,
                "round {round} must contain exactly {n_umpires} home games"
            );
        }

        for round in 0..n_rounds {
            for team in 0..n_teams {
                let opp = opponents[round][team];
                team_game[round][team] = if opp > 0 {
                    home_game[round][team].unwrap()
                } else {
                    home_game[round][(-opp - 1) as Team].unwrap()
                };
            }
        }

        let mut dist_games = vec![vec![0; n_games]; n_games];
        for (i, j) in (0..n_games).cartesian_product(0..n_games) {
            dist_games[i][j] = dist[games[i].home][games[j].home];
        }

        // A venue is reachable at round r if some team plays at home there in
        // r or any later round.
        let mut possible_visits = vec![FixedBitSet::with_capacity(n_teams); n_rounds];
        for round in (0..n_rounds).rev() {
            for team in 0..n_teams {
                if opponents[round][team] > 0
                    || (round + 1 < n_rounds && possible_visits[round + 1][team])
                {
                    possible_visits[round].insert(team);
                }
            }
        }

        let team_travel_distance = calculate_team_travel(&dist, &opponents);

        Problem {
            name: name.into(),
            q1,
            q2,
            n_teams,
            n_umpires,
            n_rounds,
            n_games,
            dist,
            opponents,
            games,
            game_round,
            dist_games,
            home_game,
            team_game,
            possible_visits,
            team_travel_distance,
        }
    }

    /// The venue (home team) of a game.
    pub fn venue(&self, game: Game) -> Team {
        self.games[game].home
    }

    /// In-round slot of a game (0..n_umpires).
    pub fn slot(&self, game: Game) -> usize {
        game % self.n_umpires
    }

    /// First game id of a round.
    pub fn first_game(&self, round: Round) -> Game {
        round * self.n_umpires
    }

    /// Game in which `team` plays at home in `round`, if any.
    pub fn home_game(&self, round: Round, team: Team) -> Option<Game> {
        self.home_game[round][team]
    }

    /// Game in which `team` is involved in `round`.
    pub fn game_of_team(&self, round: Round, team: Team) -> Game {
        self.team_game[round][team]
    }

    pub fn game_dist(&self, from: Game, to: Game) -> i64 {
        self.dist_games[from][to]
    }
}

impl fmt::Debug for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Problem")
            .field("name", &self.name)
            .field("n_teams", &self.n_teams)
            .field("n_umpires", &self.n_umpires)
            .field("n_rounds", &self.n_rounds)
            .field("n_games", &self.n_games)
            .field("q1", &self.q1)
            .field("q2", &self.q2)
            .finish()
    }
}

fn calculate_team_travel(dist: &[Vec<i64>], opponents: &[Vec<i32>]) -> i64 {
    let n_teams = dist.len();
    let mut total = 0;
    for team in 0..n_teams {
        let mut loc = team;
        for row in opponents {
            let opp = row[team];
            if opp < 0 {
                let to = (-opp - 1) as usize;
                total += dist[loc][to];
                loc = to;
            } else if loc != team {
                total += dist[loc][team];
                loc = team;
            }
        }
        if loc != team {
            total += dist[loc][team];
        }
    }
    total
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// A 4-team double round-robin built with the circle method: rounds 0..2
    /// and their venue-swapped mirror in rounds 3..5.
    pub fn opponents4() -> Vec<Vec<i32>> {
        vec![
            vec![4, 3, -2, -1],
            vec![3, -4, -1, 2],
            vec![2, -1, 4, -3],
            vec![-4, -3, 2, 1],
            vec![-3, 4, 1, -2],
            vec![-2, 1, -4, 3],
        ]
    }

    /// All off-diagonal distances equal to 1.
    pub fn ones_dist(n: usize) -> Vec<Vec<i64>> {
        (0..n)
            .map(|i| (0..n).map(|j| if i == j { 0 } else { 1 }).collect())
            .collect()
    }

    pub fn four_teams(q1: usize, q2: usize) -> Problem {
        Problem::new(4, ones_dist(4), opponents4(), q1, q2, "umps4")
    }
}
