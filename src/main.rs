use clap::Parser;
use env_logger::{Builder, Env};
use itertools::Itertools;
use serde::Serialize;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tup::bnb::search::{Solver, SolverOptions, UNBOUNDED};
use tup::file::{read_problem, render_solution, write_solution};

/// Decomposition-based branch-and-bound for the Traveling Umpire Problem
#[derive(Parser, Debug, Serialize)]
#[command(author, version, about)]
struct Args {
    /// Instance file (umps format: nTeams, dist, opponents)
    instance: String,

    /// Length of the no-repeat-venue window
    q1: usize,

    /// Length of the no-repeat-opponent window
    q2: usize,

    /// Write the best assignment to this file
    #[arg(short, long)]
    output: Option<String>,

    /// Number of threads
    #[arg(long, default_value_t = SolverOptions::default().threads)]
    threads: usize,

    /// Time limit in seconds (0 = unlimited)
    #[arg(long, default_value_t = 0)]
    time_limit: u64,

    /// Initial upper bound
    #[arg(long)]
    ub: Option<i64>,

    /// Schedule the lower-bound engine on suffix windows only
    #[arg(long, default_value_t = false)]
    no_time_windows: bool,
}

fn init_logger() {
    // Print ThreadID to tell the search workers apart
    Builder::from_env(Env::default().default_filter_or("info"))
        .format(|buf, record| {
            let ts = buf.timestamp_micros();
            writeln!(
                buf,
                "[{} {:?} {} {}] {}",
                ts,
                std::thread::current().id(),
                record.level(),
                record.module_path().unwrap_or(""),
                record.args()
            )
        })
        .init();
}

fn main() {
    init_logger();

    let args = Args::parse();

    println!("---");
    println!("command: {}", std::env::args().join(" "));
    serde_yaml::to_writer(std::io::stdout(), &args).unwrap();

    let problem = Arc::new(read_problem(&args.instance, args.q1, args.q2));
    println!("n_teams: {}", problem.n_teams);
    println!("n_rounds: {}", problem.n_rounds);
    println!("team_travel_distance: {}", problem.team_travel_distance);

    let options = SolverOptions {
        initial_ub: args.ub.unwrap_or(UNBOUNDED),
        threads: args.threads,
        time_limit: match args.time_limit {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        },
        use_time_windows: !args.no_time_windows,
        use_pruning: true,
    };
    let result = Solver::new(Arc::clone(&problem)).solve(&options);

    println!("nodes: {}", result.nodes);
    println!("leaves: {}", result.leaves);
    println!("lower_bound: {}", result.lower_bound);
    println!("proved_optimal: {}", result.proved_optimal);
    println!("elapsed_sec: {}", result.elapsed.as_secs_f32());

    match &result.best {
        Some(best) => {
            println!("best_cost: {}", best.cost);
            print!("{}", render_solution(&problem, best));
            if let Some(output) = &args.output {
                write_solution(output, &problem, best);
                println!("written: {}", output);
            }
        }
        None => println!("best_cost: none"),
    }
}
