use std::path::PathBuf;
use std::process;

use anyhow::anyhow;
use clap::Parser;

use twenty48::eval;
use twenty48::logger::{Group, Level, Logger, LoggerConfig};
use twenty48::tuner::{self, TunerConfig};

/// Evolve heuristic evaluation weights by parallel self-play.
#[derive(Parser, Debug)]
#[clap(name = "twenty48-tune", version)]
struct Args {
    /// Population size
    #[clap(short = 'p', long = "population", default_value_t = 50)]
    population: usize,

    /// Number of generations
    #[clap(short = 'g', long = "generations", default_value_t = 20)]
    generations: usize,

    /// Games played to score each candidate
    #[clap(short = 'e', long = "games", default_value_t = 100)]
    games: usize,

    /// Initial mutation rate; decays linearly over the generations
    #[clap(short = 'm', long = "mutation-rate", default_value_t = 0.15)]
    mutation_rate: f64,

    /// Fraction of the population carried over unchanged
    #[clap(long = "elite", default_value_t = 0.2)]
    elite: f64,

    /// Population CSV, rewritten every generation
    #[clap(short = 'o', long = "output", default_value = "eval_weights.csv")]
    output: PathBuf,

    /// Best weight set, as readable text
    #[clap(long = "best-file", default_value = "best_eval_weights.txt")]
    best_file: PathBuf,

    /// Best weight set, as JSON usable with the main binary
    #[clap(long = "json-file", default_value = "best_eval_weights.json")]
    json_file: PathBuf,

    /// Resume from the population CSV instead of a random population
    #[clap(short = 'c', long = "continue")]
    continue_from_file: bool,

    /// Worker threads (default: all cores)
    #[clap(short = 't', long = "threads")]
    threads: Option<usize>,

    /// Log level: e, w, i, d or error, warning, info, debug
    #[clap(short = 'l', long = "log-level", default_value = "info")]
    log_level: String,
}

fn main() {
    let args = Args::parse();
    if let Err(e) = run(args) {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    let level = Level::parse(&args.log_level)
        .ok_or_else(|| anyhow!("unknown log level: {}", args.log_level))?;
    let logger = Logger::new(LoggerConfig {
        level,
        ..LoggerConfig::default()
    });

    let config = TunerConfig {
        population_size: args.population,
        generations: args.generations,
        games_per_evaluation: args.games,
        mutation_rate: args.mutation_rate,
        elite_percentage: args.elite,
        output_file: args.output,
        best_weights_file: args.best_file,
        json_output_file: args.json_file,
        continue_from_file: args.continue_from_file,
        threads: args.threads.unwrap_or_else(num_cpus::get),
    };

    logger.info(
        Group::Tuner,
        format_args!(
            "tuning: population {}, generations {}, {} games per evaluation, {} threads",
            config.population_size, config.generations, config.games_per_evaluation, config.threads
        ),
    );

    let best = tuner::run(&config, &logger);
    for line in eval::params_table(&best.params).lines() {
        logger.info(Group::Tuner, line);
    }
    Ok(())
}
