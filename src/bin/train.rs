use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::anyhow;
use clap::Parser;

use twenty48::ai::{train, TrainConfig};
use twenty48::logger::{Group, Level, Logger, LoggerConfig};
use twenty48::ntuple::{Network, NetworkIoError};

/// Train the n-tuple network by TD(0) self-play.
#[derive(Parser, Debug)]
#[clap(name = "twenty48-train", version)]
struct Args {
    /// Number of training episodes
    #[clap(short = 'n', long = "episodes", default_value_t = 100_000)]
    episodes: usize,

    /// Learning rate
    #[clap(short = 'a', long = "alpha", default_value_t = 0.1)]
    alpha: f32,

    /// Weight file written when training finishes
    #[clap(short = 'o', long = "save", default_value = "ntuple_weights.bin")]
    save: PathBuf,

    /// Existing weight file to continue from
    #[clap(long = "load", value_name = "PATH")]
    load: Option<PathBuf>,

    /// Print statistics every this many episodes; 0 reports only at the end
    #[clap(short = 's', long = "stats-interval", default_value_t = 1_000)]
    stats_interval: usize,

    /// Self-play worker threads sharing the weight tables (Hogwild)
    #[clap(short = 't', long = "threads", default_value_t = 1)]
    threads: usize,

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

    let network = Arc::new(Network::default_patterns());
    if let Some(path) = &args.load {
        match network.load(path) {
            Ok(()) => logger.info(
                Group::Ai,
                format_args!("continuing from weights in {}", path.display()),
            ),
            Err(NetworkIoError::ShapeMismatch) => logger.warning(
                Group::Ai,
                format_args!(
                    "{} does not match the network shape; starting fresh",
                    path.display()
                ),
            ),
            Err(e) => return Err(e.into()),
        }
    }

    let config = TrainConfig {
        episodes: args.episodes,
        alpha: args.alpha,
        save_path: Some(args.save),
        stats_interval: args.stats_interval,
        threads: args.threads,
    };
    logger.info(
        Group::Ai,
        format_args!(
            "training for {} episodes at alpha {} on {} threads",
            config.episodes, config.alpha, config.threads
        ),
    );
    train(&network, &config, &logger);
    Ok(())
}
