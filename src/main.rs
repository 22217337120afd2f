use std::io::{self, Write};
use std::path::PathBuf;
use std::process;
use std::time::Instant;

use anyhow::{anyhow, Context};
use clap::{CommandFactory, Parser};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

use twenty48::board::State;
use twenty48::config::{parse_hex_state, PlayerConfig, SimConfig};
use twenty48::eval;
use twenty48::logger::{Group, Level, Logger, LoggerConfig};
use twenty48::sim::run_games;

const DEFAULT_SIM_CONFIG: &str = "configurations/sim_config.json";
const DEFAULT_LOGGER_CONFIG: &str = "configurations/logger_config.json";
const DEFAULT_PLAYER_CONFIG: &str = "configurations/player_config.json";

/// Play batches of 2048 games with a configurable policy.
#[derive(Parser, Debug)]
#[clap(name = "twenty48", version)]
struct Args {
    /// Player type: H (heuristic), R (random), or E (expectimax)
    #[clap(short = 'p', long = "player", default_value = "H", value_name = "H|R|E")]
    player: String,

    /// Number of games to play
    #[clap(short = 'n', long = "num-games", value_name = "N")]
    num_games: Option<usize>,

    /// Number of worker threads
    #[clap(short = 't', long = "threads", value_name = "N")]
    threads: Option<usize>,

    /// Initial board state as 64-bit hex, with or without 0x
    #[clap(long = "initial-state", visible_alias = "is", value_name = "HEX")]
    initial_state: Option<String>,

    /// Load simulation config from a JSON file
    #[clap(long = "sim-config", visible_alias = "sc", value_name = "PATH")]
    sim_config: Option<Option<PathBuf>>,

    /// Load player config from a JSON file
    #[clap(long = "player-config", visible_alias = "pc", value_name = "PATH")]
    player_config: Option<Option<PathBuf>>,

    /// Load heuristic weights from a JSON file (as written by the tuner)
    #[clap(short = 'w', long = "weights", value_name = "PATH")]
    weights: Option<PathBuf>,

    /// Log level: e, w, i, d or error, warning, info, debug
    #[clap(short = 'l', long = "log-level", value_name = "LEVEL")]
    log_level: Option<String>,

    /// Also write log output to this file
    #[clap(long = "log-file", visible_alias = "lf", value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Load logger config from a JSON file
    #[clap(long = "log-config", visible_alias = "lc", value_name = "PATH")]
    log_config: Option<Option<PathBuf>>,
}

fn main() {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e)
            if e.kind() == clap::ErrorKind::DisplayHelp
                || e.kind() == clap::ErrorKind::DisplayVersion =>
        {
            let _ = e.print();
            process::exit(0);
        }
        Err(e) => {
            let _ = e.print();
            process::exit(1);
        }
    };

    if let Err(e) = run(args) {
        eprintln!("Error: {e:#}");
        let _ = Args::command().print_help();
        process::exit(1);
    }
}

fn build_logger(args: &Args) -> anyhow::Result<Logger> {
    if let Some(maybe_path) = &args.log_config {
        let path = maybe_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOGGER_CONFIG));
        match LoggerConfig::from_json_file(&path) {
            Ok(config) => return Ok(Logger::new(config)),
            Err(e) => {
                eprintln!(
                    "cannot load logger config {}: {e}; using defaults",
                    path.display()
                );
                return Ok(Logger::new(LoggerConfig::default()));
            }
        }
    }

    let mut config = LoggerConfig::default();
    if let Some(level) = &args.log_level {
        config.level = Level::parse(level).ok_or_else(|| anyhow!("unknown log level: {level}"))?;
    }
    if let Some(path) = &args.log_file {
        config.log_to_file = true;
        config.log_file = path.clone();
    }
    Ok(Logger::new(config))
}

fn run(args: Args) -> anyhow::Result<()> {
    let logger = build_logger(&args)?;

    // flags first; a requested config file overrides them
    let mut sim = SimConfig::default();
    if let Some(n) = args.num_games {
        sim.num_games = n;
    }
    if let Some(t) = args.threads {
        sim.num_threads = t;
    }
    if let Some(hex) = &args.initial_state {
        sim.initial_state =
            parse_hex_state(hex).with_context(|| format!("bad --initial-state {hex}"))?;
    }
    if let Some(maybe_path) = &args.sim_config {
        let path = maybe_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SIM_CONFIG));
        sim.apply_json_file(&path, &logger);
    }

    let mut player = if let Some(maybe_path) = &args.player_config {
        let path = maybe_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_PLAYER_CONFIG));
        PlayerConfig::from_json_file(&path, &logger)
            .with_context(|| format!("cannot load player config {}", path.display()))?
    } else {
        PlayerConfig::from_code(&args.player)?
    };
    if let Some(path) = &args.weights {
        player.eval_params = eval::load_params(path, &logger);
    }

    logger.info(
        Group::Main,
        format_args!(
            "starting {} games with {} on {} threads",
            sim.num_games,
            player.kind.name(),
            sim.num_threads
        ),
    );
    if !player.eval_params.is_empty() {
        logger.info(
            Group::Main,
            format_args!(
                "evaluation parameters: {}",
                eval::params_to_string(&player.eval_params)
            ),
        );
    }
    if sim.initial_state != 0 {
        logger.info(
            Group::Main,
            format_args!("using initial state {:#018x}", sim.initial_state),
        );
    }

    let start = Instant::now();
    let outcome = run_games(&sim, &player, &logger);
    let elapsed = start.elapsed();

    logger.info(Group::Main, "final results:");
    if elapsed.as_millis() > 5_000 {
        logger.info(
            Group::Main,
            format_args!(
                "played {} games in {:.2}s ({:.2}s per game)",
                outcome.games,
                elapsed.as_secs_f64(),
                elapsed.as_secs_f64() / outcome.games.max(1) as f64
            ),
        );
    } else {
        logger.info(
            Group::Main,
            format_args!(
                "played {} games in {}ms ({:.2}ms per game)",
                outcome.games,
                elapsed.as_millis(),
                elapsed.as_millis() as f64 / outcome.games.max(1) as f64
            ),
        );
    }
    logger.info(
        Group::Main,
        format_args!(
            "best score: {} (moves: {})",
            outcome.best_score, outcome.best_moves
        ),
    );
    logger.info(Group::Main, "best board:");
    logger.print_board(Group::Main, outcome.best_state);
    print_board(outcome.best_state).context("could not print the best board")?;
    Ok(())
}

fn gray_write(stream: &mut StandardStream, s: &str) -> io::Result<()> {
    stream.set_color(ColorSpec::new().set_fg(Some(Color::Rgb(200, 200, 200))))?;
    write!(stream, "{s}")?;
    stream.reset()?;
    Ok(())
}

/// Render the board as a bordered grid of tile values.
fn print_board(state: State) -> io::Result<()> {
    let stream = &mut StandardStream::stdout(ColorChoice::Auto);
    let sep = format!("+{bar}+{bar}+{bar}+{bar}+", bar = "------");
    gray_write(stream, &sep)?;
    writeln!(stream)?;
    for row in 0..4 {
        gray_write(stream, "|")?;
        for col in 0..4 {
            let value = state.get(row, col);
            if value == 0 {
                write!(stream, "      ")?;
            } else {
                write!(stream, "{:>5} ", 1u32 << value)?;
            }
            gray_write(stream, "|")?;
        }
        writeln!(stream)?;
        gray_write(stream, &sep)?;
        writeln!(stream)?;
    }
    Ok(())
}
