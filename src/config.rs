//! Runtime configuration: simulation settings and player construction
//! parameters, with JSON loaders that warn and keep defaults on any
//! problem.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::ai::{ExpectimaxConfig, ExpectimaxPlayer, HeuristicPlayer, Player, RandomPlayer};
use crate::eval::{self, EvalParams};
use crate::logger::{Group, Logger};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed JSON in {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid board state: {0}")]
    BadHex(String),
    #[error("unknown player type: {0} (expected H, R, or E)")]
    UnknownPlayer(String),
}

/// Parse a 64-bit board state from hex, with or without a `0x` prefix.
pub fn parse_hex_state(s: &str) -> Result<u64, ConfigError> {
    let trimmed = s.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    u64::from_str_radix(digits, 16).map_err(|_| ConfigError::BadHex(s.to_string()))
}

/// A hex state from JSON: quoted, or a bare numeric token whose digits are
/// read as base 16.
fn hex_from_json(value: &serde_json::Value) -> Option<u64> {
    match value {
        serde_json::Value::String(s) => parse_hex_state(s).ok(),
        serde_json::Value::Number(n) => {
            let digits = n.to_string();
            u64::from_str_radix(&digits, 16).ok()
        }
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub struct SimConfig {
    pub num_games: usize,
    pub num_threads: usize,
    /// Print progress every this many games; 0 suppresses progress output.
    pub progress_interval: usize,
    pub initial_state: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            num_games: 1,
            num_threads: 1,
            progress_interval: 100,
            initial_state: 0,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SimConfigFile {
    num_games: Option<u64>,
    num_threads: Option<u64>,
    progress_interval: Option<u64>,
    initial_state: Option<serde_json::Value>,
}

impl SimConfig {
    /// Overlay values from a JSON file. Keys that are absent keep their
    /// current value; unknown keys are ignored; an unreadable or malformed
    /// file warns and changes nothing.
    pub fn apply_json_file(&mut self, path: &Path, logger: &Logger) {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                logger.warning(
                    Group::Parser,
                    format_args!("cannot read simulation config {}: {e}", path.display()),
                );
                return;
            }
        };
        let file: SimConfigFile = match serde_json::from_str(&text) {
            Ok(file) => file,
            Err(e) => {
                logger.warning(
                    Group::Parser,
                    format_args!("malformed simulation config {}: {e}", path.display()),
                );
                return;
            }
        };

        if let Some(n) = file.num_games {
            self.num_games = n as usize;
        }
        if let Some(n) = file.num_threads {
            self.num_threads = n as usize;
        }
        if let Some(n) = file.progress_interval {
            self.progress_interval = n as usize;
        }
        if let Some(value) = file.initial_state {
            match hex_from_json(&value) {
                Some(state) => self.initial_state = state,
                None => logger.warning(
                    Group::Parser,
                    format_args!("invalid initialState in config: {value}"),
                ),
            }
        }

        logger.info(
            Group::Parser,
            format_args!(
                "simulation config: {} games, {} threads, progress every {}, initial state {:#x}",
                self.num_games, self.num_threads, self.progress_interval, self.initial_state
            ),
        );
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerKind {
    Random,
    Heuristic,
    Expectimax,
}

impl PlayerKind {
    pub fn name(self) -> &'static str {
        match self {
            PlayerKind::Random => "Random",
            PlayerKind::Heuristic => "Heuristic",
            PlayerKind::Expectimax => "Expectimax",
        }
    }
}

/// Everything needed to construct a policy; shared across worker threads,
/// each of which builds its own player from it.
#[derive(Debug, Clone)]
pub struct PlayerConfig {
    pub kind: PlayerKind,
    pub eval_params: EvalParams,
    pub expectimax: ExpectimaxConfig,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            kind: PlayerKind::Heuristic,
            eval_params: EvalParams::new(),
            expectimax: ExpectimaxConfig::default(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct PlayerConfigFile {
    player_type: Option<String>,
    depth: Option<i32>,
    chance_covering: Option<u32>,
    time_limit: Option<f64>,
    adaptive_depth: Option<bool>,
    eval_params: Option<BTreeMap<String, serde_json::Value>>,
}

impl PlayerConfig {
    /// Build from the one-letter CLI code, applying the per-player search
    /// defaults.
    pub fn from_code(code: &str) -> Result<Self, ConfigError> {
        let kind = match code {
            "R" => PlayerKind::Random,
            "H" => PlayerKind::Heuristic,
            "E" => PlayerKind::Expectimax,
            other => return Err(ConfigError::UnknownPlayer(other.to_string())),
        };
        let mut config = PlayerConfig {
            kind,
            ..PlayerConfig::default()
        };
        match kind {
            PlayerKind::Heuristic => {
                config.expectimax.depth = 6;
                config.expectimax.adaptive_depth = true;
            }
            PlayerKind::Expectimax => {
                config.expectimax.depth = 6;
                config.expectimax.chance_covering = 4;
                config.expectimax.time_limit = 100.0;
                config.expectimax.adaptive_depth = true;
            }
            PlayerKind::Random => {}
        }
        Ok(config)
    }

    /// Load from a JSON file with keys playerType, depth, chanceCovering,
    /// timeLimit, adaptiveDepth, and evalParams.
    pub fn from_json_file(path: &Path, logger: &Logger) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let file: PlayerConfigFile =
            serde_json::from_str(&text).map_err(|source| ConfigError::Json {
                path: path.display().to_string(),
                source,
            })?;

        let mut config = PlayerConfig::default();
        if let Some(kind) = file.player_type {
            config.kind = match kind.as_str() {
                "R" | "Random" => PlayerKind::Random,
                "H" | "Heuristic" => PlayerKind::Heuristic,
                "E" | "Expectimax" => PlayerKind::Expectimax,
                other => return Err(ConfigError::UnknownPlayer(other.to_string())),
            };
        }
        if let Some(depth) = file.depth {
            config.expectimax.depth = depth;
        }
        if let Some(chance) = file.chance_covering {
            config.expectimax.chance_covering = chance;
        }
        if let Some(time) = file.time_limit {
            config.expectimax.time_limit = time;
        }
        if let Some(adaptive) = file.adaptive_depth {
            config.expectimax.adaptive_depth = adaptive;
        }
        if let Some(params) = file.eval_params {
            for (name, value) in params {
                match eval::weight_from_json(&value) {
                    Some(weight) => {
                        config.eval_params.insert(name, weight);
                    }
                    None => logger.warning(
                        Group::Parser,
                        format_args!("ignoring non-numeric weight for {name}"),
                    ),
                }
            }
        }
        Ok(config)
    }

    /// Construct a fresh policy. Each worker calls this so no player state
    /// is shared.
    pub fn build_player(&self, logger: &Logger) -> Box<dyn Player> {
        match self.kind {
            PlayerKind::Random => Box::new(RandomPlayer::new()),
            PlayerKind::Heuristic => Box::new(HeuristicPlayer::new(&self.eval_params)),
            PlayerKind::Expectimax => Box::new(ExpectimaxPlayer::new(
                self.expectimax.clone(),
                &self.eval_params,
                logger.clone(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::Logger;

    #[test]
    fn hex_parsing_is_lax() {
        assert_eq!(Ok(0x1234), parse_hex_state("1234").map_err(|_| ()));
        assert_eq!(Ok(0x1234), parse_hex_state("0x1234").map_err(|_| ()));
        assert_eq!(Ok(0xABC), parse_hex_state("0Xabc").map_err(|_| ()));
        assert!(parse_hex_state("xyz").is_err());
        assert!(parse_hex_state("").is_err());
    }

    #[test]
    fn sim_config_overlay() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("twenty48-sim-{}.json", std::process::id()));
        std::fs::write(
            &path,
            r#"{
                "numGames": 500,
                "progressInterval": 0,
                "initialState": "0x123",
                "someFutureKey": true
            }"#,
        )
        .unwrap();

        let mut config = SimConfig {
            num_threads: 4,
            ..SimConfig::default()
        };
        config.apply_json_file(&path, &Logger::quiet());
        std::fs::remove_file(&path).ok();

        assert_eq!(500, config.num_games);
        // absent keys keep their current values
        assert_eq!(4, config.num_threads);
        assert_eq!(0, config.progress_interval);
        assert_eq!(0x123, config.initial_state);
    }

    #[test]
    fn sim_config_accepts_bare_hex_numbers() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("twenty48-sim-hex-{}.json", std::process::id()));
        // an unquoted token is read as base-16 digits
        std::fs::write(&path, r#"{"initialState": 4000000}"#).unwrap();
        let mut config = SimConfig::default();
        config.apply_json_file(&path, &Logger::quiet());
        std::fs::remove_file(&path).ok();
        assert_eq!(0x400_0000, config.initial_state);
    }

    #[test]
    fn missing_sim_config_keeps_defaults() {
        let mut config = SimConfig::default();
        config.apply_json_file(Path::new("/no/such/config.json"), &Logger::quiet());
        assert_eq!(1, config.num_games);
        assert_eq!(100, config.progress_interval);
    }

    #[test]
    fn player_codes() {
        let player = PlayerConfig::from_code("H").unwrap();
        assert_eq!(PlayerKind::Heuristic, player.kind);
        assert_eq!(6, player.expectimax.depth);
        assert!(player.expectimax.adaptive_depth);

        let player = PlayerConfig::from_code("E").unwrap();
        assert_eq!(PlayerKind::Expectimax, player.kind);
        assert_eq!(4, player.expectimax.chance_covering);
        assert_eq!(100.0, player.expectimax.time_limit);

        assert_eq!(PlayerKind::Random, PlayerConfig::from_code("R").unwrap().kind);
        assert!(PlayerConfig::from_code("X").is_err());
    }

    #[test]
    fn player_config_from_json() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("twenty48-player-{}.json", std::process::id()));
        std::fs::write(
            &path,
            r#"{
                "playerType": "Expectimax",
                "depth": 5,
                "timeLimit": 2.5,
                "adaptiveDepth": true,
                "evalParams": {"emptyTiles": 400, "cornerValue": "600"}
            }"#,
        )
        .unwrap();
        let config = PlayerConfig::from_json_file(&path, &Logger::quiet()).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(PlayerKind::Expectimax, config.kind);
        assert_eq!(5, config.expectimax.depth);
        assert_eq!(2.5, config.expectimax.time_limit);
        assert!(config.expectimax.adaptive_depth);
        assert_eq!(Some(&400.0), config.eval_params.get("emptyTiles"));
        assert_eq!(Some(&600.0), config.eval_params.get("cornerValue"));
    }
}
