//! Leveled, group-filtered logging.
//!
//! The logger is an explicit handle rather than process-global state: build
//! one [`Logger`] from a [`LoggerConfig`] before spawning workers and pass
//! clones wherever output is needed. Reconfiguration during a run is not
//! supported; construct a new handle instead.

use std::fmt::Display;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::Local;
use serde::de::{self, Deserializer};
use serde::Deserialize;

use crate::board::State;

/// Log severity, most severe first. A configured level admits itself and
/// everything more severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Error,
    Warning,
    Info,
    Debug,
}

impl Level {
    /// Accepts the single-letter CLI forms and full names, case-insensitively.
    pub fn parse(s: &str) -> Option<Level> {
        match s.to_ascii_lowercase().as_str() {
            "e" | "error" => Some(Level::Error),
            "w" | "warning" => Some(Level::Warning),
            "i" | "info" => Some(Level::Info),
            "d" | "debug" => Some(Level::Debug),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Level::Error => "ERROR",
            Level::Warning => "WARN",
            Level::Info => "INFO",
            Level::Debug => "DEBUG",
        }
    }
}

impl<'de> Deserialize<'de> for Level {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Level::parse(&s).ok_or_else(|| de::Error::custom(format!("unknown log level: {s}")))
    }
}

/// Subsystem a message belongs to; each group can be toggled independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Group {
    Board,
    Evaluation,
    Ai,
    Game,
    Logger,
    Parser,
    Main,
    Tuner,
}

impl Group {
    fn name(self) -> &'static str {
        match self {
            Group::Board => "Board",
            Group::Evaluation => "Evaluation",
            Group::Ai => "AI",
            Group::Game => "Game",
            Group::Logger => "Logger",
            Group::Parser => "Parser",
            Group::Main => "Main",
            Group::Tuner => "Tuner",
        }
    }
}

/// Per-group enable flags; JSON keys use the display names.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GroupToggles {
    #[serde(rename = "Board")]
    pub board: bool,
    #[serde(rename = "Evaluation")]
    pub evaluation: bool,
    #[serde(rename = "AI")]
    pub ai: bool,
    #[serde(rename = "Game")]
    pub game: bool,
    #[serde(rename = "Logger")]
    pub logger: bool,
    #[serde(rename = "Parser")]
    pub parser: bool,
    #[serde(rename = "Main")]
    pub main: bool,
    #[serde(rename = "Tuner")]
    pub tuner: bool,
}

impl Default for GroupToggles {
    fn default() -> Self {
        Self {
            board: true,
            evaluation: true,
            ai: true,
            game: true,
            logger: true,
            parser: true,
            main: true,
            tuner: true,
        }
    }
}

impl GroupToggles {
    fn enabled(&self, group: Group) -> bool {
        match group {
            Group::Board => self.board,
            Group::Evaluation => self.evaluation,
            Group::Ai => self.ai,
            Group::Game => self.game,
            Group::Logger => self.logger,
            Group::Parser => self.parser,
            Group::Main => self.main,
            Group::Tuner => self.tuner,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LoggerConfig {
    pub level: Level,
    pub groups: GroupToggles,
    pub wait_enabled: bool,
    pub shrink_board: bool,
    pub log_to_file: bool,
    pub log_to_console: bool,
    pub show_timestamp: bool,
    pub log_file: PathBuf,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: Level::Info,
            groups: GroupToggles::default(),
            wait_enabled: false,
            shrink_board: false,
            log_to_file: false,
            log_to_console: true,
            show_timestamp: false,
            log_file: PathBuf::from("log.txt"),
        }
    }
}

impl LoggerConfig {
    pub fn from_json_file(path: &Path) -> io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

struct Inner {
    config: LoggerConfig,
    file: Mutex<Option<File>>,
    console: Mutex<()>,
}

/// Cheaply cloneable logging handle.
#[derive(Clone)]
pub struct Logger {
    inner: Arc<Inner>,
}

impl Logger {
    /// Build a handle. A file sink that cannot be opened is reported on
    /// stderr and disabled; everything else still works.
    pub fn new(config: LoggerConfig) -> Logger {
        let file = if config.log_to_file {
            match OpenOptions::new()
                .create(true)
                .append(true)
                .open(&config.log_file)
            {
                Ok(f) => Some(f),
                Err(e) => {
                    eprintln!("cannot open log file {}: {e}", config.log_file.display());
                    None
                }
            }
        } else {
            None
        };
        Logger {
            inner: Arc::new(Inner {
                config,
                file: Mutex::new(file),
                console: Mutex::new(()),
            }),
        }
    }

    /// A handle that only reports errors to the console. Used by tests and
    /// as a stand-in before configuration is loaded.
    pub fn quiet() -> Logger {
        Logger::new(LoggerConfig {
            level: Level::Error,
            ..LoggerConfig::default()
        })
    }

    pub fn config(&self) -> &LoggerConfig {
        &self.inner.config
    }

    pub fn error(&self, group: Group, msg: impl Display) {
        self.log(Level::Error, group, msg);
    }

    pub fn warning(&self, group: Group, msg: impl Display) {
        self.log(Level::Warning, group, msg);
    }

    pub fn info(&self, group: Group, msg: impl Display) {
        self.log(Level::Info, group, msg);
    }

    pub fn debug(&self, group: Group, msg: impl Display) {
        self.log(Level::Debug, group, msg);
    }

    /// Log a board at info level, as a grid or a single hex word depending
    /// on the `shrink_board` setting.
    pub fn print_board(&self, group: Group, state: State) {
        if self.inner.config.shrink_board {
            self.info(group, format_args!("board {:#018x}", state));
        } else {
            for line in state.to_string().lines() {
                self.info(group, line);
            }
        }
    }

    /// Block until the user presses enter, when step-by-step mode is on.
    pub fn wait(&self) {
        if !self.inner.config.wait_enabled {
            return;
        }
        let mut line = String::new();
        let _ = io::stdin().lock().read_line(&mut line);
    }

    fn log(&self, level: Level, group: Group, msg: impl Display) {
        let config = &self.inner.config;
        if level > config.level || !config.groups.enabled(group) {
            return;
        }
        let mut line = String::new();
        if config.show_timestamp {
            line.push_str(&format!("[{}] ", Local::now().format("%Y-%m-%d %H:%M:%S")));
        }
        line.push_str(&format!("[{}] [{}] {msg}", level.as_str(), group.name()));

        if config.log_to_console {
            let _guard = self.inner.console.lock();
            if level == Level::Error {
                eprintln!("{line}");
            } else {
                println!("{line}");
            }
        }
        if let Ok(mut file) = self.inner.file.lock() {
            if let Some(f) = file.as_mut() {
                let _ = writeln!(f, "{line}");
                let _ = f.flush();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Level, LoggerConfig};

    #[test]
    fn parse_levels() {
        assert_eq!(Some(Level::Error), Level::parse("e"));
        assert_eq!(Some(Level::Warning), Level::parse("WARNING"));
        assert_eq!(Some(Level::Info), Level::parse("Info"));
        assert_eq!(Some(Level::Debug), Level::parse("d"));
        assert_eq!(None, Level::parse("verbose"));
    }

    #[test]
    fn levels_are_ordered_by_severity() {
        assert!(Level::Error < Level::Warning);
        assert!(Level::Warning < Level::Info);
        assert!(Level::Info < Level::Debug);
    }

    #[test]
    fn config_from_json() {
        let config: LoggerConfig = serde_json::from_str(
            r#"{
                "level": "DEBUG",
                "groups": {"Board": false, "AI": true},
                "showTimestamp": true,
                "logFile": "run.log",
                "unknownKey": 3
            }"#,
        )
        .unwrap();
        assert_eq!(Level::Debug, config.level);
        assert!(!config.groups.board);
        assert!(config.groups.ai);
        assert!(config.groups.tuner);
        assert!(config.show_timestamp);
        assert!(!config.log_to_file);
    }
}
