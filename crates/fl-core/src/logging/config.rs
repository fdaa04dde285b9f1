//! Log level and format selection.
//!
//! `FAULTLINE_LOG` (or failing that `RUST_LOG`) and `FAULTLINE_LOG_FORMAT`
//! set the defaults; `-v`/`-q` and `--log-format` override them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Where log lines go and how they look.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Human,
    /// One JSON object per line.
    Jsonl,
}

const FORMAT_NAMES: &[(&str, LogFormat)] = &[
    ("human", LogFormat::Human),
    ("console", LogFormat::Human),
    ("pretty", LogFormat::Human),
    ("jsonl", LogFormat::Jsonl),
    ("json", LogFormat::Jsonl),
];

impl LogFormat {
    pub const fn as_str(self) -> &'static str {
        match self {
            LogFormat::Human => "human",
            LogFormat::Jsonl => "jsonl",
        }
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        lookup(FORMAT_NAMES, s).ok_or_else(|| format!("unknown log format: {s}"))
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Minimum severity, most verbose first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Off,
}

const LEVEL_NAMES: &[(&str, LogLevel)] = &[
    ("trace", LogLevel::Trace),
    ("debug", LogLevel::Debug),
    ("info", LogLevel::Info),
    ("warn", LogLevel::Warn),
    ("warning", LogLevel::Warn),
    ("error", LogLevel::Error),
    ("off", LogLevel::Off),
    ("none", LogLevel::Off),
    ("quiet", LogLevel::Off),
];

impl LogLevel {
    pub const fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Off => "off",
        }
    }

    /// Level for `-v` repeated `count` times, or `-q`.
    pub fn from_verbosity(count: u8, quiet: bool) -> Self {
        match (quiet, count) {
            (true, _) => LogLevel::Error,
            (false, 0) => LogLevel::Info,
            (false, 1) => LogLevel::Debug,
            (false, _) => LogLevel::Trace,
        }
    }

    /// Most verbose level named anywhere in a `RUST_LOG`-style directive.
    fn from_directives(directives: &str) -> Option<Self> {
        directives
            .split([',', '='])
            .filter_map(|part| part.trim().parse::<LogLevel>().ok())
            .filter(|level| *level != LogLevel::Off)
            .min()
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        lookup(LEVEL_NAMES, s).ok_or_else(|| format!("unknown log level: {s}"))
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn lookup<T: Copy>(names: &[(&str, T)], s: &str) -> Option<T> {
    names
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(s))
        .map(|(_, value)| *value)
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub format: LogFormat,
    pub level: LogLevel,
    /// Timestamps on human output.
    pub timestamps: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            format: LogFormat::Human,
            level: LogLevel::Info,
            timestamps: true,
        }
    }
}

impl LogConfig {
    /// Environment first, then CLI flags on top.
    pub fn from_env(cli_level: Option<LogLevel>, cli_format: Option<LogFormat>) -> Self {
        Self::from_lookup(|key| std::env::var(key).ok(), cli_level, cli_format)
    }

    /// [`LogConfig::from_env`] with an explicit environment lookup.
    pub fn from_lookup<F>(env: F, cli_level: Option<LogLevel>, cli_format: Option<LogFormat>) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        // FAULTLINE_LOG wins over RUST_LOG even when it does not parse.
        let env_level = match env("FAULTLINE_LOG") {
            Some(val) => val.trim().parse().ok(),
            None => env("RUST_LOG").and_then(|val| LogLevel::from_directives(&val)),
        };
        let env_format = env("FAULTLINE_LOG_FORMAT").and_then(|val| val.trim().parse().ok());

        let defaults = LogConfig::default();
        LogConfig {
            level: cli_level.or(env_level).unwrap_or(defaults.level),
            format: cli_format.or(env_format).unwrap_or(defaults.format),
            timestamps: defaults.timestamps,
        }
    }

    pub fn with_format(self, format: LogFormat) -> Self {
        Self { format, ..self }
    }

    pub fn with_level(self, level: LogLevel) -> Self {
        Self { level, ..self }
    }

    pub fn with_timestamps(self, timestamps: bool) -> Self {
        Self { timestamps, ..self }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_names_ignore_case() {
        assert_eq!("human".parse::<LogFormat>().unwrap(), LogFormat::Human);
        assert_eq!("JSONL".parse::<LogFormat>().unwrap(), LogFormat::Jsonl);
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Jsonl);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn level_aliases() {
        assert_eq!("WARNING".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!("none".parse::<LogLevel>().unwrap(), LogLevel::Off);
        assert!("loud".parse::<LogLevel>().is_err());
    }

    #[test]
    fn verbosity_flags() {
        assert_eq!(LogLevel::from_verbosity(0, false), LogLevel::Info);
        assert_eq!(LogLevel::from_verbosity(1, false), LogLevel::Debug);
        assert_eq!(LogLevel::from_verbosity(3, false), LogLevel::Trace);
        assert_eq!(LogLevel::from_verbosity(2, true), LogLevel::Error);
    }

    #[test]
    fn env_then_cli_precedence() {
        let env = |key: &str| match key {
            "FAULTLINE_LOG" => Some("debug".to_string()),
            "RUST_LOG" => Some("error".to_string()),
            "FAULTLINE_LOG_FORMAT" => Some("jsonl".to_string()),
            _ => None,
        };
        let config = LogConfig::from_lookup(env, None, None);
        assert_eq!(config.level, LogLevel::Debug);
        assert_eq!(config.format, LogFormat::Jsonl);

        let config = LogConfig::from_lookup(env, Some(LogLevel::Warn), Some(LogFormat::Human));
        assert_eq!(config.level, LogLevel::Warn);
        assert_eq!(config.format, LogFormat::Human);
    }

    #[test]
    fn rust_log_is_a_fallback() {
        let env = |key: &str| (key == "RUST_LOG").then(|| "fl_core=trace".to_string());
        assert_eq!(LogConfig::from_lookup(env, None, None).level, LogLevel::Trace);
    }

    #[test]
    fn rust_log_directives_pick_most_verbose() {
        assert_eq!(LogLevel::from_directives("warn,fl_core=debug"), Some(LogLevel::Debug));
        assert_eq!(LogLevel::from_directives("fl_core=off"), None);
        assert_eq!(LogLevel::from_directives("hyper"), None);
    }
}
