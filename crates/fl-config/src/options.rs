//! Agent option string parsing.
//!
//! The option string is what the host hands to both activation entry points.
//! Two shapes are accepted:
//!
//! ```text
//! 0.75
//! prob=0.75,ceiling=2,deny=com/acme/gen/;com/acme/*Test,log=/var/tmp/fl.log
//! ```
//!
//! Only keys that are present end up `Some`; resolution against the
//! environment and defaults happens in [`crate::resolve`].

use crate::agent::DispatchTarget;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// Option string parse errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OptionsError {
    #[error("unknown option key '{0}'")]
    UnknownKey(String),

    #[error("option '{0}' is missing a value")]
    MissingValue(String),

    #[error("option '{key}' has invalid value '{value}': {reason}")]
    BadValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("option '{0}' given more than once")]
    Duplicate(String),

    #[error("option '{key}' value '{value}' cannot be carried in an option string: {reason}")]
    Unrenderable {
        key: String,
        value: String,
        reason: &'static str,
    },
}

/// Options as written in the option string.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentOptions {
    pub probability: Option<f64>,
    pub throw_ceiling: Option<u64>,
    /// Extra deny entries, appended to the builtin list.
    pub deny: Vec<String>,
    pub debug_log: Option<PathBuf>,
    pub dispatch: Option<DispatchTarget>,
}

impl AgentOptions {
    /// Options carrying only a probability.
    pub fn with_probability(probability: f64) -> Self {
        Self {
            probability: Some(probability),
            ..Self::default()
        }
    }

    /// Render for handing to an agent, refusing values that would not parse
    /// back into the same options.
    pub fn to_option_string(&self) -> Result<String, OptionsError> {
        for entry in &self.deny {
            check_renderable("deny", entry, &[',', ';'])?;
        }
        if let Some(log) = &self.debug_log {
            let path = log.to_str().ok_or_else(|| OptionsError::Unrenderable {
                key: "log".to_string(),
                value: log.display().to_string(),
                reason: "path is not valid UTF-8",
            })?;
            check_renderable("log", path, &[','])?;
        }
        if let Some(dispatch) = &self.dispatch {
            check_renderable("dispatch", &dispatch.to_string(), &[','])?;
        }
        Ok(self.to_string())
    }
}

fn check_renderable(key: &str, value: &str, separators: &[char]) -> Result<(), OptionsError> {
    let reason = if value.contains(separators) {
        "contains a separator character"
    } else if value.trim() != value {
        "has leading or trailing whitespace"
    } else if value.is_empty() {
        "is empty"
    } else {
        return Ok(());
    };
    Err(OptionsError::Unrenderable {
        key: key.to_string(),
        value: value.to_string(),
        reason,
    })
}

fn parse_probability(value: &str) -> Result<f64, OptionsError> {
    value.parse::<f64>().map_err(|e| OptionsError::BadValue {
        key: "prob".to_string(),
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn set_once<T>(slot: &mut Option<T>, key: &str, value: T) -> Result<(), OptionsError> {
    if slot.is_some() {
        return Err(OptionsError::Duplicate(key.to_string()));
    }
    *slot = Some(value);
    Ok(())
}

impl FromStr for AgentOptions {
    type Err = OptionsError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        let mut options = AgentOptions::default();
        if raw.is_empty() {
            return Ok(options);
        }

        // Bare probability, the form the controller has always passed.
        if !raw.contains('=') && !raw.contains(',') {
            options.probability = Some(parse_probability(raw)?);
            return Ok(options);
        }

        for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| OptionsError::MissingValue(pair.to_string()))?;
            let key = key.trim();
            let value = value.trim();
            if value.is_empty() {
                return Err(OptionsError::MissingValue(key.to_string()));
            }

            match key {
                "prob" | "probability" => {
                    set_once(&mut options.probability, "prob", parse_probability(value)?)?
                }
                "ceiling" => {
                    let ceiling = value.parse::<u64>().map_err(|e| OptionsError::BadValue {
                        key: key.to_string(),
                        value: value.to_string(),
                        reason: e.to_string(),
                    })?;
                    set_once(&mut options.throw_ceiling, key, ceiling)?
                }
                "deny" => options.deny.extend(
                    value
                        .split(';')
                        .map(str::trim)
                        .filter(|e| !e.is_empty())
                        .map(str::to_string),
                ),
                "log" => set_once(&mut options.debug_log, key, PathBuf::from(value))?,
                "dispatch" => {
                    let target = value
                        .parse::<DispatchTarget>()
                        .map_err(|e| OptionsError::BadValue {
                            key: key.to_string(),
                            value: value.to_string(),
                            reason: e.to_string(),
                        })?;
                    set_once(&mut options.dispatch, key, target)?
                }
                other => return Err(OptionsError::UnknownKey(other.to_string())),
            }
        }

        Ok(options)
    }
}

impl fmt::Display for AgentOptions {
    /// Render back into the `key=value` form, omitting absent keys.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(p) = self.probability {
            parts.push(format!("prob={p}"));
        }
        if let Some(c) = self.throw_ceiling {
            parts.push(format!("ceiling={c}"));
        }
        if !self.deny.is_empty() {
            parts.push(format!("deny={}", self.deny.join(";")));
        }
        if let Some(log) = &self.debug_log {
            parts.push(format!("log={}", log.display()));
        }
        if let Some(dispatch) = &self.dispatch {
            parts.push(format!("dispatch={dispatch}"));
        }
        write!(f, "{}", parts.join(","))
    }
}
