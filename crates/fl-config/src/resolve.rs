//! Configuration resolution.
//!
//! Resolution order for each setting: option string → environment variable →
//! builtin default.

use crate::agent::AgentConfig;
use crate::options::AgentOptions;
use crate::validate::{validate_agent_config, ValidationResult};
use std::path::PathBuf;

/// Where a setting came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConfigSource {
    /// Given in the agent option string.
    Options,

    /// Set via environment variable.
    Environment,

    /// Using built-in defaults.
    #[default]
    BuiltinDefault,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Options => write!(f, "agent options"),
            ConfigSource::Environment => write!(f, "environment variable"),
            ConfigSource::BuiltinDefault => write!(f, "builtin default"),
        }
    }
}

/// Environment variable naming the debug log path.
pub const ENV_DEBUG_LOG: &str = "FAULTLINE_DEBUG_LOG";

/// Environment variable naming the agent payload for the controller.
pub const ENV_AGENT_PATH: &str = "FAULTLINE_AGENT";

/// Resolve options against the process environment and defaults, then validate.
pub fn resolve_agent_config(options: &AgentOptions) -> ValidationResult<AgentConfig> {
    resolve_with_env(options, |key| std::env::var(key).ok()).map(|(config, _)| config)
}

/// Resolve with an explicit environment lookup.
///
/// Returns the validated config and the source the debug log path came from.
pub fn resolve_with_env<F>(
    options: &AgentOptions,
    env: F,
) -> ValidationResult<(AgentConfig, ConfigSource)>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = AgentConfig::default();

    if let Some(probability) = options.probability {
        config.probability = probability;
    }
    if let Some(ceiling) = options.throw_ceiling {
        config.throw_ceiling = ceiling;
    }
    for entry in &options.deny {
        config = config.with_deny(entry.clone());
    }
    if let Some(dispatch) = &options.dispatch {
        config.dispatch = dispatch.clone();
    }

    let log_source = if let Some(path) = &options.debug_log {
        config.debug_log = path.clone();
        ConfigSource::Options
    } else if let Some(path) = env(ENV_DEBUG_LOG).filter(|p| !p.trim().is_empty()) {
        config.debug_log = PathBuf::from(path);
        ConfigSource::Environment
    } else {
        ConfigSource::BuiltinDefault
    };

    validate_agent_config(&config)?;
    Ok((config, log_source))
}
