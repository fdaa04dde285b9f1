//! faultline agent configuration.
//!
//! This crate provides:
//! - The read-only [`AgentConfig`] created once at agent activation
//! - Parsing of the agent option string (`"0.75"` or `key=value` pairs)
//! - Config resolution (option string → environment → defaults)
//! - Deny-list compilation (prefixes and glob patterns)
//! - Semantic validation

pub mod agent;
pub mod deny;
pub mod options;
pub mod resolve;
pub mod validate;

pub use agent::{AgentConfig, DispatchTarget};
pub use deny::DenyList;
pub use options::{AgentOptions, OptionsError};
pub use resolve::{resolve_agent_config, ConfigSource};
pub use validate::{ValidationError, ValidationResult};

use thiserror::Error;

/// Errors that can occur while turning an option string into a config.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid agent options: {0}")]
    Options(#[from] OptionsError),

    #[error("semantic validation failed: {0}")]
    Validation(#[from] ValidationError),
}

impl From<ConfigError> for fl_common::Error {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Options(e) => fl_common::Error::InvalidOptions(e.to_string()),
            ConfigError::Validation(e) => fl_common::Error::Config(e.to_string()),
        }
    }
}

/// Parse, resolve and validate an agent option string in one step.
///
/// This is what both activation entry points call.
pub fn load_agent_config(raw: &str) -> Result<AgentConfig, ConfigError> {
    let options: AgentOptions = raw.parse()?;
    let config = resolve_agent_config(&options)?;
    Ok(config)
}
