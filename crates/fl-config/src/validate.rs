//! Configuration validation errors and semantic validation.

use crate::agent::AgentConfig;
use thiserror::Error;

/// Validation result type.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Configuration validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Semantic validation failed: {0}")]
    SemanticError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl ValidationError {
    /// Error code for structured error reporting.
    pub fn code(&self) -> u32 {
        match self {
            ValidationError::SemanticError(_) => 63,
            ValidationError::MissingField(_) => 64,
            ValidationError::InvalidValue { .. } => 65,
        }
    }
}

/// Validate an agent configuration semantically.
pub fn validate_agent_config(config: &AgentConfig) -> ValidationResult<()> {
    validate_probability(config.probability)?;

    if config.debug_log.as_os_str().is_empty() {
        return Err(ValidationError::InvalidValue {
            field: "log".to_string(),
            message: "debug log path must not be empty".to_string(),
        });
    }

    // Compiling catches empty entries and broken patterns.
    let deny = config.deny_list()?;

    if config.dispatch.owner.is_empty() || config.dispatch.name.is_empty() {
        return Err(ValidationError::MissingField("dispatch".to_string()));
    }

    // A dispatch owner the rewriter would instrument recurses into itself.
    if !deny.is_denied(&config.dispatch.owner) {
        return Err(ValidationError::SemanticError(format!(
            "dispatch owner {} is not covered by the deny-list",
            config.dispatch.owner
        )));
    }

    Ok(())
}

/// Validate an injection probability.
pub fn validate_probability(probability: f64) -> ValidationResult<()> {
    if !probability.is_finite() || !(0.0..=1.0).contains(&probability) {
        return Err(ValidationError::InvalidValue {
            field: "probability".to_string(),
            message: format!("Must be in [0, 1], got {}", probability),
        });
    }
    Ok(())
}
