use crate::types::Sample;

const MAX_AGENT_ID_LEN: usize = 128;

/// Reasons a sample or identity is rejected before touching storage.
///
/// # Examples
///
/// ```
/// use vigil_common::validation::{validate_agent_id, ValidationError};
///
/// assert!(validate_agent_id("pc-001").is_ok());
/// assert!(matches!(validate_agent_id(""), Err(ValidationError::MissingAgentId)));
/// ```
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("agent_id is required")]
    MissingAgentId,

    #[error("agent_id is invalid: {0}")]
    InvalidAgentId(String),

    #[error("{field} must be a number between 0 and 100, got {value}")]
    OutOfRange { field: &'static str, value: f64 },

    #[error("invalid command '{0}', expected 'start' or 'stop'")]
    InvalidCommand(String),

    #[error("malformed payload: {0}")]
    Malformed(String),
}

pub fn validate_agent_id(agent_id: &str) -> Result<(), ValidationError> {
    if agent_id.trim().is_empty() {
        return Err(ValidationError::MissingAgentId);
    }
    if agent_id.chars().count() > MAX_AGENT_ID_LEN {
        return Err(ValidationError::InvalidAgentId(format!(
            "longer than {MAX_AGENT_ID_LEN} characters"
        )));
    }
    if agent_id.chars().any(|c| c.is_whitespace() || c == '/') {
        return Err(ValidationError::InvalidAgentId(
            "must not contain whitespace or '/'".to_string(),
        ));
    }
    Ok(())
}

fn validate_percent(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if value.is_finite() && (0.0..=100.0).contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::OutOfRange { field, value })
    }
}

/// Checks required fields and numeric ranges of a delivered sample.
pub fn validate_sample(sample: &Sample) -> Result<(), ValidationError> {
    validate_agent_id(&sample.agent_id)?;
    validate_percent("cpu", sample.cpu_pct)?;
    validate_percent("ram", sample.ram_pct)?;
    Ok(())
}
