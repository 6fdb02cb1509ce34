//! Error Types

use thiserror::Error;

/// Configuration loading and validation failures
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

/// Errors surfaced by the population controller
#[derive(Debug, Error)]
pub enum SimError {
    /// A state invariant broke mid-run. Fatal: the run must not continue.
    #[error("invariant violated for {agent}: {detail}")]
    InvariantViolation { agent: String, detail: String },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl SimError {
    pub fn invariant(agent: impl ToString, detail: impl Into<String>) -> Self {
        SimError::InvariantViolation {
            agent: agent.to_string(),
            detail: detail.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_config_lists_every_problem() {
        let err = ConfigError::Invalid(vec!["a is wrong".into(), "b is wrong".into()]);
        assert_eq!(err.to_string(), "invalid configuration: a is wrong; b is wrong");
    }

    #[test]
    fn test_invariant_message() {
        let err = SimError::invariant("agent_000001", "energy 120 out of range");
        assert!(err.to_string().contains("agent_000001"));
    }
}
