// crates/types/src/error.rs
use thiserror::Error;

/// Errors building or editing a [`crate::JobConfig`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("unknown model profile: {0}")]
    UnknownProfile(String),

    #[error("stem '{stem}' is not produced by profile {profile}")]
    UnknownStem { stem: String, profile: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::UnknownProfile("htdemucs".into());
        assert_eq!(err.to_string(), "unknown model profile: htdemucs");
    }
}
