//! Configuration types.

use crate::error::ConfigError;

/// Name of the built-in header-match chain.
pub const HEADER_MATCH_CHAIN: &str = "header-match";

/// Chain configuration for inbound message processing.
#[derive(Debug, Clone)]
pub struct ChainConfig {
    /// Site-wide header checks, one `header: pattern` pair per line.
    pub header_checks: String,
    /// Chain that header-match hits divert to, and the target of any jump
    /// link without an explicit chain.
    pub jump_chain: String,
    /// Chain each message starts walking from.
    pub start_chain: String,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            header_checks: String::new(),
            jump_chain: "hold".to_string(),
            start_chain: HEADER_MATCH_CHAIN.to_string(),
        }
    }
}

impl ChainConfig {
    /// Build config from environment variables.
    ///
    /// `LIST_HEADER_CHECKS_FILE` takes precedence over the inline
    /// `LIST_HEADER_CHECKS` text.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let header_checks = match std::env::var("LIST_HEADER_CHECKS_FILE") {
            Ok(path) => std::fs::read_to_string(path)?,
            Err(_) => std::env::var("LIST_HEADER_CHECKS").unwrap_or_default(),
        };

        let jump_chain = std::env::var("LIST_JUMP_CHAIN").unwrap_or(defaults.jump_chain);
        let start_chain = std::env::var("LIST_START_CHAIN").unwrap_or(defaults.start_chain);

        let config = Self {
            header_checks,
            jump_chain,
            start_chain,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject empty chain names.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (key, value) in [
            ("jump_chain", &self.jump_chain),
            ("start_chain", &self.start_chain),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: "chain name must not be empty".to_string(),
                });
            }
        }
        Ok(())
    }
}
