//! Error types for list-chains.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Rule error: {0}")]
    Rule(#[from] RuleError),

    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    #[error("Autoresponder error: {0}")]
    Responder(#[from] ResponderError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),
}

/// Rule construction and registration errors.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    /// A rule with this name is already registered. Always a lifecycle bug.
    #[error("Duplicate rule: {name} [{description}]")]
    Duplicate { name: String, description: String },

    #[error("Invalid pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Rule {name} is not registered")]
    Unknown { name: String },
}

/// Chain assembly and dispatch errors.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("Chain {name} is not registered")]
    UnknownChain { name: String },

    #[error("Chain {name} is already registered")]
    DuplicateChain { name: String },

    #[error("Chain cycle detected: jump to {target} after visiting {}", path.join(" -> "))]
    Cycle { target: String, path: Vec<String> },

    #[error(transparent)]
    Rule(#[from] RuleError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Outbound notification delivery errors.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Invalid address {address:?}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Failed to build message: {0}")]
    Build(String),

    #[error("Send failed: {0}")]
    SendFailed(String),
}

/// Template rendering errors (missing keys are not errors).
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("Unterminated placeholder at byte {offset}")]
    Unterminated { offset: usize },

    #[error("Invalid placeholder {placeholder:?} at byte {offset}")]
    InvalidPlaceholder { placeholder: String, offset: usize },
}

/// Autoresponder errors.
#[derive(Debug, thiserror::Error)]
pub enum ResponderError {
    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
