//! Error types for Podrelay

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PodrelayError>;

#[derive(Error, Debug)]
pub enum PodrelayError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Video {0} has already been posted")]
    AlreadyPosted(String),

    #[error("Notification failed: {0}")]
    Notification(String),
}

impl PodrelayError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            PodrelayError::InvalidInput(_) => 3,
            PodrelayError::Credential(_) => 3,
            PodrelayError::Platform(PlatformError::Authentication(_)) => 2,
            PodrelayError::Platform(PlatformError::MissingCredential(_)) => 2,
            PodrelayError::Platform(_) => 1,
            PodrelayError::Config(_) => 1,
            PodrelayError::Store(_) => 1,
            PodrelayError::AlreadyPosted(_) => 0,
            PodrelayError::Notification(_) => 1,
        }
    }

    /// Whether this error came from the network layer rather than a platform's answer
    pub fn is_network(&self) -> bool {
        matches!(self, PodrelayError::Platform(PlatformError::Network(_)))
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database operation failed: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Stored value is not valid JSON: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Concurrent update of {namespace}/{key} did not settle after {attempts} attempts")]
    Contention {
        namespace: String,
        key: String,
        attempts: u32,
    },

    #[error("In-memory store lock poisoned")]
    Poisoned,

    #[error("Upload failed: {0}")]
    Upload(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlatformError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Content validation failed: {0}")]
    Validation(String),

    #[error("Posting failed: {0}")]
    Posting(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("Missing credential: {0}")]
    MissingCredential(String),

    #[error("No programmatic posting path: {0}")]
    Unsupported(String),

    #[error("Timed out: {0}")]
    Timeout(String),
}

#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("Unknown platform: {0}")]
    UnknownPlatform(String),

    #[error("{platform} has no credential field named '{field}'")]
    UnknownField { platform: String, field: String },

    #[error("{platform} is not a level {level} platform")]
    WrongLevel { platform: String, level: u8 },

    #[error("No credentials stored for {0}")]
    NotFound(String),
}
