//! Error types for Gramcast

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, GramcastError>;

#[derive(Error, Debug)]
pub enum GramcastError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Upload error: {0}")]
    Upload(#[from] UploadError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Transcode error: {0}")]
    Transcode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl GramcastError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            GramcastError::InvalidInput(_) => 3,
            GramcastError::Credential(CredentialError::Invalid(_)) => 2,
            GramcastError::Credential(_) => 1,
            GramcastError::Platform(PlatformError::Api { code: 190, .. }) => 2,
            GramcastError::Platform(_) => 1,
            GramcastError::Upload(_) => 1,
            GramcastError::Config(_) => 1,
            GramcastError::Transcode(_) => 1,
            GramcastError::Io(_) => 1,
        }
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

    #[error("Missing secret {0} (set it in .env, the environment or the keyring)")]
    MissingSecret(String),

    #[error("Invalid duration for {field}: {value}")]
    InvalidDuration { field: String, value: String },

    #[error("Media folder not readable: {}", .0.display())]
    MediaFolder(PathBuf),
}

#[derive(Error, Debug, Clone)]
pub enum UploadError {
    #[error("Failed to upload {}: {reason}", path.display())]
    Failed { path: PathBuf, reason: String },

    #[error("No media files were successfully uploaded ({attempted} attempted)")]
    NothingUploaded { attempted: usize },

    #[error("{failed} of {attempted} uploads failed; refusing to post a partial set")]
    Partial { failed: usize, attempted: usize },

    #[error("Uploader is not configured: {0}")]
    NotConfigured(String),
}

/// Errors reported by the graph API or raised while talking to it
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlatformError {
    /// The platform has not finished processing the media yet (error code 9007)
    #[error("Media still processing: {0}")]
    Processing(String),

    #[error("Graph API error {code}: {message}")]
    Api {
        code: i64,
        subcode: Option<i64>,
        message: String,
    },

    /// A response arrived but did not carry the expected identifier field
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Media processing failed: {0}")]
    ProcessingFailed(String),

    #[error("Gave up waiting for {operation} after {attempts} attempts")]
    Timeout { operation: String, attempts: u32 },
}

impl PlatformError {
    /// Graph error code for "media is not ready to be published"
    pub const MEDIA_NOT_READY: i64 = 9007;

    /// Whether retrying the same call later can succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, PlatformError::Processing(_))
    }
}

#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("Access token is invalid or expired: {0}")]
    Invalid(String),

    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("Secret store '{backend}' failed: {reason}")]
    Store { backend: String, reason: String },
}
