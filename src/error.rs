use thiserror::Error;

/// Errors raised by the blob store and the record store.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    /// Blob or record does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Local filesystem error
    #[error("I/O error: {0}")]
    Io(String),

    /// Error from S3 or S3-compatible storage
    #[error("S3 error: {0}")]
    S3(String),

    /// SQLite error
    #[error("Database error: {0}")]
    Database(String),
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::QueryReturnedNoRows => StorageError::NotFound("record".to_string()),
            other => StorageError::Database(other.to_string()),
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            StorageError::NotFound(err.to_string())
        } else {
            StorageError::Io(err.to_string())
        }
    }
}

/// Errors produced while deriving thumbnails or binary images.
#[derive(Debug, Clone, Error)]
pub enum DerivationError {
    /// Source is not PNG/JPEG or could not be decoded/encoded (should map to HTTP 400)
    #[error("Unsupported format: {reason}")]
    UnsupportedFormat { reason: String },

    /// Decode/encode did not finish within the processing budget
    #[error("Image processing timed out after {seconds}s")]
    Timeout { seconds: u64 },
}

impl DerivationError {
    pub(crate) fn unsupported(reason: impl Into<String>) -> Self {
        DerivationError::UnsupportedFormat {
            reason: reason.into(),
        }
    }
}

/// Errors from image upload, retrieval and deletion.
#[derive(Debug, Clone, Error)]
pub enum ImageError {
    /// Image does not exist or belongs to another user
    #[error("Image not found")]
    NotFound,

    /// Title is empty or too long
    #[error("Invalid title: {reason}")]
    InvalidTitle { reason: String },

    /// Thumbnail generation failed, nothing was saved
    #[error("Thumbnail generation failed: {0}")]
    IncompleteDerivation(#[from] DerivationError),

    /// Blob or record store failure
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Errors from binary link creation.
#[derive(Debug, Clone, Error)]
pub enum LinkError {
    /// Source image does not exist or belongs to another user
    #[error("Image not found")]
    NotFound,

    /// The user's tier does not allow binary links
    #[error("Account tier '{tier}' does not allow expiring links to binary images")]
    PermissionDenied { tier: String },

    /// Requested TTL is out of range or not a multiple of the step
    #[error("Invalid expiring time: {ttl} (must be a multiple of {step} between {min} and {max} seconds)")]
    InvalidTtl { ttl: i64, min: i64, max: i64, step: i64 },

    /// Binary variant could not be derived
    #[error("Binary image generation failed: {0}")]
    Derivation(#[from] DerivationError),

    /// Blob or record store failure
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Tier authoring and command-line configuration errors.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Tier definition violates a constraint
    #[error("Invalid tier '{title}': {reason}")]
    InvalidTier { title: String, reason: String },

    /// Tier file could not be read or parsed
    #[error("Failed to load tiers: {0}")]
    TierFile(String),

    /// Time zone could not be parsed
    #[error("Invalid time zone '{0}' (expected UTC, Z or +HH:MM)")]
    InvalidTimeZone(String),
}

/// Failure while authoring a tier.
#[derive(Debug, Clone, Error)]
pub enum TierAuthoringError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
