//! Configuration management for pixhost.
//!
//! This module provides the command-line interface:
//! - Subcommands for serving, sweeping, tier authoring and user management
//! - Environment variables with `PIXHOST_` prefix
//! - Sensible defaults for all optional settings
//!
//! # Example
//!
//! ```ignore
//! use clap::Parser;
//! use pixhost::config::{Cli, Command};
//!
//! let cli = Cli::parse();
//! if let Command::Serve(config) = cli.command {
//!     println!("Listening on {}", config.bind_address());
//! }
//! ```
//!
//! # Environment Variables
//!
//! - `PIXHOST_HOST` - Server bind address (default: 0.0.0.0)
//! - `PIXHOST_PORT` - Server port (default: 3000)
//! - `PIXHOST_PUBLIC_URL` - Base URL media links are built from
//! - `PIXHOST_DATABASE` - SQLite database path (default: pixhost.db)
//! - `PIXHOST_STORAGE_DIR` - Local blob directory
//! - `PIXHOST_S3_BUCKET` - S3 bucket for blobs (instead of a local directory)
//! - `PIXHOST_S3_ENDPOINT` - Custom S3 endpoint for S3-compatible services
//! - `PIXHOST_S3_REGION` - AWS region (default: us-east-1)
//! - `PIXHOST_S3_PREFIX` - Key prefix inside the bucket
//! - `PIXHOST_AUTH_SECRET` - HMAC secret for bearer tokens
//! - `PIXHOST_TIME_ZONE` - Zone link timestamps are kept in (default: UTC)
//! - `PIXHOST_JPEG_QUALITY` - JPEG quality for derivatives (default: 80)
//! - `PIXHOST_DERIVATION_TIMEOUT` - Seconds allowed per derivation (default: 30)
//! - `PIXHOST_SWEEP_INTERVAL` - Seconds between in-process sweeps, 0 disables (default: 60)
//! - `PIXHOST_CACHE_MAX_AGE` - HTTP cache max-age seconds (default: 3600)

use std::path::PathBuf;

use chrono::FixedOffset;
use clap::{Args, Parser, Subcommand};

use crate::clock::parse_time_zone;
use crate::derive::{is_valid_quality, DEFAULT_JPEG_QUALITY, MAX_JPEG_QUALITY, MIN_JPEG_QUALITY};
use crate::error::ConfigError;
use crate::server::DEFAULT_MAX_UPLOAD_BYTES;

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 3000;

/// Default SQLite database path.
pub const DEFAULT_DATABASE: &str = "pixhost.db";

/// Default AWS region.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Default time zone.
pub const DEFAULT_TIME_ZONE: &str = "UTC";

/// Default derivation timeout in seconds.
pub const DEFAULT_DERIVATION_TIMEOUT_SECS: u64 = 30;

/// Default in-process sweep interval in seconds.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

/// Default HTTP cache max-age in seconds (1 hour).
pub const DEFAULT_CACHE_MAX_AGE: u32 = 3600;

/// Default lifetime of tokens issued by `user token` (30 days).
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 30 * 24 * 3600;

// =============================================================================
// CLI Arguments
// =============================================================================

/// pixhost - multi-tenant image hosting with tiered thumbnails.
#[derive(Parser, Debug, Clone)]
#[command(name = "pixhost")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the HTTP server.
    Serve(ServeConfig),

    /// Delete expired binary links once and exit.
    Sweep(SweepConfig),

    /// Author account tiers.
    Tiers(TiersConfig),

    /// Manage users and issue bearer tokens.
    User(UserConfig),
}

/// Where blobs live: a local directory or an S3 bucket.
#[derive(Args, Debug, Clone, Default)]
pub struct BlobArgs {
    /// Directory for blobs on the local filesystem.
    #[arg(long, env = "PIXHOST_STORAGE_DIR", conflicts_with = "s3_bucket")]
    pub storage_dir: Option<PathBuf>,

    /// S3 bucket for blobs.
    #[arg(long, env = "PIXHOST_S3_BUCKET")]
    pub s3_bucket: Option<String>,

    /// Custom S3 endpoint URL for S3-compatible services (MinIO, etc.).
    #[arg(long, env = "PIXHOST_S3_ENDPOINT")]
    pub s3_endpoint: Option<String>,

    /// AWS region for S3.
    #[arg(long, default_value = DEFAULT_REGION, env = "PIXHOST_S3_REGION")]
    pub s3_region: String,

    /// Key prefix inside the bucket.
    #[arg(long, env = "PIXHOST_S3_PREFIX")]
    pub s3_prefix: Option<String>,
}

/// The blob backend selected by [`BlobArgs`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlobBackend {
    Local(PathBuf),
    S3 {
        bucket: String,
        endpoint: Option<String>,
        region: String,
        prefix: Option<String>,
    },
}

impl BlobArgs {
    /// Validate that exactly one backend is configured.
    pub fn validate(&self) -> Result<(), String> {
        match (&self.storage_dir, &self.s3_bucket) {
            (Some(_), Some(_)) => {
                Err("Set either --storage-dir or --s3-bucket, not both".to_string())
            }
            (None, None) => Err(
                "No blob storage configured. Set --storage-dir (PIXHOST_STORAGE_DIR) \
                 or --s3-bucket (PIXHOST_S3_BUCKET)"
                    .to_string(),
            ),
            (None, Some(bucket)) if bucket.trim().is_empty() => {
                Err("S3 bucket name must not be empty".to_string())
            }
            _ => Ok(()),
        }
    }

    /// The configured backend, if exactly one is set.
    pub fn backend(&self) -> Option<BlobBackend> {
        match (&self.storage_dir, &self.s3_bucket) {
            (Some(dir), None) => Some(BlobBackend::Local(dir.clone())),
            (None, Some(bucket)) => Some(BlobBackend::S3 {
                bucket: bucket.clone(),
                endpoint: self.s3_endpoint.clone(),
                region: self.s3_region.clone(),
                prefix: self
                    .s3_prefix
                    .as_ref()
                    .map(|p| p.trim_matches('/').to_string())
                    .filter(|p| !p.is_empty()),
            }),
            _ => None,
        }
    }
}

// =============================================================================
// Serve
// =============================================================================

/// Configuration for the `serve` command.
#[derive(Args, Debug, Clone)]
pub struct ServeConfig {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "PIXHOST_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "PIXHOST_PORT")]
    pub port: u16,

    /// Base URL used when building media links.
    ///
    /// Defaults to http://localhost:<port> when binding to all interfaces.
    #[arg(long, env = "PIXHOST_PUBLIC_URL")]
    pub public_url: Option<String>,

    // =========================================================================
    // Storage Configuration
    // =========================================================================
    /// SQLite database holding tiers, users, images and links.
    #[arg(long, default_value = DEFAULT_DATABASE, env = "PIXHOST_DATABASE")]
    pub database: PathBuf,

    #[command(flatten)]
    pub blobs: BlobArgs,

    // =========================================================================
    // Authentication Configuration
    // =========================================================================
    /// Secret key for HMAC-SHA256 bearer tokens.
    #[arg(long, env = "PIXHOST_AUTH_SECRET")]
    pub auth_secret: Option<String>,

    // =========================================================================
    // Derivation Configuration
    // =========================================================================
    /// Zone link timestamps are kept in: UTC or a fixed offset like +02:00.
    #[arg(long, default_value = DEFAULT_TIME_ZONE, env = "PIXHOST_TIME_ZONE")]
    pub time_zone: String,

    /// JPEG quality for derivatives of JPEG sources (1-100).
    #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY, env = "PIXHOST_JPEG_QUALITY")]
    pub jpeg_quality: u8,

    /// Seconds allowed for a single derivation.
    #[arg(
        long,
        default_value_t = DEFAULT_DERIVATION_TIMEOUT_SECS,
        env = "PIXHOST_DERIVATION_TIMEOUT"
    )]
    pub derivation_timeout: u64,

    /// Seconds between in-process sweeps of expired links. 0 disables the loop.
    #[arg(long, default_value_t = DEFAULT_SWEEP_INTERVAL_SECS, env = "PIXHOST_SWEEP_INTERVAL")]
    pub sweep_interval_secs: u64,

    // =========================================================================
    // HTTP Configuration
    // =========================================================================
    /// HTTP Cache-Control max-age in seconds for originals and thumbnails.
    #[arg(long, default_value_t = DEFAULT_CACHE_MAX_AGE, env = "PIXHOST_CACHE_MAX_AGE")]
    pub cache_max_age: u32,

    /// Largest accepted upload in bytes.
    #[arg(long, default_value_t = DEFAULT_MAX_UPLOAD_BYTES, env = "PIXHOST_MAX_UPLOAD_BYTES")]
    pub max_upload_bytes: usize,

    /// Allowed CORS origins (comma-separated).
    ///
    /// If not specified, allows any origin.
    #[arg(long, env = "PIXHOST_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    // =========================================================================
    // Logging Configuration
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl ServeConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        match self.auth_secret.as_deref() {
            None | Some("") => {
                return Err("No auth secret provided. \
                     Set --auth-secret or PIXHOST_AUTH_SECRET"
                    .to_string());
            }
            _ => {}
        }

        self.blobs.validate()?;
        validate_time_zone(&self.time_zone)?;

        if !is_valid_quality(self.jpeg_quality) {
            return Err(format!(
                "jpeg_quality must be between {} and {}",
                MIN_JPEG_QUALITY, MAX_JPEG_QUALITY
            ));
        }

        if self.derivation_timeout == 0 {
            return Err("derivation_timeout must be greater than 0".to_string());
        }

        if self.max_upload_bytes == 0 {
            return Err("max_upload_bytes must be greater than 0".to_string());
        }

        if let Some(url) = &self.public_url {
            url::Url::parse(url).map_err(|e| format!("Invalid public_url '{}': {}", url, e))?;
        }

        Ok(())
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The public base URL, falling back to the bind address.
    pub fn public_url(&self) -> String {
        match &self.public_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None if self.host == "0.0.0.0" => format!("http://localhost:{}", self.port),
            None => format!("http://{}", self.bind_address()),
        }
    }

    /// The configured zone. Call `validate()` first for a friendly message.
    pub fn zone(&self) -> Result<FixedOffset, ConfigError> {
        parse_time_zone(&self.time_zone)
    }

    /// Get the auth secret, or an empty string if not set (call validate() first).
    pub fn auth_secret_or_empty(&self) -> &str {
        self.auth_secret.as_deref().unwrap_or("")
    }
}

// =============================================================================
// Sweep
// =============================================================================

/// Configuration for the `sweep` command.
#[derive(Args, Debug, Clone)]
pub struct SweepConfig {
    /// SQLite database holding the links.
    #[arg(long, default_value = DEFAULT_DATABASE, env = "PIXHOST_DATABASE")]
    pub database: PathBuf,

    #[command(flatten)]
    pub blobs: BlobArgs,

    /// Zone link timestamps are kept in.
    #[arg(long, default_value = DEFAULT_TIME_ZONE, env = "PIXHOST_TIME_ZONE")]
    pub time_zone: String,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl SweepConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.blobs.validate()?;
        validate_time_zone(&self.time_zone)
    }

    pub fn zone(&self) -> Result<FixedOffset, ConfigError> {
        parse_time_zone(&self.time_zone)
    }
}

// =============================================================================
// Tiers
// =============================================================================

/// Configuration for the `tiers` command.
///
/// Actions run in a fixed order: seed defaults, load file, delete, list.
#[derive(Args, Debug, Clone)]
pub struct TiersConfig {
    /// SQLite database to author tiers in.
    #[arg(long, default_value = DEFAULT_DATABASE, env = "PIXHOST_DATABASE")]
    pub database: PathBuf,

    /// Create or update the built-in Basic, Premium, Enterprise and Custom tiers.
    #[arg(long, default_value_t = false)]
    pub defaults: bool,

    /// Create or update the tiers in a JSON file.
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Delete the tier with this title. Its users fall back to the minimal policy.
    #[arg(long)]
    pub delete: Option<String>,

    /// Print the stored tiers.
    #[arg(long, default_value_t = false)]
    pub list: bool,
}

impl TiersConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !self.defaults && self.file.is_none() && self.delete.is_none() && !self.list {
            return Err(
                "Nothing to do. Pass --defaults, --file <path>, --delete <title> or --list"
                    .to_string(),
            );
        }
        if let Some(title) = &self.delete {
            if title.trim().is_empty() {
                return Err("--delete needs a tier title".to_string());
            }
        }
        Ok(())
    }
}

// =============================================================================
// User
// =============================================================================

/// Configuration for the `user` command.
#[derive(Args, Debug, Clone)]
pub struct UserConfig {
    /// SQLite database holding the users.
    #[arg(long, default_value = DEFAULT_DATABASE, env = "PIXHOST_DATABASE")]
    pub database: PathBuf,

    // Blob storage, needed to remove a deleted user's files
    #[command(flatten)]
    pub blobs: BlobArgs,

    /// Secret key used to sign issued tokens.
    #[arg(long, env = "PIXHOST_AUTH_SECRET")]
    pub auth_secret: Option<String>,

    #[command(subcommand)]
    pub action: UserAction,
}

#[derive(Subcommand, Debug, Clone)]
pub enum UserAction {
    /// Create a user.
    Create {
        /// Email address, unique across users.
        email: String,

        /// Display name.
        #[arg(long, default_value = "")]
        name: String,

        /// Tier title to assign.
        #[arg(long)]
        tier: Option<String>,
    },

    /// Assign a tier to a user, or clear it when no tier is given.
    SetTier {
        id: i64,
        tier: Option<String>,
    },

    /// Delete a user together with their images, links and blobs.
    Delete { id: i64 },

    /// List users.
    List,

    /// Issue a bearer token for a user.
    Token {
        id: i64,

        /// Token lifetime in seconds.
        #[arg(long, default_value_t = DEFAULT_TOKEN_TTL_SECS)]
        ttl: u64,
    },
}

impl UserConfig {
    pub fn validate(&self) -> Result<(), String> {
        match &self.action {
            UserAction::Create { email, .. } if email.trim().is_empty() => {
                Err("Email must not be empty".to_string())
            }
            UserAction::Delete { .. } => self.blobs.validate(),
            UserAction::Token { ttl, .. } => {
                if self.auth_secret.as_deref().unwrap_or("").is_empty() {
                    return Err("Issuing a token needs --auth-secret or PIXHOST_AUTH_SECRET"
                        .to_string());
                }
                if *ttl == 0 {
                    return Err("ttl must be greater than 0".to_string());
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

fn validate_time_zone(value: &str) -> Result<(), String> {
    parse_time_zone(value).map(|_| ()).map_err(|e| e.to_string())
}

// =============================================================================
// Tests
// =============================================================================
