//! Account tiers and the registry that resolves a user's effective policy.
//!
//! A tier is authored by administrative configuration and only ever read by the
//! derivation, visibility and link rules. The category flags (`is_basic`,
//! `is_premium`, ...) are descriptive: behavior reads the capability fields
//! alone, through [`TierPolicy`].
//!
//! # Tier File
//!
//! Tiers can be loaded from a JSON array:
//!
//! ```json
//! [
//!   {"title": "Basic", "is_basic": true, "thumb_size1": 200},
//!   {"title": "Enterprise", "is_enterprise": true, "thumb_size1": 400,
//!    "thumb_size2": 200, "allow_original_access": true, "allow_binary_link": true}
//! ]
//! ```

mod registry;

pub use registry::TierRegistry;

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Primary thumbnail bound used when a user has no tier.
pub const DEFAULT_THUMB_SIZE: u32 = 200;

/// Longest tier title accepted.
pub const MAX_TITLE_LEN: usize = 50;

/// A named configuration bundle controlling derivative sizes and access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountTier {
    pub title: String,

    #[serde(default)]
    pub is_basic: bool,
    #[serde(default)]
    pub is_premium: bool,
    #[serde(default)]
    pub is_enterprise: bool,
    #[serde(default)]
    pub is_custom: bool,

    /// Longest-edge bound for the primary thumbnail
    pub thumb_size1: u32,

    /// Longest-edge bound for the secondary thumbnail, if the tier gets one
    #[serde(default)]
    pub thumb_size2: Option<u32>,

    /// Whether the original image URL is visible in API responses
    #[serde(default)]
    pub allow_original_access: bool,

    /// Whether expiring binary links may be created
    #[serde(default)]
    pub allow_binary_link: bool,
}

impl AccountTier {
    /// Check the authoring constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidTier {
            title: self.title.clone(),
            reason: reason.to_string(),
        };

        if self.title.trim().is_empty() {
            return Err(invalid("title must not be empty"));
        }
        if self.title.chars().count() > MAX_TITLE_LEN {
            return Err(invalid("title is longer than 50 characters"));
        }
        if self.thumb_size1 == 0 {
            return Err(invalid("thumb_size1 must be positive"));
        }
        if self.thumb_size2 == Some(0) {
            return Err(invalid("thumb_size2 must be positive when set"));
        }
        Ok(())
    }

    /// The capability record derived from this tier.
    pub fn policy(&self) -> TierPolicy {
        TierPolicy {
            tier: Some(self.title.clone()),
            thumb_size1: self.thumb_size1,
            thumb_size2: self.thumb_size2,
            allow_original_access: self.allow_original_access,
            allow_binary_link: self.allow_binary_link,
        }
    }
}

/// Effective capabilities of a user, resolved from their tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierPolicy {
    /// Title of the tier this policy came from, `None` for the fallback
    pub tier: Option<String>,
    pub thumb_size1: u32,
    pub thumb_size2: Option<u32>,
    pub allow_original_access: bool,
    pub allow_binary_link: bool,
}

impl TierPolicy {
    /// Policy for users without a tier: one thumbnail, nothing else.
    pub fn fail_closed() -> Self {
        Self {
            tier: None,
            thumb_size1: DEFAULT_THUMB_SIZE,
            thumb_size2: None,
            allow_original_access: false,
            allow_binary_link: false,
        }
    }

    /// Name used in log lines and error messages.
    pub fn label(&self) -> &str {
        self.tier.as_deref().unwrap_or("none")
    }

    /// The thumbnail bounds this policy asks for.
    pub fn thumbnail_sizes(&self) -> ThumbnailSizes {
        ThumbnailSizes {
            primary: self.thumb_size1,
            secondary: self.thumb_size2,
        }
    }
}

/// Requested thumbnail bounds (longest edge, in pixels).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThumbnailSizes {
    pub primary: u32,
    pub secondary: Option<u32>,
}

/// The reference tiers: Basic, Premium, Enterprise and Custom.
pub fn default_tiers() -> Vec<AccountTier> {
    vec![
        AccountTier {
            title: "Basic".to_string(),
            is_basic: true,
            is_premium: false,
            is_enterprise: false,
            is_custom: false,
            thumb_size1: 200,
            thumb_size2: None,
            allow_original_access: false,
            allow_binary_link: false,
        },
        AccountTier {
            title: "Premium".to_string(),
            is_basic: false,
            is_premium: true,
            is_enterprise: false,
            is_custom: false,
            thumb_size1: 400,
            thumb_size2: Some(200),
            allow_original_access: true,
            allow_binary_link: false,
        },
        AccountTier {
            title: "Enterprise".to_string(),
            is_basic: false,
            is_premium: false,
            is_enterprise: true,
            is_custom: false,
            thumb_size1: 400,
            thumb_size2: Some(200),
            allow_original_access: true,
            allow_binary_link: true,
        },
        AccountTier {
            title: "Custom".to_string(),
            is_basic: false,
            is_premium: false,
            is_enterprise: false,
            is_custom: true,
            thumb_size1: 300,
            thumb_size2: Some(600),
            allow_original_access: true,
            allow_binary_link: true,
        },
    ]
}

/// Parse and validate a JSON tier list.
pub fn parse_tiers(json: &str) -> Result<Vec<AccountTier>, ConfigError> {
    let tiers: Vec<AccountTier> =
        serde_json::from_str(json).map_err(|e| ConfigError::TierFile(e.to_string()))?;

    for (i, tier) in tiers.iter().enumerate() {
        tier.validate()?;
        if tiers[..i].iter().any(|other| other.title == tier.title) {
            return Err(ConfigError::InvalidTier {
                title: tier.title.clone(),
                reason: "duplicate title".to_string(),
            });
        }
    }

    Ok(tiers)
}

/// Read a JSON tier list from disk.
pub fn load_tiers_file(path: &Path) -> Result<Vec<AccountTier>, ConfigError> {
    let json = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::TierFile(format!("{}: {}", path.display(), e)))?;
    parse_tiers(&json)
}
