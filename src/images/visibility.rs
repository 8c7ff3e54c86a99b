//! Read-time field filtering.
//!
//! The stored record always holds every reference it has; what a reader sees
//! is decided here, per request, from the reader's current tier. Changing a
//! user's tier changes what is visible without re-deriving anything.

use crate::storage::BlobRef;
use crate::store::ImageRecord;
use crate::tier::TierPolicy;

/// The outward-facing view of an image. Absent fields are not exposed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRepresentation {
    pub id: i64,
    pub title: String,
    pub original: Option<BlobRef>,
    pub thumbnail1: Option<BlobRef>,
    pub thumbnail2: Option<BlobRef>,
}

/// Decide which fields of `image` are visible under `policy`.
///
/// 1. id, title and the primary thumbnail (when present) are always included.
/// 2. The secondary thumbnail needs both a secondary size on the tier and a
///    stored secondary thumbnail.
/// 3. The original needs `allow_original_access`.
pub fn filter_representation(image: &ImageRecord, policy: &TierPolicy) -> ImageRepresentation {
    let thumbnail2 = match policy.thumb_size2 {
        Some(_) => image.thumbnail2.clone(),
        None => None,
    };

    let original = policy
        .allow_original_access
        .then(|| image.original.clone());

    ImageRepresentation {
        id: image.id,
        title: image.title.clone(),
        original,
        thumbnail1: image.thumbnail1.clone(),
        thumbnail2,
    }
}
