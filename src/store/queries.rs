use chrono::{DateTime, FixedOffset};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row};

use super::models::{normalize_email, BinaryImageLink, ImageRecord, NewBinaryLink, NewImage, User};
use super::RecordStore;
use crate::derive::SourceFormat;
use crate::error::StorageError;
use crate::storage::BlobRef;
use crate::tier::AccountTier;

const TIER_COLUMNS: &str = "title, is_basic, is_premium, is_enterprise, is_custom, \
     thumb_size1, thumb_size2, allow_original_access, allow_binary_link";

const USER_COLUMNS: &str = "id, email, name, tier, created_at";

const IMAGE_COLUMNS: &str =
    "id, owner_id, title, format, original, thumbnail1, thumbnail2, created_at";

const LINK_COLUMNS: &str =
    "id, owner_id, image_id, binary_image, ttl_seconds, created_at, expiration";

impl RecordStore {
    // -- Tiers --

    /// Insert a tier or update the one with the same title. Users keep their
    /// reference either way.
    pub fn upsert_tier(&self, tier: &AccountTier) -> Result<(), StorageError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO tiers (title, is_basic, is_premium, is_enterprise, is_custom,
                                    thumb_size1, thumb_size2, allow_original_access, allow_binary_link)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(title) DO UPDATE SET
                    is_basic = excluded.is_basic,
                    is_premium = excluded.is_premium,
                    is_enterprise = excluded.is_enterprise,
                    is_custom = excluded.is_custom,
                    thumb_size1 = excluded.thumb_size1,
                    thumb_size2 = excluded.thumb_size2,
                    allow_original_access = excluded.allow_original_access,
                    allow_binary_link = excluded.allow_binary_link",
                rusqlite::params![
                    tier.title,
                    tier.is_basic,
                    tier.is_premium,
                    tier.is_enterprise,
                    tier.is_custom,
                    tier.thumb_size1,
                    tier.thumb_size2,
                    tier.allow_original_access,
                    tier.allow_binary_link,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_tier(&self, title: &str) -> Result<Option<AccountTier>, StorageError> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {} FROM tiers WHERE title = ?1", TIER_COLUMNS),
                [title],
                tier_from_row,
            )
            .optional()
        })
    }

    pub fn list_tiers(&self) -> Result<Vec<AccountTier>, StorageError> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {} FROM tiers ORDER BY title", TIER_COLUMNS))?;
            let rows = stmt
                .query_map([], tier_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Delete a tier. Users on it fall back to no tier. Returns whether the
    /// tier existed.
    pub fn delete_tier(&self, title: &str) -> Result<bool, StorageError> {
        self.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM tiers WHERE title = ?1", [title])?;
            Ok(deleted > 0)
        })
    }

    // -- Users --

    /// Create a user. The email is normalized before insertion; a tier, when
    /// given, must already exist.
    pub fn create_user(
        &self,
        email: &str,
        name: &str,
        tier: Option<&str>,
        created_at: DateTime<FixedOffset>,
    ) -> Result<User, StorageError> {
        let email = normalize_email(email)
            .ok_or_else(|| StorageError::Database(format!("invalid email address '{}'", email)))?;

        if let Some(title) = tier {
            if self.get_tier(title)?.is_none() {
                return Err(StorageError::NotFound(format!("tier '{}'", title)));
            }
        }

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (email, name, tier, created_at) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![email, name, tier, created_at.to_rfc3339()],
            )?;
            Ok(User {
                id: conn.last_insert_rowid(),
                email,
                name: name.to_string(),
                tier: tier.map(str::to_string),
                created_at,
            })
        })
    }

    pub fn get_user(&self, id: i64) -> Result<Option<User>, StorageError> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
                [id],
                user_from_row,
            )
            .optional()
        })
    }

    pub fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StorageError> {
        let Some(email) = normalize_email(email) else {
            return Ok(None);
        };
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {} FROM users WHERE email = ?1", USER_COLUMNS),
                [email],
                user_from_row,
            )
            .optional()
        })
    }

    pub fn list_users(&self) -> Result<Vec<User>, StorageError> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {} FROM users ORDER BY id", USER_COLUMNS))?;
            let rows = stmt
                .query_map([], user_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Assign (or clear) a user's tier. Returns whether the user exists.
    pub fn set_user_tier(&self, user_id: i64, tier: Option<&str>) -> Result<bool, StorageError> {
        if let Some(title) = tier {
            if self.get_tier(title)?.is_none() {
                return Err(StorageError::NotFound(format!("tier '{}'", title)));
            }
        }

        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE users SET tier = ?1 WHERE id = ?2",
                rusqlite::params![tier, user_id],
            )?;
            Ok(updated > 0)
        })
    }

    /// Delete a user with their images and links. Returns the blob references
    /// those records held, or `None` if the user does not exist.
    pub fn delete_user(&self, user_id: i64) -> Result<Option<Vec<BlobRef>>, StorageError> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;

            let exists = tx
                .query_row("SELECT 1 FROM users WHERE id = ?1", [user_id], |_| Ok(()))
                .optional()?
                .is_some();
            if !exists {
                return Ok(None);
            }

            let mut refs: Vec<BlobRef> = query_images(&tx, user_id)?
                .iter()
                .flat_map(ImageRecord::blob_refs)
                .collect();

            {
                let mut stmt =
                    tx.prepare("SELECT binary_image FROM binary_links WHERE owner_id = ?1")?;
                let links = stmt
                    .query_map([user_id], |row| row.get::<_, String>(0).map(BlobRef::new))?
                    .collect::<Result<Vec<_>, _>>()?;
                refs.extend(links);
            }

            // Images and links go with the user
            tx.execute("DELETE FROM users WHERE id = ?1", [user_id])?;
            tx.commit()?;

            Ok(Some(refs))
        })
    }

    // -- Images --

    pub fn insert_image(&self, image: &NewImage) -> Result<ImageRecord, StorageError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO images (owner_id, title, format, original, thumbnail1, thumbnail2, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    image.owner_id,
                    image.title,
                    image.format.as_str(),
                    image.original.as_str(),
                    image.thumbnail1.as_str(),
                    image.thumbnail2.as_ref().map(BlobRef::as_str),
                    image.created_at.to_rfc3339(),
                ],
            )?;
            Ok(ImageRecord {
                id: conn.last_insert_rowid(),
                owner_id: image.owner_id,
                title: image.title.clone(),
                format: image.format,
                original: image.original.clone(),
                thumbnail1: Some(image.thumbnail1.clone()),
                thumbnail2: image.thumbnail2.clone(),
                created_at: image.created_at,
            })
        })
    }

    /// Owner-scoped lookup: another user's image is simply absent.
    pub fn get_image(&self, owner_id: i64, id: i64) -> Result<Option<ImageRecord>, StorageError> {
        self.with_conn(|conn| query_image(conn, owner_id, id))
    }

    /// Owner's images, newest first.
    pub fn list_images(&self, owner_id: i64) -> Result<Vec<ImageRecord>, StorageError> {
        self.with_conn(|conn| query_images(conn, owner_id))
    }

    /// Owner-scoped delete. Returns the deleted record so its blobs can be
    /// removed.
    pub fn delete_image(
        &self,
        owner_id: i64,
        id: i64,
    ) -> Result<Option<ImageRecord>, StorageError> {
        self.with_conn(|conn| {
            let Some(record) = query_image(conn, owner_id, id)? else {
                return Ok(None);
            };
            conn.execute(
                "DELETE FROM images WHERE id = ?1 AND owner_id = ?2",
                [id, owner_id],
            )?;
            Ok(Some(record))
        })
    }

    // -- Binary links --

    pub fn insert_link(&self, link: &NewBinaryLink) -> Result<BinaryImageLink, StorageError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO binary_links (owner_id, image_id, binary_image, ttl_seconds, created_at, expiration)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    link.owner_id,
                    link.image_id,
                    link.binary.as_str(),
                    link.ttl_seconds,
                    link.created_at.to_rfc3339(),
                    link.expiration.to_rfc3339(),
                ],
            )?;
            Ok(BinaryImageLink {
                id: conn.last_insert_rowid(),
                owner_id: link.owner_id,
                image_id: Some(link.image_id),
                binary: link.binary.clone(),
                ttl_seconds: link.ttl_seconds,
                created_at: link.created_at,
                expiration: link.expiration,
            })
        })
    }

    pub fn get_link(&self, id: i64) -> Result<Option<BinaryImageLink>, StorageError> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {} FROM binary_links WHERE id = ?1", LINK_COLUMNS),
                [id],
                link_from_row,
            )
            .optional()
        })
    }

    /// The link that exposes `binary`, if any.
    pub fn find_link_by_blob(
        &self,
        binary: &BlobRef,
    ) -> Result<Option<BinaryImageLink>, StorageError> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!(
                    "SELECT {} FROM binary_links WHERE binary_image = ?1",
                    LINK_COLUMNS
                ),
                [binary.as_str()],
                link_from_row,
            )
            .optional()
        })
    }

    /// Ids of every link, oldest first.
    pub fn list_link_ids(&self) -> Result<Vec<i64>, StorageError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id FROM binary_links ORDER BY id")?;
            let ids = stmt
                .query_map([], |row| row.get(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(ids)
        })
    }

    /// Links owned by `owner_id`, newest first.
    pub fn list_links(&self, owner_id: i64) -> Result<Vec<BinaryImageLink>, StorageError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM binary_links WHERE owner_id = ?1 ORDER BY id DESC",
                LINK_COLUMNS
            ))?;
            let rows = stmt
                .query_map([owner_id], link_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Returns whether a row was deleted.
    pub fn delete_link(&self, id: i64) -> Result<bool, StorageError> {
        self.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM binary_links WHERE id = ?1", [id])?;
            Ok(deleted > 0)
        })
    }
}

fn query_image(
    conn: &Connection,
    owner_id: i64,
    id: i64,
) -> Result<Option<ImageRecord>, rusqlite::Error> {
    conn.query_row(
        &format!(
            "SELECT {} FROM images WHERE id = ?1 AND owner_id = ?2",
            IMAGE_COLUMNS
        ),
        [id, owner_id],
        image_from_row,
    )
    .optional()
}

fn query_images(conn: &Connection, owner_id: i64) -> Result<Vec<ImageRecord>, rusqlite::Error> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM images WHERE owner_id = ?1 ORDER BY id DESC",
        IMAGE_COLUMNS
    ))?;
    let rows = stmt
        .query_map([owner_id], image_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn tier_from_row(row: &Row<'_>) -> Result<AccountTier, rusqlite::Error> {
    Ok(AccountTier {
        title: row.get(0)?,
        is_basic: row.get(1)?,
        is_premium: row.get(2)?,
        is_enterprise: row.get(3)?,
        is_custom: row.get(4)?,
        thumb_size1: row.get(5)?,
        thumb_size2: row.get(6)?,
        allow_original_access: row.get(7)?,
        allow_binary_link: row.get(8)?,
    })
}

fn user_from_row(row: &Row<'_>) -> Result<User, rusqlite::Error> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        name: row.get(2)?,
        tier: row.get(3)?,
        created_at: timestamp_at(row, 4)?,
    })
}

fn image_from_row(row: &Row<'_>) -> Result<ImageRecord, rusqlite::Error> {
    let format: String = row.get(3)?;
    let format = SourceFormat::parse(&format).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            Type::Text,
            format!("unknown image format '{}'", format).into(),
        )
    })?;

    Ok(ImageRecord {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        title: row.get(2)?,
        format,
        original: BlobRef::new(row.get::<_, String>(4)?),
        thumbnail1: row.get::<_, Option<String>>(5)?.map(BlobRef::new),
        thumbnail2: row.get::<_, Option<String>>(6)?.map(BlobRef::new),
        created_at: timestamp_at(row, 7)?,
    })
}

fn link_from_row(row: &Row<'_>) -> Result<BinaryImageLink, rusqlite::Error> {
    Ok(BinaryImageLink {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        image_id: row.get(2)?,
        binary: BlobRef::new(row.get::<_, String>(3)?),
        ttl_seconds: row.get(4)?,
        created_at: timestamp_at(row, 5)?,
        expiration: timestamp_at(row, 6)?,
    })
}

fn timestamp_at(row: &Row<'_>, idx: usize) -> Result<DateTime<FixedOffset>, rusqlite::Error> {
    let text: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
