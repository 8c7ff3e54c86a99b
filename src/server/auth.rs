//! Bearer token authentication.
//!
//! Requests to the image API carry `Authorization: Bearer <token>` where the
//! token names a user and an expiry, signed with the server secret:
//!
//! ```text
//! token     = "{user_id}.{expiry}.{signature}"
//! signature = hex(HMAC-SHA256(secret_key, "{user_id}.{expiry}"))
//! ```
//!
//! # Security Properties
//!
//! - **Time-limited**: tokens carry an absolute Unix expiry
//! - **Constant-time comparison**: signatures are compared with `subtle`
//! - **Live users only**: a valid token for a deleted user is rejected
//!
//! # Example
//!
//! ```rust
//! use pixhost::server::auth::TokenAuth;
//! use std::time::Duration;
//!
//! let auth = TokenAuth::new("my-secret-key");
//! let token = auth.issue(42, Duration::from_secs(3600));
//! assert_eq!(auth.verify(&token).unwrap(), 42);
//! ```

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use super::handlers::{AppState, ErrorResponse};
use crate::store::User;

// =============================================================================
// Types
// =============================================================================

/// HMAC-SHA256 type alias
type HmacSha256 = Hmac<Sha256>;

/// Authentication error types. All map to 401.
#[derive(Debug, Clone)]
pub enum AuthError {
    /// No `Authorization: Bearer` header
    MissingToken,

    /// Token is not `{user_id}.{expiry}.{hex}`
    MalformedToken,

    /// Token has expired
    Expired {
        /// When the token expired
        expired_at: u64,
        /// Current time
        current_time: u64,
    },

    /// Signature does not match
    InvalidSignature,

    /// Token is valid but the user no longer exists
    UnknownUser { user_id: i64 },

    /// The user could not be loaded
    Unavailable(String),
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::MissingToken => write!(f, "Missing bearer token"),
            AuthError::MalformedToken => write!(f, "Malformed bearer token"),
            AuthError::Expired {
                expired_at,
                current_time,
            } => write!(
                f,
                "Token expired at {} (current time: {})",
                expired_at, current_time
            ),
            AuthError::InvalidSignature => write!(f, "Invalid token signature"),
            AuthError::UnknownUser { user_id } => write!(f, "Unknown user {}", user_id),
            AuthError::Unavailable(reason) => write!(f, "Authentication unavailable: {}", reason),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            AuthError::MissingToken => (StatusCode::UNAUTHORIZED, "missing_token"),
            AuthError::MalformedToken => (StatusCode::UNAUTHORIZED, "malformed_token"),
            AuthError::Expired { .. } => (StatusCode::UNAUTHORIZED, "token_expired"),
            AuthError::InvalidSignature => (StatusCode::UNAUTHORIZED, "invalid_signature"),
            AuthError::UnknownUser { .. } => (StatusCode::UNAUTHORIZED, "unknown_user"),
            AuthError::Unavailable(_) => (StatusCode::INTERNAL_SERVER_ERROR, "auth_unavailable"),
        };
        let message = self.to_string();

        // Forged signatures are worth a warning; expiry and missing headers are routine
        match &self {
            AuthError::InvalidSignature | AuthError::Unavailable(_) => {
                warn!(
                    error_type = error_type,
                    status = status.as_u16(),
                    "Authentication failed: {}",
                    message
                );
            }
            _ => {
                debug!(
                    error_type = error_type,
                    status = status.as_u16(),
                    "Authentication failed: {}",
                    message
                );
            }
        }

        let error_response = ErrorResponse::with_status(error_type, message, status);
        (status, Json(error_response)).into_response()
    }
}

// =============================================================================
// Token Authentication
// =============================================================================

/// Issues and verifies signed bearer tokens.
#[derive(Clone)]
pub struct TokenAuth {
    /// Secret key for HMAC computation
    secret_key: Vec<u8>,
}

impl TokenAuth {
    /// Create a new authenticator. The secret should be at least 32 bytes.
    pub fn new(secret_key: impl AsRef<[u8]>) -> Self {
        Self {
            secret_key: secret_key.as_ref().to_vec(),
        }
    }

    /// Issue a token for `user_id` valid for `ttl`.
    pub fn issue(&self, user_id: i64, ttl: Duration) -> String {
        self.issue_with_expiry(user_id, unix_now() + ttl.as_secs())
    }

    /// Issue a token that expires at a specific Unix timestamp.
    pub fn issue_with_expiry(&self, user_id: i64, expiry: u64) -> String {
        let payload = format!("{}.{}", user_id, expiry);
        let signature = hex::encode(self.compute_signature(&payload));
        format!("{}.{}", payload, signature)
    }

    /// Verify a token and return the user id it names.
    pub fn verify(&self, token: &str) -> Result<i64, AuthError> {
        let mut parts = token.split('.');
        let (Some(user_part), Some(expiry_part), Some(signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(AuthError::MalformedToken);
        };

        let user_id: i64 = user_part.parse().map_err(|_| AuthError::MalformedToken)?;
        let expiry: u64 = expiry_part.parse().map_err(|_| AuthError::MalformedToken)?;
        let provided = hex::decode(signature).map_err(|_| AuthError::MalformedToken)?;

        // Check expiry first
        let current_time = unix_now();
        if current_time > expiry {
            return Err(AuthError::Expired {
                expired_at: expiry,
                current_time,
            });
        }

        let expected = self.compute_signature(&format!("{}.{}", user_part, expiry_part));
        if provided.ct_eq(&expected).into() {
            Ok(user_id)
        } else {
            Err(AuthError::InvalidSignature)
        }
    }

    fn compute_signature(&self, payload: &str) -> Vec<u8> {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret_key).expect("HMAC can take key of any size");
        mac.update(payload.as_bytes());
        mac.finalize().into_bytes().to_vec()
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Extract the token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header_value: &str) -> Option<&str> {
    let (scheme, token) = header_value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

// =============================================================================
// Axum Middleware
// =============================================================================

/// The authenticated user, inserted into request extensions by
/// [`auth_middleware`].
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

/// Axum middleware that verifies the bearer token, loads the user and makes
/// it available to handlers as `Extension<CurrentUser>`.
///
/// # Example
///
/// ```ignore
/// use axum::{Router, middleware};
/// use pixhost::server::auth::auth_middleware;
///
/// let app = Router::new()
///     .route("/images", get(list_images_handler))
///     .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));
/// ```
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or(AuthError::MissingToken)?;

    let token = bearer_token(header).ok_or(AuthError::MalformedToken)?;
    let user_id = state.auth.verify(token)?;

    let user = state
        .store
        .get_user(user_id)
        .map_err(|e| AuthError::Unavailable(e.to_string()))?
        .ok_or(AuthError::UnknownUser { user_id })?;

    request.extensions_mut().insert(CurrentUser(user));

    Ok(next.run(request).await)
}

// =============================================================================
// Tests
// =============================================================================
