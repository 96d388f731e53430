/// JWT Claims structure
///
/// Payload carried by both access and refresh tokens.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::User;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    /// Subject (username)
    pub sub: String,
    #[serde(rename = "userId")]
    pub user_id: i64,
    /// Issued at (Unix timestamp, seconds)
    pub iat: i64,
    /// Expiration time (Unix timestamp, seconds)
    pub exp: i64,
    /// Unique token id; keeps two tokens minted in the same second distinct
    pub jti: String,
}

impl Claims {
    /// Claims for `user`, valid from `issued_at` to `expires_at`
    pub fn new(user: &User, issued_at: i64, expires_at: i64) -> Self {
        Self {
            sub: user.username.clone(),
            user_id: user.id,
            iat: issued_at,
            exp: expires_at,
            jti: Uuid::new_v4().to_string(),
        }
    }

    /// A token is expired from its `exp` second onwards
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.exp <= now
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(chrono::Utc::now().timestamp())
    }
}
