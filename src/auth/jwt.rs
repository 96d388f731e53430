/// JWT Token Generation and Validation
///
/// `TokenCodec` signs and parses access and refresh tokens with a single
/// HMAC-SHA256 key fixed at startup. Signature validity and freshness are
/// separate checks: `decode`/`is_valid` never look at `exp`, `is_expired`
/// does nothing else.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

use crate::auth::claims::Claims;
use crate::configuration::JwtSettings;
use crate::error::{AppError, AuthError, ConfigError};
use crate::models::User;

/// HMAC-SHA256 needs at least 256 bits of key material
pub const MIN_KEY_BYTES: usize = 32;

/// Longest accepted token lifetime (ten years)
pub const MAX_TTL_MS: i64 = 10 * 365 * 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

/// A freshly signed token together with the claims it carries
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub claims: Claims,
    expires_at: DateTime<Utc>,
}

impl IssuedToken {
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }
}

pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenCodec {
    /// Build a codec from raw key bytes and per-kind lifetimes in milliseconds
    ///
    /// # Errors
    /// Returns a configuration error if the key is shorter than
    /// `MIN_KEY_BYTES` or a lifetime is outside `0..=MAX_TTL_MS`.
    pub fn new(key: &[u8], access_ttl_ms: i64, refresh_ttl_ms: i64) -> Result<Self, AppError> {
        if key.len() < MIN_KEY_BYTES {
            return Err(ConfigError::InvalidValue(format!(
                "jwt.secret must decode to at least {} bytes, got {}",
                MIN_KEY_BYTES,
                key.len()
            ))
            .into());
        }
        for ttl_ms in [access_ttl_ms, refresh_ttl_ms] {
            if !(0..=MAX_TTL_MS).contains(&ttl_ms) {
                return Err(ConfigError::InvalidValue(format!(
                    "token expiration must be between 0 and {} ms, got {}",
                    MAX_TTL_MS, ttl_ms
                ))
                .into());
            }
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["sub", "exp"]);

        Ok(Self {
            encoding_key: EncodingKey::from_secret(key),
            decoding_key: DecodingKey::from_secret(key),
            validation,
            access_ttl: Duration::milliseconds(access_ttl_ms),
            refresh_ttl: Duration::milliseconds(refresh_ttl_ms),
        })
    }

    /// Build a codec from settings; the secret is standard base64
    pub fn from_settings(settings: &JwtSettings) -> Result<Self, AppError> {
        let key = STANDARD.decode(settings.secret.trim()).map_err(|e| {
            ConfigError::InvalidValue(format!("jwt.secret is not valid base64: {}", e))
        })?;

        Self::new(
            &key,
            settings.access_token_expiration_ms,
            settings.refresh_token_expiration_ms,
        )
    }

    pub fn ttl(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        }
    }

    /// Sign a new token of `kind` for `user`
    ///
    /// # Errors
    /// Returns an internal error if signing fails or the expiry is not a
    /// representable date
    pub fn issue(&self, user: &User, kind: TokenKind) -> Result<IssuedToken, AppError> {
        let now = Utc::now();
        let expires_at = now
            .checked_add_signed(self.ttl(kind))
            .ok_or_else(|| AppError::Internal("Token expiry out of range".to_string()))?;
        let claims = Claims::new(user, now.timestamp(), expires_at.timestamp());

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))?;

        Ok(IssuedToken {
            token,
            claims,
            expires_at,
        })
    }

    /// Verify signature and structure, returning the claims
    ///
    /// Expiry is not checked here; see `is_expired`.
    pub fn decode(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(error = %e, "Token failed to decode");
                AuthError::InvalidToken
            })
    }

    pub fn is_valid(&self, token: &str) -> bool {
        self.decode(token).is_ok()
    }

    /// Fails closed: a token that does not decode counts as expired
    pub fn is_expired(&self, token: &str) -> bool {
        match self.decode(token) {
            Ok(claims) => claims.is_expired(),
            Err(_) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &[u8] = b"test-secret-key-at-least-32-bytes-long";

    fn user() -> User {
        User {
            id: 1,
            username: "testuser".to_string(),
            email: "test@example.com".to_string(),
            password_hash: "hash".to_string(),
            full_name: "Test User".to_string(),
            created_at: Utc::now(),
        }
    }

    fn codec() -> TokenCodec {
        TokenCodec::new(KEY, 3_600_000, 604_800_000).expect("Failed to build codec")
    }

    #[test]
    fn test_issue_and_decode_both_kinds() {
        let codec = codec();

        let access = codec.issue(&user(), TokenKind::Access).unwrap();
        let claims = codec.decode(&access.token).unwrap();
        assert_eq!(claims.sub, "testuser");
        assert_eq!(claims.user_id, 1);
        assert_eq!(claims.exp - claims.iat, 3_600);

        let refresh = codec.issue(&user(), TokenKind::Refresh).unwrap();
        let claims = codec.decode(&refresh.token).unwrap();
        assert_eq!(claims.exp - claims.iat, 604_800);
        assert_eq!(refresh.expires_at().timestamp(), claims.exp);
    }

    #[test]
    fn test_decode_is_idempotent() {
        let codec = codec();
        let issued = codec.issue(&user(), TokenKind::Access).unwrap();

        assert_eq!(codec.decode(&issued.token), codec.decode(&issued.token));
    }

    #[test]
    fn test_tokens_issued_back_to_back_differ() {
        let codec = codec();
        let a = codec.issue(&user(), TokenKind::Refresh).unwrap();
        let b = codec.issue(&user(), TokenKind::Refresh).unwrap();

        assert_ne!(a.token, b.token);
    }

    #[test]
    fn test_garbage_token() {
        let codec = codec();

        assert_eq!(codec.decode("invalid.token.here"), Err(AuthError::InvalidToken));
        assert!(!codec.is_valid("invalid.token.here"));
        assert!(codec.is_expired("invalid.token.here"));
    }

    #[test]
    fn test_tampered_token() {
        let codec = codec();
        let issued = codec.issue(&user(), TokenKind::Access).unwrap();

        let tampered = format!("{}X", issued.token);

        assert!(!codec.is_valid(&tampered));
        assert!(codec.is_expired(&tampered));
    }

    #[test]
    fn test_token_from_other_key_is_invalid() {
        let other = TokenCodec::new(b"another-secret-key-that-is-32-bytes!!", 3_600_000, 3_600_000)
            .unwrap();
        let issued = other.issue(&user(), TokenKind::Access).unwrap();

        assert!(!codec().is_valid(&issued.token));
    }

    #[test]
    fn test_zero_ttl_is_expired_but_still_valid() {
        let codec = TokenCodec::new(KEY, 0, 0).unwrap();
        let issued = codec.issue(&user(), TokenKind::Access).unwrap();

        assert!(codec.is_valid(&issued.token));
        assert!(codec.is_expired(&issued.token));
    }

    #[test]
    fn test_fresh_token_is_not_expired() {
        let codec = codec();
        let issued = codec.issue(&user(), TokenKind::Access).unwrap();

        assert!(!codec.is_expired(&issued.token));
    }

    #[test]
    fn test_out_of_range_ttl_rejected() {
        for (access, refresh) in [(-1, 1_000), (1_000, i64::MAX), (MAX_TTL_MS + 1, 1_000)] {
            let result = TokenCodec::new(KEY, access, refresh);
            assert!(
                matches!(result, Err(AppError::Config(_))),
                "accepted ttl pair ({}, {})",
                access,
                refresh
            );
        }
    }

    #[test]
    fn test_longest_ttl_still_issues() {
        let codec = TokenCodec::new(KEY, MAX_TTL_MS, MAX_TTL_MS).unwrap();
        let issued = codec.issue(&user(), TokenKind::Refresh).unwrap();

        assert_eq!(issued.expires_at().timestamp(), issued.claims.exp);
        assert!(!codec.is_expired(&issued.token));
    }

    #[test]
    fn test_short_key_rejected() {
        let result = TokenCodec::new(b"too-short", 1_000, 1_000);
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_from_settings_decodes_base64() {
        let settings = JwtSettings {
            secret: STANDARD.encode(KEY),
            access_token_expiration_ms: 60_000,
            refresh_token_expiration_ms: 120_000,
        };
        let codec = TokenCodec::from_settings(&settings).unwrap();

        assert_eq!(codec.ttl(TokenKind::Access), Duration::seconds(60));
        assert_eq!(codec.ttl(TokenKind::Refresh), Duration::seconds(120));
    }

    #[test]
    fn test_from_settings_rejects_non_base64() {
        let settings = JwtSettings {
            secret: "not base64 at all!".to_string(),
            access_token_expiration_ms: 60_000,
            refresh_token_expiration_ms: 120_000,
        };

        assert!(matches!(
            TokenCodec::from_settings(&settings),
            Err(AppError::Config(_))
        ));
    }
}
