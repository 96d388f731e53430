/// Session Lifecycle
///
/// Registration, login, refresh-token rotation and logout. The manager owns
/// the refresh-token rows: a user has at most one live row, every refresh
/// consumes the presented token, and a refresh token that fails signature,
/// expiry or ownership checks is deleted before the failure is returned.

use std::sync::Arc;

use crate::auth::jwt::{TokenCodec, TokenKind};
use crate::auth::password::CredentialVerifier;
use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AuthError};
use crate::models::{NewRefreshToken, NewUser, User};
use crate::store::{RefreshTokenStore, UserStore};

#[derive(Debug, Clone)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
    pub full_name: String,
}

/// Access and refresh token handed to a client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

pub struct SessionManager {
    users: Arc<dyn UserStore>,
    refresh_tokens: Arc<dyn RefreshTokenStore>,
    codec: Arc<TokenCodec>,
    credentials: CredentialVerifier,
}

impl SessionManager {
    pub fn new(
        users: Arc<dyn UserStore>,
        refresh_tokens: Arc<dyn RefreshTokenStore>,
        codec: Arc<TokenCodec>,
        credentials: CredentialVerifier,
    ) -> Self {
        Self {
            users,
            refresh_tokens,
            codec,
            credentials,
        }
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// Create an account. Username is checked before email; no tokens are
    /// issued.
    ///
    /// # Errors
    /// `DuplicateUsername`, `DuplicateEmail`, or a storage error
    pub async fn register(&self, registration: Registration) -> Result<User, AppError> {
        if self
            .users
            .find_by_username(&registration.username)
            .await?
            .is_some()
        {
            return Err(AuthError::DuplicateUsername.into());
        }
        if self.users.find_by_email(&registration.email).await?.is_some() {
            return Err(AuthError::DuplicateEmail.into());
        }

        let password_hash = self.credentials.hash(&registration.password)?;
        let user = self
            .users
            .insert_user(NewUser {
                username: registration.username,
                email: registration.email,
                password_hash,
                full_name: registration.full_name,
            })
            .await?;

        tracing::info!(user_id = user.id, "User registered");
        Ok(user)
    }

    /// Verify credentials and start a new session, replacing any refresh
    /// token the user already had.
    ///
    /// # Errors
    /// `InvalidCredentials` for an unknown username or a wrong password
    pub async fn login(&self, username: &str, password: &str) -> Result<TokenPair, AppError> {
        let user = self
            .users
            .find_by_username(username)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !self.credentials.verify(password, &user.password_hash)? {
            return Err(AuthError::InvalidCredentials.into());
        }

        let access = self.codec.issue(&user, TokenKind::Access)?;
        let refresh = self.codec.issue(&user, TokenKind::Refresh)?;

        self.refresh_tokens
            .replace_for_user(NewRefreshToken {
                expires_at: refresh.expires_at(),
                token: refresh.token.clone(),
                user_id: user.id,
            })
            .await?;

        tracing::info!(user_id = user.id, "User logged in");
        Ok(TokenPair {
            access_token: access.token,
            refresh_token: refresh.token,
        })
    }

    /// Exchange a refresh token for a new pair. The presented token is
    /// single-use whether or not the exchange succeeds.
    ///
    /// # Errors
    /// In check order: `TokenNotFound`, `InvalidToken`, `ExpiredToken`,
    /// `UserNotFound`, `TokenUserMismatch`. `TokenNotFound` is also returned
    /// when a concurrent refresh consumed the token first.
    pub async fn refresh(&self, presented: &str) -> Result<TokenPair, AppError> {
        let stored = self
            .refresh_tokens
            .find_by_token(presented)
            .await?
            .ok_or(AuthError::TokenNotFound)?;

        if !self.codec.is_valid(presented) {
            self.refresh_tokens.delete_by_token(presented).await?;
            tracing::warn!(user_id = stored.user_id, "Refresh token failed signature check");
            return Err(AuthError::InvalidToken.into());
        }

        if self.codec.is_expired(presented) {
            self.refresh_tokens.delete_by_token(presented).await?;
            tracing::info!(user_id = stored.user_id, "Refresh token expired");
            return Err(AuthError::ExpiredToken.into());
        }

        let claims = self.codec.decode(presented)?;
        let user = match self.users.find_by_username(&claims.sub).await? {
            Some(user) => user,
            None => {
                tracing::error!(user_id = stored.user_id, "Refresh token subject has no account");
                return Err(AuthError::UserNotFound.into());
            }
        };

        if stored.user_id != user.id {
            self.refresh_tokens.delete_by_token(presented).await?;
            tracing::warn!(
                user_id = user.id,
                row_owner = stored.user_id,
                "Refresh token presented against another user's row"
            );
            return Err(AuthError::TokenUserMismatch.into());
        }

        let access = self.codec.issue(&user, TokenKind::Access)?;
        let refresh = self.codec.issue(&user, TokenKind::Refresh)?;

        let rotated = self
            .refresh_tokens
            .rotate(
                presented,
                NewRefreshToken {
                    expires_at: refresh.expires_at(),
                    token: refresh.token.clone(),
                    user_id: user.id,
                },
            )
            .await?;

        if rotated.is_none() {
            tracing::warn!(user_id = user.id, "Refresh token consumed by a concurrent refresh");
            return Err(AuthError::TokenNotFound.into());
        }

        tracing::info!(user_id = user.id, "Token refreshed");
        Ok(TokenPair {
            access_token: access.token,
            refresh_token: refresh.token,
        })
    }

    /// End every session of the caller by dropping their refresh tokens.
    /// Access tokens already issued stay valid until they expire.
    pub async fn logout(&self, caller: &AuthenticatedUser) -> Result<(), AppError> {
        let removed = self.refresh_tokens.delete_by_user(caller.id).await?;
        tracing::info!(user_id = caller.id, removed, "User logged out");
        Ok(())
    }
}
