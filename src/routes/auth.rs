/// Authentication Routes
///
/// Handles user registration, login, token refresh and logout.

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::auth::{AuthenticatedUser, Registration, SessionManager, TokenKind, TokenPair};
use crate::error::{AppError, ValidationError};
use crate::models::ProfileResponse;
use crate::validators::{
    is_valid_email, is_valid_name, is_valid_username, validate_password_strength,
};

/// User registration request
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub full_name: String,
}

/// User login request
#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Refresh token, accepted from the query string or the JSON body
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

/// Authentication response with access and refresh tokens
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Access token lifetime in milliseconds
    pub expires_in: i64,
}

impl AuthResponse {
    fn new(pair: TokenPair, sessions: &SessionManager) -> Self {
        Self {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: sessions.codec().ttl(TokenKind::Access).num_milliseconds(),
        }
    }
}

/// POST /auth/register
///
/// Creates the account and returns its profile. No tokens are issued;
/// the client logs in afterwards.
///
/// # Errors
/// - 400: Validation errors (username/email/password/full name)
/// - 409: Username or email already taken, with the conflicting `field`
pub async fn register(
    form: web::Json<RegisterRequest>,
    sessions: web::Data<SessionManager>,
) -> Result<HttpResponse, AppError> {
    let form = form.into_inner();

    let username = is_valid_username(&form.username)?;
    let email = is_valid_email(&form.email)?;
    let full_name = is_valid_name("fullName", &form.full_name)?;
    validate_password_strength(&form.password)?;

    let user = sessions
        .register(Registration {
            username,
            email,
            password: form.password,
            full_name,
        })
        .await?;

    Ok(HttpResponse::Ok().json(ProfileResponse::from(&user)))
}

/// POST /auth/login
///
/// # Errors
/// - 400: Unknown username or wrong password (same response for both)
pub async fn login(
    form: web::Json<LoginRequest>,
    sessions: web::Data<SessionManager>,
) -> Result<HttpResponse, AppError> {
    let pair = sessions.login(form.username.trim(), &form.password).await?;

    Ok(HttpResponse::Ok().json(AuthResponse::new(pair, &sessions)))
}

/// POST /auth/refresh
///
/// Exchanges a refresh token for a new pair. The presented token is
/// consumed even when the exchange fails.
///
/// # Errors
/// - 400: Missing, unknown, invalid, expired or mismatched refresh token
pub async fn refresh(
    query: web::Query<RefreshRequest>,
    body: Option<web::Json<RefreshRequest>>,
    sessions: web::Data<SessionManager>,
) -> Result<HttpResponse, AppError> {
    let non_empty = |token: &String| !token.is_empty();
    let presented = query
        .into_inner()
        .refresh_token
        .filter(non_empty)
        .or_else(|| {
            body.and_then(|b| b.into_inner().refresh_token)
                .filter(non_empty)
        })
        .ok_or_else(|| ValidationError::Missing("refreshToken".to_string()))?;

    let pair = sessions.refresh(&presented).await?;

    Ok(HttpResponse::Ok().json(AuthResponse::new(pair, &sessions)))
}

/// POST /auth/logout
///
/// **Requires valid JWT access token.** Drops the caller's refresh tokens.
pub async fn logout(
    caller: AuthenticatedUser,
    sessions: web::Data<SessionManager>,
) -> Result<HttpResponse, AppError> {
    sessions.logout(&caller).await?;
    Ok(HttpResponse::NoContent().finish())
}
