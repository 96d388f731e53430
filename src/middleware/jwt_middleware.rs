/// Request Authentication Middleware
///
/// Runs before every handler. A request without a bearer credential passes
/// through unauthenticated; a bearer token that is invalid, expired or names
/// an unknown user ends the request with 401. A good token resolves to an
/// `AuthenticatedUser` stored in the request extensions.

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpMessage, HttpResponse,
};
use futures::future::LocalBoxFuture;
use std::rc::Rc;
use std::sync::Arc;

use crate::auth::{AuthenticatedUser, TokenCodec};
use crate::store::UserStore;

/// Why a bearer token was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    InvalidToken,
    ExpiredToken,
    UnknownUser,
    LookupFailed,
}

impl Rejection {
    pub fn code(&self) -> &'static str {
        match self {
            Rejection::InvalidToken => "TOKEN_INVALID",
            Rejection::ExpiredToken => "TOKEN_EXPIRED",
            Rejection::UnknownUser | Rejection::LookupFailed => "AUTHENTICATION_FAILED",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Rejection::InvalidToken => "Invalid token",
            Rejection::ExpiredToken => "Token expired",
            Rejection::UnknownUser | Rejection::LookupFailed => "Authentication failed",
        }
    }
}

/// Resolve an optional bearer token to a caller
///
/// `Ok(None)` means no credential was presented.
pub async fn authenticate(
    codec: &TokenCodec,
    users: &dyn UserStore,
    token: Option<&str>,
) -> Result<Option<AuthenticatedUser>, Rejection> {
    let Some(token) = token else {
        return Ok(None);
    };

    if !codec.is_valid(token) {
        return Err(Rejection::InvalidToken);
    }
    if codec.is_expired(token) {
        return Err(Rejection::ExpiredToken);
    }

    let claims = codec.decode(token).map_err(|_| Rejection::InvalidToken)?;

    match users.find_by_username(&claims.sub).await {
        Ok(Some(user)) => Ok(Some(AuthenticatedUser::from(&user))),
        Ok(None) => Err(Rejection::UnknownUser),
        Err(e) => {
            tracing::error!(error = %e, "User lookup failed during authentication");
            Err(Rejection::LookupFailed)
        }
    }
}

/// Token from an `Authorization: Bearer <token>` header, if any
fn bearer_token(req: &ServiceRequest) -> Option<String> {
    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
}

pub struct RequestAuthenticator {
    codec: Arc<TokenCodec>,
    users: Arc<dyn UserStore>,
}

impl RequestAuthenticator {
    pub fn new(codec: Arc<TokenCodec>, users: Arc<dyn UserStore>) -> Self {
        Self { codec, users }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RequestAuthenticator
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = RequestAuthenticatorService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(RequestAuthenticatorService {
            service: Rc::new(service),
            codec: self.codec.clone(),
            users: self.users.clone(),
        }))
    }
}

pub struct RequestAuthenticatorService<S> {
    service: Rc<S>,
    codec: Arc<TokenCodec>,
    users: Arc<dyn UserStore>,
}

impl<S, B> Service<ServiceRequest> for RequestAuthenticatorService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let token = bearer_token(&req);
        let codec = self.codec.clone();
        let users = self.users.clone();
        let service = self.service.clone();

        Box::pin(async move {
            match authenticate(&codec, users.as_ref(), token.as_deref()).await {
                Ok(Some(caller)) => {
                    tracing::debug!(
                        user_id = caller.id,
                        username = %caller.username,
                        "Bearer token accepted"
                    );
                    req.extensions_mut().insert(caller);
                }
                Ok(None) => {
                    tracing::debug!(path = %req.path(), "No bearer token presented");
                }
                Err(rejection) => {
                    tracing::warn!(
                        path = %req.path(),
                        reason = rejection.code(),
                        "Bearer token rejected"
                    );
                    let response = HttpResponse::Unauthorized().json(serde_json::json!({
                        "error": rejection.message(),
                        "code": rejection.code()
                    }));
                    return Err(actix_web::error::InternalError::from_response(
                        rejection.message(),
                        response,
                    )
                    .into());
                }
            }

            service.call(req).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenKind;
    use crate::models::NewUser;
    use crate::store::MemoryStore;
    use actix_web::{http::StatusCode, test, web, App};

    const KEY: &[u8] = b"middleware-test-key-long-enough-123";

    async fn store_with_user() -> (Arc<MemoryStore>, crate::models::User) {
        let store = Arc::new(MemoryStore::new());
        let user = store
            .insert_user(NewUser {
                username: "dave".to_string(),
                email: "dave@example.com".to_string(),
                password_hash: "hash".to_string(),
                full_name: "Dave".to_string(),
            })
            .await
            .unwrap();
        (store, user)
    }

    fn codec(access_ttl_ms: i64) -> Arc<TokenCodec> {
        Arc::new(TokenCodec::new(KEY, access_ttl_ms, 60_000).unwrap())
    }

    #[tokio::test]
    async fn test_no_token_is_anonymous() {
        let (store, _) = store_with_user().await;

        let result = authenticate(&codec(60_000), store.as_ref(), None).await;
        assert_eq!(result, Ok(None));
    }

    #[tokio::test]
    async fn test_valid_token_resolves_caller() {
        let (store, user) = store_with_user().await;
        let codec = codec(60_000);
        let token = codec.issue(&user, TokenKind::Access).unwrap().token;

        let caller = authenticate(&codec, store.as_ref(), Some(&token)).await.unwrap();
        assert_eq!(caller, Some(AuthenticatedUser::from(&user)));
    }

    #[tokio::test]
    async fn test_invalid_and_expired_are_distinguished() {
        let (store, user) = store_with_user().await;

        let garbage = authenticate(&codec(60_000), store.as_ref(), Some("a.b.c")).await;
        assert_eq!(garbage, Err(Rejection::InvalidToken));

        let expired_codec = codec(0);
        let token = expired_codec.issue(&user, TokenKind::Access).unwrap().token;
        let expired = authenticate(&expired_codec, store.as_ref(), Some(&token)).await;
        assert_eq!(expired, Err(Rejection::ExpiredToken));
    }

    #[tokio::test]
    async fn test_deleted_user_is_rejected() {
        let (store, user) = store_with_user().await;
        let codec = codec(60_000);
        let token = codec.issue(&user, TokenKind::Access).unwrap().token;
        store.delete_user(user.id).await.unwrap();

        let result = authenticate(&codec, store.as_ref(), Some(&token)).await;
        assert_eq!(result, Err(Rejection::UnknownUser));
    }

    async fn whoami(caller: AuthenticatedUser) -> String {
        caller.username
    }

    async fn open() -> &'static str {
        "open"
    }

    #[actix_web::test]
    async fn test_middleware_gates_requests() {
        let (store, user) = store_with_user().await;
        let codec = codec(60_000);
        let token = codec.issue(&user, TokenKind::Access).unwrap().token;
        let users: Arc<dyn UserStore> = store.clone();

        let app = test::init_service(
            App::new()
                .wrap(RequestAuthenticator::new(codec.clone(), users))
                .route("/me", web::get().to(whoami))
                .route("/open", web::get().to(open)),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/me")
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .to_request();
        let body = test::call_and_read_body(&app, req).await;
        assert_eq!(body, "dave");

        let req = test::TestRequest::get().uri("/open").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let req = test::TestRequest::get().uri("/me").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let req = test::TestRequest::get()
            .uri("/open")
            .insert_header(("Authorization", "Bearer not-a-token"))
            .to_request();
        let err = app.call(req).await.err().expect("request should be rejected");
        assert_eq!(err.error_response().status(), StatusCode::UNAUTHORIZED);
    }
}
