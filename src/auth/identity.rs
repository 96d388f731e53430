/// Caller identity established by `RequestAuthenticator`.
///
/// Handlers that need a caller take `AuthenticatedUser` as an argument; a
/// request that reached the handler without one is rejected with 401.

use actix_web::{dev::Payload, FromRequest, HttpMessage, HttpRequest};
use std::future::{ready, Ready};

use crate::error::{AppError, AuthError};
use crate::models::User;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub id: i64,
    pub username: String,
}

impl From<&User> for AuthenticatedUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
        }
    }
}

impl FromRequest for AuthenticatedUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let caller = req.extensions().get::<AuthenticatedUser>().cloned();
        ready(caller.ok_or_else(|| AuthError::MissingToken.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[actix_web::test]
    async fn test_extracts_attached_identity() {
        let req = TestRequest::default().to_http_request();
        req.extensions_mut().insert(AuthenticatedUser {
            id: 3,
            username: "carol".to_string(),
        });

        let caller = AuthenticatedUser::extract(&req).await.unwrap();
        assert_eq!(caller.id, 3);
    }

    #[actix_web::test]
    async fn test_missing_identity_is_rejected() {
        let req = TestRequest::default().to_http_request();

        let result = AuthenticatedUser::extract(&req).await;
        assert!(matches!(result, Err(AppError::Auth(AuthError::MissingToken))));
    }
}
