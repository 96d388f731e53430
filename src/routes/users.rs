/// User Routes
///
/// Profile reads for any authenticated caller; updates and deletion only
/// on the caller's own account.

use actix_web::{web, HttpResponse};
use serde::Deserialize;

use crate::auth::AuthenticatedUser;
use crate::error::AppError;
use crate::models::ProfileResponse;
use crate::users::{ProfileUpdate, UserService};

#[derive(Deserialize)]
pub struct Pagination {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    10
}

/// GET /api/users/profile
pub async fn get_profile(
    caller: AuthenticatedUser,
    users: web::Data<UserService>,
) -> Result<HttpResponse, AppError> {
    let user = users.profile(&caller).await?;
    Ok(HttpResponse::Ok().json(ProfileResponse::from(&user)))
}

/// GET /api/users/{id}
pub async fn get_user(
    _caller: AuthenticatedUser,
    path: web::Path<i64>,
    users: web::Data<UserService>,
) -> Result<HttpResponse, AppError> {
    let user = users.get(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ProfileResponse::from(&user)))
}

/// PUT /api/users/{id}
///
/// # Errors
/// - 403: Not the caller's account
/// - 409: Email already used by another account
pub async fn update_user(
    caller: AuthenticatedUser,
    path: web::Path<i64>,
    form: web::Json<ProfileUpdate>,
    users: web::Data<UserService>,
) -> Result<HttpResponse, AppError> {
    let user = users
        .update(&caller, path.into_inner(), form.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(ProfileResponse::from(&user)))
}

/// DELETE /api/users/{id}
pub async fn delete_user(
    caller: AuthenticatedUser,
    path: web::Path<i64>,
    users: web::Data<UserService>,
) -> Result<HttpResponse, AppError> {
    users.delete(&caller, path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// GET /api/users?limit=10&offset=0
pub async fn list_users(
    _caller: AuthenticatedUser,
    query: web::Query<Pagination>,
    users: web::Data<UserService>,
) -> Result<HttpResponse, AppError> {
    let page: Vec<ProfileResponse> = users
        .list(query.limit, query.offset)
        .await?
        .iter()
        .map(ProfileResponse::from)
        .collect();
    Ok(HttpResponse::Ok().json(page))
}
