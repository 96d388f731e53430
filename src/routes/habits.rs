/// Habit Routes
///
/// All handlers require an authenticated caller.

use actix_web::{web, HttpResponse};
use serde::Deserialize;

use crate::auth::AuthenticatedUser;
use crate::error::AppError;
use crate::habits::{CreateHabit, HabitResponse, HabitService, Period, ProgressResponse};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRequest {
    pub completed_amount: i32,
}

#[derive(Deserialize)]
pub struct AnalyticsQuery {
    pub period: String,
}

/// POST /api/habits
pub async fn create_habit(
    caller: AuthenticatedUser,
    form: web::Json<CreateHabit>,
    habits: web::Data<HabitService>,
) -> Result<HttpResponse, AppError> {
    let habit = habits.create_habit(&caller, form.into_inner()).await?;
    Ok(HttpResponse::Ok().json(HabitResponse::from(&habit)))
}

/// GET /api/habits
pub async fn list_habits(
    caller: AuthenticatedUser,
    habits: web::Data<HabitService>,
) -> Result<HttpResponse, AppError> {
    let list: Vec<HabitResponse> = habits
        .list_habits(&caller)
        .await?
        .iter()
        .map(HabitResponse::from)
        .collect();
    Ok(HttpResponse::Ok().json(list))
}

/// POST /api/habits/{id}/progress
///
/// # Errors
/// - 403: Habit belongs to another user
/// - 404: No such habit
pub async fn record_progress(
    caller: AuthenticatedUser,
    path: web::Path<i64>,
    form: web::Json<ProgressRequest>,
    habits: web::Data<HabitService>,
) -> Result<HttpResponse, AppError> {
    let progress = habits
        .record_progress(&caller, path.into_inner(), form.completed_amount)
        .await?;
    Ok(HttpResponse::Ok().json(ProgressResponse::from(&progress)))
}

/// GET /api/habits/{id}/analytics?period=week|month
pub async fn analytics(
    caller: AuthenticatedUser,
    path: web::Path<i64>,
    query: web::Query<AnalyticsQuery>,
    habits: web::Data<HabitService>,
) -> Result<HttpResponse, AppError> {
    let period: Period = query.period.parse()?;
    let report = habits.analytics(&caller, path.into_inner(), period).await?;
    Ok(HttpResponse::Ok().json(report))
}
