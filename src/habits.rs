/// Habit Tracking
///
/// Habit creation, daily progress logging and completion analytics. Every
/// operation takes the caller explicitly; a habit owned by someone else is
/// reported as forbidden, an unknown one as not found.

use chrono::{Duration, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

use crate::auth::AuthenticatedUser;
use crate::error::{AppError, ValidationError};
use crate::models::{Frequency, Habit, HabitProgress, NewHabit, NewHabitProgress};
use crate::store::HabitStore;
use crate::validators::is_valid_name;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateHabit {
    pub name: String,
    pub frequency: Frequency,
    pub target_amount: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HabitResponse {
    pub id: i64,
    pub name: String,
    pub frequency: Frequency,
    pub target_amount: i32,
    pub user_id: i64,
}

impl From<&Habit> for HabitResponse {
    fn from(habit: &Habit) -> Self {
        Self {
            id: habit.id,
            name: habit.name.clone(),
            frequency: habit.frequency,
            target_amount: habit.target_amount,
            user_id: habit.user_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProgressResponse {
    pub id: i64,
    pub date: NaiveDate,
    pub completed_amount: i32,
    pub habit_id: i64,
}

impl From<&HabitProgress> for ProgressResponse {
    fn from(progress: &HabitProgress) -> Self {
        Self {
            id: progress.id,
            date: progress.date,
            completed_amount: progress.completed_amount,
            habit_id: progress.habit_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HabitAnalytics {
    pub habit_name: String,
    pub period: String,
    pub total_target: i64,
    pub total_completed: i64,
    pub completion_percentage: String,
}

/// Trailing analytics window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Week,
    Month,
}

impl Period {
    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Week => "week",
            Period::Month => "month",
        }
    }

    /// Inclusive `[start, today]` range covered by the period
    pub fn window(&self, today: NaiveDate) -> Result<(NaiveDate, NaiveDate), AppError> {
        let start = match self {
            Period::Week => today - Duration::days(7),
            Period::Month => today
                .checked_sub_months(Months::new(1))
                .ok_or_else(|| AppError::Internal("date out of range".to_string()))?,
        };
        Ok((start, today))
    }
}

impl FromStr for Period {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "week" => Ok(Period::Week),
            "month" => Ok(Period::Month),
            _ => Err(ValidationError::InvalidFormat("period".to_string())),
        }
    }
}

/// Totals for a set of progress entries against a per-entry target.
///
/// Returns `(total_target, total_completed, percentage)` where the
/// percentage has two decimals and a `%` suffix.
pub fn completion_summary(entries: &[HabitProgress], target_amount: i32) -> (i64, i64, String) {
    let total_target = entries.len() as i64 * i64::from(target_amount);
    let total_completed: i64 = entries.iter().map(|p| i64::from(p.completed_amount)).sum();

    let percentage = if total_target == 0 {
        0.0
    } else {
        total_completed as f64 / total_target as f64 * 100.0
    };

    (total_target, total_completed, format!("{:.2}%", percentage))
}

pub struct HabitService {
    habits: Arc<dyn HabitStore>,
}

impl HabitService {
    pub fn new(habits: Arc<dyn HabitStore>) -> Self {
        Self { habits }
    }

    pub async fn create_habit(
        &self,
        caller: &AuthenticatedUser,
        request: CreateHabit,
    ) -> Result<Habit, AppError> {
        let name = is_valid_name("name", &request.name)?;
        if request.target_amount < 1 {
            return Err(ValidationError::OutOfRange("targetAmount".to_string()).into());
        }

        let habit = self
            .habits
            .insert_habit(NewHabit {
                user_id: caller.id,
                name,
                frequency: request.frequency,
                target_amount: request.target_amount,
            })
            .await?;

        tracing::info!(user_id = caller.id, habit_id = habit.id, "Habit created");
        Ok(habit)
    }

    pub async fn list_habits(&self, caller: &AuthenticatedUser) -> Result<Vec<Habit>, AppError> {
        self.habits.habits_for_user(caller.id).await
    }

    /// Log progress for today (UTC)
    pub async fn record_progress(
        &self,
        caller: &AuthenticatedUser,
        habit_id: i64,
        completed_amount: i32,
    ) -> Result<HabitProgress, AppError> {
        if completed_amount < 0 {
            return Err(ValidationError::OutOfRange("completedAmount".to_string()).into());
        }
        let habit = self.owned_habit(caller, habit_id).await?;

        let progress = self
            .habits
            .insert_progress(NewHabitProgress {
                habit_id: habit.id,
                date: Utc::now().date_naive(),
                completed_amount,
            })
            .await?;

        tracing::info!(
            user_id = caller.id,
            habit_id = habit.id,
            completed_amount,
            "Progress recorded"
        );
        Ok(progress)
    }

    pub async fn analytics(
        &self,
        caller: &AuthenticatedUser,
        habit_id: i64,
        period: Period,
    ) -> Result<HabitAnalytics, AppError> {
        self.analytics_on(caller, habit_id, period, Utc::now().date_naive())
            .await
    }

    /// Analytics for the window ending on `today`
    pub async fn analytics_on(
        &self,
        caller: &AuthenticatedUser,
        habit_id: i64,
        period: Period,
        today: NaiveDate,
    ) -> Result<HabitAnalytics, AppError> {
        let habit = self.owned_habit(caller, habit_id).await?;
        let (start, end) = period.window(today)?;
        let entries = self.habits.progress_between(habit.id, start, end).await?;

        let (total_target, total_completed, completion_percentage) =
            completion_summary(&entries, habit.target_amount);

        Ok(HabitAnalytics {
            habit_name: habit.name,
            period: period.as_str().to_string(),
            total_target,
            total_completed,
            completion_percentage,
        })
    }

    async fn owned_habit(
        &self,
        caller: &AuthenticatedUser,
        habit_id: i64,
    ) -> Result<Habit, AppError> {
        let habit = self
            .habits
            .find_habit(habit_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Habit not found".to_string()))?;

        if habit.user_id != caller.id {
            tracing::warn!(user_id = caller.id, habit_id, "Access to another user's habit");
            return Err(AppError::Forbidden("Habit belongs to another user".to_string()));
        }
        Ok(habit)
    }
}
