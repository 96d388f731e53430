/// Persistence contracts
///
/// Services depend on these traits only. `PgStore` backs them with Postgres;
/// `MemoryStore` keeps everything in process and is used by tests and by
/// `storage: memory`.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::AppError;
use crate::models::{
    Habit, HabitProgress, NewHabit, NewHabitProgress, NewRefreshToken, NewUser, RefreshToken,
    User,
};

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<User>, AppError>;

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AppError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError>;

    /// Fails with `AuthError::DuplicateUsername`/`DuplicateEmail` when a
    /// unique field is already taken.
    async fn insert_user(&self, user: NewUser) -> Result<User, AppError>;

    async fn update_profile(
        &self,
        id: i64,
        email: &str,
        full_name: &str,
    ) -> Result<Option<User>, AppError>;

    /// Removes the user with their habits, progress and refresh tokens.
    async fn delete_user(&self, id: i64) -> Result<bool, AppError>;

    /// Users ordered by id
    async fn list_users(&self, limit: i64, offset: i64) -> Result<Vec<User>, AppError>;
}

/// Refresh-token rows. Every write that adds a row first removes the
/// owner's existing rows inside the same transaction, so a user never has
/// more than one.
#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    async fn find_by_token(&self, token: &str) -> Result<Option<RefreshToken>, AppError>;

    async fn find_by_user(&self, user_id: i64) -> Result<Vec<RefreshToken>, AppError>;

    /// Delete the owner's rows, then insert `token`.
    async fn replace_for_user(&self, token: NewRefreshToken) -> Result<RefreshToken, AppError>;

    /// Delete the row holding `old_token`, delete the owner's remaining rows
    /// and insert `replacement`, all or nothing. Returns `None` without
    /// writing anything if `old_token` is no longer stored.
    async fn rotate(
        &self,
        old_token: &str,
        replacement: NewRefreshToken,
    ) -> Result<Option<RefreshToken>, AppError>;

    async fn delete_by_token(&self, token: &str) -> Result<u64, AppError>;

    async fn delete_by_user(&self, user_id: i64) -> Result<u64, AppError>;
}

#[async_trait]
pub trait HabitStore: Send + Sync {
    async fn insert_habit(&self, habit: NewHabit) -> Result<Habit, AppError>;

    async fn find_habit(&self, id: i64) -> Result<Option<Habit>, AppError>;

    async fn habits_for_user(&self, user_id: i64) -> Result<Vec<Habit>, AppError>;

    async fn insert_progress(&self, progress: NewHabitProgress) -> Result<HabitProgress, AppError>;

    /// Progress entries with `start <= date <= end`, oldest first
    async fn progress_between(
        &self,
        habit_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<HabitProgress>, AppError>;
}
