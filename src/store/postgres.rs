use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgPool, Postgres, Transaction};

use super::{HabitStore, RefreshTokenStore, UserStore};
use crate::error::{AppError, AuthError};
use crate::models::{
    Habit, HabitProgress, NewHabit, NewHabitProgress, NewRefreshToken, NewUser, RefreshToken,
    User,
};

const USER_COLUMNS: &str = "id, username, email, password_hash, full_name, created_at";
const TOKEN_COLUMNS: &str = "id, token, user_id, expires_at, created_at";
const HABIT_COLUMNS: &str = "id, user_id, name, frequency, target_amount, created_at";

/// Postgres-backed store; schema lives in `migrations/`
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply pending migrations
    pub async fn migrate(&self) -> Result<(), AppError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

/// Take the owner's row lock so refresh-token writes for one user run one
/// at a time. Without it two transactions each delete nothing and both
/// insert.
async fn lock_user(tx: &mut Transaction<'_, Postgres>, user_id: i64) -> Result<(), AppError> {
    sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;
    Ok(())
}

/// Translate unique violations on `users` into the registration failures
fn map_user_conflict(err: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db_err) = &err {
        match db_err.constraint() {
            Some("users_username_key") => return AuthError::DuplicateUsername.into(),
            Some("users_email_key") => return AuthError::DuplicateEmail.into(),
            _ => {}
        }
    }
    err.into()
}

#[derive(sqlx::FromRow)]
struct HabitRow {
    id: i64,
    user_id: i64,
    name: String,
    frequency: String,
    target_amount: i32,
    created_at: DateTime<Utc>,
}

impl TryFrom<HabitRow> for Habit {
    type Error = AppError;

    fn try_from(row: HabitRow) -> Result<Self, Self::Error> {
        let frequency = row.frequency.parse().map_err(|_| {
            AppError::Internal(format!("Unknown habit frequency stored: {}", row.frequency))
        })?;

        Ok(Habit {
            id: row.id,
            user_id: row.user_id,
            name: row.name,
            frequency,
            target_amount: row.target_amount,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn find_by_id(&self, id: i64) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE username = $1",
            USER_COLUMNS
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE email = $1",
            USER_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn insert_user(&self, user: NewUser) -> Result<User, AppError> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (username, email, password_hash, full_name)
            VALUES ($1, $2, $3, $4)
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.full_name)
        .fetch_one(&self.pool)
        .await
        .map_err(map_user_conflict)
    }

    async fn update_profile(
        &self,
        id: i64,
        email: &str,
        full_name: &str,
    ) -> Result<Option<User>, AppError> {
        sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET email = $1, full_name = $2 WHERE id = $3 RETURNING {}",
            USER_COLUMNS
        ))
        .bind(email)
        .bind(full_name)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_user_conflict)
    }

    async fn delete_user(&self, id: i64) -> Result<bool, AppError> {
        // habits, habit_progress and refresh_tokens cascade
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_users(&self, limit: i64, offset: i64) -> Result<Vec<User>, AppError> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users ORDER BY id LIMIT $1 OFFSET $2",
            USER_COLUMNS
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }
}

#[async_trait]
impl RefreshTokenStore for PgStore {
    async fn find_by_token(&self, token: &str) -> Result<Option<RefreshToken>, AppError> {
        let row = sqlx::query_as::<_, RefreshToken>(&format!(
            "SELECT {} FROM refresh_tokens WHERE token = $1",
            TOKEN_COLUMNS
        ))
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_by_user(&self, user_id: i64) -> Result<Vec<RefreshToken>, AppError> {
        let rows = sqlx::query_as::<_, RefreshToken>(&format!(
            "SELECT {} FROM refresh_tokens WHERE user_id = $1",
            TOKEN_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn replace_for_user(&self, token: NewRefreshToken) -> Result<RefreshToken, AppError> {
        let mut tx = self.pool.begin().await?;
        lock_user(&mut tx, token.user_id).await?;

        sqlx::query("DELETE FROM refresh_tokens WHERE user_id = $1")
            .bind(token.user_id)
            .execute(&mut tx)
            .await?;

        let row = sqlx::query_as::<_, RefreshToken>(&format!(
            "INSERT INTO refresh_tokens (token, user_id, expires_at) VALUES ($1, $2, $3) RETURNING {}",
            TOKEN_COLUMNS
        ))
        .bind(&token.token)
        .bind(token.user_id)
        .bind(token.expires_at)
        .fetch_one(&mut tx)
        .await?;

        tx.commit().await?;
        Ok(row)
    }

    async fn rotate(
        &self,
        old_token: &str,
        replacement: NewRefreshToken,
    ) -> Result<Option<RefreshToken>, AppError> {
        let mut tx = self.pool.begin().await?;
        lock_user(&mut tx, replacement.user_id).await?;

        // A concurrent rotation or login that committed first has already
        // removed the old row.
        let consumed = sqlx::query("DELETE FROM refresh_tokens WHERE token = $1")
            .bind(old_token)
            .execute(&mut tx)
            .await?
            .rows_affected();

        if consumed == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        sqlx::query("DELETE FROM refresh_tokens WHERE user_id = $1")
            .bind(replacement.user_id)
            .execute(&mut tx)
            .await?;

        let row = sqlx::query_as::<_, RefreshToken>(&format!(
            "INSERT INTO refresh_tokens (token, user_id, expires_at) VALUES ($1, $2, $3) RETURNING {}",
            TOKEN_COLUMNS
        ))
        .bind(&replacement.token)
        .bind(replacement.user_id)
        .bind(replacement.expires_at)
        .fetch_one(&mut tx)
        .await?;

        tx.commit().await?;
        Ok(Some(row))
    }

    async fn delete_by_token(&self, token: &str) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_by_user(&self, user_id: i64) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl HabitStore for PgStore {
    async fn insert_habit(&self, habit: NewHabit) -> Result<Habit, AppError> {
        let row = sqlx::query_as::<_, HabitRow>(&format!(
            r#"
            INSERT INTO habits (user_id, name, frequency, target_amount)
            VALUES ($1, $2, $3, $4)
            RETURNING {}
            "#,
            HABIT_COLUMNS
        ))
        .bind(habit.user_id)
        .bind(&habit.name)
        .bind(habit.frequency.as_str())
        .bind(habit.target_amount)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn find_habit(&self, id: i64) -> Result<Option<Habit>, AppError> {
        let row = sqlx::query_as::<_, HabitRow>(&format!(
            "SELECT {} FROM habits WHERE id = $1",
            HABIT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Habit::try_from).transpose()
    }

    async fn habits_for_user(&self, user_id: i64) -> Result<Vec<Habit>, AppError> {
        let rows = sqlx::query_as::<_, HabitRow>(&format!(
            "SELECT {} FROM habits WHERE user_id = $1 ORDER BY id",
            HABIT_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Habit::try_from).collect()
    }

    async fn insert_progress(&self, progress: NewHabitProgress) -> Result<HabitProgress, AppError> {
        let row = sqlx::query_as::<_, HabitProgress>(
            r#"
            INSERT INTO habit_progress (habit_id, date, completed_amount)
            VALUES ($1, $2, $3)
            RETURNING id, habit_id, date, completed_amount
            "#,
        )
        .bind(progress.habit_id)
        .bind(progress.date)
        .bind(progress.completed_amount)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn progress_between(
        &self,
        habit_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<HabitProgress>, AppError> {
        let rows = sqlx::query_as::<_, HabitProgress>(
            r#"
            SELECT id, habit_id, date, completed_amount
            FROM habit_progress
            WHERE habit_id = $1 AND date BETWEEN $2 AND $3
            ORDER BY date, id
            "#,
        )
        .bind(habit_id)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
