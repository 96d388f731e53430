use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use parking_lot::Mutex;
use std::collections::BTreeMap;

use super::{HabitStore, RefreshTokenStore, UserStore};
use crate::error::{AppError, AuthError};
use crate::models::{
    Habit, HabitProgress, NewHabit, NewHabitProgress, NewRefreshToken, NewUser, RefreshToken,
    User,
};

#[derive(Default)]
struct Tables {
    users: BTreeMap<i64, User>,
    refresh_tokens: BTreeMap<i64, RefreshToken>,
    habits: BTreeMap<i64, Habit>,
    progress: BTreeMap<i64, HabitProgress>,
    next_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn remove_tokens_where(&mut self, pred: impl Fn(&RefreshToken) -> bool) -> u64 {
        let before = self.refresh_tokens.len();
        self.refresh_tokens.retain(|_, row| !pred(row));
        (before - self.refresh_tokens.len()) as u64
    }

    fn insert_token(&mut self, token: NewRefreshToken) -> RefreshToken {
        let row = RefreshToken {
            id: self.next_id(),
            token: token.token,
            user_id: token.user_id,
            expires_at: token.expires_at,
            created_at: Utc::now(),
        };
        self.refresh_tokens.insert(row.id, row.clone());
        row
    }
}

/// In-process store. One lock guards every table, so each trait method is
/// atomic with respect to all others.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_by_id(&self, id: i64) -> Result<Option<User>, AppError> {
        Ok(self.tables.lock().users.get(&id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        let tables = self.tables.lock();
        Ok(tables.users.values().find(|u| u.username == username).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let tables = self.tables.lock();
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }

    async fn insert_user(&self, user: NewUser) -> Result<User, AppError> {
        let mut tables = self.tables.lock();
        if tables.users.values().any(|u| u.username == user.username) {
            return Err(AuthError::DuplicateUsername.into());
        }
        if tables.users.values().any(|u| u.email == user.email) {
            return Err(AuthError::DuplicateEmail.into());
        }

        let row = User {
            id: tables.next_id(),
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            full_name: user.full_name,
            created_at: Utc::now(),
        };
        tables.users.insert(row.id, row.clone());
        Ok(row)
    }

    async fn update_profile(
        &self,
        id: i64,
        email: &str,
        full_name: &str,
    ) -> Result<Option<User>, AppError> {
        let mut tables = self.tables.lock();
        if tables.users.values().any(|u| u.id != id && u.email == email) {
            return Err(AuthError::DuplicateEmail.into());
        }

        Ok(tables.users.get_mut(&id).map(|user| {
            user.email = email.to_string();
            user.full_name = full_name.to_string();
            user.clone()
        }))
    }

    async fn delete_user(&self, id: i64) -> Result<bool, AppError> {
        let mut tables = self.tables.lock();
        if tables.users.remove(&id).is_none() {
            return Ok(false);
        }

        let habit_ids: Vec<i64> = tables
            .habits
            .values()
            .filter(|h| h.user_id == id)
            .map(|h| h.id)
            .collect();
        tables.progress.retain(|_, p| !habit_ids.contains(&p.habit_id));
        tables.habits.retain(|_, h| h.user_id != id);
        tables.remove_tokens_where(|row| row.user_id == id);
        Ok(true)
    }

    async fn list_users(&self, limit: i64, offset: i64) -> Result<Vec<User>, AppError> {
        let tables = self.tables.lock();
        Ok(tables
            .users
            .values()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl RefreshTokenStore for MemoryStore {
    async fn find_by_token(&self, token: &str) -> Result<Option<RefreshToken>, AppError> {
        let tables = self.tables.lock();
        Ok(tables.refresh_tokens.values().find(|row| row.token == token).cloned())
    }

    async fn find_by_user(&self, user_id: i64) -> Result<Vec<RefreshToken>, AppError> {
        let tables = self.tables.lock();
        Ok(tables
            .refresh_tokens
            .values()
            .filter(|row| row.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn replace_for_user(&self, token: NewRefreshToken) -> Result<RefreshToken, AppError> {
        let mut tables = self.tables.lock();
        let owner = token.user_id;
        tables.remove_tokens_where(|row| row.user_id == owner);
        Ok(tables.insert_token(token))
    }

    async fn rotate(
        &self,
        old_token: &str,
        replacement: NewRefreshToken,
    ) -> Result<Option<RefreshToken>, AppError> {
        let mut tables = self.tables.lock();
        if tables.remove_tokens_where(|row| row.token == old_token) == 0 {
            return Ok(None);
        }

        let owner = replacement.user_id;
        tables.remove_tokens_where(|row| row.user_id == owner);
        Ok(Some(tables.insert_token(replacement)))
    }

    async fn delete_by_token(&self, token: &str) -> Result<u64, AppError> {
        Ok(self.tables.lock().remove_tokens_where(|row| row.token == token))
    }

    async fn delete_by_user(&self, user_id: i64) -> Result<u64, AppError> {
        Ok(self.tables.lock().remove_tokens_where(|row| row.user_id == user_id))
    }
}

#[async_trait]
impl HabitStore for MemoryStore {
    async fn insert_habit(&self, habit: NewHabit) -> Result<Habit, AppError> {
        let mut tables = self.tables.lock();
        if !tables.users.contains_key(&habit.user_id) {
            return Err(AppError::NotFound("User not found".to_string()));
        }

        let row = Habit {
            id: tables.next_id(),
            user_id: habit.user_id,
            name: habit.name,
            frequency: habit.frequency,
            target_amount: habit.target_amount,
            created_at: Utc::now(),
        };
        tables.habits.insert(row.id, row.clone());
        Ok(row)
    }

    async fn find_habit(&self, id: i64) -> Result<Option<Habit>, AppError> {
        Ok(self.tables.lock().habits.get(&id).cloned())
    }

    async fn habits_for_user(&self, user_id: i64) -> Result<Vec<Habit>, AppError> {
        let tables = self.tables.lock();
        Ok(tables
            .habits
            .values()
            .filter(|h| h.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn insert_progress(&self, progress: NewHabitProgress) -> Result<HabitProgress, AppError> {
        let mut tables = self.tables.lock();
        if !tables.habits.contains_key(&progress.habit_id) {
            return Err(AppError::NotFound("Habit not found".to_string()));
        }

        let row = HabitProgress {
            id: tables.next_id(),
            habit_id: progress.habit_id,
            date: progress.date,
            completed_amount: progress.completed_amount,
        };
        tables.progress.insert(row.id, row.clone());
        Ok(row)
    }

    async fn progress_between(
        &self,
        habit_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<HabitProgress>, AppError> {
        let tables = self.tables.lock();
        let mut rows: Vec<HabitProgress> = tables
            .progress
            .values()
            .filter(|p| p.habit_id == habit_id && p.date >= start && p.date <= end)
            .cloned()
            .collect();
        rows.sort_by_key(|p| (p.date, p.id));
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Frequency;
    use chrono::Duration;

    fn new_user(username: &str, email: &str) -> NewUser {
        NewUser {
            username: username.to_string(),
            email: email.to_string(),
            password_hash: "hash".to_string(),
            full_name: "Test User".to_string(),
        }
    }

    fn new_token(user_id: i64, token: &str) -> NewRefreshToken {
        NewRefreshToken {
            token: token.to_string(),
            user_id,
            expires_at: Utc::now() + Duration::days(7),
        }
    }

    #[tokio::test]
    async fn test_insert_user_enforces_unique_fields() {
        let store = MemoryStore::new();
        store.insert_user(new_user("alice", "alice@example.com")).await.unwrap();

        let dup_name = store.insert_user(new_user("alice", "other@example.com")).await;
        assert!(matches!(dup_name, Err(AppError::Auth(AuthError::DuplicateUsername))));

        let dup_email = store.insert_user(new_user("bob", "alice@example.com")).await;
        assert!(matches!(dup_email, Err(AppError::Auth(AuthError::DuplicateEmail))));
    }

    #[tokio::test]
    async fn test_replace_for_user_keeps_one_row() {
        let store = MemoryStore::new();
        let user = store.insert_user(new_user("alice", "alice@example.com")).await.unwrap();

        store.replace_for_user(new_token(user.id, "first")).await.unwrap();
        store.replace_for_user(new_token(user.id, "second")).await.unwrap();

        let rows = store.find_by_user(user.id).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].token, "second");
    }

    #[tokio::test]
    async fn test_rotate_requires_old_token() {
        let store = MemoryStore::new();
        let user = store.insert_user(new_user("alice", "alice@example.com")).await.unwrap();
        store.replace_for_user(new_token(user.id, "old")).await.unwrap();

        let rotated = store.rotate("old", new_token(user.id, "new")).await.unwrap();
        assert_eq!(rotated.map(|row| row.token), Some("new".to_string()));

        let again = store.rotate("old", new_token(user.id, "newer")).await.unwrap();
        assert!(again.is_none());
        assert_eq!(store.find_by_user(user.id).await.unwrap()[0].token, "new");
    }

    #[tokio::test]
    async fn test_delete_user_cascades() {
        let store = MemoryStore::new();
        let user = store.insert_user(new_user("alice", "alice@example.com")).await.unwrap();
        let habit = store
            .insert_habit(NewHabit {
                user_id: user.id,
                name: "Read".to_string(),
                frequency: Frequency::Daily,
                target_amount: 10,
            })
            .await
            .unwrap();
        store
            .insert_progress(NewHabitProgress {
                habit_id: habit.id,
                date: Utc::now().date_naive(),
                completed_amount: 5,
            })
            .await
            .unwrap();
        store.replace_for_user(new_token(user.id, "tok")).await.unwrap();

        assert!(store.delete_user(user.id).await.unwrap());

        assert!(store.find_habit(habit.id).await.unwrap().is_none());
        assert!(store.find_by_token("tok").await.unwrap().is_none());
        assert!(!store.delete_user(user.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_progress_between_is_inclusive() {
        let store = MemoryStore::new();
        let user = store.insert_user(new_user("alice", "alice@example.com")).await.unwrap();
        let habit = store
            .insert_habit(NewHabit {
                user_id: user.id,
                name: "Run".to_string(),
                frequency: Frequency::Daily,
                target_amount: 1,
            })
            .await
            .unwrap();

        let day = |d: u32| NaiveDate::from_ymd_opt(2024, 3, d).unwrap();
        for d in [1, 5, 8, 9] {
            store
                .insert_progress(NewHabitProgress {
                    habit_id: habit.id,
                    date: day(d),
                    completed_amount: 1,
                })
                .await
                .unwrap();
        }

        let rows = store.progress_between(habit.id, day(1), day(8)).await.unwrap();
        let days: Vec<NaiveDate> = rows.iter().map(|p| p.date).collect();
        assert_eq!(days, vec![day(1), day(5), day(8)]);
    }
}
