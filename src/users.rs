/// User profile management. Mutations are limited to the caller's own
/// account.

use serde::Deserialize;
use std::sync::Arc;

use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AuthError, ValidationError};
use crate::models::User;
use crate::store::UserStore;
use crate::validators::{is_valid_email, is_valid_name};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub email: String,
    pub full_name: String,
}

pub struct UserService {
    users: Arc<dyn UserStore>,
}

impl UserService {
    pub fn new(users: Arc<dyn UserStore>) -> Self {
        Self { users }
    }

    pub async fn profile(&self, caller: &AuthenticatedUser) -> Result<User, AppError> {
        self.get(caller.id).await
    }

    pub async fn get(&self, id: i64) -> Result<User, AppError> {
        self.users
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }

    /// # Errors
    /// `Forbidden` for another user's id, `DuplicateEmail` when the new
    /// address belongs to someone else
    pub async fn update(
        &self,
        caller: &AuthenticatedUser,
        id: i64,
        update: ProfileUpdate,
    ) -> Result<User, AppError> {
        ensure_self(caller, id)?;

        let email = is_valid_email(&update.email)?;
        let full_name = is_valid_name("fullName", &update.full_name)?;

        if let Some(existing) = self.users.find_by_email(&email).await? {
            if existing.id != id {
                return Err(AuthError::DuplicateEmail.into());
            }
        }

        let user = self
            .users
            .update_profile(id, &email, &full_name)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        tracing::info!(user_id = id, "Profile updated");
        Ok(user)
    }

    /// Deletes the caller's account along with their habits and sessions
    pub async fn delete(&self, caller: &AuthenticatedUser, id: i64) -> Result<(), AppError> {
        ensure_self(caller, id)?;

        if !self.users.delete_user(id).await? {
            return Err(AppError::NotFound("User not found".to_string()));
        }

        tracing::info!(user_id = id, "User deleted");
        Ok(())
    }

    pub async fn list(&self, limit: i64, offset: i64) -> Result<Vec<User>, AppError> {
        if limit <= 0 {
            return Err(ValidationError::OutOfRange("limit".to_string()).into());
        }
        if offset < 0 {
            return Err(ValidationError::OutOfRange("offset".to_string()).into());
        }
        self.users.list_users(limit, offset).await
    }
}

fn ensure_self(caller: &AuthenticatedUser, id: i64) -> Result<(), AppError> {
    if caller.id != id {
        tracing::warn!(user_id = caller.id, target_id = id, "Attempt to modify another account");
        return Err(AppError::Forbidden("Cannot modify another user".to_string()));
    }
    Ok(())
}
