mod auth;
mod habits;
mod health_check;
mod users;

pub use auth::{login, logout, refresh, register, AuthResponse};
pub use habits::{analytics, create_habit, list_habits, record_progress};
pub use health_check::health_check;
pub use users::{delete_user, get_profile, get_user, list_users, update_user};
