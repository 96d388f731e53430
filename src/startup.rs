use actix_web::dev::Server;
use actix_web::{middleware::Logger, web, App, HttpServer};
use std::net::TcpListener;
use std::sync::Arc;

use crate::auth::{CredentialVerifier, SessionManager, TokenCodec};
use crate::habits::HabitService;
use crate::logger::LoggerMiddleware;
use crate::middleware::RequestAuthenticator;
use crate::routes::{
    analytics, create_habit, delete_user, get_profile, get_user, health_check, list_habits,
    list_users, login, logout, record_progress, refresh, register, update_user,
};
use crate::store::{HabitStore, RefreshTokenStore, UserStore};
use crate::users::UserService;

/// Build the HTTP server over one store that backs users, refresh tokens
/// and habits.
///
/// `RequestAuthenticator` wraps the whole app: a bad bearer token is
/// refused on every route, public ones included. Handlers that need a
/// caller take `AuthenticatedUser`.
pub fn run<S>(
    listener: TcpListener,
    store: Arc<S>,
    codec: TokenCodec,
    credentials: CredentialVerifier,
) -> Result<Server, std::io::Error>
where
    S: UserStore + RefreshTokenStore + HabitStore + 'static,
{
    let codec = Arc::new(codec);
    let users: Arc<dyn UserStore> = store.clone();
    let refresh_tokens: Arc<dyn RefreshTokenStore> = store.clone();
    let habit_store: Arc<dyn HabitStore> = store;

    let sessions = web::Data::new(SessionManager::new(
        users.clone(),
        refresh_tokens,
        codec.clone(),
        credentials,
    ));
    let habits = web::Data::new(HabitService::new(habit_store));
    let user_service = web::Data::new(UserService::new(users.clone()));

    let server = HttpServer::new(move || {
        App::new()
            // Global middleware
            .wrap(RequestAuthenticator::new(codec.clone(), users.clone()))
            .wrap(LoggerMiddleware)
            .wrap(Logger::default())

            // Shared state
            .app_data(sessions.clone())
            .app_data(habits.clone())
            .app_data(user_service.clone())

            .route("/health_check", web::get().to(health_check))
            .service(
                web::scope("/auth")
                    .route("/register", web::post().to(register))
                    .route("/login", web::post().to(login))
                    .route("/refresh", web::post().to(refresh))
                    .route("/logout", web::post().to(logout)),
            )
            .service(
                web::scope("/api/habits")
                    .route("", web::post().to(create_habit))
                    .route("", web::get().to(list_habits))
                    .route("/{id}/progress", web::post().to(record_progress))
                    .route("/{id}/analytics", web::get().to(analytics)),
            )
            .service(
                web::scope("/api/users")
                    .route("", web::get().to(list_users))
                    .route("/profile", web::get().to(get_profile))
                    .route("/{id}", web::get().to(get_user))
                    .route("/{id}", web::put().to(update_user))
                    .route("/{id}", web::delete().to(delete_user)),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}
