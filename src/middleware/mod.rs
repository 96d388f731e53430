/// Middleware module
///
/// Request authentication for every route.

mod jwt_middleware;

pub use jwt_middleware::{authenticate, Rejection, RequestAuthenticator};
