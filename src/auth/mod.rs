/// Authentication module
///
/// Token signing/validation, password hashing, the session lifecycle and
/// the caller identity handed to protected handlers.

mod claims;
mod identity;
mod jwt;
mod password;
mod session;

pub use claims::Claims;
pub use identity::AuthenticatedUser;
pub use jwt::{IssuedToken, TokenCodec, TokenKind, MAX_TTL_MS, MIN_KEY_BYTES};
pub use password::CredentialVerifier;
pub use session::{Registration, SessionManager, TokenPair};
