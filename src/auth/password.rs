/// Password Hashing and Verification
///
/// One-way bcrypt hashing of account passwords. Plaintext passwords are
/// only ever held in memory for the duration of a call.

use bcrypt::{hash, verify};

use crate::configuration::PasswordSettings;
use crate::error::AppError;

#[derive(Debug, Clone, Copy)]
pub struct CredentialVerifier {
    cost: u32,
}

impl CredentialVerifier {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    pub fn from_settings(settings: &PasswordSettings) -> Self {
        Self::new(settings.bcrypt_cost)
    }

    /// Hash a password for storage
    ///
    /// # Errors
    /// Returns error if bcrypt rejects the cost or input
    pub fn hash(&self, password: &str) -> Result<String, AppError> {
        hash(password, self.cost)
            .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
    }

    /// Check a password against a stored hash
    ///
    /// # Errors
    /// Returns error if the stored hash is malformed
    pub fn verify(&self, password: &str, password_hash: &str) -> Result<bool, AppError> {
        verify(password, password_hash)
            .map_err(|e| AppError::Internal(format!("Password verification failed: {}", e)))
    }
}

impl Default for CredentialVerifier {
    fn default() -> Self {
        Self::new(bcrypt::DEFAULT_COST)
    }
}
