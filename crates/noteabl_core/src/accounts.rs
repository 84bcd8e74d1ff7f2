//! Credential hashing, opaque token minting, and account input validation.

use crate::constants::MIN_PASSWORD_LENGTH;
use crate::error::AppError;
use argon2::password_hash::{
    rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
};
use argon2::Argon2;

/// Mint a random opaque token (64 hex chars).
pub fn generate_token() -> String {
    let bytes: [u8; 32] = rand::random();
    blake3::Hash::from(bytes).to_hex().to_string()
}

/// Hash a bearer/verification/reset token for storage.
///
/// Tokens are high-entropy, so an unsalted digest is enough to keep
/// database contents from being replayable.
pub fn hash_token(token: &str) -> String {
    blake3::hash(token.trim().as_bytes()).to_hex().to_string()
}

/// Hash a password with argon2id and a fresh random salt.
///
/// # Returns
/// A PHC string carrying the algorithm, parameters and salt.
///
/// # Errors
/// Returns [`AppError::Internal`] if the hasher rejects its input.
pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| {
            tracing::error!(error = %err, "password hashing failed");
            AppError::Internal
        })
}

/// Check `password` against a value produced by [`hash_password`].
///
/// Malformed stored values never verify.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// Canonical email form: trimmed and lower-cased.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Structural email check: one `@`, non-empty local part, dotted domain.
pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !email.chars().any(char::is_whitespace)
        && domain
            .split('.')
            .filter(|label| !label.is_empty())
            .count()
            >= 2
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}

/// Password policy: minimum length plus upper, lower, digit, and symbol.
pub fn is_strong_password(password: &str) -> bool {
    password.chars().count() >= MIN_PASSWORD_LENGTH
        && password.chars().any(|c| c.is_uppercase())
        && password.chars().any(|c| c.is_lowercase())
        && password.chars().any(|c| c.is_ascii_digit())
        && password.chars().any(|c| !c.is_alphanumeric() && !c.is_whitespace())
}

/// Validate registration input.
///
/// # Returns
/// The normalized `(name, email)` pair.
///
/// # Errors
/// Returns [`AppError::BadRequest`] naming the first failing field.
pub fn validate_registration(
    name: &str,
    email: &str,
    password: &str,
) -> Result<(String, String), AppError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("Missing fields".to_string()));
    }
    let email = normalize_email(email);
    if !is_valid_email(&email) {
        return Err(AppError::BadRequest("Invalid email address".to_string()));
    }
    ensure_strong_password(password)?;
    Ok((name.to_string(), email))
}

/// Reject passwords that fail [`is_strong_password`].
pub fn ensure_strong_password(password: &str) -> Result<(), AppError> {
    if is_strong_password(password) {
        Ok(())
    } else {
        Err(AppError::BadRequest(format!(
            "Password must be at least {} characters and include upper and lower case letters, a number, and a symbol",
            MIN_PASSWORD_LENGTH
        )))
    }
}
