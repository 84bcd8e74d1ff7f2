//! Account HTTP handlers.

use crate::{
    accounts,
    auth::CurrentUser,
    constants::{PASSWORD_RESET_EXPIRY_MINS, VERIFICATION_LINK_EXPIRY_HRS},
    error::HttpError,
    listing::{self, Dashboard},
    models::user::{
        ForgotPasswordRequest, LoginRequest, RegisterRequest, ResetPasswordRequest, User,
        UserProfile,
    },
    AppError, AppState, Config,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{Duration, Utc};
use serde::Serialize;
use serde_json::json;

/// Emit a raw verification link or reset token. No-op unless `log_account_tokens` is set.
fn log_account_token(config: &Config, user_id: &str, secret: &str) {
    if config.log_account_tokens {
        tracing::debug!(user_id, secret, "account token for local delivery");
    }
}

/// Session issued by a successful login.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserProfile,
}

/// Register an unverified account and issue its verification link.
///
/// # Returns
/// `201 Created` with the new profile.
///
/// # Errors
/// Returns an error for invalid input, a taken email, or storage failures.
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserProfile>), HttpError> {
    let (name, email) = accounts::validate_registration(&req.name, &req.email, &req.password)?;

    let token = accounts::generate_token();
    let password_hash = accounts::hash_password(&req.password)?;
    let mut user = User::new(&name, &email, password_hash);
    user.verification_token_hash = Some(accounts::hash_token(&token));
    user.verification_expires_at =
        Some(Utc::now() + Duration::hours(VERIFICATION_LINK_EXPIRY_HRS));
    state.db.users.create(&user)?;

    // Stands in for email delivery.
    tracing::info!(user_id = %user.id, email = %user.email, "verification link issued");
    log_account_token(
        &state.config,
        &user.id,
        &format!("/api/users/verify/{}", token),
    );
    Ok((StatusCode::CREATED, Json(user.profile())))
}

/// Consume a verification token.
///
/// # Errors
/// Returns an error for unknown, replayed or expired tokens.
pub async fn verify_email(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<UserProfile>, HttpError> {
    let user = state
        .db
        .users
        .consume_verification(&accounts::hash_token(&token), Utc::now())?;
    tracing::info!(user_id = %user.id, "email verified");
    Ok(Json(user.profile()))
}

/// Exchange credentials for a session token.
///
/// # Errors
/// Returns [`AppError::Unauthorized`] for bad credentials and
/// [`AppError::Forbidden`] for unverified accounts.
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, HttpError> {
    let email = accounts::normalize_email(&req.email);
    let user = state
        .db
        .users
        .get_by_email(&email)?
        .filter(|user| accounts::verify_password(&req.password, &user.password_hash))
        .ok_or(AppError::Unauthorized)?;
    if !user.is_verified {
        return Err(AppError::Forbidden(
            "Please verify your email before logging in".to_string(),
        )
        .into());
    }

    let token = state.db.sessions.create(&user.id)?;
    tracing::debug!(user_id = %user.id, "session opened");
    Ok(Json(LoginResponse {
        token,
        user: user.profile(),
    }))
}

/// Revoke the presented session.
///
/// # Errors
/// Returns an error if storage fails.
pub async fn logout(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Json<serde_json::Value>, HttpError> {
    state.db.sessions.revoke(&current.token)?;
    Ok(super::success())
}

/// Issue a password reset token when the account exists.
///
/// The response is identical whether or not the email is registered.
///
/// # Errors
/// Returns an error if storage fails.
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(req): Json<ForgotPasswordRequest>,
) -> Result<Json<serde_json::Value>, HttpError> {
    let email = accounts::normalize_email(&req.email);
    if let Some(user) = state.db.users.get_by_email(&email)? {
        let token = accounts::generate_token();
        state.db.users.set_reset_token(
            &user.id,
            &accounts::hash_token(&token),
            Utc::now() + Duration::minutes(PASSWORD_RESET_EXPIRY_MINS),
        )?;
        tracing::info!(user_id = %user.id, "password reset token issued");
        log_account_token(&state.config, &user.id, &token);
    }
    Ok(Json(json!({
        "message": "If that email is registered, a reset link has been sent"
    })))
}

/// Consume a reset token and set a new password.
///
/// # Errors
/// Returns an error for weak passwords and invalid or expired tokens.
pub async fn reset_password(
    State(state): State<AppState>,
    Json(req): Json<ResetPasswordRequest>,
) -> Result<Json<serde_json::Value>, HttpError> {
    accounts::ensure_strong_password(&req.password)?;
    let user = state.db.users.consume_reset(
        &accounts::hash_token(&req.token),
        accounts::hash_password(&req.password)?,
        Utc::now(),
    )?;
    tracing::info!(user_id = %user.id, "password reset");
    Ok(super::success())
}

/// Profile with recently viewed and liked notes.
///
/// # Errors
/// Returns an error if storage fails.
pub async fn dashboard(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Json<Dashboard>, HttpError> {
    Ok(Json(listing::dashboard(&state.db, &current.user.id)?))
}

/// Delete the caller's account. Their notes stay listed under a placeholder author.
///
/// # Errors
/// Returns an error if storage fails.
pub async fn delete_account(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Json<serde_json::Value>, HttpError> {
    if !state.db.users.delete(&current.user.id)? {
        return Err(AppError::NotFound.into());
    }
    tracing::info!(user_id = %current.user.id, "account deleted");
    Ok(super::success())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().expect("log buffer").extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn debug_output_of(config: &Config, secret: &str) -> String {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, || {
            log_account_token(config, "user-1", secret);
        });
        let bytes = captured.0.lock().expect("log buffer").clone();
        String::from_utf8(bytes).expect("utf8 log output")
    }

    #[test]
    fn account_tokens_stay_out_of_logs_by_default() {
        let temp = tempfile::TempDir::new().expect("temp dir");
        let config = Config::for_data_dir(temp.path());

        let output = debug_output_of(&config, "reset-secret-123");
        assert!(!output.contains("reset-secret-123"), "{}", output);
    }

    #[test]
    fn account_tokens_are_logged_when_opted_in() {
        let temp = tempfile::TempDir::new().expect("temp dir");
        let mut config = Config::for_data_dir(temp.path());
        config.log_account_tokens = true;

        let output = debug_output_of(&config, "reset-secret-123");
        assert!(output.contains("reset-secret-123"), "{}", output);
        assert!(output.contains("DEBUG"), "{}", output);
    }
}
