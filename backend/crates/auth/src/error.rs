//! Auth Error Types
//!
//! This module provides auth-specific error variants that integrate
//! with the unified `kernel::error::AppError` system.
//!
//! Credential and 2FA failures are deliberately generic: responses never
//! reveal whether an account exists or which factor was wrong.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use kernel::error::{app_error::AppError, kind::ErrorKind};
use thiserror::Error;

/// Auth-specific result type alias
pub type AuthResult<T> = Result<T, AuthError>;

/// Auth-specific error variants
#[derive(Debug, Error)]
pub enum AuthError {
    /// Account not found
    #[error("Account not found")]
    AccountNotFound,

    /// Email already registered
    #[error("Email is already registered")]
    EmailTaken,

    /// Invalid credentials (wrong password, or unknown account)
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Account is locked (too many failed attempts)
    #[error("Account is temporarily locked")]
    AccountLocked { retry_after_secs: i64 },

    /// Account is disabled
    #[error("Account is disabled")]
    AccountDisabled,

    /// Session not found or expired
    #[error("Session not found or expired")]
    SessionInvalid,

    /// Session fingerprint mismatch
    #[error("Session fingerprint mismatch")]
    SessionFingerprintMismatch,

    /// 2FA required; carries the opaque challenge reference the client
    /// presents to the verify endpoint
    #[error("Two-factor authentication required")]
    TwoFactorRequired { challenge: String },

    /// Invalid 2FA code (TOTP and backup code both rejected)
    #[error("Invalid two-factor authentication code")]
    InvalidTwoFactorCode,

    /// 2FA not set up
    #[error("Two-factor authentication not set up")]
    TwoFactorNotSetup,

    /// Too many 2FA verification attempts
    #[error("Too many verification attempts, try again later")]
    TooManyTwoFactorAttempts { retry_after_secs: i64 },

    /// Stored secret could not be decrypted (corruption or key rotation gone
    /// wrong). User-facing message matches a wrong code.
    #[error("Invalid two-factor authentication code")]
    Decryption,

    /// OAuth state parameter missing or mismatched
    #[error("OAuth state validation failed")]
    InvalidState,

    /// OAuth provider rejected or garbled the code-for-token exchange
    #[error("Token exchange failed: {0}")]
    TokenExchange(String),

    /// OAuth provider profile endpoint failed
    #[error("Profile fetch failed: {0}")]
    ProfileFetch(String),

    /// Unknown provider name in the URL path
    #[error("Unsupported OAuth provider: {0}")]
    UnsupportedProvider(String),

    /// Disconnecting would leave the account with no way to sign in
    #[error("Cannot remove the last sign-in method")]
    LastAuthMethod,

    /// This provider identity is already linked to another account
    #[error("This provider account is already linked elsewhere")]
    DuplicateProviderLink,

    /// Anti-forgery token missing, expired, or invalid
    #[error("CSRF validation failed")]
    CsrfRejected,

    /// Missing required header
    #[error("Missing required header: {0}")]
    MissingHeader(String),

    /// Password validation error
    #[error("Password validation failed: {0}")]
    PasswordValidation(String),

    /// Request payload failed validation
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::AccountNotFound => StatusCode::NOT_FOUND,
            AuthError::EmailTaken | AuthError::DuplicateProviderLink => StatusCode::CONFLICT,
            AuthError::InvalidCredentials
            | AuthError::InvalidTwoFactorCode
            | AuthError::Decryption
            | AuthError::SessionInvalid
            | AuthError::SessionFingerprintMismatch => StatusCode::UNAUTHORIZED,
            AuthError::AccountLocked { .. } => StatusCode::LOCKED,
            AuthError::AccountDisabled | AuthError::CsrfRejected => StatusCode::FORBIDDEN,
            AuthError::TwoFactorRequired { .. } => StatusCode::from_u16(428).unwrap(), // Precondition Required
            AuthError::TwoFactorNotSetup => StatusCode::PRECONDITION_FAILED,
            AuthError::TooManyTwoFactorAttempts { .. } => StatusCode::TOO_MANY_REQUESTS,
            AuthError::InvalidState
            | AuthError::UnsupportedProvider(_)
            | AuthError::MissingHeader(_)
            | AuthError::PasswordValidation(_)
            | AuthError::Validation(_) => StatusCode::BAD_REQUEST,
            AuthError::LastAuthMethod => StatusCode::CONFLICT,
            AuthError::TokenExchange(_) | AuthError::ProfileFetch(_) => StatusCode::BAD_GATEWAY,
            AuthError::Database(_) | AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the ErrorKind for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::AccountNotFound => ErrorKind::NotFound,
            AuthError::EmailTaken
            | AuthError::DuplicateProviderLink
            | AuthError::LastAuthMethod => ErrorKind::Conflict,
            AuthError::InvalidCredentials
            | AuthError::InvalidTwoFactorCode
            | AuthError::Decryption
            | AuthError::SessionInvalid
            | AuthError::SessionFingerprintMismatch => ErrorKind::Unauthorized,
            AuthError::AccountLocked { .. } => ErrorKind::Locked,
            AuthError::AccountDisabled | AuthError::CsrfRejected => ErrorKind::Forbidden,
            AuthError::TwoFactorRequired { .. } => ErrorKind::PreconditionRequired,
            AuthError::TwoFactorNotSetup => ErrorKind::UnprocessableEntity,
            AuthError::TooManyTwoFactorAttempts { .. } => ErrorKind::TooManyRequests,
            AuthError::InvalidState
            | AuthError::UnsupportedProvider(_)
            | AuthError::MissingHeader(_)
            | AuthError::PasswordValidation(_)
            | AuthError::Validation(_) => ErrorKind::BadRequest,
            AuthError::TokenExchange(_) | AuthError::ProfileFetch(_) => ErrorKind::BadGateway,
            AuthError::Database(_) | AuthError::Internal(_) => ErrorKind::InternalServerError,
        }
    }

    /// Convert to AppError
    pub fn to_app_error(&self) -> AppError {
        AppError::new(self.kind(), self.to_string())
    }

    /// Log the error with appropriate level
    fn log(&self) {
        match self {
            AuthError::Database(e) => {
                tracing::error!(error = %e, "Auth database error");
            }
            AuthError::Internal(msg) => {
                tracing::error!(message = %msg, "Auth internal error");
            }
            AuthError::Decryption => {
                // Corrupted stored secret, not a user mistake
                tracing::error!("Stored secret failed to decrypt");
            }
            AuthError::TokenExchange(msg) => {
                tracing::error!(message = %msg, "OAuth token exchange failed");
            }
            AuthError::ProfileFetch(msg) => {
                tracing::error!(message = %msg, "OAuth profile fetch failed");
            }
            AuthError::InvalidCredentials => {
                tracing::warn!("Invalid login attempt");
            }
            AuthError::AccountLocked { retry_after_secs } => {
                tracing::warn!(retry_after_secs, "Login attempt on locked account");
            }
            AuthError::SessionFingerprintMismatch => {
                tracing::warn!("Session fingerprint mismatch detected");
            }
            AuthError::CsrfRejected => {
                tracing::warn!("CSRF validation failed");
            }
            AuthError::TooManyTwoFactorAttempts { retry_after_secs } => {
                tracing::warn!(retry_after_secs, "2FA attempts throttled");
            }
            _ => {
                tracing::debug!(error = %self, "Auth error");
            }
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        self.log();

        // TwoFactorRequired is not a failure from the client's point of
        // view; it carries the challenge reference in the body.
        if let AuthError::TwoFactorRequired { challenge } = &self {
            let body = serde_json::json!({
                "error": "two_factor_required",
                "message": self.to_string(),
                "challenge": challenge,
            });
            return (self.status_code(), axum::Json(body)).into_response();
        }

        if let AuthError::AccountLocked { retry_after_secs }
        | AuthError::TooManyTwoFactorAttempts { retry_after_secs } = &self
        {
            let body = serde_json::json!({
                "error": "locked",
                "message": self.to_string(),
                "retryAfterSecs": retry_after_secs,
            });
            return (self.status_code(), axum::Json(body)).into_response();
        }

        self.to_app_error().into_response()
    }
}

impl From<AppError> for AuthError {
    fn from(err: AppError) -> Self {
        AuthError::Internal(err.to_string())
    }
}

impl From<platform::client::FingerprintError> for AuthError {
    fn from(err: platform::client::FingerprintError) -> Self {
        match err {
            platform::client::FingerprintError::MissingHeader(header) => {
                AuthError::MissingHeader(header)
            }
        }
    }
}

impl From<platform::cipher::CipherError> for AuthError {
    fn from(_: platform::cipher::CipherError) -> Self {
        AuthError::Decryption
    }
}

impl From<platform::password::PasswordPolicyError> for AuthError {
    fn from(err: platform::password::PasswordPolicyError) -> Self {
        AuthError::PasswordValidation(err.to_string())
    }
}

impl From<platform::password::PasswordHashError> for AuthError {
    fn from(err: platform::password::PasswordHashError) -> Self {
        AuthError::Internal(err.to_string())
    }
}
