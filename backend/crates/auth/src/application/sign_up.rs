//! Sign Up Use Case
//!
//! Registers a new account with email and password credentials.

use std::sync::Arc;

use crate::application::config::AuthConfig;
use crate::domain::entity::{account::Account, credentials::Credentials};
use crate::domain::repository::{AccountRepository, CredentialsRepository};
use crate::domain::value_object::{
    email::Email,
    password::{PasswordHash, RawPassword},
};
use crate::error::{AuthError, AuthResult};

/// Display name length bounds
const DISPLAY_NAME_MAX: usize = 50;

/// Sign up input
pub struct SignUpInput {
    pub email: String,
    pub password: String,
    pub display_name: String,
}

/// Sign up output
pub struct SignUpOutput {
    /// Public ID of the created account
    pub public_id: String,
}

/// Sign up use case
pub struct SignUpUseCase<A, C>
where
    A: AccountRepository,
    C: CredentialsRepository,
{
    account_repo: Arc<A>,
    credentials_repo: Arc<C>,
    config: Arc<AuthConfig>,
}

impl<A, C> SignUpUseCase<A, C>
where
    A: AccountRepository,
    C: CredentialsRepository,
{
    pub fn new(account_repo: Arc<A>, credentials_repo: Arc<C>, config: Arc<AuthConfig>) -> Self {
        Self {
            account_repo,
            credentials_repo,
            config,
        }
    }

    pub async fn execute(&self, input: SignUpInput) -> AuthResult<SignUpOutput> {
        let email = Email::new(&input.email)?;

        let display_name = input.display_name.trim().to_string();
        if display_name.is_empty() {
            return Err(AuthError::Validation("Display name cannot be empty".to_string()));
        }
        if display_name.chars().count() > DISPLAY_NAME_MAX {
            return Err(AuthError::Validation(format!(
                "Display name must be at most {} characters",
                DISPLAY_NAME_MAX
            )));
        }

        // Password validation and hashing happens before the uniqueness
        // check so a taken email is only revealed for well-formed requests.
        let raw_password = RawPassword::new(input.password)
            .map_err(|e| AuthError::PasswordValidation(e.to_string()))?;
        let password_hash = PasswordHash::from_raw(&raw_password, self.config.pepper())?;

        if self.account_repo.exists_by_email(&email).await? {
            return Err(AuthError::EmailTaken);
        }

        let account = Account::new(email, display_name);
        let credentials = Credentials::new(account.account_id, password_hash);

        self.account_repo.create(&account).await?;
        self.credentials_repo.create(&credentials).await?;

        tracing::info!(
            public_id = %account.public_id,
            "Account registered"
        );

        Ok(SignUpOutput {
            public_id: account.public_id.to_string(),
        })
    }
}
