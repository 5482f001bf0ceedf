//! Application Layer
//!
//! Use cases and application services.

pub mod check_session;
pub mod config;
pub mod oauth;
pub mod session;
pub mod sign_in;
pub mod sign_out;
pub mod sign_up;
pub mod token;
pub mod totp_setup;
pub mod trusted_device;
pub mod two_factor;

// Re-exports
pub use check_session::{CheckSessionUseCase, SessionInfoOutput};
pub use config::{AuthConfig, OAuthProviderConfig};
pub use oauth::{OAuthCallbackOutcome, OAuthGateway, OAuthTokens, OAuthUseCase};
pub use session::IssuedSession;
pub use sign_in::{SignInInput, SignInOutcome, SignInUseCase};
pub use sign_out::SignOutUseCase;
pub use sign_up::{SignUpInput, SignUpOutput, SignUpUseCase};
pub use totp_setup::{TotpSetupOutput, TotpSetupUseCase, TwoFactorStatus};
pub use trusted_device::{TrustedDeviceUseCase, TrustedDeviceView};
pub use two_factor::{TwoFactorInput, TwoFactorOutput, VerifyTwoFactorUseCase};
