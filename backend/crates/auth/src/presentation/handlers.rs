//! HTTP Handlers

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Redirect};
use std::sync::Arc;

use platform::client::{ClientFingerprint, extract_client_ip, extract_fingerprint};
use platform::cookie::{CookieConfig, SameSite, extract_cookie};

use crate::application::config::AuthConfig;
use crate::application::token::OAUTH_STATE_TTL_MS;
use crate::application::{
    CheckSessionUseCase, OAuthCallbackOutcome, OAuthGateway, OAuthUseCase, SignInInput,
    SignInOutcome, SignInUseCase, SignOutUseCase, SignUpInput, SignUpUseCase, TotpSetupUseCase,
    TrustedDeviceUseCase, TwoFactorInput, VerifyTwoFactorUseCase,
};
use crate::domain::entity::auth_session::AuthSession;
use crate::domain::repository::{
    AccountRepository, AuthSessionRepository, BackupCodeRepository, CredentialsRepository,
    LoginHistoryRepository, OAuthIdentityRepository, TrustedDeviceRepository,
    TwoFactorThrottleRepository,
};
use crate::domain::value_object::oauth_provider::OAuthProvider;
use crate::error::{AuthError, AuthResult};
use crate::presentation::dto::{
    BackupCodesResponse, CsrfTokenResponse, LoginEventResponse, LoginHistoryResponse,
    OAuthCallbackQuery, OAuthConnectionResponse, OAuthConnectionsResponse,
    RegenerateBackupCodesRequest, SessionStatusResponse, SignInRequest, SignInResponse,
    SignOutAllResponse, SignUpRequest, SignUpResponse, TotpConfirmRequest, TotpDisableRequest,
    TotpSetupResponse, TrustedDeviceListResponse, TrustedDeviceResponse, TwoFactorStatusResponse,
    TwoFactorVerifyRequest, TwoFactorVerifyResponse,
};
use crate::presentation::middleware::csrf_session_key;

/// Login history page size for the API
const LOGIN_HISTORY_PAGE: u32 = 20;

/// Every repository port the handlers need, as one bound
pub trait AuthRepositories:
    AccountRepository
    + CredentialsRepository
    + BackupCodeRepository
    + TrustedDeviceRepository
    + OAuthIdentityRepository
    + LoginHistoryRepository
    + TwoFactorThrottleRepository
    + AuthSessionRepository
    + Clone
    + Send
    + Sync
    + 'static
{
}

impl<T> AuthRepositories for T where
    T: AccountRepository
        + CredentialsRepository
        + BackupCodeRepository
        + TrustedDeviceRepository
        + OAuthIdentityRepository
        + LoginHistoryRepository
        + TwoFactorThrottleRepository
        + AuthSessionRepository
        + Clone
        + Send
        + Sync
        + 'static
{
}

/// Shared state for auth handlers
pub struct AuthAppState<R, G>
where
    R: AuthRepositories,
    G: OAuthGateway + Send + Sync + 'static,
{
    pub repo: Arc<R>,
    pub gateway: Arc<G>,
    pub config: Arc<AuthConfig>,
}

// Manual impl: a derive would require G: Clone, but the gateway only ever
// lives behind the Arc.
impl<R, G> Clone for AuthAppState<R, G>
where
    R: AuthRepositories,
    G: OAuthGateway + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            repo: self.repo.clone(),
            gateway: self.gateway.clone(),
            config: self.config.clone(),
        }
    }
}

// ============================================================================
// Sign Up
// ============================================================================

/// POST /api/auth/signup
pub async fn sign_up<R, G>(
    State(state): State<AuthAppState<R, G>>,
    Json(req): Json<SignUpRequest>,
) -> AuthResult<(StatusCode, Json<SignUpResponse>)>
where
    R: AuthRepositories,
    G: OAuthGateway + Send + Sync + 'static,
{
    let use_case = SignUpUseCase::new(state.repo.clone(), state.repo.clone(), state.config.clone());

    let input = SignUpInput {
        email: req.email,
        password: req.password,
        display_name: req.display_name,
    };

    let output = use_case.execute(input).await?;

    Ok((
        StatusCode::CREATED,
        Json(SignUpResponse {
            public_id: output.public_id,
        }),
    ))
}

// ============================================================================
// Sign In
// ============================================================================

/// POST /api/auth/signin
///
/// Answers 200 with a session cookie, or 428 with a `challenge` field when
/// a second factor is still required.
pub async fn sign_in<R, G>(
    State(state): State<AuthAppState<R, G>>,
    headers: HeaderMap,
    axum::extract::ConnectInfo(addr): axum::extract::ConnectInfo<std::net::SocketAddr>,
    Json(req): Json<SignInRequest>,
) -> AuthResult<impl IntoResponse>
where
    R: AuthRepositories,
    G: OAuthGateway + Send + Sync + 'static,
{
    let fingerprint = request_fingerprint(&headers, addr)?;

    let use_case = SignInUseCase::new(
        state.repo.clone(),
        state.repo.clone(),
        state.repo.clone(),
        state.repo.clone(),
        state.repo.clone(),
        state.config.clone(),
    );

    let input = SignInInput {
        email: req.email,
        password: req.password,
        remember_me: req.remember_me,
        trusted_device_id: extract_cookie(&headers, &state.config.device_cookie_name),
    };

    match use_case.execute(input, fingerprint).await? {
        SignInOutcome::SignedIn(issued) => {
            let cookie =
                build_session_cookie(&state.config, &issued.session_token, issued.remember_me);

            Ok((
                StatusCode::OK,
                set_cookie_headers(vec![cookie])?,
                Json(SignInResponse {
                    public_id: issued.public_id,
                    role: issued.role,
                    expires_at_ms: issued.expires_at_ms,
                }),
            )
                .into_response())
        }
        SignInOutcome::ChallengeRequired { challenge } => {
            Err(AuthError::TwoFactorRequired { challenge })
        }
    }
}

// ============================================================================
// Two-Factor Verification
// ============================================================================

/// POST /api/auth/2fa/verify
pub async fn two_factor_verify<R, G>(
    State(state): State<AuthAppState<R, G>>,
    headers: HeaderMap,
    axum::extract::ConnectInfo(addr): axum::extract::ConnectInfo<std::net::SocketAddr>,
    Json(req): Json<TwoFactorVerifyRequest>,
) -> AuthResult<impl IntoResponse>
where
    R: AuthRepositories,
    G: OAuthGateway + Send + Sync + 'static,
{
    let fingerprint = request_fingerprint(&headers, addr)?;

    let use_case = VerifyTwoFactorUseCase::new(
        state.repo.clone(),
        state.repo.clone(),
        state.repo.clone(),
        state.repo.clone(),
        state.repo.clone(),
        state.repo.clone(),
        state.repo.clone(),
        state.config.clone(),
    );

    let input = TwoFactorInput {
        challenge: req.challenge,
        code: req.code,
        trust_device: req.trust_device,
    };

    let output = use_case.execute(input, fingerprint).await?;

    let mut cookies = vec![build_session_cookie(
        &state.config,
        &output.session.session_token,
        output.session.remember_me,
    )];
    if let Some(device_id) = &output.trusted_device_id {
        cookies.push(build_device_cookie(&state.config, device_id));
    }

    Ok((
        StatusCode::OK,
        set_cookie_headers(cookies)?,
        Json(TwoFactorVerifyResponse {
            public_id: output.session.public_id,
            role: output.session.role,
            expires_at_ms: output.session.expires_at_ms,
            backup_codes_remaining: output.backup_codes_remaining,
        }),
    ))
}

/// GET /api/auth/2fa/status
pub async fn two_factor_status<R, G>(
    State(state): State<AuthAppState<R, G>>,
    headers: HeaderMap,
    axum::extract::ConnectInfo(addr): axum::extract::ConnectInfo<std::net::SocketAddr>,
) -> AuthResult<Json<TwoFactorStatusResponse>>
where
    R: AuthRepositories,
    G: OAuthGateway + Send + Sync + 'static,
{
    let session = require_session(&state, &headers, addr).await?;

    let use_case =
        TotpSetupUseCase::new(state.repo.clone(), state.repo.clone(), state.repo.clone(), state.config.clone());
    let status = use_case.status(&session.account_id).await?;

    Ok(Json(TwoFactorStatusResponse {
        enabled: status.enabled,
        pending: status.pending,
        backup_codes_remaining: status.backup_codes_remaining,
    }))
}

// ============================================================================
// Sign Out
// ============================================================================

/// POST /api/auth/signout
pub async fn sign_out<R, G>(
    State(state): State<AuthAppState<R, G>>,
    headers: HeaderMap,
) -> AuthResult<impl IntoResponse>
where
    R: AuthRepositories,
    G: OAuthGateway + Send + Sync + 'static,
{
    if let Some(token) = extract_cookie(&headers, &state.config.session_cookie_name) {
        let use_case = SignOutUseCase::new(state.repo.clone(), state.config.clone());
        // Ignore errors, just clear the cookie
        let _ = use_case.execute(&token).await;
    }

    let cookie = build_clear_session_cookie(&state.config);

    Ok((StatusCode::NO_CONTENT, set_cookie_headers(vec![cookie])?))
}

/// POST /api/auth/signout/all
///
/// Invalidates every session of the account except the current one.
pub async fn sign_out_all<R, G>(
    State(state): State<AuthAppState<R, G>>,
    headers: HeaderMap,
    axum::extract::ConnectInfo(addr): axum::extract::ConnectInfo<std::net::SocketAddr>,
) -> AuthResult<Json<SignOutAllResponse>>
where
    R: AuthRepositories,
    G: OAuthGateway + Send + Sync + 'static,
{
    let fingerprint = request_fingerprint(&headers, addr)?;
    let token = extract_cookie(&headers, &state.config.session_cookie_name)
        .ok_or(AuthError::SessionInvalid)?;

    let use_case = SignOutUseCase::new(state.repo.clone(), state.config.clone());
    let revoked = use_case.execute_all(&token, &fingerprint.hash).await?;

    Ok(Json(SignOutAllResponse { revoked }))
}

// ============================================================================
// Session Status
// ============================================================================

/// GET /api/auth/status
pub async fn session_status<R, G>(
    State(state): State<AuthAppState<R, G>>,
    headers: HeaderMap,
    axum::extract::ConnectInfo(addr): axum::extract::ConnectInfo<std::net::SocketAddr>,
) -> AuthResult<Json<SessionStatusResponse>>
where
    R: AuthRepositories,
    G: OAuthGateway + Send + Sync + 'static,
{
    let fingerprint = request_fingerprint(&headers, addr)?;
    let token = extract_cookie(&headers, &state.config.session_cookie_name);

    let use_case = CheckSessionUseCase::new(state.repo.clone(), state.config.clone());

    let session_info = if let Some(token) = token {
        use_case.execute(&token, &fingerprint.hash).await.ok()
    } else {
        None
    };

    match session_info {
        Some(info) => Ok(Json(SessionStatusResponse {
            authenticated: true,
            public_id: Some(info.public_id),
            role: Some(info.role),
            expires_at_ms: Some(info.expires_at_ms),
        })),
        None => Ok(Json(SessionStatusResponse {
            authenticated: false,
            public_id: None,
            role: None,
            expires_at_ms: None,
        })),
    }
}

// ============================================================================
// Anti-Forgery Token
// ============================================================================

/// GET /api/auth/csrf
///
/// Issues a token bound to the current session (or client IP before
/// sign-in). The token is returned in the body and mirrored into a
/// script-readable cookie for the double-submit pattern.
pub async fn csrf_token<R, G>(
    State(state): State<AuthAppState<R, G>>,
    headers: HeaderMap,
    axum::extract::ConnectInfo(addr): axum::extract::ConnectInfo<std::net::SocketAddr>,
) -> AuthResult<impl IntoResponse>
where
    R: AuthRepositories,
    G: OAuthGateway + Send + Sync + 'static,
{
    let key = csrf_session_key(&headers, Some(addr.ip()), &state.config);
    let guard = state.config.csrf_guard();
    let token = guard.generate_token(&key);

    let cookie = build_csrf_cookie(&state.config, &token, guard.token_ttl_secs());

    Ok((
        set_cookie_headers(vec![cookie])?,
        Json(CsrfTokenResponse {
            token,
            header_name: state.config.csrf_header_name.clone(),
        }),
    ))
}

// ============================================================================
// TOTP Setup (requires authentication)
// ============================================================================

/// POST /api/auth/totp/setup
pub async fn totp_setup<R, G>(
    State(state): State<AuthAppState<R, G>>,
    headers: HeaderMap,
    axum::extract::ConnectInfo(addr): axum::extract::ConnectInfo<std::net::SocketAddr>,
) -> AuthResult<Json<TotpSetupResponse>>
where
    R: AuthRepositories,
    G: OAuthGateway + Send + Sync + 'static,
{
    let session = require_session(&state, &headers, addr).await?;

    let use_case =
        TotpSetupUseCase::new(state.repo.clone(), state.repo.clone(), state.repo.clone(), state.config.clone());
    let output = use_case.setup(&session.account_id).await?;

    Ok(Json(TotpSetupResponse {
        qr_code: output.qr_code_base64,
        secret: output.secret_base32,
        otpauth_url: output.otpauth_url,
    }))
}

/// POST /api/auth/totp/confirm
///
/// First valid code enables 2FA; the response carries the one-time view
/// of the backup codes.
pub async fn totp_confirm<R, G>(
    State(state): State<AuthAppState<R, G>>,
    headers: HeaderMap,
    axum::extract::ConnectInfo(addr): axum::extract::ConnectInfo<std::net::SocketAddr>,
    Json(req): Json<TotpConfirmRequest>,
) -> AuthResult<Json<BackupCodesResponse>>
where
    R: AuthRepositories,
    G: OAuthGateway + Send + Sync + 'static,
{
    let session = require_session(&state, &headers, addr).await?;

    let use_case =
        TotpSetupUseCase::new(state.repo.clone(), state.repo.clone(), state.repo.clone(), state.config.clone());
    let backup_codes = use_case.confirm(&session.account_id, &req.code).await?;

    Ok(Json(BackupCodesResponse { backup_codes }))
}

/// POST /api/auth/totp/disable
pub async fn totp_disable<R, G>(
    State(state): State<AuthAppState<R, G>>,
    headers: HeaderMap,
    axum::extract::ConnectInfo(addr): axum::extract::ConnectInfo<std::net::SocketAddr>,
    Json(req): Json<TotpDisableRequest>,
) -> AuthResult<StatusCode>
where
    R: AuthRepositories,
    G: OAuthGateway + Send + Sync + 'static,
{
    let session = require_session(&state, &headers, addr).await?;

    let use_case =
        TotpSetupUseCase::new(state.repo.clone(), state.repo.clone(), state.repo.clone(), state.config.clone());
    use_case.disable(&session.account_id, &req.code).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/auth/totp/backup-codes
///
/// Replaces the whole batch; old codes stop working immediately.
pub async fn regenerate_backup_codes<R, G>(
    State(state): State<AuthAppState<R, G>>,
    headers: HeaderMap,
    axum::extract::ConnectInfo(addr): axum::extract::ConnectInfo<std::net::SocketAddr>,
    Json(req): Json<RegenerateBackupCodesRequest>,
) -> AuthResult<Json<BackupCodesResponse>>
where
    R: AuthRepositories,
    G: OAuthGateway + Send + Sync + 'static,
{
    let session = require_session(&state, &headers, addr).await?;

    let use_case =
        TotpSetupUseCase::new(state.repo.clone(), state.repo.clone(), state.repo.clone(), state.config.clone());
    let backup_codes = use_case
        .regenerate_backup_codes(&session.account_id, &req.code)
        .await?;

    Ok(Json(BackupCodesResponse { backup_codes }))
}

// ============================================================================
// Trusted Devices (requires authentication)
// ============================================================================

/// GET /api/auth/devices
pub async fn list_trusted_devices<R, G>(
    State(state): State<AuthAppState<R, G>>,
    headers: HeaderMap,
    axum::extract::ConnectInfo(addr): axum::extract::ConnectInfo<std::net::SocketAddr>,
) -> AuthResult<Json<TrustedDeviceListResponse>>
where
    R: AuthRepositories,
    G: OAuthGateway + Send + Sync + 'static,
{
    let session = require_session(&state, &headers, addr).await?;

    let use_case = TrustedDeviceUseCase::new(state.repo.clone(), state.config.clone());
    let devices = use_case.list(&session.account_id).await?;

    Ok(Json(TrustedDeviceListResponse {
        devices: devices
            .into_iter()
            .map(|d| TrustedDeviceResponse {
                device_id: d.device_id,
                display_name: d.display_name,
                created_at_ms: d.created_at.timestamp_millis(),
                last_used_at_ms: d.last_used_at.timestamp_millis(),
                expired: d.expired,
            })
            .collect(),
    }))
}

/// DELETE /api/auth/devices/{device_id}
pub async fn revoke_trusted_device<R, G>(
    State(state): State<AuthAppState<R, G>>,
    headers: HeaderMap,
    axum::extract::ConnectInfo(addr): axum::extract::ConnectInfo<std::net::SocketAddr>,
    Path(device_id): Path<String>,
) -> AuthResult<StatusCode>
where
    R: AuthRepositories,
    G: OAuthGateway + Send + Sync + 'static,
{
    let session = require_session(&state, &headers, addr).await?;

    let use_case = TrustedDeviceUseCase::new(state.repo.clone(), state.config.clone());
    use_case.revoke(&session.account_id, &device_id).await?;

    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Login History (requires authentication)
// ============================================================================

/// GET /api/auth/history
pub async fn login_history<R, G>(
    State(state): State<AuthAppState<R, G>>,
    headers: HeaderMap,
    axum::extract::ConnectInfo(addr): axum::extract::ConnectInfo<std::net::SocketAddr>,
) -> AuthResult<Json<LoginHistoryResponse>>
where
    R: AuthRepositories,
    G: OAuthGateway + Send + Sync + 'static,
{
    let session = require_session(&state, &headers, addr).await?;

    let events = state
        .repo
        .find_recent(&session.account_id, LOGIN_HISTORY_PAGE)
        .await?;

    Ok(Json(LoginHistoryResponse {
        events: events
            .into_iter()
            .map(|e| LoginEventResponse {
                success: e.success,
                method: e.method.code(),
                client_ip: e.client_ip,
                user_agent: e.user_agent,
                created_at_ms: e.created_at.timestamp_millis(),
            })
            .collect(),
    }))
}

// ============================================================================
// OAuth
// ============================================================================

/// GET /api/auth/oauth/{provider}
///
/// Redirects the browser to the provider's authorization page; the state
/// value is pinned in a short-lived cookie for the callback check.
pub async fn oauth_begin<R, G>(
    State(state): State<AuthAppState<R, G>>,
    Path(provider): Path<String>,
) -> AuthResult<impl IntoResponse>
where
    R: AuthRepositories,
    G: OAuthGateway + Send + Sync + 'static,
{
    let provider: OAuthProvider = provider.parse()?;

    let use_case = oauth_use_case(&state);
    let (url, oauth_state) = use_case.begin(provider)?;

    let cookie = build_oauth_state_cookie(&state.config, &oauth_state);

    Ok((set_cookie_headers(vec![cookie])?, Redirect::to(&url)))
}

/// GET /api/auth/oauth/{provider}/callback
///
/// A signed-in caller gets the provider linked to their account; an
/// anonymous caller is signed in (or challenged for their second factor).
pub async fn oauth_callback<R, G>(
    State(state): State<AuthAppState<R, G>>,
    headers: HeaderMap,
    axum::extract::ConnectInfo(addr): axum::extract::ConnectInfo<std::net::SocketAddr>,
    Path(provider): Path<String>,
    Query(query): Query<OAuthCallbackQuery>,
) -> AuthResult<impl IntoResponse>
where
    R: AuthRepositories,
    G: OAuthGateway + Send + Sync + 'static,
{
    let provider: OAuthProvider = provider.parse()?;
    let fingerprint = request_fingerprint(&headers, addr)?;

    if let Some(error) = query.error {
        return Err(AuthError::Validation(format!(
            "{} denied the request: {error}",
            provider.display_name()
        )));
    }

    let code = query.code.ok_or(AuthError::InvalidState)?;
    let callback_state = query.state.ok_or(AuthError::InvalidState)?;
    let cookie_state = extract_cookie(&headers, &state.config.oauth_state_cookie_name)
        .ok_or(AuthError::InvalidState)?;

    // A valid session turns the callback into a link operation
    let link_to = match extract_cookie(&headers, &state.config.session_cookie_name) {
        Some(token) => {
            let check = CheckSessionUseCase::new(state.repo.clone(), state.config.clone());
            check
                .get_session(&token, &fingerprint.hash)
                .await
                .ok()
                .map(|s| s.account_id)
        }
        None => None,
    };

    let use_case = oauth_use_case(&state);
    let outcome = use_case
        .callback(
            provider,
            &code,
            &callback_state,
            &cookie_state,
            link_to,
            fingerprint,
        )
        .await?;

    // The state cookie is single-use either way
    let mut cookies = vec![build_clear_oauth_state_cookie(&state.config)];

    let redirect = match outcome {
        OAuthCallbackOutcome::SignedIn(issued) => {
            cookies.push(build_session_cookie(
                &state.config,
                &issued.session_token,
                issued.remember_me,
            ));
            state.config.post_oauth_redirect.clone()
        }
        OAuthCallbackOutcome::ChallengeRequired { challenge } => {
            // The challenge is URL-safe by construction
            with_query_param(
                &state.config.post_oauth_redirect,
                "twoFactorChallenge",
                &challenge,
            )
        }
        OAuthCallbackOutcome::Linked => {
            with_query_param(&state.config.post_oauth_redirect, "linked", provider.code())
        }
    };

    Ok((set_cookie_headers(cookies)?, Redirect::to(&redirect)))
}

/// GET /api/auth/oauth
pub async fn oauth_connections<R, G>(
    State(state): State<AuthAppState<R, G>>,
    headers: HeaderMap,
    axum::extract::ConnectInfo(addr): axum::extract::ConnectInfo<std::net::SocketAddr>,
) -> AuthResult<Json<OAuthConnectionsResponse>>
where
    R: AuthRepositories,
    G: OAuthGateway + Send + Sync + 'static,
{
    let session = require_session(&state, &headers, addr).await?;

    let use_case = oauth_use_case(&state);
    let links = use_case.list(&session.account_id).await?;

    Ok(Json(OAuthConnectionsResponse {
        connections: links
            .into_iter()
            .map(|l| OAuthConnectionResponse {
                provider: l.provider.code().to_string(),
                provider_display_name: l.provider.display_name().to_string(),
                email: l.email,
                name: l.name,
                connected_at_ms: l.created_at.timestamp_millis(),
                last_used_at_ms: l.last_used_at.timestamp_millis(),
            })
            .collect(),
    }))
}

/// DELETE /api/auth/oauth/{provider}
pub async fn oauth_disconnect<R, G>(
    State(state): State<AuthAppState<R, G>>,
    headers: HeaderMap,
    axum::extract::ConnectInfo(addr): axum::extract::ConnectInfo<std::net::SocketAddr>,
    Path(provider): Path<String>,
) -> AuthResult<StatusCode>
where
    R: AuthRepositories,
    G: OAuthGateway + Send + Sync + 'static,
{
    let provider: OAuthProvider = provider.parse()?;
    let session = require_session(&state, &headers, addr).await?;

    let use_case = oauth_use_case(&state);
    use_case.disconnect(&session.account_id, provider).await?;

    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Helper Functions
// ============================================================================

fn request_fingerprint(
    headers: &HeaderMap,
    addr: std::net::SocketAddr,
) -> AuthResult<ClientFingerprint> {
    let client_ip = extract_client_ip(headers, Some(addr.ip()));
    Ok(extract_fingerprint(headers, client_ip)?)
}

/// Resolve the current session or fail with 401
async fn require_session<R, G>(
    state: &AuthAppState<R, G>,
    headers: &HeaderMap,
    addr: std::net::SocketAddr,
) -> AuthResult<AuthSession>
where
    R: AuthRepositories,
    G: OAuthGateway + Send + Sync + 'static,
{
    let fingerprint = request_fingerprint(headers, addr)?;
    let token = extract_cookie(headers, &state.config.session_cookie_name)
        .ok_or(AuthError::SessionInvalid)?;

    let use_case = CheckSessionUseCase::new(state.repo.clone(), state.config.clone());
    use_case.get_session(&token, &fingerprint.hash).await
}

fn oauth_use_case<R, G>(
    state: &AuthAppState<R, G>,
) -> OAuthUseCase<R, R, R, R, R, G>
where
    R: AuthRepositories,
    G: OAuthGateway + Send + Sync + 'static,
{
    OAuthUseCase::new(
        state.repo.clone(),
        state.repo.clone(),
        state.repo.clone(),
        state.repo.clone(),
        state.repo.clone(),
        state.gateway.clone(),
        state.config.clone(),
    )
}

fn set_cookie_headers(cookies: Vec<String>) -> AuthResult<HeaderMap> {
    let mut headers = HeaderMap::new();
    for cookie in cookies {
        let value = HeaderValue::from_str(&cookie)
            .map_err(|e| AuthError::Internal(format!("Invalid cookie value: {e}")))?;
        headers.append(header::SET_COOKIE, value);
    }
    Ok(headers)
}

fn session_cookie_config(config: &AuthConfig, max_age_secs: Option<i64>) -> CookieConfig {
    CookieConfig {
        name: config.session_cookie_name.clone(),
        secure: config.cookie_secure,
        http_only: true,
        same_site: config.cookie_same_site,
        path: "/".to_string(),
        max_age_secs,
    }
}

/// Session cookie; Max-Age must match the remember-me TTL choice
fn build_session_cookie(config: &AuthConfig, token: &str, remember_me: bool) -> String {
    let max_age = if remember_me {
        config.session_ttl_long.as_secs()
    } else {
        config.session_ttl_short.as_secs()
    };

    session_cookie_config(config, Some(max_age as i64)).build_set_cookie(token)
}

fn build_clear_session_cookie(config: &AuthConfig) -> String {
    session_cookie_config(config, None).build_delete_cookie()
}

/// Trusted device cookie; outlives the session by design
fn build_device_cookie(config: &AuthConfig, device_id: &str) -> String {
    CookieConfig {
        name: config.device_cookie_name.clone(),
        secure: config.cookie_secure,
        http_only: true,
        same_site: config.cookie_same_site,
        path: "/".to_string(),
        max_age_secs: Some(config.trusted_device_ttl.as_secs() as i64),
    }
    .build_set_cookie(device_id)
}

/// Anti-forgery cookie; script-readable for the double-submit pattern.
/// Always SameSite=Strict regardless of the configured session policy so
/// the token never rides along on a cross-site navigation.
fn build_csrf_cookie(config: &AuthConfig, token: &str, max_age_secs: i64) -> String {
    CookieConfig {
        name: config.csrf_cookie_name.clone(),
        secure: config.cookie_secure,
        http_only: false,
        same_site: SameSite::Strict,
        path: "/".to_string(),
        max_age_secs: Some(max_age_secs),
    }
    .build_set_cookie(token)
}

/// OAuth state cookie; SameSite=Lax so it survives the top-level redirect
/// back from the provider
fn oauth_state_cookie_config(config: &AuthConfig, max_age_secs: Option<i64>) -> CookieConfig {
    CookieConfig {
        name: config.oauth_state_cookie_name.clone(),
        secure: config.cookie_secure,
        http_only: true,
        same_site: SameSite::Lax,
        path: "/".to_string(),
        max_age_secs,
    }
}

fn build_oauth_state_cookie(config: &AuthConfig, state: &str) -> String {
    oauth_state_cookie_config(config, Some(OAUTH_STATE_TTL_MS / 1000)).build_set_cookie(state)
}

fn build_clear_oauth_state_cookie(config: &AuthConfig) -> String {
    oauth_state_cookie_config(config, None).build_delete_cookie()
}

fn with_query_param(base: &str, key: &str, value: &str) -> String {
    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{base}{separator}{key}={value}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csrf_cookie_is_strict_and_script_readable() {
        let config = AuthConfig::with_random_secret();
        // Session cookies default to Lax; the anti-forgery cookie must
        // stay Strict even then
        assert_eq!(config.cookie_same_site, SameSite::Lax);

        let cookie = build_csrf_cookie(&config, "tok", 3600);
        assert!(cookie.starts_with(&format!("{}=tok", config.csrf_cookie_name)));
        assert!(cookie.contains("SameSite=Strict"));
        assert!(!cookie.contains("HttpOnly"));
        assert!(cookie.contains("Max-Age=3600"));
    }

    #[test]
    fn test_session_cookie_follows_configured_policy() {
        let config = AuthConfig::with_random_secret();

        let cookie = build_session_cookie(&config, "token", false);
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
    }

    #[test]
    fn test_with_query_param() {
        assert_eq!(
            with_query_param("https://app/x", "linked", "google"),
            "https://app/x?linked=google"
        );
        assert_eq!(
            with_query_param("https://app/x?tab=1", "linked", "google"),
            "https://app/x?tab=1&linked=google"
        );
    }
}
