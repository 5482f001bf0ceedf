//! Auth Middleware
//!
//! Session gating for protected routes and the anti-forgery check on
//! state-changing requests.

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, Request, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use platform::client::{extract_client_ip, extract_fingerprint};
use platform::cookie::extract_cookie;
use platform::csrf::{CsrfGuard, OriginPolicy};
use std::net::IpAddr;
use std::sync::Arc;

use crate::application::CheckSessionUseCase;
use crate::application::config::AuthConfig;
use crate::domain::repository::AuthSessionRepository;
use crate::error::AuthError;

/// Middleware state
#[derive(Clone)]
pub struct AuthMiddlewareState<R>
where
    R: AuthSessionRepository + Clone + Send + Sync + 'static,
{
    pub repo: Arc<R>,
    pub config: Arc<AuthConfig>,
}

/// Middleware that requires a valid auth session
pub async fn require_auth_session<R>(
    state: AuthMiddlewareState<R>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, Response>
where
    R: AuthSessionRepository + Clone + Send + Sync + 'static,
{
    let headers = req.headers();
    let client_ip = connect_info_ip(&req);
    let client_ip = extract_client_ip(headers, client_ip);

    let fingerprint = match extract_fingerprint(headers, client_ip) {
        Ok(fp) => fp,
        Err(e) => return Err(AuthError::from(e).into_response()),
    };

    let token = extract_cookie(headers, &state.config.session_cookie_name);

    let use_case = CheckSessionUseCase::new(state.repo.clone(), state.config.clone());

    let session_valid = if let Some(token) = token {
        use_case.is_valid(&token, &fingerprint.hash).await
    } else {
        false
    };

    if !session_valid {
        return Err((StatusCode::UNAUTHORIZED, [("X-Auth-Required", "true")]).into_response());
    }

    Ok(next.run(req).await)
}

/// Middleware that checks the auth session but doesn't require it
///
/// Stores [`AuthStatus`] in request extensions for downstream handlers.
pub async fn check_auth_session<R>(
    state: AuthMiddlewareState<R>,
    mut req: Request<Body>,
    next: Next,
) -> Response
where
    R: AuthSessionRepository + Clone + Send + Sync + 'static,
{
    let headers = req.headers();
    let client_ip = connect_info_ip(&req);
    let client_ip = extract_client_ip(headers, client_ip);

    let fingerprint = extract_fingerprint(headers, client_ip).ok();
    let token = extract_cookie(headers, &state.config.session_cookie_name);

    let status = if let (Some(token), Some(fp)) = (token, fingerprint) {
        let use_case = CheckSessionUseCase::new(state.repo.clone(), state.config.clone());
        match use_case.get_session(&token, &fp.hash).await {
            Ok(session) => AuthStatus {
                is_authenticated: true,
                public_id: Some(session.public_id.to_string()),
            },
            Err(_) => AuthStatus::anonymous(),
        }
    } else {
        AuthStatus::anonymous()
    };

    req.extensions_mut().insert(status);

    next.run(req).await
}

/// Authentication status stored in request extensions
#[derive(Clone)]
pub struct AuthStatus {
    pub is_authenticated: bool,
    pub public_id: Option<String>,
}

impl AuthStatus {
    fn anonymous() -> Self {
        Self {
            is_authenticated: false,
            public_id: None,
        }
    }
}

// ============================================================================
// Anti-Forgery
// ============================================================================

/// Middleware enforcing the anti-forgery token on unsafe methods
///
/// The token comes from the configured header, falling back to the
/// double-submit cookie. Origin/Referer headers, when present, must match
/// the allow-list.
pub async fn csrf_protect(
    State(config): State<Arc<AuthConfig>>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, Response> {
    if !CsrfGuard::method_requires_token(req.method().as_str()) {
        return Ok(next.run(req).await);
    }

    let headers = req.headers();

    let origin_policy = if config.allowed_origins.is_empty() {
        OriginPolicy::permissive()
    } else {
        OriginPolicy::enforcing(config.allowed_origins.clone())
    };

    let origin = headers.get(header::ORIGIN).and_then(|v| v.to_str().ok());
    let referer = headers.get(header::REFERER).and_then(|v| v.to_str().ok());
    if !origin_policy.check(origin, referer) {
        return Err(AuthError::CsrfRejected.into_response());
    }

    let token = headers
        .get(config.csrf_header_name.as_str())
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| extract_cookie(headers, &config.csrf_cookie_name));

    let Some(token) = token else {
        return Err(AuthError::CsrfRejected.into_response());
    };

    let client_ip = connect_info_ip(&req);
    let key = csrf_session_key(headers, client_ip, &config);

    if !config.csrf_guard().validate_token(&token, &key) {
        return Err(AuthError::CsrfRejected.into_response());
    }

    Ok(next.run(req).await)
}

/// The key an anti-forgery token is bound to
///
/// The session cookie value when signed in, the client IP before that.
/// Issuance and validation must agree on this, so both go through here.
pub(crate) fn csrf_session_key(
    headers: &HeaderMap,
    client_ip: Option<IpAddr>,
    config: &AuthConfig,
) -> String {
    if let Some(session) = extract_cookie(headers, &config.session_cookie_name) {
        return session;
    }

    match extract_client_ip(headers, client_ip) {
        Some(ip) => ip.to_string(),
        None => "anonymous".to_string(),
    }
}

fn connect_info_ip(req: &Request<Body>) -> Option<IpAddr> {
    req.extensions()
        .get::<axum::extract::ConnectInfo<std::net::SocketAddr>>()
        .map(|info| info.0.ip())
}
