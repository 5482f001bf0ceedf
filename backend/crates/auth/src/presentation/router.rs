//! Auth Router

use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use std::sync::Arc;

use crate::application::config::AuthConfig;
use crate::application::oauth::OAuthGateway;
use crate::infra::oauth_http::HttpOAuthGateway;
use crate::infra::postgres::PgAuthRepository;
use crate::presentation::handlers::{self, AuthAppState, AuthRepositories};
use crate::presentation::middleware;

/// Create the Auth router with the PostgreSQL repository and the real
/// provider gateway
pub fn auth_router(
    repo: PgAuthRepository,
    gateway: HttpOAuthGateway,
    config: AuthConfig,
) -> Router {
    auth_router_generic(repo, gateway, config)
}

/// Create an Auth router for any repository and gateway implementation
pub fn auth_router_generic<R, G>(repo: R, gateway: G, config: AuthConfig) -> Router
where
    R: AuthRepositories,
    G: OAuthGateway + Send + Sync + 'static,
{
    let config = Arc::new(config);
    let state = AuthAppState {
        repo: Arc::new(repo),
        gateway: Arc::new(gateway),
        config: config.clone(),
    };

    Router::new()
        .route("/signup", post(handlers::sign_up::<R, G>))
        .route("/signin", post(handlers::sign_in::<R, G>))
        .route("/signout", post(handlers::sign_out::<R, G>))
        .route("/signout/all", post(handlers::sign_out_all::<R, G>))
        .route("/status", get(handlers::session_status::<R, G>))
        .route("/csrf", get(handlers::csrf_token::<R, G>))
        .route("/history", get(handlers::login_history::<R, G>))
        .route("/2fa/verify", post(handlers::two_factor_verify::<R, G>))
        .route("/2fa/status", get(handlers::two_factor_status::<R, G>))
        .route("/totp/setup", post(handlers::totp_setup::<R, G>))
        .route("/totp/confirm", post(handlers::totp_confirm::<R, G>))
        .route("/totp/disable", post(handlers::totp_disable::<R, G>))
        .route(
            "/totp/backup-codes",
            post(handlers::regenerate_backup_codes::<R, G>),
        )
        .route("/devices", get(handlers::list_trusted_devices::<R, G>))
        .route(
            "/devices/{device_id}",
            axum::routing::delete(handlers::revoke_trusted_device::<R, G>),
        )
        .route("/oauth", get(handlers::oauth_connections::<R, G>))
        .route(
            "/oauth/{provider}",
            get(handlers::oauth_begin::<R, G>)
                .delete(handlers::oauth_disconnect::<R, G>),
        )
        .route(
            "/oauth/{provider}/callback",
            get(handlers::oauth_callback::<R, G>),
        )
        .layer(from_fn_with_state(config, middleware::csrf_protect))
        .with_state(state)
}
