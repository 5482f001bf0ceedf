//! API Server Entry Point
//!
//! Application entry point and server initialization.
//! Uses `anyhow` for startup errors, but application-level
//! errors should use `kernel::error::AppError`.

use auth::config::OAuthProviderConfig;
use auth::infra::HttpOAuthGateway;
use auth::{AuthConfig, PgAuthRepository, auth_router};
use axum::{
    Router, http,
    http::{Method, header},
};
use base64::Engine;
use base64::engine::general_purpose;
use sqlx::postgres::PgPoolOptions;
use std::env;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::cors::{AllowHeaders, AllowMethods, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// Re-export unified error types for use in handlers
pub use kernel::error::{
    app_error::{AppError, AppResult},
    kind::ErrorKind,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "api=info,auth=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Database connection
    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set in environment");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;

    tracing::info!("Connected to database");

    // Run migrations
    sqlx::migrate!("../../../database/migrations")
        .run(&pool)
        .await?;

    tracing::info!("Migrations completed");

    // Startup cleanup: remove expired sessions
    // Errors here should not prevent server startup
    let repo_for_cleanup = PgAuthRepository::new(pool.clone());
    match repo_for_cleanup.cleanup_expired().await {
        Ok(sessions) => {
            tracing::info!(
                sessions_deleted = sessions,
                "Auth session cleanup completed"
            );
        }
        Err(e) => {
            tracing::warn!(
                error = %e,
                "Auth session cleanup failed, continuing anyway"
            );
        }
    }

    let auth_config = build_auth_config()?;
    let gateway = HttpOAuthGateway::new(auth_config.oauth_http_timeout)?;
    let repo = PgAuthRepository::new(pool.clone());

    // CORS configuration
    let frontend_origins = env::var("FRONTEND_ORIGINS")
        .unwrap_or_else(|_| "http://localhost:40922,http://127.0.0.1:40922".to_string());

    let allowed_origins: Vec<http::HeaderValue> = frontend_origins
        .split(',')
        .filter_map(|origin| origin.trim().parse().ok())
        .collect();

    let csrf_header = auth_config
        .csrf_header_name
        .parse::<header::HeaderName>()
        .map_err(|e| anyhow::anyhow!("Invalid CSRF header name: {e}"))?;

    let cors = CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods(AllowMethods::list([
            Method::GET,
            Method::POST,
            Method::DELETE,
            Method::OPTIONS,
        ]))
        .allow_headers(AllowHeaders::list([
            header::CONTENT_TYPE,
            header::ACCEPT,
            csrf_header,
        ]))
        .allow_credentials(true);

    // Build router
    let app = Router::new()
        .nest("/api/auth", auth_router(repo, gateway, auth_config))
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Start server
    let port = env::var("API_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(31113);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// Assemble the auth configuration from the environment
///
/// Debug builds fall back to random secrets; production requires them.
fn build_auth_config() -> anyhow::Result<AuthConfig> {
    let mut config = if cfg!(debug_assertions) {
        AuthConfig::development()
    } else {
        AuthConfig {
            session_secret: decode_secret("AUTH_SESSION_SECRET")?,
            master_key: decode_secret("AUTH_MASTER_KEY")?,
            csrf_secret: decode_secret("AUTH_CSRF_SECRET")?,
            ..AuthConfig::default()
        }
    };

    if let Ok(pepper_b64) = env::var("AUTH_PASSWORD_PEPPER") {
        config.password_pepper = Some(Engine::decode(&general_purpose::STANDARD, &pepper_b64)?);
    }

    config.allowed_origins = env::var("FRONTEND_ORIGINS")
        .unwrap_or_default()
        .split(',')
        .map(|o| o.trim().to_string())
        .filter(|o| !o.is_empty())
        .collect();

    if let Ok(redirect) = env::var("POST_OAUTH_REDIRECT") {
        config.post_oauth_redirect = redirect;
    }

    config.google = provider_from_env("GOOGLE", &["openid", "email", "profile"]);
    config.github = provider_from_env("GITHUB", &["read:user", "user:email"]);
    config.vk = provider_from_env("VK", &["email"]);

    Ok(config)
}

fn decode_secret(name: &str) -> anyhow::Result<[u8; 32]> {
    let b64 = env::var(name)
        .map_err(|_| anyhow::anyhow!("{name} must be set in production"))?;
    let bytes = Engine::decode(&general_purpose::STANDARD, &b64)?;

    let mut secret = [0u8; 32];
    if bytes.len() != secret.len() {
        anyhow::bail!("{name} must decode to exactly 32 bytes");
    }
    secret.copy_from_slice(&bytes);

    Ok(secret)
}

/// Provider credentials from `OAUTH_{NAME}_CLIENT_ID` etc.; a provider
/// with no client ID configured stays disabled
fn provider_from_env(name: &str, scopes: &[&str]) -> Option<OAuthProviderConfig> {
    let client_id = env::var(format!("OAUTH_{name}_CLIENT_ID")).ok()?;
    let client_secret = env::var(format!("OAUTH_{name}_CLIENT_SECRET")).ok()?;
    let redirect_uri = env::var(format!("OAUTH_{name}_REDIRECT_URI")).ok()?;

    Some(OAuthProviderConfig {
        client_id,
        client_secret,
        redirect_uri,
        scopes: scopes.iter().map(|s| s.to_string()).collect(),
    })
}
