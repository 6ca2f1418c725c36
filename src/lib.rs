pub mod api;
pub mod auth;
pub mod cleanup;
pub mod cli;
pub mod client;
pub mod clock;
pub mod db;
pub mod jwt;
pub mod rate_limit;
pub mod refresh;

use api::create_api_router;
use auth::AuthGateway;
use axum::Router;
use clock::SharedClock;
use db::Database;
use jwt::{JwtConfig, TokenIssuer, TokenVerifier};
use rate_limit::{RateLimitConfig, RateLimitSettings};
use refresh::RefreshCoordinator;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

pub struct ServerConfig {
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// Secret for signing access tokens
    pub access_secret: Vec<u8>,
    /// Secret for signing refresh tokens (may equal the access secret)
    pub refresh_secret: Vec<u8>,
    /// Time source for issuing and verifying tokens
    pub clock: SharedClock,
    pub rate_limits: RateLimitSettings,
    /// Key rate limits on X-Forwarded-For (requires running behind a proxy)
    pub trust_proxy: bool,
    /// Whether new user signups are disabled
    pub no_signup: bool,
}

impl ServerConfig {
    /// Config with one secret for both token kinds, the system clock and
    /// default rate limits.
    pub fn new(db: Database, secret: Vec<u8>) -> Self {
        Self {
            db,
            refresh_secret: secret.clone(),
            access_secret: secret,
            clock: clock::system_clock(),
            rate_limits: RateLimitSettings::default(),
            trust_proxy: false,
            no_signup: false,
        }
    }
}

/// Create the application router with the given configuration.
pub fn create_app(config: &ServerConfig) -> Router {
    let jwt = Arc::new(JwtConfig::new(&config.access_secret, &config.refresh_secret));
    let issuer = TokenIssuer::new(jwt.clone(), config.clock.clone());
    let verifier = TokenVerifier::new(jwt, config.clock.clone());

    let gateway = Arc::new(AuthGateway::new(verifier.clone()));
    let coordinator = Arc::new(RefreshCoordinator::new(
        config.db.clone(),
        issuer,
        verifier,
        config.clock.clone(),
    ));
    let rate_limit_config = Arc::new(RateLimitConfig::new(config.rate_limits, config.trust_proxy));

    create_api_router(
        config.db.clone(),
        gateway,
        coordinator,
        rate_limit_config,
        config.no_signup,
    )
}

/// Run cleanup tasks and spawn background scheduler.
/// Call this before starting the server.
pub async fn init_cleanup(db: &Database, clock: &SharedClock) {
    cleanup::run_cleanup(db, clock.now()).await;
    cleanup::spawn_cleanup_scheduler(db.clone(), clock.clone());
}

/// Run the server on the given listener. This function blocks until the server exits.
/// Call `init_cleanup` before this to run cleanup on startup.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&config);
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}

/// Start the server on 127.0.0.1 in a background task. Use port 0 to let the OS choose a random port.
/// Returns the actual address the server is listening on.
/// Note: For production use, prefer `run_server` directly in main.
pub async fn start_server(
    config: ServerConfig,
    port: u16,
) -> Result<(tokio::task::JoinHandle<()>, SocketAddr), std::io::Error> {
    init_cleanup(&config.db, &config.clock).await;

    let listener = TcpListener::bind(("127.0.0.1", port)).await?;
    let local_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = run_server(config, listener).await {
            tracing::error!(error = %e, "Server error");
        }
    });

    Ok((handle, local_addr))
}
