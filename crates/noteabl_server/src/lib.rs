//! HTTP server wiring for Noteabl (API, handlers, auth, and shared state).

/// Bearer-session authentication extractor.
pub mod auth;
/// HTTP error mapping for API handlers.
pub mod error;
/// HTTP handlers for note and account endpoints.
pub mod handlers;

pub use noteabl_core::{
    accounts, config, constants, db, listing, models, rating, search, uploads, AppError,
    BlobStore, Config, Database, FsBlobStore, MemoryBlobStore, RatingEngine, DEFAULT_PORT,
};

use axum::{
    extract::DefaultBodyLimit,
    http::header,
    routing::{get, patch, post},
    Router,
};
use hyper::HeaderMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};

/// Headroom for multipart framing and text fields on top of the file bytes.
const UPLOAD_BODY_OVERHEAD: usize = 1024 * 1024;

/// Shared state passed to HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub config: Arc<Config>,
    pub blobs: Arc<dyn BlobStore>,
    pub ratings: RatingEngine,
}

impl AppState {
    /// Construct shared application state.
    ///
    /// # Arguments
    /// - `config`: Loaded configuration.
    /// - `db`: Open database handle.
    /// - `blobs`: Object store for note files, built once at startup.
    ///
    /// # Returns
    /// A new [`AppState`] with the rating engine configured from `config`.
    pub fn new(config: Config, db: Database, blobs: Arc<dyn BlobStore>) -> Self {
        Self {
            db: Arc::new(db),
            ratings: RatingEngine::from_config(&config),
            config: Arc::new(config),
            blobs,
        }
    }
}

/// Create the application router with all routes and middleware.
///
/// # Arguments
/// - `state`: Shared application state.
/// - `allow_public_access`: Whether to allow cross-origin requests from any origin.
///
/// # Returns
/// Configured `axum::Router`.
pub fn create_app(state: AppState, allow_public_access: bool) -> Router {
    let cors_port = state.config.port;
    create_app_with_cors_port(state, allow_public_access, cors_port)
}

/// Resolve the listener address from env var overrides and security policy.
///
/// # Arguments
/// - `config`: Server configuration containing the configured `port`.
/// - `allow_public_access`: Whether non-loopback bind targets are permitted.
///
/// # Returns
/// A validated socket address that enforces loopback when public access is disabled.
pub fn resolve_bind_address(config: &Config, allow_public_access: bool) -> SocketAddr {
    let default_bind = SocketAddr::from(([127, 0, 0, 1], config.port));
    let requested = match std::env::var("BIND") {
        Ok(value) => match value.trim().parse::<SocketAddr>() {
            Ok(addr) => addr,
            Err(err) => {
                tracing::warn!(
                    "Invalid BIND='{}': {}. Falling back to {}",
                    value,
                    err,
                    default_bind
                );
                default_bind
            }
        },
        Err(_) => default_bind,
    };

    if allow_public_access || requested.ip().is_loopback() {
        return requested;
    }

    tracing::warn!(
        "Non-loopback bind {} requested without ALLOW_PUBLIC_ACCESS; forcing 127.0.0.1",
        requested
    );
    SocketAddr::from(([127, 0, 0, 1], requested.port()))
}

fn upload_body_limit(config: &Config) -> usize {
    config
        .max_files
        .saturating_mul(config.max_file_size)
        .saturating_add(UPLOAD_BODY_OVERHEAD)
}

fn api_routes() -> Router<AppState> {
    use handlers::{notes, users};

    Router::new()
        .route("/api/users", post(users::register))
        .route("/api/users/login", post(users::login))
        .route("/api/users/logout", post(users::logout))
        .route("/api/users/verify/:token", get(users::verify_email))
        .route("/api/users/forgot-password", post(users::forgot_password))
        .route("/api/users/reset-password", post(users::reset_password))
        .route(
            "/api/users/me",
            get(users::dashboard).delete(users::delete_account),
        )
        .route("/api/users/me/notes", get(notes::list_own_notes))
        .route("/api/users/me/notes/liked", get(notes::list_liked_notes))
        .route(
            "/api/users/me/notes/:id",
            patch(notes::update_own_note).delete(notes::delete_own_note),
        )
        .route(
            "/api/notes",
            get(notes::browse_notes).post(notes::upload_notes),
        )
        .route("/api/notes/:id", get(notes::get_note))
        .route("/api/notes/:id/file", get(notes::download_note))
        .route("/api/notes/:id/rating", patch(notes::rate_note))
}

fn create_app_with_cors_port(state: AppState, allow_public_access: bool, cors_port: u16) -> Router {
    let mut default_headers = HeaderMap::new();
    default_headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        header::HeaderValue::from_static("nosniff"),
    );
    default_headers.insert(
        header::X_FRAME_OPTIONS,
        header::HeaderValue::from_static("DENY"),
    );
    default_headers.insert(
        header::CONTENT_SECURITY_POLICY,
        header::HeaderValue::from_static("default-src 'none'; frame-ancestors 'none'"),
    );

    let methods = [
        axum::http::Method::GET,
        axum::http::Method::POST,
        axum::http::Method::PATCH,
        axum::http::Method::DELETE,
    ];
    let cors = if allow_public_access {
        CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods(methods)
            .allow_headers(tower_http::cors::Any)
    } else {
        let origins = [
            format!("http://localhost:{}", cors_port),
            format!("http://127.0.0.1:{}", cors_port),
        ]
        .into_iter()
        .filter_map(|origin| origin.parse::<header::HeaderValue>().ok())
        .collect::<Vec<_>>();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(methods)
            .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::AUTHORIZATION])
    };

    let body_limit = upload_body_limit(&state.config);
    let mut router = api_routes().with_state(state).layer(
        tower::ServiceBuilder::new()
            .layer(DefaultBodyLimit::max(body_limit))
            .layer(TraceLayer::new_for_http())
            .layer(CompressionLayer::new())
            .layer(cors),
    );
    for (name, value) in default_headers.iter() {
        router = router.layer(SetResponseHeaderLayer::overriding(
            name.clone(),
            value.clone(),
        ));
    }
    router
}

fn listener_cors_port(listener: &tokio::net::TcpListener, fallback_port: u16) -> u16 {
    listener
        .local_addr()
        .map(|addr| addr.port())
        .unwrap_or(fallback_port)
}

/// Run the Axum server with graceful shutdown support.
///
/// # Arguments
/// - `listener`: Bound TCP listener for the server.
/// - `state`: Shared application state.
/// - `allow_public_access`: Whether to allow cross-origin requests from any origin.
/// - `shutdown_signal`: Future that resolves when shutdown should start.
///
/// # Errors
/// Returns any I/O error produced by `axum::serve`.
pub async fn serve_router(
    listener: tokio::net::TcpListener,
    state: AppState,
    allow_public_access: bool,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), std::io::Error> {
    let cors_port = listener_cors_port(&listener, state.config.port);
    let app = create_app_with_cors_port(state, allow_public_access, cors_port);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
}

/// Counts removed by one [`sweep_expired_accounts`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub unverified_users: usize,
    pub sessions: usize,
}

/// Delete unverified accounts past their verification window and expired sessions.
///
/// # Errors
/// Returns an error if storage fails.
pub fn sweep_expired_accounts(db: &Database) -> Result<SweepReport, AppError> {
    Ok(SweepReport {
        unverified_users: db.users.delete_expired_unverified(chrono::Utc::now())?,
        sessions: db.sessions.purge_expired()?,
    })
}

/// Run [`sweep_expired_accounts`] every `interval` until the runtime shuts down.
///
/// The first sweep runs immediately.
pub fn spawn_cleanup_task(db: Arc<Database>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let db = db.clone();
            match tokio::task::spawn_blocking(move || sweep_expired_accounts(&db)).await {
                Ok(Ok(report)) => {
                    if report != SweepReport::default() {
                        tracing::info!(
                            unverified_users = report.unverified_users,
                            sessions = report.sessions,
                            "expired accounts swept"
                        );
                    }
                }
                Ok(Err(err)) => tracing::warn!("Account cleanup failed: {}", err),
                Err(err) => tracing::error!("Account cleanup task panicked: {}", err),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::{
        listener_cors_port, resolve_bind_address, sweep_expired_accounts, upload_body_limit,
        SweepReport,
    };
    use noteabl_core::accounts::{generate_token, hash_password, hash_token};
    use noteabl_core::env::{env_lock, EnvGuard};
    use noteabl_core::models::user::User;
    use noteabl_core::{Config, Database, DEFAULT_PORT};
    use std::net::SocketAddr;
    use tempfile::TempDir;

    #[tokio::test]
    async fn listener_cors_port_uses_bound_listener_port() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("listener");
        let expected = listener.local_addr().expect("listener addr").port();
        let resolved = listener_cors_port(&listener, DEFAULT_PORT);
        assert_eq!(resolved, expected);
    }

    #[test]
    fn resolve_bind_address_enforces_loopback_when_public_access_disabled() {
        let _lock = env_lock().lock().expect("env lock");
        let temp = TempDir::new().expect("temp dir");
        let mut config = Config::for_data_dir(temp.path());
        config.port = 4040;
        let _bind = EnvGuard::set("BIND", "0.0.0.0:4040");

        let resolved = resolve_bind_address(&config, false);
        assert_eq!(resolved.ip().to_string(), "127.0.0.1");
        assert_eq!(resolved.port(), 4040);

        let public = resolve_bind_address(&config, true);
        assert_eq!(public, SocketAddr::from(([0, 0, 0, 0], 4040)));
    }

    #[test]
    fn resolve_bind_address_allows_loopback_and_invalid_fallback() {
        let _lock = env_lock().lock().expect("env lock");
        let temp = TempDir::new().expect("temp dir");
        let mut config = Config::for_data_dir(temp.path());
        config.port = 4041;
        {
            let _unset = EnvGuard::remove("BIND");
            let loopback = resolve_bind_address(&config, false);
            assert_eq!(loopback, SocketAddr::from(([127, 0, 0, 1], 4041)));
        }

        let _bind = EnvGuard::set("BIND", "bad:host");
        let fallback = resolve_bind_address(&config, false);
        assert_eq!(fallback, SocketAddr::from(([127, 0, 0, 1], 4041)));
    }

    #[test]
    fn upload_body_limit_covers_a_full_batch() {
        let temp = TempDir::new().expect("temp dir");
        let config = Config::for_data_dir(temp.path());
        assert!(upload_body_limit(&config) > config.max_files * config.max_file_size);
    }

    #[test]
    fn sweep_removes_expired_unverified_users_only() {
        let temp = TempDir::new().expect("temp dir");
        let db_path = temp.path().join("sweep.db");
        let db = Database::new(db_path.to_str().expect("db path")).expect("db");

        let mut stale = User::new(
            "Stale",
            "stale@example.com",
            hash_password("x").expect("hash password"),
        );
        stale.verification_token_hash = Some(hash_token(&generate_token()));
        stale.verification_expires_at = Some(chrono::Utc::now() - chrono::Duration::hours(1));
        db.users.create(&stale).expect("stale");

        let mut active = User::new(
            "Active",
            "active@example.com",
            hash_password("x").expect("hash password"),
        );
        active.is_verified = true;
        db.users.create(&active).expect("active");
        db.sessions.create(&active.id).expect("session");

        let report = sweep_expired_accounts(&db).expect("sweep");
        assert_eq!(
            report,
            SweepReport {
                unverified_users: 1,
                sessions: 0,
            }
        );
        assert!(db.users.get(&stale.id).expect("get").is_none());
        assert!(db.users.get(&active.id).expect("get").is_some());
    }
}
