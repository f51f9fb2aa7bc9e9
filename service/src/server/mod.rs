//! HTTP server implementation.

mod backend;
mod handlers;
mod layers;
mod rate_limiter;
mod runner;
mod session;

use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::post;

use sql_gate::pipeline::Endpoint;
use sql_gate::store::sqlite::SqliteStore;
use sql_gate_core::config::GateConfig;
use sql_gate_core::credentials::CredentialStore;
use sql_gate_core::policy::PolicyTables;
use sql_gate_core::session::{SessionAuthenticator, SigningKey};

#[derive(Clone)]
struct AppState {
    inner: Arc<AppInner>,
}

struct AppInner {
    backend: backend::Backend,
    config: GateConfig,
    authenticator: SessionAuthenticator,
    tables: PolicyTables,
    rate_limiter: rate_limiter::RateLimiter,
    io_concurrency: Arc<tokio::sync::Semaphore>,
}

impl Drop for AppInner {
    fn drop(&mut self) {
        tracing::info!(backend = self.backend.name(), "closing database pool");
    }
}

/// Body of every response that is not a pipeline outcome.
#[derive(Debug, serde::Serialize)]
struct StatusBody {
    status: String,
}

type ErrorResponse = (StatusCode, Json<StatusBody>);

fn err(status: StatusCode, message: impl Into<String>) -> ErrorResponse {
    (
        status,
        Json(StatusBody {
            status: message.into(),
        }),
    )
}

fn err_response(status: StatusCode, message: impl Into<String>) -> Response {
    err(status, message).into_response()
}

fn map_err(error: sql_gate_core::Error) -> ErrorResponse {
    match error.code() {
        "timeout" => err(StatusCode::REQUEST_TIMEOUT, "request timed out"),
        code => {
            tracing::error!(code, err = %error, "sql-gate request failed");
            err(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

fn build_state(
    backend: backend::Backend,
    mut config: GateConfig,
) -> anyhow::Result<(AppState, usize)> {
    config.validate()?;
    let credentials = CredentialStore::from_config(&config.users)?;
    if credentials.is_empty() {
        tracing::warn!("no users configured; every login will fail");
    }
    let authenticator = SessionAuthenticator::new(credentials, &SigningKey::generate())?;
    let tables = PolicyTables::compile()?;
    let rate_limiter = rate_limiter::RateLimiter::new(&config.limits);
    let io_concurrency = config.limits.max_concurrency;
    let body_limit = config.limits.max_body_bytes;

    tracing::info!(
        backend = backend.name(),
        users = authenticator.credentials().len(),
        "sql-gate state ready"
    );

    config.users.clear();

    let state = AppState {
        inner: Arc::new(AppInner {
            backend,
            config,
            authenticator,
            tables,
            rate_limiter,
            io_concurrency: Arc::new(tokio::sync::Semaphore::new(io_concurrency)),
        }),
    };

    Ok((state, body_limit))
}

fn routes(state: AppState, body_limit: usize) -> Router {
    Router::new()
        .route("/", post(handlers::login))
        .route("/login", post(handlers::login))
        .route(Endpoint::Query.path(), post(handlers::query))
        .route(Endpoint::Modify.path(), post(handlers::modify))
        .route(Endpoint::Add.path(), post(handlers::add))
        .route(Endpoint::Remove.path(), post(handlers::remove))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            layers::rate_limit_middleware,
        ))
        .layer(middleware::from_fn(layers::request_id_middleware))
        .with_state(state)
}

pub fn build_app_sqlite(db_path: std::path::PathBuf, config: GateConfig) -> anyhow::Result<Router> {
    config.validate()?;
    let _ = SqliteStore::open(&db_path)?;

    const SQLITE_BUSY_TIMEOUT_CAP_MS: u64 = 5_000;
    let busy_timeout =
        Duration::from_millis(config.limits.max_io_ms.min(SQLITE_BUSY_TIMEOUT_CAP_MS));
    let manager = r2d2_sqlite::SqliteConnectionManager::file(&db_path).with_init(move |conn| {
        conn.busy_timeout(busy_timeout)?;
        Ok(())
    });
    let pool = r2d2::Pool::builder()
        .max_size(config.limits.max_db_connections)
        .connection_timeout(Duration::from_millis(config.limits.max_io_ms))
        .build(manager)
        .map_err(anyhow::Error::msg)?;

    let (state, body_limit) = build_state(backend::Backend::Sqlite { pool }, config)?;
    Ok(routes(state, body_limit))
}

#[cfg(feature = "postgres")]
pub fn build_app_postgres(url: String, config: GateConfig) -> anyhow::Result<Router> {
    config.validate()?;

    let statement_timeout_ms = config.limits.max_io_ms;
    let mut pg_config: r2d2_postgres::postgres::Config = url.parse()?;
    let options_extra = format!("-c statement_timeout={statement_timeout_ms}");
    let options = match pg_config.get_options() {
        Some(existing) => format!("{existing} {options_extra}"),
        None => options_extra,
    };
    pg_config.options(&options);
    pg_config.connect_timeout(Duration::from_millis(config.limits.max_io_ms));

    let manager =
        r2d2_postgres::PostgresConnectionManager::new(pg_config, r2d2_postgres::postgres::NoTls);
    let pool = r2d2::Pool::builder()
        .max_size(config.limits.max_db_connections)
        .connection_timeout(Duration::from_millis(config.limits.max_io_ms))
        .build(manager)?;

    let (state, body_limit) = build_state(backend::Backend::Postgres { pool }, config)?;
    Ok(routes(state, body_limit))
}

pub fn build_app(db_path: std::path::PathBuf, config: GateConfig) -> anyhow::Result<Router> {
    build_app_sqlite(db_path, config)
}
