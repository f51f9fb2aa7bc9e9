use std::net::{IpAddr, SocketAddr};
use std::num::NonZeroUsize;
use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "sql-gate-service")]
struct Args {
    /// Bind host.
    #[arg(long, default_value = "0.0.0.0")]
    host: IpAddr,

    /// Bind port.
    #[arg(long, env = "PORT", default_value_t = 9876)]
    port: u16,

    /// Tokio worker threads (defaults to available CPU parallelism).
    #[arg(long, env = "WEB_CONCURRENCY")]
    workers: Option<usize>,

    /// Config file path (.toml or .json), parsed as sql_gate_core::config::GateConfig.
    #[arg(long)]
    config: PathBuf,

    /// SQLite database file path (created if missing).
    #[arg(long)]
    sqlite: Option<PathBuf>,

    /// Postgres connection URL.
    #[cfg(feature = "postgres")]
    #[arg(long)]
    postgres: Option<String>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = sql_gate_service::config_io::load_config(&args.config)?;

    // Pools are built before the runtime starts; the sync postgres client refuses to
    // connect from inside an async context.
    #[cfg(feature = "postgres")]
    let app = match (args.sqlite, args.postgres) {
        (Some(path), None) => sql_gate_service::server::build_app_sqlite(path, config)?,
        (None, Some(url)) => sql_gate_service::server::build_app_postgres(url, config)?,
        (Some(_), Some(_)) => anyhow::bail!("pass only one of --sqlite / --postgres"),
        (None, None) => anyhow::bail!("one of --sqlite / --postgres is required"),
    };
    #[cfg(not(feature = "postgres"))]
    let app = match args.sqlite {
        Some(path) => sql_gate_service::server::build_app_sqlite(path, config)?,
        None => anyhow::bail!("--sqlite is required"),
    };

    let workers = args
        .workers
        .filter(|&workers| workers > 0)
        .unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1)
        });
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(workers)
        .enable_all()
        .build()?;

    let addr = SocketAddr::new(args.host, args.port);
    runtime.block_on(async move {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!(%addr, workers, "sql-gate listening");
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;
        tracing::info!("sql-gate stopped");
        Ok::<(), anyhow::Error>(())
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(err = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::warn!(err = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown signal received");
}
