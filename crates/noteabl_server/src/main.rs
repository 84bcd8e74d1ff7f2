//! Headless API server entrypoint.

use noteabl_core::DEFAULT_PORT;
use noteabl_server::{
    config::{env_flag_enabled, Config},
    db::Database,
    serve_router, spawn_cleanup_task, AppState, FsBlobStore,
};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct CliFlags {
    help: bool,
}

fn parse_cli_flags(args: &[String]) -> anyhow::Result<CliFlags> {
    let mut flags = CliFlags::default();
    for arg in args.iter().skip(1) {
        match arg.as_str() {
            "--help" | "-h" => flags.help = true,
            value if value.starts_with('-') => {
                anyhow::bail!(
                    "Unknown option: '{}'. Use --help to see supported options.",
                    value
                );
            }
            value => {
                anyhow::bail!(
                    "Unexpected positional argument: '{}'. Use --help to see supported options.",
                    value
                );
            }
        }
    }
    Ok(flags)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "noteabl=info,tower_http=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = std::env::args().collect();
    if parse_cli_flags(&args)?.help {
        print_help();
        return Ok(());
    }

    let config = Config::from_env();
    let database = Database::new(&config.db_path)?;

    let blobs = FsBlobStore::new(&config.blob_dir);
    blobs.validate().await?;
    tracing::info!("Blob store ready at {}", blobs.root().display());

    tracing::info!(
        mode = ?config.rating_consistency,
        max_attempts = config.rating_max_attempts,
        "rating engine configured"
    );

    let state = AppState::new(config.clone(), database, Arc::new(blobs));
    let cleanup = spawn_cleanup_task(
        state.db.clone(),
        Duration::from_secs(config.cleanup_interval_secs),
    );

    let allow_public = env_flag_enabled("ALLOW_PUBLIC_ACCESS");
    if allow_public {
        tracing::warn!("Public access enabled - server will accept requests from any origin");
    }

    let bind_addr = noteabl_server::resolve_bind_address(&config, allow_public);
    if !bind_addr.ip().is_loopback() {
        tracing::warn!(
            "Binding to non-localhost address: {} - ensure proper security measures are in place",
            bind_addr
        );
    }

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    let actual_addr = listener.local_addr().unwrap_or(bind_addr);
    tracing::info!("Noteabl running at http://{}", actual_addr);

    let serve_result = serve_router(listener, state, allow_public, shutdown_signal()).await;
    cleanup.abort();
    tracing::info!("Server stopped");

    serve_result?;
    Ok(())
}

fn print_help() {
    println!("Noteabl Server\n");
    println!("Usage: noteabl [OPTIONS]\n");
    println!("Options:");
    println!("  --help            Show this help message");
    println!("\nEnvironment variables:");
    println!("  DB_PATH               Database path (default: ~/.cache/noteabl/db)");
    println!("  BLOB_DIR              Note file directory (default: next to the database)");
    println!(
        "  PORT                  Server port (default: {})",
        DEFAULT_PORT
    );
    println!("  MAX_FILE_SIZE         Maximum size of one uploaded PDF in bytes (default: 10MB)");
    println!("  MAX_FILES             Maximum files per upload (default: 5)");
    println!("  RATING_CONSISTENCY    transactional | compensating (default: transactional)");
    println!("  RATING_MAX_ATTEMPTS   Attempts per transactional rating (default: 5)");
    println!("  CLEANUP_INTERVAL_SECS Unverified-account sweep interval (default: 86400)");
    println!("  ALLOW_PUBLIC_ACCESS   Allow CORS from any origin");
    println!(
        "  BIND                  Override bind address (e.g. 0.0.0.0:{})",
        DEFAULT_PORT
    );
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", err);
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
                tracing::error!("Failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_cli_flags, CliFlags};

    #[test]
    fn parse_cli_flags_rejects_unknown_and_positional_arguments() {
        let cases = [
            (
                vec!["noteabl".to_string(), "--hepl".to_string()],
                "Unknown option",
            ),
            (
                vec!["noteabl".to_string(), "serve".to_string()],
                "Unexpected positional argument",
            ),
        ];

        for (args, expected_fragment) in cases {
            let err = parse_cli_flags(&args).expect_err("invalid args should be rejected");
            assert!(err.to_string().contains(expected_fragment));
        }
    }

    #[test]
    fn parse_cli_flags_accepts_help() {
        let args = vec!["noteabl".to_string(), "--help".to_string()];
        assert_eq!(
            parse_cli_flags(&args).expect("help parses"),
            CliFlags { help: true }
        );
        assert_eq!(
            parse_cli_flags(&["noteabl".to_string()]).expect("no args"),
            CliFlags::default()
        );
    }
}
