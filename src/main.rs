use std::path::PathBuf;

use clap::{Parser, Subcommand};

use microblog::app::{build_state, router};
use microblog::config::AppConfig;
use microblog::search::searchable::reindex_all;

/// Microblog server with a full-text search index kept in sync with its
/// record store.
#[derive(Debug, Parser)]
#[command(version)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long, env = "MICROBLOG_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP server (default).
    Serve,
    /// Rebuild the search index from the record store and exit.
    Reindex,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "microblog=info,tower_http=info".into()),
        )
        .init();

    let config = AppConfig::load(cli.config.as_deref())?;
    let state = build_state(&config).await?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            tracing::info!("Starting microblog server...");
            let listener = tokio::net::TcpListener::bind(&config.server.bind_addr).await?;
            tracing::info!("Listening on http://{}", config.server.bind_addr);
            axum::serve(listener, router(state).into_make_service())
                .with_graceful_shutdown(async {
                    let _ = tokio::signal::ctrl_c().await;
                })
                .await?;
        }
        Command::Reindex => {
            if !state.search_index.is_configured() {
                tracing::warn!("Search is not configured, nothing to reindex");
                return Ok(());
            }
            let indexed = reindex_all(&state.session, &state.search_index, &state.registry).await?;
            tracing::info!("Reindex complete: {} document(s)", indexed);
        }
    }

    Ok(())
}
