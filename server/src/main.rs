//! meridiand: hosts many concurrent game instances behind an HTTP + SSE
//! surface, with SQLite as the durable source of truth.

mod http;
mod registry;
mod session;
mod store;

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::{http::AppState, registry::GameRegistry, session::SessionStore, store::Store};

#[derive(Debug, Parser)]
#[command(name = "meridiand", version, about = "Meridian game server")]
struct Args {
    /// Port to listen on
    #[arg(long, default_value_t = 8080)]
    port: u16,

    /// Database URL; falls back to $DATABASE_URL, then $TEST_DATABASE_URL,
    /// then a local file
    #[arg(long)]
    database_url: Option<String>,

    /// Log filter, e.g. "info" or "meridiand=debug,sqlx=warn"
    #[arg(long, default_value = "info")]
    log: String,
}

impl Args {
    fn database_url(&self) -> String {
        self.database_url
            .clone()
            .or_else(|| std::env::var("DATABASE_URL").ok())
            .or_else(|| std::env::var("TEST_DATABASE_URL").ok())
            .unwrap_or_else(|| "sqlite:meridian.db".to_owned())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(args.log.clone())),
        )
        .init();

    let database_url = args.database_url();
    tracing::info!(%database_url, "connecting to store");
    let store = Store::connect(&database_url).await?;

    let registry = Arc::new(GameRegistry::new());

    // The store is authoritative; warm the registry from it
    let mut restored = 0usize;
    for id in store.list_game_ids().await? {
        match store.load_game(id).await {
            Ok(Some(game)) => {
                registry.insert(game).await;
                restored += 1;
            }
            Ok(None) => {}
            Err(err) => tracing::warn!(game = %id, error = %err, "failed to restore game"),
        }
    }
    tracing::info!(restored, "registry warmed");

    let state = AppState {
        registry,
        sessions: Arc::new(SessionStore::new()),
        store,
    };

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], args.port));
    tracing::info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, http::router(state)).await?;

    Ok(())
}
