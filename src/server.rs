//! HTTP server startup.
//!
//! Opens the journal once (schema bootstrap and migrations happen here, never
//! on a request), then serves the API router until ctrl-c.

use anyhow::{Context, Result};

use rendezvous::api::{self, AppState};
use rendezvous::config::JournalConfig;
use rendezvous::db;

pub async fn serve(config: JournalConfig) -> Result<()> {
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    let db_path = config.resolved_db_path();
    let conn = db::open_database(&db_path)?;
    tracing::info!(db = %db_path.display(), "database ready");

    let router = api::router(AppState::new(conn, config));

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    tracing::info!(addr = %bind_addr, "journal API listening at http://{bind_addr}/api");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
            tracing::info!("shutting down journal API");
        })
        .await?;

    Ok(())
}
