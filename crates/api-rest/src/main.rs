//! Standalone REST API server binary.
//!
//! ## Purpose
//! Runs the REST trigger surface on its own.
//!
//! ## Intended use
//! Useful for development and debugging. The workspace's main `callmeta-run` binary serves the
//! same router.

use api_rest::{router, AppState, DEFAULT_REST_ADDR, ENV_REST_ADDR};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the REST API server
///
/// # Environment Variables
/// - `CALLMETA_REST_ADDR`: Server address (default: "0.0.0.0:3000")
/// - `CALLMETA_CONFIG`: Optional YAML settings file
/// - `CALLMETA_STORE_ROOT`: Object store directory (default: ".")
/// - `CALLMETA_*`: Pipeline settings overriding the YAML file
///
/// # Errors
/// Returns an error if configuration is invalid, the address cannot be bound, or the server
/// fails while running.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("api_rest=info".parse()?)
                .add_directive("callmeta_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addr = std::env::var(ENV_REST_ADDR).unwrap_or_else(|_| DEFAULT_REST_ADDR.into());
    tracing::info!("-- Starting callmeta REST API on {}", addr);

    let app = router(AppState::from_env()?);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
