use api_rest::{router, AppState, DEFAULT_REST_ADDR, ENV_REST_ADDR};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the call metadata pipeline server
///
/// Loads the pipeline configuration once, then serves the REST trigger surface.
///
/// # Environment Variables
/// - `CALLMETA_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `CALLMETA_CONFIG`: Optional YAML settings file
/// - `CALLMETA_STORE_ROOT`: Object store directory (default: ".")
/// - `CALLMETA_INGEST_BUCKET`, `CALLMETA_OUTPUT_BUCKET`, ...: pipeline settings
///
/// # Returns
/// * `Ok(())` - If the server starts and runs successfully
/// * `Err(anyhow::Error)` - If configuration, startup or the server fails
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("callmeta=info".parse()?)
                .add_directive("callmeta_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rest_addr = std::env::var(ENV_REST_ADDR).unwrap_or_else(|_| DEFAULT_REST_ADDR.into());
    let state = AppState::from_env()?;

    tracing::info!("++ Starting callmeta REST on {}", rest_addr);

    let listener = tokio::net::TcpListener::bind(&rest_addr).await?;
    axum::serve(listener, router(state)).await?;

    Ok(())
}
