use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod registry;
mod routes;

use config::Settings;
use registry::Registry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::from_env()?;
    init_tracing(&settings.server.log_filter);

    let (registry, commands) = Registry::new(settings.engine.clone());
    let _worker = registry.spawn_worker(commands);
    let app = routes::app_router(registry);

    let addr = settings.server.bind.as_str();
    let listener = TcpListener::bind(addr).await?;
    info!(
        rows = settings.engine.rows,
        columns = settings.engine.columns,
        connect = settings.engine.connect,
        "Listening on http://{addr}"
    );
    axum::serve(listener, app).await?;
    Ok(())
}

/// `RUST_LOG` wins over the configured filter.
fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
