use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "controller starting");

    let config = match controller::config::load_config() {
        Ok(config) => config,
        Err(error) => {
            tracing::error!(%error, "failed to load controller configuration");
            std::process::exit(1);
        }
    };

    match controller::run(config).await {
        Ok(()) => {
            info!("commissioning run completed");
            std::process::exit(0);
        }
        Err(error) => {
            tracing::error!(%error, "commissioning run failed");
            std::process::exit(2);
        }
    }
}
