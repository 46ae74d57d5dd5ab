use anyhow::Result;
use log::{error, info};
use quake_engine::api::rest::RestApi;
use quake_engine::config::{self, Config, StoreBackend};
use quake_engine::{DetectionEngine, DetectionSettings, DetectionStore, MemoryStore, PgStore};
use std::path::PathBuf;
use std::sync::Arc;

async fn build_store(config: &Config) -> Result<Arc<dyn DetectionStore>> {
    match config.database.backend {
        StoreBackend::Postgres => {
            let store = PgStore::connect(&config.database).await?;
            info!("Using PostgreSQL store");
            Ok(Arc::new(store))
        }
        StoreBackend::Memory => {
            info!("Using in-memory store; state is lost on exit");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

async fn run_app() -> Result<()> {
    // Config path: first argument, then the environment
    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var(config::CONFIG_ENV_VAR).ok())
        .map(PathBuf::from);

    let config = config::load_config(config_path.as_deref())?;

    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.api.log_level))
        .init();
    info!("Starting seismic event detection engine");
    match &config_path {
        Some(path) => info!("Configuration loaded from {:?}", path),
        None => info!("No configuration file given, using defaults"),
    }

    let store = build_store(&config).await?;

    let engine = DetectionEngine::new(store, DetectionSettings::from(&config.detection));
    info!(
        "Detection threshold {} with {}s quiet period",
        engine.settings().threshold,
        engine.settings().quiet_period.num_seconds()
    );
    engine.provision(&config.detection.sensors).await?;

    let api = RestApi::new(&config.api, Arc::new(engine), config.history.clone());
    api.run().await?;

    info!("Application shutdown complete");
    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(e) = run_app().await {
        error!("Application error: {:#}", e);
        eprintln!("Application error: {:#}", e);
        std::process::exit(1);
    }
}
