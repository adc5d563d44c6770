pub mod config;
pub mod error;

pub use config::{
    CacheConfig, ClassificationConfig, ClassificationMode, Config, ForecastStep, LookDirection,
    RegionConfig, ServerStore, UpstreamConfig, ValidationResult,
};
pub use error::{AppError, ConfigError, ReqwestErrorExt, WeatherError};

use anyhow::Result;

/// Initialize logging for the process
pub fn init() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Barowatch core initialized");
    Ok(())
}
