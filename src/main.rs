use anyhow::{Context, Result};
use barowatch_core::{AppError, Config};
use barowatch_pressure::{advice, alert_message, WeatherService};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize core
    barowatch_core::init()?;

    let (config, _validation) = Config::load_validated()?;
    tracing::info!("Configuration loaded from {}", config.config_dir.display());

    let region = std::env::args()
        .nth(1)
        .unwrap_or_else(|| config.default_region.clone());

    let service = WeatherService::from_config(&config).context("Failed to start weather service")?;

    match service.get_weather(&region).await {
        Ok(snapshot) => {
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
            if snapshot.degraded {
                println!("\n(showing last known data; the weather service is unavailable)");
            }
            let tip = advice(&snapshot);
            println!("\n{}", alert_message(&snapshot));
            println!("{} (risk: {})", tip.text, tip.risk);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Failed to get weather for {}: {}", region, e);
            let err = AppError::from(e);
            eprintln!("{}", err.user_message());
            Err(err.into())
        }
    }
}
