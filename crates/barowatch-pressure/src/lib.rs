//! Pressure classification and caching engine for Barowatch
//!
//! Turns upstream pressure series into classified forecasts and serves them
//! through a client and a server cache tier.

pub mod advisory;
pub mod cache;
pub mod classify;
pub mod forecast;
pub mod provider;
pub mod region;
pub mod service;
pub mod store;
pub mod types;

pub use advisory::{advice, alert_message, Advice, RiskLevel};
pub use cache::{CacheLookup, CacheStore, CacheTier, Clock, ManualClock, MemoryStore, SystemClock};
pub use classify::{classify, ClassificationPolicy};
pub use forecast::ForecastTransformer;
pub use provider::{parse_one_call, OpenWeatherProvider, PressureSource};
pub use region::RegionResolver;
pub use service::{WeatherService, WeatherServiceBuilder};
pub use store::SqliteStore;
pub use types::*;
