//! Weather fetch orchestration: client tier → server tier → upstream.

use anyhow::{Context, Result};
use barowatch_core::{Config, ServerStore, WeatherError};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{CacheStore, CacheTier, Clock, MemoryStore, SystemClock};
use crate::forecast::ForecastTransformer;
use crate::provider::{OpenWeatherProvider, PressureSource};
use crate::region::RegionResolver;
use crate::store::SqliteStore;
use crate::types::WeatherSnapshot;

pub const DEFAULT_CLIENT_TTL_MINUTES: i64 = 5;
pub const DEFAULT_SERVER_TTL_MINUTES: i64 = 360;
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Entry point for pressure snapshots.
///
/// Owns a client tier and shares a server tier; several services may sit in
/// front of one server tier.
pub struct WeatherService {
    resolver: RegionResolver,
    source: Arc<dyn PressureSource>,
    transformer: ForecastTransformer,
    client: CacheTier,
    server: Arc<CacheTier>,
    clock: Arc<dyn Clock>,
    fetch_timeout: Duration,
}

impl std::fmt::Debug for WeatherService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeatherService")
            .field("regions", &self.resolver.len())
            .field("transformer", &self.transformer)
            .field("client", &self.client)
            .field("server", &self.server)
            .field("fetch_timeout", &self.fetch_timeout)
            .finish()
    }
}

impl WeatherService {
    pub fn builder(source: Arc<dyn PressureSource>) -> WeatherServiceBuilder {
        WeatherServiceBuilder::new(source)
    }

    /// Service backed by OpenWeatherMap, configured from `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let provider = OpenWeatherProvider::new(&config.upstream)?;
        Ok(WeatherServiceBuilder::from_config(config, Arc::new(provider))?.build())
    }

    /// Classified snapshot for `region`.
    ///
    /// Tries the client tier, then the server tier, then resolves the region
    /// and calls the upstream. Fetched values are written to both tiers.
    pub async fn get_weather(&self, region: &str) -> Result<WeatherSnapshot, WeatherError> {
        let lookup = self
            .client
            .get_or_fetch(region, || async {
                self.server
                    .get_or_fetch(region, || self.fetch_fresh(region))
                    .await
                    .map(|lookup| lookup.snapshot)
            })
            .await?;
        Ok(lookup.snapshot)
    }

    async fn fetch_fresh(&self, region: &str) -> Result<WeatherSnapshot, WeatherError> {
        let coordinate = self.resolver.resolve(region)?;

        let series = tokio::time::timeout(self.fetch_timeout, self.source.fetch_series(coordinate))
            .await
            .map_err(|_| {
                WeatherError::UpstreamUnavailable(format!(
                    "no response within {}s",
                    self.fetch_timeout.as_secs_f64()
                ))
            })??;

        let window = self.source.step().window_size();
        let snapshot = self
            .transformer
            .transform(&series, window, self.clock.now())?;

        tracing::info!(
            "Fetched pressure for {}: {} hPa ({})",
            region,
            snapshot.pressure_hpa,
            snapshot.tier
        );
        Ok(snapshot)
    }

    /// Drop `region` from both tiers.
    pub fn invalidate(&self, region: &str) {
        self.client.invalidate(region);
        self.server.invalidate(region);
    }

    pub fn resolver(&self) -> &RegionResolver {
        &self.resolver
    }

    pub fn client_tier(&self) -> &CacheTier {
        &self.client
    }

    /// Shared handle to the server tier, for building sibling services
    pub fn server_tier(&self) -> Arc<CacheTier> {
        self.server.clone()
    }
}

pub struct WeatherServiceBuilder {
    source: Arc<dyn PressureSource>,
    resolver: RegionResolver,
    transformer: ForecastTransformer,
    clock: Arc<dyn Clock>,
    client_ttl: chrono::Duration,
    server_ttl: chrono::Duration,
    server_store: Option<Box<dyn CacheStore>>,
    server_tier: Option<Arc<CacheTier>>,
    serve_stale_on_error: bool,
    fetch_timeout: Duration,
}

impl WeatherServiceBuilder {
    pub fn new(source: Arc<dyn PressureSource>) -> Self {
        Self {
            source,
            resolver: RegionResolver::japan(),
            transformer: ForecastTransformer::default(),
            clock: Arc::new(SystemClock),
            client_ttl: chrono::Duration::minutes(DEFAULT_CLIENT_TTL_MINUTES),
            server_ttl: chrono::Duration::minutes(DEFAULT_SERVER_TTL_MINUTES),
            server_store: None,
            server_tier: None,
            serve_stale_on_error: false,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    /// Apply every setting in `config` except the upstream itself.
    pub fn from_config(config: &Config, source: Arc<dyn PressureSource>) -> Result<Self> {
        let server_store: Box<dyn CacheStore> = match config.cache.server_store {
            ServerStore::Memory => Box::new(MemoryStore::new()),
            ServerStore::Sqlite => {
                let path = config.sqlite_path();
                tracing::info!("Server cache at {}", path.display());
                Box::new(
                    SqliteStore::open(&path).context("Failed to open server cache database")?,
                )
            }
        };

        Ok(Self::new(source)
            .resolver(RegionResolver::with_extra(&config.regions))
            .transformer(ForecastTransformer::from_config(&config.classification))
            .client_ttl(minutes(config.cache.client_ttl_minutes))
            .server_ttl(minutes(config.cache.server_ttl_minutes))
            .server_store(server_store)
            .serve_stale_on_error(config.cache.serve_stale_on_error)
            .fetch_timeout(Duration::from_secs(config.upstream.timeout_secs)))
    }

    pub fn resolver(mut self, resolver: RegionResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn transformer(mut self, transformer: ForecastTransformer) -> Self {
        self.transformer = transformer;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn client_ttl(mut self, ttl: chrono::Duration) -> Self {
        self.client_ttl = ttl;
        self
    }

    pub fn server_ttl(mut self, ttl: chrono::Duration) -> Self {
        self.server_ttl = ttl;
        self
    }

    pub fn server_store(mut self, store: Box<dyn CacheStore>) -> Self {
        self.server_store = Some(store);
        self
    }

    /// Reuse an existing server tier; its TTL, store and clock win.
    pub fn server_tier(mut self, tier: Arc<CacheTier>) -> Self {
        self.server_tier = Some(tier);
        self
    }

    /// Applies to the server tier built here.
    pub fn serve_stale_on_error(mut self, enabled: bool) -> Self {
        self.serve_stale_on_error = enabled;
        self
    }

    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn build(self) -> WeatherService {
        let server = match self.server_tier {
            Some(tier) => tier,
            None => {
                let store = self
                    .server_store
                    .unwrap_or_else(|| Box::new(MemoryStore::new()));
                Arc::new(
                    CacheTier::new("server", self.server_ttl, store, self.clock.clone())
                        .with_serve_stale_on_error(self.serve_stale_on_error),
                )
            }
        };

        let client = CacheTier::new(
            "client",
            self.client_ttl,
            Box::new(MemoryStore::new()),
            self.clock.clone(),
        );

        WeatherService {
            resolver: self.resolver,
            source: self.source,
            transformer: self.transformer,
            client,
            server,
            clock: self.clock,
            fetch_timeout: self.fetch_timeout,
        }
    }
}

fn minutes(value: u64) -> chrono::Duration {
    let capped = i64::try_from(value)
        .unwrap_or(i64::MAX)
        .min(i64::MAX / 60_000);
    chrono::Duration::minutes(capped)
}
