//! Orchestrator and cache behaviour against a counting fake upstream.

use async_trait::async_trait;
use barowatch_core::{ForecastStep, WeatherError};
use barowatch_pressure::{
    CacheTier, Coordinate, ManualClock, MemoryStore, PressureReading, PressureSeries,
    PressureSource, SeverityTier, SqliteStore, WeatherService, CURRENT_LABEL,
};
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const TOKYO: &str = "東京都";

struct FakeSource {
    calls: AtomicUsize,
    response: Mutex<Result<PressureSeries, WeatherError>>,
    delay: Option<Duration>,
    step: ForecastStep,
}

impl FakeSource {
    fn new(pressures: &[f64]) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            response: Mutex::new(Ok(series(pressures))),
            delay: None,
            step: ForecastStep::Hourly,
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn with_step(mut self, step: ForecastStep) -> Self {
        self.step = step;
        self
    }

    fn respond_with(&self, response: Result<PressureSeries, WeatherError>) {
        *self.response.lock() = response;
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PressureSource for FakeSource {
    async fn fetch_series(&self, _coordinate: Coordinate) -> Result<PressureSeries, WeatherError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.response.lock().clone()
    }

    fn step(&self) -> ForecastStep {
        self.step
    }
}

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 3, 0, 0).unwrap()
}

fn series(pressures: &[f64]) -> PressureSeries {
    let base = start().timestamp();
    let readings = pressures
        .iter()
        .enumerate()
        .map(|(i, p)| PressureReading::new(base + i as i64 * 3600, *p))
        .collect();
    PressureSeries::new(readings).with_utc_offset(9 * 3600)
}

fn minutes(m: i64) -> chrono::Duration {
    chrono::Duration::minutes(m)
}

/// Client TTL 5 minutes, server TTL 30 minutes, manual clock
fn service(source: &Arc<FakeSource>, clock: &Arc<ManualClock>) -> WeatherService {
    WeatherService::builder(source.clone())
        .clock(clock.clone())
        .client_ttl(minutes(5))
        .server_ttl(minutes(30))
        .build()
}

#[tokio::test]
async fn test_falling_pressure_scenario() {
    let source = Arc::new(FakeSource::new(&[1013.0, 1010.0, 1002.0]));
    let clock = Arc::new(ManualClock::new(start()));
    let service = service(&source, &clock);

    let snapshot = service.get_weather(TOKYO).await.unwrap();

    assert_eq!(snapshot.pressure_hpa, 1013);
    assert_eq!(snapshot.pressure_change, -3.0);
    assert_eq!(snapshot.tier, SeverityTier::Danger);
    assert_eq!(snapshot.produced_at, start());
    let labels: Vec<_> = snapshot.forecast.iter().map(|p| p.label.as_str()).collect();
    assert_eq!(labels, vec![CURRENT_LABEL, "13:00", "14:00"]);
    assert!(snapshot
        .forecast
        .iter()
        .all(|p| p.tier == SeverityTier::Danger));
}

/// Repeated hits are bit-identical to each other. The first response is not
/// bit-identical to them: it carries `served_from_cache = false`, so it is
/// compared on everything except that flag.
#[tokio::test]
async fn test_repeat_calls_within_client_ttl_hit_upstream_once() {
    let source = Arc::new(FakeSource::new(&[1012.0, 1012.0, 1011.0]));
    let clock = Arc::new(ManualClock::new(start()));
    let service = service(&source, &clock);

    let first = service.get_weather(TOKYO).await.unwrap();
    clock.advance(minutes(2));
    let second = service.get_weather(TOKYO).await.unwrap();
    let third = service.get_weather(TOKYO).await.unwrap();

    assert_eq!(source.calls(), 1);
    assert_eq!(second, third);
    assert!(!first.served_from_cache);
    assert!(second.served_from_cache);
    assert_ne!(first, second);
    assert_eq!(
        WeatherSnapshotView::from(&first),
        WeatherSnapshotView::from(&second)
    );
}

/// Snapshot contents without the per-response cache flag
#[derive(Debug, PartialEq)]
struct WeatherSnapshotView {
    pressure_hpa: i32,
    pressure_change: f64,
    tier: SeverityTier,
    forecast: Vec<barowatch_pressure::ForecastPoint>,
    produced_at: DateTime<Utc>,
}

impl From<&barowatch_pressure::WeatherSnapshot> for WeatherSnapshotView {
    fn from(s: &barowatch_pressure::WeatherSnapshot) -> Self {
        Self {
            pressure_hpa: s.pressure_hpa,
            pressure_change: s.pressure_change,
            tier: s.tier,
            forecast: s.forecast.clone(),
            produced_at: s.produced_at,
        }
    }
}

#[tokio::test]
async fn test_client_miss_is_served_by_server_tier() {
    let source = Arc::new(FakeSource::new(&[1012.0, 1012.0]));
    let clock = Arc::new(ManualClock::new(start()));
    let service = service(&source, &clock);

    service.get_weather(TOKYO).await.unwrap();
    clock.advance(minutes(6));
    let snapshot = service.get_weather(TOKYO).await.unwrap();

    assert_eq!(source.calls(), 1);
    assert!(snapshot.served_from_cache);
    // The client tier was refilled from the server tier.
    assert_eq!(
        service.client_tier().peek(TOKYO).unwrap().stored_at,
        start() + minutes(6)
    );
}

#[tokio::test]
async fn test_expired_server_entry_triggers_fresh_fetch() {
    let source = Arc::new(FakeSource::new(&[1012.0, 1012.0]));
    let clock = Arc::new(ManualClock::new(start()));
    let service = service(&source, &clock);

    service.get_weather(TOKYO).await.unwrap();
    clock.advance(minutes(31));
    source.respond_with(Ok(series(&[1004.0, 1004.0])));
    let snapshot = service.get_weather(TOKYO).await.unwrap();

    assert_eq!(source.calls(), 2);
    assert!(!snapshot.served_from_cache);
    assert_eq!(snapshot.pressure_hpa, 1004);
    assert_eq!(snapshot.tier, SeverityTier::Danger);
}

#[tokio::test]
async fn test_unknown_region_makes_no_upstream_call() {
    let source = Arc::new(FakeSource::new(&[1012.0]));
    let clock = Arc::new(ManualClock::new(start()));
    let service = service(&source, &clock);

    let err = service.get_weather("UnknownLand").await.unwrap_err();

    assert_eq!(err, WeatherError::UnknownRegion("UnknownLand".to_string()));
    assert!(err.is_client_error());
    assert_eq!(source.calls(), 0);
}

#[tokio::test]
async fn test_empty_series_is_insufficient_data() {
    let source = Arc::new(FakeSource::new(&[]));
    let clock = Arc::new(ManualClock::new(start()));
    let service = service(&source, &clock);

    let err = service.get_weather(TOKYO).await.unwrap_err();
    assert!(matches!(err, WeatherError::InsufficientData(_)));
    assert!(service.server_tier().peek(TOKYO).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_callers_share_one_fetch() {
    let source = Arc::new(FakeSource::new(&[1013.0, 1010.0]).with_delay(Duration::from_secs(1)));
    let clock = Arc::new(ManualClock::new(start()));
    let service = Arc::new(service(&source, &clock));

    let mut handles = Vec::new();
    for _ in 0..16 {
        let service = service.clone();
        handles.push(tokio::spawn(async move { service.get_weather(TOKYO).await }));
    }

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap().unwrap());
    }

    assert_eq!(source.calls(), 1);
    assert!(results.iter().all(|r| *r == results[0]));
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_failure_reaches_all_callers_and_is_not_cached() {
    let source = Arc::new(FakeSource::new(&[1013.0]).with_delay(Duration::from_secs(1)));
    source.respond_with(Err(WeatherError::UpstreamUnavailable("503".to_string())));
    let clock = Arc::new(ManualClock::new(start()));
    let service = Arc::new(service(&source, &clock));

    let mut handles = Vec::new();
    for _ in 0..6 {
        let service = service.clone();
        handles.push(tokio::spawn(async move { service.get_weather(TOKYO).await }));
    }
    for handle in handles {
        let err = handle.await.unwrap().unwrap_err();
        assert!(err.is_retryable());
    }
    assert_eq!(source.calls(), 1);

    source.respond_with(Ok(series(&[1013.0])));
    service.get_weather(TOKYO).await.unwrap();
    assert_eq!(source.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_upstream_timeout_surfaces_as_unavailable() {
    let source = Arc::new(FakeSource::new(&[1013.0]).with_delay(Duration::from_secs(60)));
    let clock = Arc::new(ManualClock::new(start()));
    let service = WeatherService::builder(source.clone())
        .clock(clock.clone())
        .fetch_timeout(Duration::from_secs(5))
        .build();

    let err = service.get_weather(TOKYO).await.unwrap_err();
    assert!(matches!(err, WeatherError::UpstreamUnavailable(_)));
}

#[tokio::test]
async fn test_degraded_mode_serves_expired_entry() {
    let source = Arc::new(FakeSource::new(&[1009.0, 1009.0]));
    let clock = Arc::new(ManualClock::new(start()));
    let service = WeatherService::builder(source.clone())
        .clock(clock.clone())
        .client_ttl(minutes(5))
        .server_ttl(minutes(30))
        .serve_stale_on_error(true)
        .build();

    service.get_weather(TOKYO).await.unwrap();
    clock.advance(minutes(45));
    source.respond_with(Err(WeatherError::UpstreamUnavailable("timeout".to_string())));

    let snapshot = service.get_weather(TOKYO).await.unwrap();
    assert!(snapshot.degraded);
    assert!(snapshot.served_from_cache);
    assert_eq!(snapshot.pressure_hpa, 1009);
    assert_eq!(source.calls(), 2);
    // Neither tier promotes the degraded value.
    assert_eq!(service.client_tier().peek(TOKYO).unwrap().stored_at, start());
    assert_eq!(service.server_tier().peek(TOKYO).unwrap().stored_at, start());

    source.respond_with(Err(WeatherError::MisconfiguredCredentials("401".to_string())));
    let err = service.get_weather(TOKYO).await.unwrap_err();
    assert!(matches!(err, WeatherError::MisconfiguredCredentials(_)));
}

#[tokio::test]
async fn test_degraded_mode_off_propagates_failure() {
    let source = Arc::new(FakeSource::new(&[1009.0, 1009.0]));
    let clock = Arc::new(ManualClock::new(start()));
    let service = service(&source, &clock);

    service.get_weather(TOKYO).await.unwrap();
    clock.advance(minutes(45));
    source.respond_with(Err(WeatherError::UpstreamUnavailable("timeout".to_string())));

    let err = service.get_weather(TOKYO).await.unwrap_err();
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_services_share_server_tier() {
    let source = Arc::new(FakeSource::new(&[1015.0, 1015.0]));
    let clock = Arc::new(ManualClock::new(start()));
    let server = Arc::new(CacheTier::new(
        "server",
        minutes(360),
        Box::new(MemoryStore::new()),
        clock.clone(),
    ));

    let first = WeatherService::builder(source.clone())
        .clock(clock.clone())
        .server_tier(server.clone())
        .build();
    let second = WeatherService::builder(source.clone())
        .clock(clock.clone())
        .server_tier(server)
        .build();

    let a = first.get_weather(TOKYO).await.unwrap();
    let b = second.get_weather(TOKYO).await.unwrap();

    assert_eq!(source.calls(), 1);
    assert!(!a.served_from_cache);
    assert!(b.served_from_cache);
    assert_eq!(a.forecast, b.forecast);
}

#[tokio::test]
async fn test_three_hourly_step_limits_window() {
    let pressures: Vec<f64> = (0..40).map(|i| 1013.0 - i as f64 * 0.2).collect();
    let source = Arc::new(FakeSource::new(&pressures).with_step(ForecastStep::ThreeHourly));
    let clock = Arc::new(ManualClock::new(start()));
    let service = service(&source, &clock);

    let snapshot = service.get_weather(TOKYO).await.unwrap();
    assert_eq!(snapshot.forecast.len(), 9);
}

#[tokio::test]
async fn test_invalidate_forces_refetch() {
    let source = Arc::new(FakeSource::new(&[1012.0]));
    let clock = Arc::new(ManualClock::new(start()));
    let service = service(&source, &clock);

    service.get_weather(TOKYO).await.unwrap();
    service.invalidate(TOKYO);
    service.get_weather(TOKYO).await.unwrap();

    assert_eq!(source.calls(), 2);
}

#[tokio::test]
async fn test_sqlite_server_tier_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("weather_cache.db");
    let source = Arc::new(FakeSource::new(&[1011.0, 1010.0]));
    let clock = Arc::new(ManualClock::new(start()));

    {
        let service = WeatherService::builder(source.clone())
            .clock(clock.clone())
            .server_store(Box::new(SqliteStore::open(&db).unwrap()))
            .build();
        service.get_weather(TOKYO).await.unwrap();
    }

    let service = WeatherService::builder(source.clone())
        .clock(clock.clone())
        .server_store(Box::new(SqliteStore::open(&db).unwrap()))
        .build();
    let snapshot = service.get_weather(TOKYO).await.unwrap();

    assert_eq!(source.calls(), 1);
    assert!(snapshot.served_from_cache);
    assert_eq!(snapshot.pressure_hpa, 1011);
}
