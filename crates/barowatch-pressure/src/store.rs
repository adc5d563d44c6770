//! SQLite-backed cache store for the server tier.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

use crate::cache::CacheStore;
use crate::types::{CacheEntry, WeatherSnapshot};

/// One row per region: `(region, data, fetched_at)`, replaced on refresh.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
        }
        let conn = Connection::open(path)
            .with_context(|| format!("opening cache database {}", path.display()))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory database.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.lock().execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS weather_cache (
                region TEXT PRIMARY KEY,
                data TEXT NOT NULL,
                fetched_at TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    /// Number of cached regions
    pub fn len(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .lock()
            .query_row("SELECT COUNT(*) FROM weather_cache", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

impl CacheStore for SqliteStore {
    fn load(&self, key: &str) -> Result<Option<CacheEntry>> {
        let row: Option<(String, String)> = self
            .conn
            .lock()
            .query_row(
                "SELECT data, fetched_at FROM weather_cache WHERE region = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((data, fetched_at)) = row else {
            return Ok(None);
        };

        let value: WeatherSnapshot = serde_json::from_str(&data)
            .with_context(|| format!("decoding cached snapshot for {}", key))?;
        let stored_at = DateTime::parse_from_rfc3339(&fetched_at)
            .with_context(|| format!("decoding fetched_at for {}", key))?
            .with_timezone(&Utc);

        Ok(Some(CacheEntry {
            key: key.to_string(),
            value,
            stored_at,
        }))
    }

    fn save(&self, entry: &CacheEntry) -> Result<()> {
        let data = serde_json::to_string(&entry.value)?;
        self.conn.lock().execute(
            r#"
            INSERT OR REPLACE INTO weather_cache (region, data, fetched_at)
            VALUES (?1, ?2, ?3)
            "#,
            params![entry.key, data, entry.stored_at.to_rfc3339()],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.conn
            .lock()
            .execute("DELETE FROM weather_cache WHERE region = ?1", params![key])?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.conn.lock().execute("DELETE FROM weather_cache", [])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChangeUnit, ForecastPoint, SeverityTier, CURRENT_LABEL};
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn entry(key: &str, pressure: i32) -> CacheEntry {
        let stored_at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        CacheEntry {
            key: key.to_string(),
            value: WeatherSnapshot {
                pressure_hpa: pressure,
                pressure_change: -1.5,
                change_unit: ChangeUnit::Hpa,
                tier: SeverityTier::Caution,
                forecast: vec![
                    ForecastPoint {
                        label: CURRENT_LABEL.to_string(),
                        pressure_hpa: pressure,
                        tier: SeverityTier::Caution,
                    },
                    ForecastPoint {
                        label: "22:00".to_string(),
                        pressure_hpa: pressure - 4,
                        tier: SeverityTier::Danger,
                    },
                ],
                produced_at: stored_at,
                served_from_cache: false,
                degraded: false,
            },
            stored_at,
        }
    }

    #[test]
    fn test_save_and_load() {
        let store = SqliteStore::in_memory().unwrap();
        let saved = entry("東京都", 1012);
        store.save(&saved).unwrap();

        let loaded = store.load("東京都").unwrap().unwrap();
        assert_eq!(loaded, saved);
        assert!(store.load("大阪府").unwrap().is_none());
    }

    #[test]
    fn test_one_row_per_region() {
        let store = SqliteStore::in_memory().unwrap();
        store.save(&entry("東京都", 1012)).unwrap();
        store.save(&entry("東京都", 1004)).unwrap();

        assert_eq!(store.len().unwrap(), 1);
        assert_eq!(store.load("東京都").unwrap().unwrap().value.pressure_hpa, 1004);
    }

    #[test]
    fn test_remove_and_clear() {
        let store = SqliteStore::in_memory().unwrap();
        store.save(&entry("東京都", 1012)).unwrap();
        store.save(&entry("神奈川県", 1011)).unwrap();

        store.remove("東京都").unwrap();
        assert!(store.load("東京都").unwrap().is_none());
        assert_eq!(store.len().unwrap(), 1);

        store.clear().unwrap();
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("weather_cache.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            store.save(&entry("札幌", 1009)).unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        let loaded = store.load("札幌").unwrap().unwrap();
        assert_eq!(loaded, entry("札幌", 1009));
    }

    #[test]
    fn test_corrupt_row_is_an_error() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .conn
            .lock()
            .execute(
                "INSERT INTO weather_cache (region, data, fetched_at) VALUES ('x', 'not json', 'later')",
                [],
            )
            .unwrap();
        assert!(store.load("x").is_err());
    }
}
