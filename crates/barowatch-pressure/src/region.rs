//! Static region table: region id -> reference coordinate.
//!
//! The built-in set is the 47 prefectures of Japan, keyed by their Japanese
//! names and located at the prefectural capital. Extra regions can be added
//! at construction time; the table never changes afterwards.

use std::collections::HashMap;

use barowatch_core::{RegionConfig, WeatherError};

use crate::types::Coordinate;

/// Prefectural capitals (id, latitude, longitude).
const PREFECTURES: &[(&str, f64, f64)] = &[
    ("北海道", 43.0646, 141.3468),
    ("青森県", 40.8244, 140.74),
    ("岩手県", 39.7036, 141.1527),
    ("宮城県", 38.2688, 140.8721),
    ("秋田県", 39.7186, 140.1024),
    ("山形県", 38.2404, 140.3633),
    ("福島県", 37.75, 140.4676),
    ("茨城県", 36.3418, 140.4468),
    ("栃木県", 36.5657, 139.8836),
    ("群馬県", 36.3912, 139.0608),
    ("埼玉県", 35.8569, 139.6489),
    ("千葉県", 35.6047, 140.1233),
    ("東京都", 35.6895, 139.6917),
    ("神奈川県", 35.4478, 139.6425),
    ("新潟県", 37.9026, 139.0236),
    ("富山県", 36.6953, 137.2113),
    ("石川県", 36.5946, 136.6256),
    ("福井県", 36.0652, 136.2216),
    ("山梨県", 35.6642, 138.5684),
    ("長野県", 36.6513, 138.181),
    ("岐阜県", 35.3912, 136.7223),
    ("静岡県", 34.9769, 138.3831),
    ("愛知県", 35.1802, 136.9066),
    ("三重県", 34.7303, 136.5086),
    ("滋賀県", 35.0045, 135.8686),
    ("京都府", 35.0116, 135.7681),
    ("大阪府", 34.6937, 135.5023),
    ("兵庫県", 34.6913, 135.183),
    ("奈良県", 34.6851, 135.8049),
    ("和歌山県", 34.226, 135.1675),
    ("鳥取県", 35.5039, 134.2377),
    ("島根県", 35.4723, 133.0505),
    ("岡山県", 34.6618, 133.9344),
    ("広島県", 34.3966, 132.4596),
    ("山口県", 34.186, 131.4714),
    ("徳島県", 34.0658, 134.5593),
    ("香川県", 34.3401, 134.0434),
    ("愛媛県", 33.8416, 132.7657),
    ("高知県", 33.5597, 133.531),
    ("福岡県", 33.6064, 130.4183),
    ("佐賀県", 33.2494, 130.2988),
    ("長崎県", 32.7448, 129.8737),
    ("熊本県", 32.7898, 130.7417),
    ("大分県", 33.2382, 131.6126),
    ("宮崎県", 31.9111, 131.4239),
    ("鹿児島県", 31.5602, 130.5581),
    ("沖縄県", 26.2124, 127.6809),
];

/// Exact, case-sensitive lookup from region id to coordinate.
#[derive(Debug, Clone)]
pub struct RegionResolver {
    coordinates: HashMap<String, Coordinate>,
    order: Vec<String>,
}

impl RegionResolver {
    /// Resolver over the built-in prefecture table.
    pub fn japan() -> Self {
        Self::from_entries(
            PREFECTURES
                .iter()
                .map(|(id, latitude, longitude)| (id.to_string(), *latitude, *longitude)),
        )
    }

    /// Built-in table plus configured regions. A configured id replaces a built-in one.
    pub fn with_extra(extra: &[RegionConfig]) -> Self {
        let mut resolver = Self::japan();
        for region in extra {
            resolver.insert(region.id.clone(), region.latitude, region.longitude);
        }
        resolver
    }

    /// Resolver over an arbitrary bounded set of regions.
    pub fn from_entries(entries: impl IntoIterator<Item = (String, f64, f64)>) -> Self {
        let mut resolver = Self {
            coordinates: HashMap::new(),
            order: Vec::new(),
        };
        for (id, latitude, longitude) in entries {
            resolver.insert(id, latitude, longitude);
        }
        resolver
    }

    fn insert(&mut self, id: String, latitude: f64, longitude: f64) {
        let coordinate = Coordinate {
            latitude,
            longitude,
        };
        if self.coordinates.insert(id.clone(), coordinate).is_none() {
            self.order.push(id);
        }
    }

    /// Resolve a region id.
    ///
    /// # Errors
    /// `WeatherError::UnknownRegion` for any id not in the table.
    pub fn resolve(&self, region_id: &str) -> Result<Coordinate, WeatherError> {
        self.coordinates
            .get(region_id)
            .copied()
            .ok_or_else(|| WeatherError::UnknownRegion(region_id.to_string()))
    }

    pub fn contains(&self, region_id: &str) -> bool {
        self.coordinates.contains_key(region_id)
    }

    /// Region ids in table order
    pub fn regions(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl Default for RegionResolver {
    fn default() -> Self {
        Self::japan()
    }
}
