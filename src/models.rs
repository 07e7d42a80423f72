use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::time::Duration;

/// Application state shared across API handlers
#[derive(Clone)]
pub struct AppState {
    pub db_pool: SqlitePool,
}

/// Type alias for the application state that can be used with Axum
pub type SharedState = axum::extract::State<AppState>;

/// A relay as stored in the database
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Relay {
    pub id: i64,
    pub url: String,
    pub host: String,
    pub is_alive: bool,
    pub last_checked: Option<DateTime<Utc>>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Relay {
    pub fn has_location(&self) -> bool {
        self.latitude.is_some() && self.longitude.is_some()
    }
}

/// What a crawl hands to the store for one relay
#[derive(Debug, Clone)]
pub struct RelayUpdate {
    pub url: String,
    pub is_alive: bool,
    pub last_checked: DateTime<Utc>,
    pub location: Option<GeoLocation>,
}

impl RelayUpdate {
    /// A relay that just answered a probe, location unknown
    pub fn alive(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            is_alive: true,
            last_checked: Utc::now(),
            location: None,
        }
    }
}

/// Geographic position of a relay's IPv4 address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub country: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub city: String,
}

/// A signed social graph event. Only `tags` matter for discovery.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NostrEvent {
    pub id: String,
    pub pubkey: String,
    pub kind: u64,
    pub tags: Vec<Vec<String>>,
    pub content: String,
    pub sig: String,
    pub created_at: i64,
}

/// Progress counters of a single crawl
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryStats {
    pub total_relays_found: usize,
    pub functioning_relays: usize,
    pub events_processed: usize,
    pub start_time: DateTime<Utc>,
    pub duration: Duration,
}

/// Aggregate statistics over the relay store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayStats {
    pub total_relays: i64,
    pub functioning_relays: i64,
    pub geolocated_relays: i64,
    pub unique_hosts: i64,
    pub unique_countries: i64,
}

/// State of a geo-IP range table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GeoStats {
    pub loaded: bool,
    pub ranges: usize,
}
