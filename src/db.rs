use chrono::Utc;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use std::path::Path;

use crate::{
    error::AppError,
    models::{GeoLocation, Relay, RelayStats, RelayUpdate},
    utils::extract_host,
};

/// Optional filters for listing relays
#[derive(Debug, Clone, Default)]
pub struct RelayFilter {
    pub alive: Option<bool>,
    pub country: Option<String>,
    pub limit: Option<i64>,
}

/// Open (creating if missing) the relay database and ensure its schema
pub async fn create_pool(path: &Path) -> Result<SqlitePool, AppError> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .map_err(|e| AppError::DbConnectionError(e.to_string()))?;

    ensure_schema(&pool).await?;

    tracing::info!("Database {} opened", path.display());
    Ok(pool)
}

/// Create the relay table and its indexes if they don't exist
async fn ensure_schema(pool: &SqlitePool) -> Result<(), AppError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS relays (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            url TEXT NOT NULL UNIQUE,
            host TEXT NOT NULL,
            is_alive BOOLEAN NOT NULL DEFAULT 0,
            last_checked TIMESTAMP,
            latitude REAL,
            longitude REAL,
            country TEXT,
            city TEXT,
            created_at TIMESTAMP NOT NULL,
            updated_at TIMESTAMP NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| AppError::DbError(e.to_string()))?;

    for statement in [
        "CREATE INDEX IF NOT EXISTS idx_relays_url ON relays(url)",
        "CREATE INDEX IF NOT EXISTS idx_relays_host ON relays(host)",
        "CREATE INDEX IF NOT EXISTS idx_relays_is_alive ON relays(is_alive)",
        "CREATE INDEX IF NOT EXISTS idx_relays_location ON relays(latitude, longitude)",
    ] {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|e| AppError::DbError(e.to_string()))?;
    }

    tracing::debug!("Database schema ensured");
    Ok(())
}

/// Insert or update a relay keyed by its URL.
///
/// Liveness and check time are always overwritten. Location columns keep
/// their stored value when the update carries no location.
pub async fn save_relay(pool: &SqlitePool, relay: &RelayUpdate) -> Result<(), AppError> {
    let host = extract_host(&relay.url)?;
    let now = Utc::now();
    let location = relay.location.as_ref();

    sqlx::query(
        r#"
        INSERT INTO relays (
            url, host, is_alive, last_checked, latitude, longitude,
            country, city, created_at, updated_at
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
        ON CONFLICT(url) DO UPDATE SET
            host = excluded.host,
            is_alive = excluded.is_alive,
            last_checked = excluded.last_checked,
            latitude = COALESCE(excluded.latitude, relays.latitude),
            longitude = COALESCE(excluded.longitude, relays.longitude),
            country = COALESCE(excluded.country, relays.country),
            city = COALESCE(excluded.city, relays.city),
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&relay.url)
    .bind(&host)
    .bind(relay.is_alive)
    .bind(relay.last_checked)
    .bind(location.map(|l| l.latitude))
    .bind(location.map(|l| l.longitude))
    .bind(location.and_then(|l| non_empty(&l.country)))
    .bind(location.and_then(|l| non_empty(&l.city)))
    .bind(now)
    .execute(pool)
    .await
    .map_err(|e| AppError::DbError(e.to_string()))?;

    Ok(())
}

fn non_empty(s: &str) -> Option<&str> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

pub async fn get_relay(pool: &SqlitePool, url: &str) -> Result<Option<Relay>, AppError> {
    let relay = sqlx::query_as::<_, Relay>(r#"SELECT * FROM relays WHERE url = ?"#)
        .bind(url)
        .fetch_optional(pool)
        .await
        .map_err(|e| AppError::DbError(e.to_string()))?;

    Ok(relay)
}

/// All relays, newest first
pub async fn get_all_relays(pool: &SqlitePool) -> Result<Vec<Relay>, AppError> {
    list_relays(pool, &RelayFilter::default()).await
}

/// Relays matching the filter, newest first
pub async fn list_relays(pool: &SqlitePool, filter: &RelayFilter) -> Result<Vec<Relay>, AppError> {
    let relays = sqlx::query_as::<_, Relay>(
        r#"
        SELECT * FROM relays
        WHERE (?1 IS NULL OR is_alive = ?1)
          AND (?2 IS NULL OR country = ?2)
        ORDER BY created_at DESC, id DESC
        LIMIT ?3
        "#,
    )
    .bind(filter.alive)
    .bind(&filter.country)
    .bind(filter.limit.unwrap_or(-1))
    .fetch_all(pool)
    .await
    .map_err(|e| AppError::DbError(e.to_string()))?;

    Ok(relays)
}

/// Alive relays, most recently checked first
pub async fn get_functioning_relays(pool: &SqlitePool) -> Result<Vec<Relay>, AppError> {
    let relays = sqlx::query_as::<_, Relay>(
        r#"
        SELECT * FROM relays
        WHERE is_alive = 1
        ORDER BY last_checked DESC, id DESC
        "#,
    )
    .fetch_all(pool)
    .await
    .map_err(|e| AppError::DbError(e.to_string()))?;

    Ok(relays)
}

pub async fn get_geolocated_relays(pool: &SqlitePool) -> Result<Vec<Relay>, AppError> {
    let relays = sqlx::query_as::<_, Relay>(
        r#"
        SELECT * FROM relays
        WHERE latitude IS NOT NULL AND longitude IS NOT NULL
        ORDER BY created_at DESC, id DESC
        "#,
    )
    .fetch_all(pool)
    .await
    .map_err(|e| AppError::DbError(e.to_string()))?;

    Ok(relays)
}

/// Store a location for an existing relay
pub async fn update_relay_location(
    pool: &SqlitePool,
    url: &str,
    location: &GeoLocation,
) -> Result<(), AppError> {
    let result = sqlx::query(
        r#"
        UPDATE relays
        SET latitude = ?1, longitude = ?2, country = ?3, city = ?4, updated_at = ?5
        WHERE url = ?6
        "#,
    )
    .bind(location.latitude)
    .bind(location.longitude)
    .bind(non_empty(&location.country))
    .bind(non_empty(&location.city))
    .bind(Utc::now())
    .bind(url)
    .execute(pool)
    .await
    .map_err(|e| AppError::DbError(e.to_string()))?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFoundError(format!("relay {}", url)));
    }

    Ok(())
}

/// Aggregate statistics over all stored relays
pub async fn get_relay_stats(pool: &SqlitePool) -> Result<RelayStats, AppError> {
    let (total_relays, functioning_relays, geolocated_relays, unique_hosts, unique_countries) =
        sqlx::query_as::<_, (i64, i64, i64, i64, i64)>(
            r#"
            SELECT
                COUNT(*),
                COALESCE(SUM(CASE WHEN is_alive THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN latitude IS NOT NULL AND longitude IS NOT NULL THEN 1 ELSE 0 END), 0),
                COUNT(DISTINCT host),
                COUNT(DISTINCT NULLIF(country, ''))
            FROM relays
            "#,
        )
        .fetch_one(pool)
        .await
        .map_err(|e| AppError::DbError(e.to_string()))?;

    Ok(RelayStats {
        total_relays,
        functioning_relays,
        geolocated_relays,
        unique_hosts,
        unique_countries,
    })
}

/// Single-connection in-memory database with the schema applied
#[cfg(test)]
pub(crate) async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    ensure_schema(&pool).await.unwrap();
    pool
}
