use futures::{stream, StreamExt};
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;

use super::{crawler::Crawler, geo::GeoLocator, session::Probe};
use crate::{
    config::CrawlerConfig,
    db,
    error::AppError,
    models::{DiscoveryStats, RelayUpdate},
};

/// Crawl from the configured seeds and store every relay that answered
pub async fn run_discovery(
    pool: &SqlitePool,
    config: &CrawlerConfig,
    cancel: &CancellationToken,
) -> Result<DiscoveryStats, AppError> {
    tracing::info!(
        "Starting relay discovery from {} seeds (depth {}, batch {}, timeout {:?})",
        config.seeds.len(),
        config.max_depth,
        config.batch_size,
        config.probe_timeout
    );

    let crawler = Crawler::new(config.clone());
    for seed in &config.seeds {
        crawler.add_seed(seed);
    }

    crawl_and_store(pool, &crawler, cancel).await
}

/// Run an already seeded crawler and persist its alive relays.
///
/// A relay that fails to save is logged and skipped.
pub async fn crawl_and_store<P: Probe>(
    pool: &SqlitePool,
    crawler: &Crawler<P>,
    cancel: &CancellationToken,
) -> Result<DiscoveryStats, AppError> {
    let alive = crawler.discover(cancel).await;

    let mut saved = 0;
    for url in &alive {
        match db::save_relay(pool, &RelayUpdate::alive(url.as_str())).await {
            Ok(()) => saved += 1,
            Err(e) => tracing::warn!("Failed to save relay {}: {}", url, e),
        }
    }

    let stats = crawler.stats();
    tracing::info!(
        "Discovery complete: {} relays probed, {} functioning, {} saved, {} events processed in {:?}",
        stats.total_relays_found,
        stats.functioning_relays,
        saved,
        stats.events_processed,
        stats.duration
    );

    let round_sizes: Vec<usize> = crawler.rounds().iter().map(|r| r.probed).collect();
    tracing::debug!("Relays probed per round: {:?}", round_sizes);

    let pending = crawler.pending();
    if !pending.is_empty() {
        tracing::info!("{} discovered relays were left unprobed", pending.len());
    }

    Ok(stats)
}

/// Locate every functioning relay without coordinates and store its location.
///
/// Returns how many relays were geolocated. Failing to load the dataset
/// aborts; a relay that cannot be located is logged and skipped.
pub async fn run_geolocation(
    pool: &SqlitePool,
    locator: &GeoLocator,
    concurrency: usize,
) -> Result<usize, AppError> {
    locator.load_database().await?;

    let relays: Vec<_> = db::get_functioning_relays(pool)
        .await?
        .into_iter()
        .filter(|r| !r.has_location())
        .collect();

    tracing::info!(
        "Geolocating {} relays with up to {} lookups in flight",
        relays.len(),
        concurrency
    );

    let located = stream::iter(relays)
        .map(|relay| async move {
            let location = match locator.locate_relay(&relay.url).await {
                Ok(location) => location,
                Err(e) => {
                    tracing::debug!("Could not locate {}: {}", relay.url, e);
                    return false;
                }
            };

            match db::update_relay_location(pool, &relay.url, &location).await {
                Ok(()) => {
                    tracing::debug!(
                        "Relay {} located at {:.4},{:.4} ({})",
                        relay.url,
                        location.latitude,
                        location.longitude,
                        location.country
                    );
                    true
                }
                Err(e) => {
                    tracing::warn!("Failed to store location of {}: {}", relay.url, e);
                    false
                }
            }
        })
        .buffer_unordered(concurrency.max(1))
        .filter(|ok| futures::future::ready(*ok))
        .count()
        .await;

    tracing::info!("Geolocated {} relays", located);
    Ok(located)
}
