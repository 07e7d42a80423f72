use chrono::{DateTime, Utc};
use futures::future::join_all;
use parking_lot::Mutex;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tokio_util::sync::CancellationToken;

use super::{
    frontier::Frontier,
    normalize::extract_candidates,
    session::{Probe, ProbeResult, RelayProbe},
};
use crate::{config::CrawlerConfig, error::ProbeError, models::DiscoveryStats};

/// Counters gathered from one finished round
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoundStats {
    pub probed: usize,
    pub alive: usize,
    pub events: usize,
}

#[derive(Debug)]
struct StatsState {
    total_relays_found: usize,
    functioning_relays: usize,
    events_processed: usize,
    start_time: DateTime<Utc>,
    started: Instant,
    /// Set once the crawl has finished
    duration: Option<Duration>,
    rounds: Vec<RoundStats>,
}

/// Lock-protected crawl statistics
#[derive(Debug)]
struct StatsTracker {
    inner: Mutex<StatsState>,
}

impl StatsTracker {
    fn new() -> Self {
        Self {
            inner: Mutex::new(StatsState {
                total_relays_found: 0,
                functioning_relays: 0,
                events_processed: 0,
                start_time: Utc::now(),
                started: Instant::now(),
                duration: None,
                rounds: Vec::new(),
            }),
        }
    }

    fn begin(&self) {
        let mut state = self.inner.lock();
        state.start_time = Utc::now();
        state.started = Instant::now();
        state.duration = None;
        state.rounds.clear();
    }

    fn record_round(&self, round: RoundStats) {
        let mut state = self.inner.lock();
        state.total_relays_found += round.probed;
        state.functioning_relays += round.alive;
        state.events_processed += round.events;
        state.rounds.push(round);
    }

    fn finish(&self) -> Duration {
        let mut state = self.inner.lock();
        let elapsed = state.started.elapsed();
        state.duration = Some(elapsed);
        elapsed
    }

    fn rounds(&self) -> Vec<RoundStats> {
        self.inner.lock().rounds.clone()
    }

    fn snapshot(&self) -> DiscoveryStats {
        let state = self.inner.lock();
        DiscoveryStats {
            total_relays_found: state.total_relays_found,
            functioning_relays: state.functioning_relays,
            events_processed: state.events_processed,
            start_time: state.start_time,
            duration: state.duration.unwrap_or_else(|| state.started.elapsed()),
        }
    }
}

/// Breadth-first relay crawler.
///
/// Each round drains up to `batch_size` relays from the frontier, probes them
/// all concurrently and waits for every probe before mining the alive ones
/// for new relay references. Rounds stop at `max_depth`, when the frontier
/// runs dry, or when the cancellation token fires.
pub struct Crawler<P = RelayProbe> {
    config: CrawlerConfig,
    probe: Arc<P>,
    frontier: Frontier,
    stats: StatsTracker,
}

impl Crawler<RelayProbe> {
    /// Crawler that probes relays over websocket
    pub fn new(config: CrawlerConfig) -> Self {
        let probe = RelayProbe::from_config(&config);
        Self::with_probe(config, probe)
    }
}

impl<P: Probe> Crawler<P> {
    pub fn with_probe(config: CrawlerConfig, probe: P) -> Self {
        Self {
            config,
            probe: Arc::new(probe),
            frontier: Frontier::new(),
            stats: StatsTracker::new(),
        }
    }

    /// Put a seed relay on the frontier. The URL is used as given.
    /// Returns false if the relay was already known.
    pub fn add_seed(&self, url: &str) -> bool {
        self.frontier.try_enqueue(url)
    }

    /// Relays discovered but not probed yet
    pub fn pending(&self) -> Vec<String> {
        self.frontier.pending()
    }

    /// Current statistics. While a crawl runs the duration is measured up to now.
    pub fn stats(&self) -> DiscoveryStats {
        self.stats.snapshot()
    }

    /// Counters of every finished round of the current crawl, in order
    pub fn rounds(&self) -> Vec<RoundStats> {
        self.stats.rounds()
    }

    /// Run the crawl and return every relay that answered, in probe order
    pub async fn discover(&self, cancel: &CancellationToken) -> Vec<String> {
        self.stats.begin();
        let mut functioning = Vec::new();

        for depth in 0..self.config.max_depth {
            if cancel.is_cancelled() {
                tracing::info!("Discovery cancelled before depth {}", depth);
                break;
            }

            let batch = self.frontier.drain_batch(self.config.batch_size);
            if batch.is_empty() {
                break;
            }

            tracing::info!(
                "Starting depth {} with {} relays to process ({} still queued)",
                depth,
                batch.len(),
                self.frontier.pending_len()
            );

            let results = self.probe_batch(batch, cancel).await;

            let mut round = RoundStats {
                probed: results.len(),
                ..Default::default()
            };

            for result in &results {
                round.events += result.events.len();

                if !result.is_alive {
                    if let Some(e) = &result.error {
                        tracing::debug!("Relay {} is not functioning: {}", result.url, e);
                    }
                    continue;
                }

                round.alive += 1;
                functioning.push(result.url.clone());

                let candidates = extract_candidates(&result.events);
                let added = self.frontier.enqueue_all(&candidates);
                tracing::debug!(
                    "Relay {} referenced {} relays, {} new",
                    result.url,
                    candidates.len(),
                    added
                );
            }

            self.stats.record_round(round);

            tracing::info!(
                "Depth {} done: {}/{} relays alive, {} events, {} relays known",
                depth,
                round.alive,
                round.probed,
                round.events,
                self.frontier.visited_len()
            );
        }

        let duration = self.stats.finish();
        tracing::info!(
            "Discovery finished in {:?}: {} functioning relays",
            duration,
            functioning.len()
        );

        functioning
    }

    /// Probe one batch with one task per relay and wait for all of them.
    /// Results come back in batch order.
    async fn probe_batch(&self, batch: Vec<String>, cancel: &CancellationToken) -> Vec<ProbeResult> {
        let handles: Vec<_> = batch
            .iter()
            .map(|url| {
                let probe = Arc::clone(&self.probe);
                let url = url.clone();
                let cancel = cancel.clone();
                tokio::spawn(async move { probe.probe(url, cancel).await })
            })
            .collect();

        join_all(handles)
            .await
            .into_iter()
            .zip(batch)
            .map(|(joined, url)| match joined {
                Ok(result) => result,
                Err(e) => {
                    tracing::warn!("Probe task for {} failed: {}", url, e);
                    ProbeResult::dead(url, ProbeError::Task(e.to_string()))
                }
            })
            .collect()
    }
}
