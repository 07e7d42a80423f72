use crate::{cli::Cli, discovery::DEFAULT_DATABASE_URL, error::AppError};
use std::{path::PathBuf, time::Duration};

const DEFAULT_MAX_DEPTH: usize = 3;
const DEFAULT_BATCH_SIZE: usize = 10;
const DEFAULT_PROBE_TIMEOUT: u64 = 10; // seconds
const DEFAULT_EVENT_LIMIT: usize = 100;
const DEFAULT_GEO_CONCURRENCY: usize = 16;

/// Settings of a single breadth-first crawl
#[derive(Debug, Clone)]
pub struct CrawlerConfig {
    /// Seed relays that enter the frontier before the first round
    pub seeds: Vec<String>,
    /// Maximum number of rounds
    pub max_depth: usize,
    /// Maximum number of relays probed in one round
    pub batch_size: usize,
    /// Budget for one probe, covering connect, request and collection
    pub probe_timeout: Duration,
    /// Result-count cap sent in the subscription filter
    pub event_limit: usize,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            seeds: Vec::new(),
            max_depth: DEFAULT_MAX_DEPTH,
            batch_size: DEFAULT_BATCH_SIZE,
            probe_timeout: Duration::from_secs(DEFAULT_PROBE_TIMEOUT),
            event_limit: DEFAULT_EVENT_LIMIT,
        }
    }
}

/// Where the geo-IP dataset comes from
#[derive(Debug, Clone)]
pub struct GeoConfig {
    pub database_url: String,
    pub database_file: Option<PathBuf>,
    pub concurrency: usize,
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            database_file: None,
            concurrency: DEFAULT_GEO_CONCURRENCY,
        }
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_path: PathBuf,
    pub crawler: CrawlerConfig,
    pub geo: GeoConfig,
}

impl AppConfig {
    /// Build the configuration from parsed command-line arguments
    pub fn from_cli(cli: &Cli) -> Result<Self, AppError> {
        let seeds = cli
            .seed
            .iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let config = AppConfig {
            database_path: cli.db.clone(),
            crawler: CrawlerConfig {
                seeds,
                max_depth: cli.depth,
                batch_size: cli.batch,
                probe_timeout: cli.probe_timeout(),
                event_limit: cli.event_limit,
            },
            geo: GeoConfig {
                database_url: cli.geo_db_url.clone(),
                database_file: cli.geo_db_file.clone(),
                concurrency: cli.geo_concurrency,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.crawler.seeds.is_empty() {
            return Err(AppError::ConfigError("at least one seed relay is required".to_string()));
        }
        if self.crawler.batch_size == 0 {
            return Err(AppError::ConfigError("batch size must be at least 1".to_string()));
        }
        if self.crawler.probe_timeout.is_zero() {
            return Err(AppError::ConfigError("probe timeout must be positive".to_string()));
        }
        if self.crawler.event_limit == 0 {
            return Err(AppError::ConfigError("event limit must be at least 1".to_string()));
        }
        if self.geo.concurrency == 0 {
            return Err(AppError::ConfigError(
                "geolocation concurrency must be at least 1".to_string(),
            ));
        }

        if self.crawler.max_depth == 0 {
            tracing::warn!("Max depth is 0, discovery will not probe any relay");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_from_cli() {
        let cli = parse(&[
            "relaymap",
            "--batch",
            "4",
            "--timeout",
            "3",
            "--seed",
            " wss://a.example ",
            "discover",
        ]);
        let config = AppConfig::from_cli(&cli).unwrap();
        assert_eq!(config.crawler.batch_size, 4);
        assert_eq!(config.crawler.probe_timeout, Duration::from_secs(3));
        assert_eq!(config.crawler.seeds, vec!["wss://a.example".to_string()]);
        assert_eq!(config.geo.database_url, DEFAULT_DATABASE_URL);
        assert!(config.geo.database_file.is_none());
    }

    #[test]
    fn test_zero_batch_rejected() {
        let cli = parse(&["relaymap", "--batch", "0", "discover"]);
        assert!(matches!(AppConfig::from_cli(&cli), Err(AppError::ConfigError(_))));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let cli = parse(&["relaymap", "--timeout", "0", "discover"]);
        assert!(matches!(AppConfig::from_cli(&cli), Err(AppError::ConfigError(_))));
    }

    #[test]
    fn test_blank_seed_rejected() {
        let cli = parse(&["relaymap", "--seed", " ", "discover"]);
        assert!(matches!(AppConfig::from_cli(&cli), Err(AppError::ConfigError(_))));
    }
}
