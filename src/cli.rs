use clap::{Parser, Subcommand};
use std::{path::PathBuf, time::Duration};

use crate::discovery::DEFAULT_DATABASE_URL;

/// Command-line interface for the relay discovery tool
#[derive(Parser, Debug, Clone)]
#[clap(
    name = "relaymap",
    about = "Discovers Nostr relays and finds their geographic locations",
    version
)]
pub struct Cli {
    /// SQLite database path
    #[clap(long, global = true, env("RELAYS_DB"), default_value = "relays.db")]
    pub db: PathBuf,

    /// Seed relay to start discovery from (repeatable)
    #[clap(
        long,
        global = true,
        env("RELAYS_SEED"),
        value_delimiter = ',',
        default_value = "wss://relay.damus.io"
    )]
    pub seed: Vec<String>,

    /// Maximum discovery depth (number of breadth-first rounds)
    #[clap(long, global = true, env("RELAYS_DEPTH"), default_value = "3")]
    pub depth: usize,

    /// Relays probed concurrently per round
    #[clap(long, global = true, env("RELAYS_BATCH"), default_value = "10")]
    pub batch: usize,

    /// Timeout for a single relay probe in seconds
    #[clap(long, global = true, env("RELAYS_TIMEOUT"), default_value = "10")]
    pub timeout: u64,

    /// Maximum number of events requested from each relay
    #[clap(long, global = true, env("RELAYS_EVENT_LIMIT"), default_value = "100")]
    pub event_limit: usize,

    /// URL of the gzip-compressed geo-IP dataset
    #[clap(long, global = true, env("RELAYS_GEO_DB_URL"), default_value = DEFAULT_DATABASE_URL)]
    pub geo_db_url: String,

    /// Local geo-IP dataset to use instead of downloading one
    #[clap(long, global = true, env("RELAYS_GEO_DB_FILE"))]
    pub geo_db_file: Option<PathBuf>,

    /// Maximum number of concurrent relay geolocations
    #[clap(long, global = true, env("RELAYS_GEO_CONCURRENCY"), default_value = "16")]
    pub geo_concurrency: usize,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Discover Nostr relays
    Discover,
    /// Geolocate discovered relays
    Geolocate,
    /// Run full discovery and geolocation process
    Full,
    /// Show database statistics
    Stats,
    /// Export relay data (JSON, or CSV when the file ends in .csv)
    Export {
        /// Output file for results
        #[clap(long, env("RELAYS_OUTPUT"))]
        output: PathBuf,
    },
    /// Serve the relay database over HTTP
    Serve {
        /// Port to run the web server on
        #[clap(short, long, env("RELAYS_PORT"), default_value = "8080")]
        port: u16,
    },
}

impl Cli {
    /// Get the probe timeout as a Duration
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}
