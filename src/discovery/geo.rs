use flate2::read::GzDecoder;
use reqwest::Client;
use std::{
    fs::File,
    io::{BufRead, BufReader},
    net::{IpAddr, Ipv4Addr},
    path::{Path, PathBuf},
    time::Duration,
};
use tokio::sync::RwLock;

use crate::{
    config::GeoConfig,
    error::AppError,
    models::{GeoLocation, GeoStats},
    utils::extract_host,
};

/// dbip city-level IPv4 dataset with numeric range bounds
pub const DEFAULT_DATABASE_URL: &str = "https://raw.githubusercontent.com/sapics/ip-location-db/refs/heads/main/dbip-city/dbip-city-ipv4-num.csv.gz";

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

// Column layout of a dataset record
const MIN_FIELDS: usize = 9;
const COL_START: usize = 0;
const COL_END: usize = 1;
const COL_COUNTRY: usize = 4;
const COL_CITY: usize = 5;
const COL_LATITUDE: usize = 7;
const COL_LONGITUDE: usize = 8;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// An inclusive range of IPv4 addresses and where it is located
#[derive(Debug, Clone, PartialEq)]
pub struct IpRange {
    pub start: u32,
    pub end: u32,
    pub latitude: f64,
    pub longitude: f64,
    pub country: String,
    pub city: String,
}

impl IpRange {
    fn location(&self) -> GeoLocation {
        GeoLocation {
            latitude: self.latitude,
            longitude: self.longitude,
            country: self.country.clone(),
            city: self.city.clone(),
        }
    }
}

#[derive(Debug, Default)]
struct RangeTable {
    /// Sorted by `start`
    ranges: Vec<IpRange>,
    loaded: bool,
}

impl RangeTable {
    fn loaded(ranges: Vec<IpRange>) -> Self {
        Self {
            ranges,
            loaded: true,
        }
    }

    /// Binary search assuming sorted, non-overlapping ranges
    fn find(&self, ip: u32) -> Option<&IpRange> {
        let mut low = 0;
        let mut high = self.ranges.len();

        while low < high {
            let mid = low + (high - low) / 2;
            let range = &self.ranges[mid];

            if ip < range.start {
                high = mid;
            } else if ip > range.end {
                low = mid + 1;
            } else {
                return Some(range);
            }
        }

        None
    }
}

/// Maps relays to a location using a bulk geo-IP range dataset.
///
/// The dataset is loaded once, either downloaded from `database_url` or read
/// from `database_file` when one is configured. Loading holds the table's
/// write lock so concurrent lookups wait for it; afterwards lookups only
/// take the read lock.
pub struct GeoLocator {
    client: Client,
    database_url: String,
    database_file: Option<PathBuf>,
    table: RwLock<RangeTable>,
}

impl GeoLocator {
    pub fn new(config: &GeoConfig) -> Result<Self, AppError> {
        let client = Client::builder().timeout(DOWNLOAD_TIMEOUT).build()?;

        Ok(Self {
            client,
            database_url: config.database_url.clone(),
            database_file: config.database_file.clone(),
            table: RwLock::new(RangeTable::default()),
        })
    }

    /// Load the configured dataset unless a table is already loaded.
    ///
    /// On failure the locator stays unloaded. A dataset without a single
    /// usable record counts as a failed acquisition.
    pub async fn load_database(&self) -> Result<(), AppError> {
        let mut table = self.table.write().await;
        if table.loaded {
            return Ok(());
        }

        let ranges = match &self.database_file {
            Some(path) => read_dataset_file(path.clone()).await?,
            None => self.download().await?,
        };

        tracing::info!("Geo-IP table loaded with {} ranges", ranges.len());
        *table = RangeTable::loaded(ranges);
        Ok(())
    }

    /// Replace the table with a local dataset. Paths ending in `.gz` are decompressed.
    pub async fn load_from_file(&self, path: impl AsRef<Path>) -> Result<(), AppError> {
        let mut table = self.table.write().await;
        let ranges = read_dataset_file(path.as_ref().to_path_buf()).await?;

        tracing::info!(
            "Geo-IP table loaded from {} with {} ranges",
            path.as_ref().display(),
            ranges.len()
        );
        *table = RangeTable::loaded(ranges);
        Ok(())
    }

    async fn download(&self) -> Result<Vec<IpRange>, AppError> {
        tracing::info!("Downloading geo-IP dataset from {}", self.database_url);

        let response = self
            .client
            .get(&self.database_url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AppError::DatasetError(format!("download failed: {}", e)))?;

        let body = response
            .bytes()
            .await
            .map_err(|e| AppError::DatasetError(format!("download interrupted: {}", e)))?;

        tracing::debug!("Downloaded {} bytes of geo-IP data", body.len());

        tokio::task::spawn_blocking(move || {
            if body.starts_with(&GZIP_MAGIC) {
                parse_dataset(BufReader::new(GzDecoder::new(&body[..])))
            } else {
                parse_dataset(&body[..])
            }
        })
        .await
        .map_err(|e| AppError::ServerError(format!("dataset parser failed: {}", e)))?
    }

    pub async fn is_loaded(&self) -> bool {
        self.table.read().await.loaded
    }

    pub async fn stats(&self) -> GeoStats {
        let table = self.table.read().await;
        GeoStats {
            loaded: table.loaded,
            ranges: table.ranges.len(),
        }
    }

    /// Location of a single address, loading the dataset first if needed
    pub async fn lookup(&self, ip: Ipv4Addr) -> Result<GeoLocation, AppError> {
        if !self.is_loaded().await {
            self.load_database().await?;
        }

        self.table
            .read()
            .await
            .find(u32::from(ip))
            .map(IpRange::location)
            .ok_or_else(|| AppError::NotFoundError(format!("no geo-IP range contains {}", ip)))
    }

    /// Resolve a relay's host and look up its first IPv4 address
    pub async fn locate_relay(&self, relay_url: &str) -> Result<GeoLocation, AppError> {
        let host = extract_host(relay_url)?;
        if !self.is_loaded().await {
            self.load_database().await?;
        }

        let ip = resolve_ipv4(&host).await?;
        tracing::debug!("Relay {} resolved to {}", relay_url, ip);

        self.lookup(ip).await
    }
}

async fn resolve_ipv4(host: &str) -> Result<Ipv4Addr, AppError> {
    if let Ok(ip) = host.parse::<Ipv4Addr>() {
        return Ok(ip);
    }

    let mut addrs = tokio::net::lookup_host((host, 0))
        .await
        .map_err(|e| AppError::ResolutionError(format!("{}: {}", host, e)))?;

    addrs
        .find_map(|addr| match addr.ip() {
            IpAddr::V4(ip) => Some(ip),
            IpAddr::V6(_) => None,
        })
        .ok_or_else(|| AppError::ResolutionError(format!("{}: no IPv4 address", host)))
}

async fn read_dataset_file(path: PathBuf) -> Result<Vec<IpRange>, AppError> {
    tokio::task::spawn_blocking(move || {
        let file = File::open(&path).map_err(|e| {
            AppError::DatasetError(format!("cannot open {}: {}", path.display(), e))
        })?;

        if path.extension().is_some_and(|ext| ext == "gz") {
            parse_dataset(BufReader::new(GzDecoder::new(file)))
        } else {
            parse_dataset(BufReader::new(file))
        }
    })
    .await
    .map_err(|e| AppError::ServerError(format!("dataset parser failed: {}", e)))?
}

/// Parse dataset records into a table sorted by range start.
///
/// Rows that are short or have unparseable numbers are skipped. A dataset
/// without a single usable row is rejected.
fn parse_dataset<R: BufRead>(mut reader: R) -> Result<Vec<IpRange>, AppError> {
    let mut ranges = Vec::new();
    let mut skipped = 0usize;
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let read = reader
            .read_until(b'\n', &mut buf)
            .map_err(|e| AppError::DatasetError(format!("cannot read dataset: {}", e)))?;
        if read == 0 {
            break;
        }

        let line = String::from_utf8_lossy(&buf);
        let line = line.trim_end_matches(['\n', '\r']);
        if line.is_empty() {
            continue;
        }

        match parse_record(line) {
            Some(range) => ranges.push(range),
            None => skipped += 1,
        }
    }

    if skipped > 0 {
        tracing::debug!("Skipped {} malformed geo-IP records", skipped);
    }

    if ranges.is_empty() {
        return Err(AppError::DatasetError(
            "dataset contains no usable records".to_string(),
        ));
    }

    ranges.sort_by_key(|r| r.start);
    Ok(ranges)
}

fn parse_record(line: &str) -> Option<IpRange> {
    let fields = split_record(line);
    if fields.len() < MIN_FIELDS {
        return None;
    }

    let start = fields[COL_START].trim().parse::<u32>().ok()?;
    let end = fields[COL_END].trim().parse::<u32>().ok()?;
    let latitude = fields[COL_LATITUDE].trim().parse::<f64>().ok()?;
    let longitude = fields[COL_LONGITUDE].trim().parse::<f64>().ok()?;

    if end < start {
        return None;
    }

    Some(IpRange {
        start,
        end,
        latitude,
        longitude,
        country: fields[COL_COUNTRY].trim().to_string(),
        city: fields[COL_CITY].trim().to_string(),
    })
}

/// Split one comma separated record. Fields may be double-quoted, with `""`
/// standing for a literal quote inside a quoted field.
fn split_record(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    field.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            }
            '"' if field.is_empty() => in_quotes = true,
            ',' if !in_quotes => fields.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }
    fields.push(field);

    fields
}
