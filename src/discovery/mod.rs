// Modules
mod crawler;
mod frontier;
mod geo;
mod normalize;
mod protocol;
mod service;
mod session;
mod utils;

// Public exports
pub use geo::{GeoLocator, DEFAULT_DATABASE_URL};
pub use service::{run_discovery, run_geolocation};
