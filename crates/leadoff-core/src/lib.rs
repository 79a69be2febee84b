// Library root for the leadoff engine core: feed snapshot normalization,
// leadoff projection, alert deduplication and SQLite persistence.

pub mod alerts;
pub mod db;
pub mod names;
pub mod projector;
pub mod snapshot;
pub mod watchlist;
