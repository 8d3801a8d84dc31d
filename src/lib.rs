//! Tracks author medals on track of the day maps and ranks players by how
//! many they hold.

#[macro_use]
extern crate serde_derive;

pub mod auth;
pub mod config;
mod db_create;
pub mod display;
pub mod error;
pub mod ingest;
pub mod nadeo;
pub mod ranking;
pub mod scanner;
pub mod store;

pub use error::{Error, Result};
pub use ingest::{IngestReport, MapCatalog, MedalIngestionPipeline};
pub use ranking::{Direction, PageRequest, RankedPlayer, RankingCursor, RankingPaginator};
pub use scanner::{LeaderboardSource, ScanOptions, ScanResult};
pub use store::{PlayerRef, RecordStore};
