//! Author medal ingestion: map metadata and qualifying leaderboard entries
//! into the record store.

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::scanner::{self, LeaderboardSource, ScanOptions};
use crate::store::{MapAttributes, RecordStore, UpsertOutcome};

/// Map metadata as published by the game's map service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapInfo {
    pub uid: String,
    pub name: String,
    pub author: String,
    /// Qualifying time for the author medal. `None` when the service has none.
    pub author_time: Option<i64>,
    pub gold_time: i64,
}

/// A track-of-the-day map and the day it was released.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TotdMap {
    pub map_uid: String,
    /// `YYYY-MM-DD`
    pub release_date: String,
}

#[async_trait]
pub trait MapCatalog: Send + Sync {
    async fn map_info(&self, map_uid: &str) -> Result<Option<MapInfo>>;

    /// Track-of-the-day maps for `length` months, starting `offset` months
    /// back from the current one.
    async fn totd_maps(&self, length: u32, offset: u32) -> Result<Vec<TotdMap>>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub map_id: String,
    pub accepted: usize,
    pub inserted: usize,
    pub updated: usize,
    pub newly_counted: usize,
    pub skipped: u32,
    pub truncated: bool,
}

pub struct MedalIngestionPipeline<'a, L: ?Sized, C: ?Sized> {
    leaderboard: &'a L,
    catalog: &'a C,
    group: String,
    options: ScanOptions,
}

impl<'a, L, C> MedalIngestionPipeline<'a, L, C>
where
    L: LeaderboardSource + ?Sized,
    C: MapCatalog + ?Sized,
{
    pub fn new(leaderboard: &'a L, catalog: &'a C, group: &str, options: ScanOptions) -> Self {
        MedalIngestionPipeline { leaderboard, catalog, group: group.to_string(), options }
    }

    /// Ingests every author medal on one map.
    ///
    /// Qualifying entries are written page by page, each in its own
    /// transaction. When the scan fails with [`Error::Fetch`] everything before
    /// its `resume_offset` is already stored, and a pipeline built with that
    /// offset as `start_offset` finishes the map. Running it again for the same
    /// map does not inflate the map's author count.
    pub async fn ingest_map(&self, store: &mut RecordStore, map_id: &str, release_date: &str) -> Result<IngestReport> {
        let mut report = IngestReport { map_id: map_id.to_string(), ..IngestReport::default() };

        let info = self
            .catalog
            .map_info(map_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("map '{}'", map_id)))?;
        store.ensure_map(
            map_id,
            &MapAttributes {
                name: info.name,
                author: info.author,
                release_date: release_date.to_string(),
                author_time: info.author_time,
                gold_time: info.gold_time,
            },
        )?;
        // first writer wins: qualify against the stored time
        let threshold = store.map(map_id)?.and_then(|map| map.author_time);
        if threshold.is_none() {
            info!(map_id, "map has no author time, nothing to ingest");
        }

        let scanned = scanner::scan_with(self.leaderboard, &self.group, map_id, threshold, &self.options, |entries| {
            for entry in entries {
                let tally = store.record_qualifying(&entry.account_id, map_id, entry.score)?;
                report.accepted += 1;
                match tally.outcome {
                    UpsertOutcome::Inserted => report.inserted += 1,
                    UpsertOutcome::Updated => report.updated += 1,
                }
                if tally.newly_counted {
                    report.newly_counted += 1;
                }
            }
            Ok(())
        })
        .await;
        let scan = match scanned {
            Ok(scan) => scan,
            Err(e) => {
                warn!(map_id, stored = report.accepted, error = %e, "ingestion interrupted");
                return Err(e);
            }
        };
        report.truncated = scan.truncated;
        report.skipped = scan.skipped;

        info!(
            map_id,
            accepted = report.accepted,
            inserted = report.inserted,
            newly_counted = report.newly_counted,
            truncated = report.truncated,
            "ingested map"
        );
        Ok(report)
    }

    /// Ingests every track-of-the-day map of the given month window, one map
    /// after the other. Stops at the first map that fails.
    pub async fn ingest_totd(&self, store: &mut RecordStore, months: u32, offset: u32) -> Result<Vec<IngestReport>> {
        let maps = self.catalog.totd_maps(months, offset).await?;
        info!(maps = maps.len(), months, offset, "ingesting track of the day maps");
        let mut reports = Vec::with_capacity(maps.len());
        for map in maps {
            info!(map_uid = %map.map_uid, release_date = %map.release_date, "filling map");
            reports.push(self.ingest_map(store, &map.map_uid, &map.release_date).await?);
        }
        Ok(reports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::{RawEntry, RetryPolicy};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    struct FakeLeaderboard {
        boards: HashMap<String, Vec<RawEntry>>,
        requests: Mutex<u32>,
        /// Pages starting at or after this offset fail with a 502.
        fail_from: Mutex<Option<u32>>,
    }

    #[async_trait]
    impl LeaderboardSource for FakeLeaderboard {
        async fn fetch_page(&self, _group: &str, map_id: &str, length: u32, offset: u32) -> Result<Vec<RawEntry>> {
            *self.requests.lock().unwrap() += 1;
            if matches!(*self.fail_from.lock().unwrap(), Some(from) if offset >= from) {
                return Err(Error::Status { status_code: reqwest::StatusCode::BAD_GATEWAY });
            }
            let board = self.boards.get(map_id).cloned().unwrap_or_default();
            Ok(board.into_iter().skip(offset as usize).take(length as usize).collect())
        }
    }

    struct FakeCatalog {
        maps: HashMap<String, MapInfo>,
        totd: Vec<TotdMap>,
    }

    #[async_trait]
    impl MapCatalog for FakeCatalog {
        async fn map_info(&self, map_uid: &str) -> Result<Option<MapInfo>> {
            Ok(self.maps.get(map_uid).cloned())
        }

        async fn totd_maps(&self, _length: u32, _offset: u32) -> Result<Vec<TotdMap>> {
            Ok(self.totd.clone())
        }
    }

    fn info(uid: &str, author_time: Option<i64>) -> MapInfo {
        MapInfo {
            uid: uid.to_string(),
            name: format!("Map {}", uid),
            author: "author-account".to_string(),
            author_time,
            gold_time: 60_000,
        }
    }

    fn board(entries: &[(&str, i64)]) -> Vec<RawEntry> {
        entries.iter().map(|(account, score)| RawEntry::new(account, *score)).collect()
    }

    fn fixtures() -> (FakeLeaderboard, FakeCatalog) {
        let mut boards = HashMap::new();
        boards.insert("m1".to_string(), board(&[("a", 40_000), ("b", 44_000), ("c", 50_000)]));
        boards.insert("m2".to_string(), board(&[("a", 30_000), ("c", 31_000), ("b", 40_000)]));
        boards.insert("m3".to_string(), board(&[("a", 1)]));
        let mut maps = HashMap::new();
        maps.insert("m1".to_string(), info("m1", Some(45_000)));
        maps.insert("m2".to_string(), info("m2", Some(35_000)));
        maps.insert("m3".to_string(), info("m3", None));
        let totd = vec![
            TotdMap { map_uid: "m1".to_string(), release_date: "2024-07-01".to_string() },
            TotdMap { map_uid: "m2".to_string(), release_date: "2024-07-02".to_string() },
        ];
        (
            FakeLeaderboard { boards, requests: Mutex::new(0), fail_from: Mutex::new(None) },
            FakeCatalog { maps, totd },
        )
    }

    #[tokio::test]
    async fn reingesting_does_not_inflate_author_count() {
        let (leaderboard, catalog) = fixtures();
        let pipeline = MedalIngestionPipeline::new(&leaderboard, &catalog, "Personal_Best", ScanOptions::default());
        let mut store = RecordStore::open_in_memory().unwrap();

        let first = pipeline.ingest_map(&mut store, "m1", "2024-07-01").await.unwrap();
        assert_eq!((first.accepted, first.inserted, first.newly_counted), (2, 2, 2));

        let second = pipeline.ingest_map(&mut store, "m1", "2024-07-01").await.unwrap();
        assert_eq!((second.accepted, second.updated, second.newly_counted), (2, 2, 0));

        let map = store.map("m1").unwrap().unwrap();
        assert_eq!(map.author_count, 2);
        assert_eq!(map.release_date, "2024-07-01");
        assert_eq!(
            store.records_for_map("m1").unwrap(),
            vec![("a".to_string(), 40_000), ("b".to_string(), 44_000)]
        );
    }

    #[tokio::test]
    async fn map_without_author_time_is_skipped() {
        let (leaderboard, catalog) = fixtures();
        let pipeline = MedalIngestionPipeline::new(&leaderboard, &catalog, "Personal_Best", ScanOptions::default());
        let mut store = RecordStore::open_in_memory().unwrap();

        let report = pipeline.ingest_map(&mut store, "m3", "2024-07-03").await.unwrap();
        assert_eq!(report.accepted, 0);
        assert!(!report.truncated);
        assert_eq!(*leaderboard.requests.lock().unwrap(), 0);
        let map = store.map("m3").unwrap().unwrap();
        assert_eq!((map.author_time, map.author_count), (None, 0));
    }

    #[tokio::test]
    async fn unknown_map_is_not_found() {
        let (leaderboard, catalog) = fixtures();
        let pipeline = MedalIngestionPipeline::new(&leaderboard, &catalog, "Personal_Best", ScanOptions::default());
        let mut store = RecordStore::open_in_memory().unwrap();
        let err = pipeline.ingest_map(&mut store, "nope", "2024-07-03").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn truncation_is_reported() {
        let (leaderboard, catalog) = fixtures();
        let options = ScanOptions { page_size: 1, offset_cap: 1, ..ScanOptions::default() };
        let pipeline = MedalIngestionPipeline::new(&leaderboard, &catalog, "Personal_Best", options);
        let mut store = RecordStore::open_in_memory().unwrap();

        let report = pipeline.ingest_map(&mut store, "m1", "2024-07-01").await.unwrap();
        assert!(report.truncated);
        assert_eq!(report.accepted, 1);
    }

    #[tokio::test]
    async fn interrupted_ingestion_keeps_earlier_pages_and_resumes() {
        let (leaderboard, catalog) = fixtures();
        *leaderboard.fail_from.lock().unwrap() = Some(1);
        let retry = RetryPolicy { max_attempts: 1, initial_delay: Duration::from_millis(0), max_delay: Duration::from_millis(0) };
        let options = ScanOptions { page_size: 1, retry, ..ScanOptions::default() };
        let mut store = RecordStore::open_in_memory().unwrap();

        let pipeline = MedalIngestionPipeline::new(&leaderboard, &catalog, "Personal_Best", options);
        let resume_offset = match pipeline.ingest_map(&mut store, "m1", "2024-07-01").await.unwrap_err() {
            Error::Fetch { resume_offset, .. } => resume_offset,
            other => panic!("unexpected error {:?}", other),
        };
        assert_eq!(resume_offset, 1);
        assert_eq!(store.records_for_map("m1").unwrap(), vec![("a".to_string(), 40_000)]);
        assert_eq!(store.map("m1").unwrap().unwrap().author_count, 1);

        *leaderboard.fail_from.lock().unwrap() = None;
        let resumed = ScanOptions { start_offset: resume_offset, ..options };
        let pipeline = MedalIngestionPipeline::new(&leaderboard, &catalog, "Personal_Best", resumed);
        let report = pipeline.ingest_map(&mut store, "m1", "2024-07-01").await.unwrap();
        assert_eq!((report.accepted, report.newly_counted), (1, 1));
        assert_eq!(
            store.records_for_map("m1").unwrap(),
            vec![("a".to_string(), 40_000), ("b".to_string(), 44_000)]
        );
        assert_eq!(store.map("m1").unwrap().unwrap().author_count, 2);

        // a full pass afterwards finds nothing new to count
        let pipeline = MedalIngestionPipeline::new(&leaderboard, &catalog, "Personal_Best", ScanOptions::default());
        pipeline.ingest_map(&mut store, "m1", "2024-07-01").await.unwrap();
        assert_eq!(store.map("m1").unwrap().unwrap().author_count, 2);
    }

    #[tokio::test]
    async fn totd_window_fills_every_map() {
        let (leaderboard, catalog) = fixtures();
        let pipeline = MedalIngestionPipeline::new(&leaderboard, &catalog, "Personal_Best", ScanOptions::default());
        let mut store = RecordStore::open_in_memory().unwrap();

        let reports = pipeline.ingest_totd(&mut store, 1, 0).await.unwrap();
        let maps: Vec<&str> = reports.iter().map(|r| r.map_id.as_str()).collect();
        assert_eq!(maps, vec!["m1", "m2"]);
        assert_eq!(store.map("m2").unwrap().unwrap().author_count, 2);
        assert_eq!(store.record_count("a".into()).unwrap(), 2);
        assert_eq!(store.record_count("b".into()).unwrap(), 1);
        assert_eq!(store.record_count("c".into()).unwrap(), 1);
    }
}
