//! Bounded scan of an externally paginated leaderboard.
//!
//! The leaderboard is sorted by ascending score, so the scan accepts entries
//! until the first one above the threshold and stops there. A hard offset cap
//! bounds the number of pages requested for very deep leaderboards.

use std::time::Duration;

use async_trait::async_trait;
use futures_timer::Delay;
use tracing::{debug, warn};

use crate::error::{Error, Result};

pub const DEFAULT_PAGE_SIZE: u32 = 100;
pub const DEFAULT_OFFSET_CAP: u32 = 10_000;

/// An entry as delivered by the leaderboard service. Fields are optional so a
/// single bad row does not fail the whole page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RawEntry {
    #[serde(rename = "accountId", default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub score: Option<i64>,
}

impl RawEntry {
    pub fn new(account_id: &str, score: i64) -> RawEntry {
        RawEntry { account_id: Some(account_id.to_string()), score: Some(score) }
    }

    fn into_entry(self) -> Option<LeaderboardEntry> {
        match (self.account_id, self.score) {
            (Some(account_id), Some(score)) if !account_id.is_empty() => Some(LeaderboardEntry { account_id, score }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderboardEntry {
    pub account_id: String,
    pub score: i64,
}

/// A leaderboard whose entries, within and across pages, are sorted by
/// ascending score. `offset` counts entries, not pages.
#[async_trait]
pub trait LeaderboardSource: Send + Sync {
    async fn fetch_page(&self, group: &str, map_id: &str, length: u32, offset: u32) -> Result<Vec<RawEntry>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per page, first try included.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOptions {
    pub page_size: u32,
    pub offset_cap: u32,
    /// Offset of the first page; non-zero when resuming an interrupted scan.
    pub start_offset: u32,
    pub retry: RetryPolicy,
}

impl Default for ScanOptions {
    fn default() -> Self {
        ScanOptions {
            page_size: DEFAULT_PAGE_SIZE,
            offset_cap: DEFAULT_OFFSET_CAP,
            start_offset: 0,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanResult {
    pub entries: Vec<LeaderboardEntry>,
    /// The offset cap was reached before a disqualifying entry was seen, so
    /// more qualifying entries may exist.
    pub truncated: bool,
    pub pages_fetched: u32,
    pub skipped: u32,
    /// Offset right after the last page consumed.
    pub next_offset: u32,
}

/// Collects every entry with `score <= threshold`.
///
/// Without a threshold nothing is fetched and the result is empty. Transient
/// fetch failures are retried with exponential backoff; once the retries are
/// used up the scan fails with [`Error::Fetch`] carrying the offset to resume
/// from.
pub async fn scan<S>(
    source: &S,
    group: &str,
    map_id: &str,
    threshold: Option<i64>,
    options: &ScanOptions,
) -> Result<ScanResult>
where
    S: LeaderboardSource + ?Sized,
{
    scan_with(source, group, map_id, threshold, options, |_| Ok(())).await
}

/// Like [`scan`], handing the accepted entries of every page to `on_page`
/// before the next page is requested.
///
/// When the scan later fails with [`Error::Fetch`], every entry before
/// `resume_offset` has already gone through `on_page`. An error from
/// `on_page` stops the scan and is returned as is.
pub async fn scan_with<S, F>(
    source: &S,
    group: &str,
    map_id: &str,
    threshold: Option<i64>,
    options: &ScanOptions,
    mut on_page: F,
) -> Result<ScanResult>
where
    S: LeaderboardSource + ?Sized,
    F: FnMut(&[LeaderboardEntry]) -> Result<()>,
{
    let threshold = match threshold {
        Some(threshold) => threshold,
        None => {
            debug!(map_id, "no threshold, skipping scan");
            return Ok(ScanResult::default());
        }
    };

    let page_size = options.page_size.max(1);
    let mut offset = options.start_offset;
    let mut result = ScanResult { next_offset: offset, ..ScanResult::default() };

    loop {
        if offset >= options.offset_cap {
            warn!(map_id, offset_cap = options.offset_cap, accepted = result.entries.len(), "offset cap reached, result truncated");
            result.truncated = true;
            break;
        }
        let length = page_size.min(options.offset_cap - offset);
        let page = fetch_with_retry(source, group, map_id, length, offset, &options.retry).await?;
        result.pages_fetched += 1;

        let received = page.len();
        let first_accepted = result.entries.len();
        let mut disqualified = false;
        for raw in page {
            match raw.into_entry() {
                None => {
                    warn!(map_id, offset, "skipping malformed leaderboard entry");
                    result.skipped += 1;
                }
                Some(entry) if entry.score <= threshold => result.entries.push(entry),
                Some(_) => {
                    disqualified = true;
                    break;
                }
            }
        }

        on_page(&result.entries[first_accepted..])?;

        offset += length;
        result.next_offset = offset;
        if disqualified || received < length as usize {
            break;
        }
    }

    debug!(map_id, accepted = result.entries.len(), pages = result.pages_fetched, "scan finished");
    Ok(result)
}

async fn fetch_with_retry<S>(
    source: &S,
    group: &str,
    map_id: &str,
    length: u32,
    offset: u32,
    retry: &RetryPolicy,
) -> Result<Vec<RawEntry>>
where
    S: LeaderboardSource + ?Sized,
{
    let mut delay = retry.initial_delay;
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match source.fetch_page(group, map_id, length, offset).await {
            Ok(page) => return Ok(page),
            Err(e) if !e.is_transient() => return Err(e),
            Err(e) if attempt >= retry.max_attempts.max(1) => {
                return Err(Error::Fetch { resume_offset: offset, source: Box::new(e) });
            }
            Err(e) => {
                warn!(map_id, offset, attempt, error = %e, "leaderboard fetch failed, retrying");
                Delay::new(delay).await;
                delay = (delay * 2).min(retry.max_delay);
            }
        }
    }
}
