//! Date windows for sync jobs.
//!
//! Meta caps how much daily-breakdown data one insights request may return,
//! so a requested window is split into inclusive chunks of at most
//! `max_days` days and each chunk is fetched separately.

use chrono::{Duration, NaiveDate};
use serde::Serialize;

use crate::{Error, Result};

pub const DEFAULT_CHUNK_DAYS: u32 = 30;
pub const MAX_CHUNK_DAYS: u32 = 90;

/// Default look-back for insight syncs when `since` is omitted.
pub const INSIGHTS_LOOKBACK_DAYS: i64 = 30;
/// Default look-back for lead fetches when `since` is omitted.
pub const LEADS_LOOKBACK_DAYS: i64 = 7;

/// An inclusive `[start, end]` date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateChunk {
  pub start: NaiveDate,
  pub end:   NaiveDate,
}

impl DateChunk {
  pub fn days(&self) -> i64 { (self.end - self.start).num_days() + 1 }
}

/// Split `[since, until]` into contiguous, non-overlapping chunks of at most
/// `max_days` days. Returns an empty vec when `since > until`. Ranges that
/// reach the end of the calendar stop at its last day.
pub fn chunk_date_range(since: NaiveDate, until: NaiveDate, max_days: u32) -> Vec<DateChunk> {
  let step = Duration::days(i64::from(max_days.max(1)) - 1);
  let mut chunks = Vec::new();
  let mut cursor = since;
  while cursor <= until {
    let end = cursor.checked_add_signed(step).map_or(until, |end| end.min(until));
    chunks.push(DateChunk { start: cursor, end });
    match end.succ_opt() {
      Some(next) => cursor = next,
      None => break,
    }
  }
  chunks
}

/// Apply the default and the `1..=90` clamp to a caller-supplied chunk size.
pub fn clamp_chunk_days(requested: Option<u32>) -> u32 {
  requested
    .unwrap_or(DEFAULT_CHUNK_DAYS)
    .clamp(1, MAX_CHUNK_DAYS)
}

/// Parse a `YYYY-MM-DD` date. Full RFC 3339 timestamps are accepted and
/// truncated to their date.
pub fn parse_iso_date(raw: &str) -> Result<NaiveDate> {
  let s = raw.trim();
  NaiveDate::parse_from_str(s, "%Y-%m-%d")
    .or_else(|_| chrono::DateTime::parse_from_rfc3339(s).map(|dt| dt.date_naive()))
    .map_err(|_| Error::InvalidDate(raw.to_owned()))
}

/// The resolved, validated window a sync job runs over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncWindow {
  pub since: NaiveDate,
  pub until: NaiveDate,
}

impl SyncWindow {
  /// Fill in defaults: `until` falls back to `today`, `since` to
  /// `today - lookback_days`. Rejects inverted windows.
  pub fn resolve(
    since: Option<NaiveDate>,
    until: Option<NaiveDate>,
    today: NaiveDate,
    lookback_days: i64,
  ) -> Result<Self> {
    let until = until.unwrap_or(today);
    let since = since.unwrap_or_else(|| {
      today
        .checked_sub_signed(Duration::days(lookback_days))
        .unwrap_or(NaiveDate::MIN)
    });
    if since > until {
      return Err(Error::InvertedWindow { since, until });
    }
    Ok(Self { since, until })
  }

  pub fn chunks(&self, max_days: u32) -> Vec<DateChunk> {
    chunk_date_range(self.since, self.until, max_days)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn d(s: &str) -> NaiveDate { parse_iso_date(s).unwrap() }

  #[test]
  fn chunks_cover_range_without_gaps() {
    let chunks = chunk_date_range(d("2024-01-01"), d("2024-03-15"), 30);
    assert_eq!(chunks.len(), 3);
    assert_eq!(chunks[0], DateChunk { start: d("2024-01-01"), end: d("2024-01-30") });
    assert_eq!(chunks[1], DateChunk { start: d("2024-01-31"), end: d("2024-02-29") });
    assert_eq!(chunks[2], DateChunk { start: d("2024-03-01"), end: d("2024-03-15") });
    for pair in chunks.windows(2) {
      assert_eq!(pair[0].end + Duration::days(1), pair[1].start);
    }
    let total: i64 = chunks.iter().map(DateChunk::days).sum();
    assert_eq!(total, 75);
  }

  #[test]
  fn single_day_and_inverted_ranges() {
    let one = chunk_date_range(d("2024-05-05"), d("2024-05-05"), 30);
    assert_eq!(one, vec![DateChunk { start: d("2024-05-05"), end: d("2024-05-05") }]);
    assert!(chunk_date_range(d("2024-05-06"), d("2024-05-05"), 30).is_empty());
  }

  #[test]
  fn ranges_at_the_calendar_edge_end_cleanly() {
    let last = NaiveDate::MAX;
    let start = last - Duration::days(4);
    let chunks = chunk_date_range(start, last, 3);
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0], DateChunk { start, end: start + Duration::days(2) });
    assert_eq!(chunks[1].end, last);

    assert_eq!(chunk_date_range(last, last, 90), vec![DateChunk { start: last, end: last }]);

    let window = SyncWindow::resolve(None, None, NaiveDate::MIN, 30).unwrap();
    assert_eq!(window.since, NaiveDate::MIN);
  }

  #[test]
  fn chunk_size_is_clamped() {
    assert_eq!(clamp_chunk_days(None), 30);
    assert_eq!(clamp_chunk_days(Some(0)), 1);
    assert_eq!(clamp_chunk_days(Some(365)), 90);
    assert_eq!(chunk_date_range(d("2024-01-01"), d("2024-01-03"), 1).len(), 3);
  }

  #[test]
  fn window_defaults_and_validation() {
    let today = d("2024-06-30");
    let w = SyncWindow::resolve(None, None, today, INSIGHTS_LOOKBACK_DAYS).unwrap();
    assert_eq!(w.since, d("2024-05-31"));
    assert_eq!(w.until, today);

    let err = SyncWindow::resolve(Some(d("2024-07-01")), Some(d("2024-06-01")), today, 7);
    assert!(matches!(err, Err(Error::InvertedWindow { .. })));
  }

  #[test]
  fn timestamps_truncate_to_date() {
    assert_eq!(d("2024-02-10T23:59:00Z"), NaiveDate::from_ymd_opt(2024, 2, 10).unwrap());
    assert!(parse_iso_date("10/02/2024").is_err());
  }
}
