//! Run reports returned by the engine and serialized as the `/sync/*`
//! response bodies.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use insightfy_core::dates::SyncWindow;
use insightfy_meta::Collected;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

/// One Graph request's worth of work: an account and a date chunk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkReport {
  /// Meta account id.
  pub account:  String,
  pub since:    NaiveDate,
  pub until:    NaiveDate,
  /// Campaigns, ad sets or ads the request was filtered to.
  pub entities: usize,
  pub rows:     usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
  pub since:              Option<NaiveDate>,
  pub until:              Option<NaiveDate>,
  pub dry_run:            bool,
  pub accounts_processed: usize,
  pub accounts_skipped:   usize,
  /// Rows received from Meta.
  pub total_rows:         usize,
  /// Rows written to the store.
  pub total_upserts:      usize,
  /// Rows whose Meta id has no local counterpart.
  pub unmapped_rows:      usize,
  pub chunks:             Vec<ChunkReport>,
  pub notes:              Vec<String>,
  pub errors:             Vec<String>,
  /// At least one Graph call hit a rate limit; the requests it covered
  /// are listed in `errors`.
  pub rate_limited:       bool,
}

impl SyncReport {
  pub(crate) fn new(dry_run: bool) -> Self { Self { dry_run, ..Self::default() } }

  pub(crate) fn for_window(window: SyncWindow, dry_run: bool) -> Self {
    Self {
      since: Some(window.since),
      until: Some(window.until),
      ..Self::new(dry_run)
    }
  }

  /// An account left out of the run, with the reason.
  pub(crate) fn skip(&mut self, note: String) {
    info!(%note, "account skipped");
    self.accounts_skipped += 1;
    self.notes.push(note);
  }

  pub(crate) fn note(&mut self, note: String) {
    info!(%note, "sync note");
    self.notes.push(note);
  }

  pub(crate) fn error(&mut self, message: String) {
    warn!(%message, "sync error");
    self.errors.push(message);
  }

  /// Record a failed Graph call. A rate limit flags the report; the run
  /// carries on with the next chunk or account.
  pub(crate) fn graph_error(&mut self, context: &str, err: &insightfy_meta::Error) {
    self.error(format!("{context}: {err}"));
    if err.is_rate_limited() {
      self.rate_limited = true;
    }
  }

  /// The rows of a paged Graph call. `None` when not even the first page
  /// came back; a later failure is recorded and the earlier rows returned.
  pub(crate) fn collected<T>(
    &mut self,
    context: impl FnOnce() -> String,
    result: insightfy_meta::Result<Collected<T>>,
  ) -> Option<Vec<T>> {
    match result {
      Ok(Collected { rows, error: None }) => Some(rows),
      Ok(Collected { rows, error: Some(e) }) => {
        self.graph_error(&format!("{} (kept {} rows)", context(), rows.len()), &e);
        Some(rows)
      }
      Err(e) => {
        self.graph_error(&context(), &e);
        None
      }
    }
  }

  pub fn is_clean(&self) -> bool { self.errors.is_empty() && !self.rate_limited }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LeadFetchReport {
  pub since:              Option<NaiveDate>,
  pub until:              Option<NaiveDate>,
  pub dry_run:            bool,
  pub accounts_processed: usize,
  pub total_fetched:      usize,
  pub new_leads:          usize,
  pub duplicate_leads:    usize,
  /// Keyed by account label (business name, else Meta id).
  pub leads_by_account:   BTreeMap<String, usize>,
  pub errors:             Vec<String>,
}

impl LeadFetchReport {
  pub(crate) fn error(&mut self, message: String) {
    warn!(%message, "lead fetch error");
    self.errors.push(message);
  }
}

/// What happened to one leadgen id delivered by the webhook.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LeadgenOutcome {
  Created {
    leadgen_id:      String,
    lead_id:         Uuid,
    organization_id: Uuid,
  },
  Duplicate {
    leadgen_id: String,
  },
  Skipped {
    leadgen_id: String,
    reason:     String,
  },
  Failed {
    leadgen_id: String,
    error:      String,
  },
}
