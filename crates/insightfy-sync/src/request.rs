//! Request bodies accepted by the engine.
//!
//! These deserialize directly from the JSON posted to the `/sync/*`
//! endpoints. Every field is optional; camelCase spellings of the older
//! clients are accepted as aliases.

use chrono::NaiveDate;
use insightfy_core::dates::{
  INSIGHTS_LOOKBACK_DAYS, LEADS_LOOKBACK_DAYS, SyncWindow, clamp_chunk_days,
};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

/// Leads fetched per account when the caller sets no limit.
pub const DEFAULT_LEAD_LIMIT: usize = 100;

/// Selection and window for hierarchy and insight syncs. Empty id lists mean
/// "everything".
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SyncRequest {
  pub since:                 Option<NaiveDate>,
  pub until:                 Option<NaiveDate>,
  pub ad_account_ids:        Vec<Uuid>,
  pub campaign_ids:          Vec<Uuid>,
  /// Meta campaign ids, for callers that only know those.
  pub campaign_external_ids: Vec<String>,
  pub ad_set_ids:            Vec<Uuid>,
  pub ad_ids:                Vec<Uuid>,
  /// Fetch and count, but write nothing.
  #[serde(alias = "dryRun")]
  pub dry_run:               bool,
  #[serde(alias = "maxDaysPerChunk")]
  pub max_days_per_chunk:    Option<u32>,
}

impl SyncRequest {
  pub fn window(&self, today: NaiveDate) -> insightfy_core::Result<SyncWindow> {
    SyncWindow::resolve(self.since, self.until, today, INSIGHTS_LOOKBACK_DAYS)
  }

  pub fn chunk_days(&self) -> u32 { clamp_chunk_days(self.max_days_per_chunk) }

  pub(crate) fn wants_campaign(&self, campaign_id: Uuid, external_id: &str) -> bool {
    (self.campaign_ids.is_empty() || self.campaign_ids.contains(&campaign_id))
      && (self.campaign_external_ids.is_empty()
        || self.campaign_external_ids.iter().any(|e| e == external_id))
  }

  pub(crate) fn wants_ad_set(&self, ad_set_id: Uuid) -> bool {
    self.ad_set_ids.is_empty() || self.ad_set_ids.contains(&ad_set_id)
  }

  pub(crate) fn wants_ad(&self, ad_id: Uuid) -> bool { self.ad_ids.is_empty() || self.ad_ids.contains(&ad_id) }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LeadFetchRequest {
  pub ad_account_ids: Vec<Uuid>,
  pub since:          Option<NaiveDate>,
  pub until:          Option<NaiveDate>,
  /// Per account.
  pub limit:          usize,
  #[serde(alias = "dryRun")]
  pub dry_run:        bool,
}

impl Default for LeadFetchRequest {
  fn default() -> Self {
    Self {
      ad_account_ids: Vec::new(),
      since:          None,
      until:          None,
      limit:          DEFAULT_LEAD_LIMIT,
      dry_run:        false,
    }
  }
}

impl LeadFetchRequest {
  pub fn window(&self, today: NaiveDate) -> insightfy_core::Result<SyncWindow> {
    SyncWindow::resolve(self.since, self.until, today, LEADS_LOOKBACK_DAYS)
  }
}

// ─── Webhook payload ─────────────────────────────────────────────────────────

/// The body Meta posts to the lead-ads webhook.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LeadgenNotification {
  #[serde(default)]
  pub object: Option<String>,
  #[serde(default)]
  pub entry:  Vec<WebhookEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookEntry {
  #[serde(default)]
  pub id:      Option<String>,
  #[serde(default)]
  pub changes: Vec<WebhookChange>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookChange {
  pub field: String,
  #[serde(default)]
  pub value: Value,
}

impl LeadgenNotification {
  /// Leadgen ids of every `leadgen` change, in order. Meta sends them as
  /// strings or as bare numbers.
  pub fn leadgen_ids(&self) -> Vec<String> {
    self
      .entry
      .iter()
      .flat_map(|e| &e.changes)
      .filter(|c| c.field == "leadgen")
      .filter_map(|c| match c.value.get("leadgen_id")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
      })
      .collect()
  }
}
