//! The locally mirrored Meta Ads hierarchy: campaign → ad set → ad.
//!
//! Every entity is keyed by its Meta `external_id`. Upserts are idempotent on
//! that key: re-syncing an entity updates it in place and keeps its internal
//! UUID, so daily insight rows keep pointing at the same parent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ─── Campaigns ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Campaign {
  pub campaign_id:   Uuid,
  pub ad_account_id: Uuid,
  pub external_id:   String,
  pub name:          String,
  pub status:        Option<String>,
  pub objective:     Option<String>,
  pub daily_budget:  Option<f64>,
  pub start_time:    Option<DateTime<Utc>>,
  pub stop_time:     Option<DateTime<Utc>>,
  pub updated_at:    DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CampaignUpsert {
  pub ad_account_id: Uuid,
  pub external_id:   String,
  pub name:          String,
  pub status:        Option<String>,
  pub objective:     Option<String>,
  pub daily_budget:  Option<f64>,
  pub start_time:    Option<DateTime<Utc>>,
  pub stop_time:     Option<DateTime<Utc>>,
}

// ─── Ad sets ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdSet {
  pub ad_set_id:         Uuid,
  pub campaign_id:       Uuid,
  pub external_id:       String,
  pub name:              String,
  pub status:            Option<String>,
  pub optimization_goal: Option<String>,
  pub billing_event:     Option<String>,
  pub bid_strategy:      Option<String>,
  pub targeting:         Option<Value>,
  /// Currency units (Meta reports minor units; converted on ingest).
  pub daily_budget:      Option<f64>,
  pub lifetime_budget:   Option<f64>,
  pub start_time:        Option<DateTime<Utc>>,
  pub end_time:          Option<DateTime<Utc>>,
  pub updated_at:        DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AdSetUpsert {
  pub campaign_id:       Uuid,
  pub external_id:       String,
  pub name:              String,
  pub status:            Option<String>,
  pub optimization_goal: Option<String>,
  pub billing_event:     Option<String>,
  pub bid_strategy:      Option<String>,
  pub targeting:         Option<Value>,
  pub daily_budget:      Option<f64>,
  pub lifetime_budget:   Option<f64>,
  pub start_time:        Option<DateTime<Utc>>,
  pub end_time:          Option<DateTime<Utc>>,
}

// ─── Ads ─────────────────────────────────────────────────────────────────────

/// How an ad's creative is assembled. Detected from the creative spec.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum CreativeType {
  DynamicCreative,
  Carousel,
  Collection,
  Image,
  Video,
  Photo,
  Text,
  Unknown,
}

/// Display-relevant fields pulled out of a Meta creative.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CreativeSummary {
  pub creative_id:    Option<String>,
  pub creative_type:  Option<CreativeType>,
  pub title:          Option<String>,
  pub body:           Option<String>,
  pub call_to_action: Option<String>,
  pub link_url:       Option<String>,
  pub image_url:      Option<String>,
  pub video_url:      Option<String>,
  pub thumbnail_url:  Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ad {
  pub ad_id:           Uuid,
  pub ad_set_id:       Uuid,
  pub campaign_id:     Uuid,
  pub external_id:     String,
  pub name:            String,
  pub status:          Option<String>,
  #[serde(flatten)]
  pub creative:        CreativeSummary,
  pub creative_data:   Option<Value>,
  pub asset_feed_spec: Option<Value>,
  pub created_time:    Option<DateTime<Utc>>,
  pub updated_time:    Option<DateTime<Utc>>,
  pub updated_at:      DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AdUpsert {
  pub ad_set_id:       Uuid,
  pub campaign_id:     Uuid,
  pub external_id:     String,
  pub name:            String,
  pub status:          Option<String>,
  pub creative:        CreativeSummary,
  pub creative_data:   Option<Value>,
  pub asset_feed_spec: Option<Value>,
  pub created_time:    Option<DateTime<Utc>>,
  pub updated_time:    Option<DateTime<Utc>>,
}

// ─── ID maps ─────────────────────────────────────────────────────────────────

/// Internal ids resolved from an external id, used to attach insight rows
/// to their parents without a round-trip per row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdSetRef {
  pub ad_set_id:   Uuid,
  pub campaign_id: Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdRef {
  pub ad_id:       Uuid,
  pub ad_set_id:   Uuid,
  pub campaign_id: Uuid,
}

// ─── Value conversions ───────────────────────────────────────────────────────

/// Meta budgets arrive as minor-unit strings (`"1500"` → 15.00).
pub fn budget_from_minor_units(raw: Option<&Value>) -> Option<f64> {
  let n = match raw? {
    Value::Number(n) => n.as_f64()?,
    Value::String(s) => s.trim().parse::<f64>().ok()?,
    _ => return None,
  };
  n.is_finite().then_some(n / 100.0)
}

/// Parse a Meta timestamp (`2024-05-01T10:00:00-0300` or RFC 3339).
pub fn parse_meta_time(raw: Option<&str>) -> Option<DateTime<Utc>> {
  let s = raw?.trim();
  if s.is_empty() {
    return None;
  }
  DateTime::parse_from_rfc3339(s)
    .or_else(|_| DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%z"))
    .map(|dt| dt.with_timezone(&Utc))
    .ok()
}
