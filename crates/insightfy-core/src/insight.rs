//! Daily insight rows and the derived advertising ratios computed from them.
//!
//! Each insight table holds at most one row per `(entity_id, date)`. Syncing
//! the same day twice overwrites the earlier row with the latest numbers
//! Meta reports (late attribution routinely revises recent days).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Meta action types counted as a lead. Only the first matching action in a
/// row is counted; Meta reports the same conversions under several of these.
pub const LEAD_ACTION_TYPES: &[&str] = &[
  "lead",
  "leads",
  "leadgen.other",
  "onsite_conversion.lead_grouped",
  "onsite_conversion.lead_form.submit",
];

/// Granularity of an insights request and of the table it lands in.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum InsightLevel {
  Campaign,
  #[serde(alias = "adSet", alias = "adset")]
  #[strum(to_string = "ad_set", serialize = "adset")]
  AdSet,
  Ad,
}

impl InsightLevel {
  /// The `level=` value expected by the Graph API.
  pub fn graph_level(self) -> &'static str {
    match self {
      InsightLevel::Campaign => "campaign",
      InsightLevel::AdSet => "adset",
      InsightLevel::Ad => "ad",
    }
  }
}

/// One `{action_type, value}` entry from a Meta `actions` array.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Action {
  pub action_type: String,
  /// Meta sends counts as strings.
  pub value:       Value,
}

/// Lead count for a row: the value of the first lead-like action, 0 if none.
pub fn leads_from_actions(actions: &[Action]) -> i64 {
  actions
    .iter()
    .find(|a| LEAD_ACTION_TYPES.contains(&a.action_type.as_str()))
    .and_then(|a| lenient_i64(&a.value))
    .unwrap_or(0)
}

/// Parse an integer the way Meta formats them (numbers or numeric strings).
/// Fractional strings are truncated.
pub fn lenient_i64(v: &Value) -> Option<i64> {
  match v {
    Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
    Value::String(s) => {
      let s = s.trim();
      s.parse::<i64>()
        .ok()
        .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f as i64))
    }
    _ => None,
  }
}

/// Parse a float the way Meta formats them. Non-finite values are rejected.
pub fn lenient_f64(v: &Value) -> Option<f64> {
  let f = match v {
    Value::Number(n) => n.as_f64()?,
    Value::String(s) => s.trim().parse::<f64>().ok()?,
    _ => return None,
  };
  f.is_finite().then_some(f)
}

// ─── Metrics ─────────────────────────────────────────────────────────────────

/// Raw additive counters for one entity on one day.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct DailyMetrics {
  pub spend:           f64,
  pub impressions:     i64,
  pub clicks:          i64,
  pub leads_count:     i64,
  pub reach:           i64,
  pub frequency:       f64,
  pub link_clicks:     i64,
  pub post_engagement: i64,
}

impl DailyMetrics {
  pub fn derived(&self) -> DerivedMetrics {
    DerivedMetrics::compute(self.spend, self.impressions, self.clicks, self.leads_count)
  }
}

/// Ratios computed from counters. Every ratio is 0 when its denominator is 0.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct DerivedMetrics {
  /// Cost per click.
  pub cpc: f64,
  /// Cost per thousand impressions.
  pub cpm: f64,
  /// Cost per lead.
  pub cpl: f64,
  /// Click-through rate, in percent.
  pub ctr: f64,
}

impl DerivedMetrics {
  pub fn compute(spend: f64, impressions: i64, clicks: i64, leads: i64) -> Self {
    Self {
      cpc: ratio(spend, clicks as f64),
      cpm: ratio(spend, impressions as f64) * 1000.0,
      cpl: ratio(spend, leads as f64),
      ctr: ratio(clicks as f64, impressions as f64) * 100.0,
    }
  }
}

/// `num / den`, or 0 when `den` is not positive.
pub fn ratio(num: f64, den: f64) -> f64 { if den > 0.0 { num / den } else { 0.0 } }

// ─── Rows ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CampaignDailyInsight {
  pub campaign_id: Uuid,
  pub date:        NaiveDate,
  #[serde(flatten)]
  pub metrics:     DailyMetrics,
  pub actions:     Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdSetDailyInsight {
  pub ad_set_id:   Uuid,
  pub campaign_id: Uuid,
  pub date:        NaiveDate,
  #[serde(flatten)]
  pub metrics:     DailyMetrics,
  pub actions:     Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdDailyInsight {
  pub ad_id:                  Uuid,
  pub ad_set_id:              Uuid,
  pub campaign_id:            Uuid,
  pub date:                   NaiveDate,
  #[serde(flatten)]
  pub metrics:                DailyMetrics,
  pub actions:                Option<Value>,
  /// Stored alongside the counters so dashboards can sort on them.
  pub derived:                DerivedMetrics,
  pub video_views:            i64,
  pub video_avg_time_watched: f64,
  pub quality_ranking:        Option<String>,
  pub engagement_ranking:     Option<String>,
  pub conversion_ranking:     Option<String>,
}
