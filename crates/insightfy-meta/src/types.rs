//! Graph API response shapes and their mapping onto the domain types.
//!
//! Meta reports most numbers as strings and omits fields freely, so every
//! numeric field is kept as a raw [`Value`] and parsed leniently.

use chrono::NaiveDate;
use insightfy_core::{
  ads::{AdSetRef, AdSetUpsert, AdUpsert, CampaignUpsert, budget_from_minor_units, parse_meta_time},
  insight::{Action, DailyMetrics, lenient_f64, lenient_i64, leads_from_actions},
  lead::{FormFields, LeadSource, NewLead},
};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::creative;

// ─── Paging ──────────────────────────────────────────────────────────────────

/// One page of a Graph edge.
#[derive(Debug, Deserialize)]
#[serde(bound = "T: serde::de::DeserializeOwned")]
pub struct Paged<T> {
  #[serde(default = "Vec::new")]
  pub data:   Vec<T>,
  #[serde(default)]
  pub paging: Option<Paging>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Paging {
  #[serde(default)]
  pub next: Option<String>,
}

impl<T> Paged<T> {
  pub fn next_url(&self) -> Option<&str> {
    self.paging.as_ref()?.next.as_deref().filter(|s| !s.is_empty())
  }
}

// ─── Nodes ───────────────────────────────────────────────────────────────────

/// `GET /act_<id>?fields=id,name`, used as a connectivity check.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountNode {
  pub id:   String,
  #[serde(default)]
  pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CampaignNode {
  pub id:           String,
  #[serde(default)]
  pub name:         Option<String>,
  #[serde(default)]
  pub status:       Option<String>,
  #[serde(default)]
  pub objective:    Option<String>,
  #[serde(default)]
  pub daily_budget: Option<Value>,
  #[serde(default)]
  pub start_time:   Option<String>,
  #[serde(default)]
  pub stop_time:    Option<String>,
}

impl CampaignNode {
  pub fn into_upsert(self, ad_account_id: Uuid) -> CampaignUpsert {
    CampaignUpsert {
      ad_account_id,
      name: self.name.unwrap_or_default(),
      status: self.status,
      objective: self.objective,
      daily_budget: budget_from_minor_units(self.daily_budget.as_ref()),
      start_time: parse_meta_time(self.start_time.as_deref()),
      stop_time: parse_meta_time(self.stop_time.as_deref()),
      external_id: self.id,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdSetNode {
  pub id:                String,
  #[serde(default)]
  pub name:              Option<String>,
  #[serde(default)]
  pub status:            Option<String>,
  #[serde(default)]
  pub optimization_goal: Option<String>,
  #[serde(default)]
  pub billing_event:     Option<String>,
  #[serde(default)]
  pub bid_strategy:      Option<String>,
  #[serde(default)]
  pub targeting:         Option<Value>,
  #[serde(default)]
  pub daily_budget:      Option<Value>,
  #[serde(default)]
  pub lifetime_budget:   Option<Value>,
  #[serde(default)]
  pub start_time:        Option<String>,
  #[serde(default)]
  pub end_time:          Option<String>,
  #[serde(default)]
  pub campaign_id:       Option<String>,
}

impl AdSetNode {
  pub fn into_upsert(self, campaign_id: Uuid) -> AdSetUpsert {
    AdSetUpsert {
      campaign_id,
      name: self.name.unwrap_or_default(),
      status: self.status,
      optimization_goal: self.optimization_goal,
      billing_event: self.billing_event,
      bid_strategy: self.bid_strategy,
      targeting: self.targeting,
      daily_budget: budget_from_minor_units(self.daily_budget.as_ref()),
      lifetime_budget: budget_from_minor_units(self.lifetime_budget.as_ref()),
      start_time: parse_meta_time(self.start_time.as_deref()),
      end_time: parse_meta_time(self.end_time.as_deref()),
      external_id: self.id,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdNode {
  pub id:              String,
  #[serde(default)]
  pub name:            Option<String>,
  #[serde(default)]
  pub status:          Option<String>,
  #[serde(default)]
  pub adset_id:        Option<String>,
  #[serde(default)]
  pub campaign_id:     Option<String>,
  #[serde(default)]
  pub creative:        Option<Value>,
  #[serde(default)]
  pub asset_feed_spec: Option<Value>,
  #[serde(default)]
  pub created_time:    Option<String>,
  #[serde(default)]
  pub updated_time:    Option<String>,
}

impl AdNode {
  pub fn into_upsert(self, parent: AdSetRef) -> AdUpsert {
    let extracted = creative::extract(self.creative.as_ref(), self.asset_feed_spec.as_ref());
    AdUpsert {
      ad_set_id: parent.ad_set_id,
      campaign_id: parent.campaign_id,
      name: self.name.unwrap_or_default(),
      status: self.status,
      creative: extracted.summary,
      creative_data: self.creative,
      asset_feed_spec: extracted.asset_feed_spec,
      created_time: parse_meta_time(self.created_time.as_deref()),
      updated_time: parse_meta_time(self.updated_time.as_deref()),
      external_id: self.id,
    }
  }
}

// ─── Insights ────────────────────────────────────────────────────────────────

/// One row of `/act_<id>/insights` with `time_increment=1`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InsightRow {
  #[serde(default)]
  pub campaign_id:             Option<String>,
  #[serde(default)]
  pub adset_id:                Option<String>,
  #[serde(default)]
  pub ad_id:                   Option<String>,
  pub date_start:              String,
  #[serde(default)]
  pub date_stop:               Option<String>,
  #[serde(default)]
  pub spend:                   Option<Value>,
  #[serde(default)]
  pub impressions:             Option<Value>,
  #[serde(default)]
  pub clicks:                  Option<Value>,
  #[serde(default)]
  pub reach:                   Option<Value>,
  #[serde(default)]
  pub frequency:               Option<Value>,
  #[serde(default)]
  pub link_clicks:             Option<Value>,
  #[serde(default)]
  pub post_engagement:         Option<Value>,
  #[serde(default)]
  pub video_views:             Option<Value>,
  #[serde(default)]
  pub video_avg_time_watched:  Option<Value>,
  #[serde(default)]
  pub quality_ranking:         Option<String>,
  #[serde(default)]
  pub engagement_rate_ranking: Option<String>,
  #[serde(default)]
  pub conversion_rate_ranking: Option<String>,
  #[serde(default)]
  pub actions:                 Vec<Action>,
}

fn int(v: &Option<Value>) -> Option<i64> { v.as_ref().and_then(lenient_i64) }
fn float(v: &Option<Value>) -> Option<f64> { v.as_ref().and_then(lenient_f64) }

impl InsightRow {
  pub fn date(&self) -> insightfy_core::Result<NaiveDate> {
    insightfy_core::dates::parse_iso_date(&self.date_start)
  }

  fn action_count(&self, kind: &str) -> Option<i64> {
    self
      .actions
      .iter()
      .find(|a| a.action_type == kind)
      .and_then(|a| lenient_i64(&a.value))
  }

  /// Counters for this row. Link clicks and engagement fall back to the
  /// matching entries of `actions` when not reported as top-level fields.
  pub fn metrics(&self) -> DailyMetrics {
    DailyMetrics {
      spend:           float(&self.spend).unwrap_or(0.0),
      impressions:     int(&self.impressions).unwrap_or(0),
      clicks:          int(&self.clicks).unwrap_or(0),
      leads_count:     leads_from_actions(&self.actions),
      reach:           int(&self.reach).unwrap_or(0),
      frequency:       float(&self.frequency).unwrap_or(0.0),
      link_clicks:     int(&self.link_clicks)
        .or_else(|| self.action_count("link_click"))
        .unwrap_or(0),
      post_engagement: int(&self.post_engagement)
        .or_else(|| self.action_count("post_engagement"))
        .unwrap_or(0),
    }
  }

  pub fn video_views(&self) -> i64 {
    int(&self.video_views)
      .or_else(|| self.action_count("video_view"))
      .unwrap_or(0)
  }

  pub fn video_avg_time_watched(&self) -> f64 { float(&self.video_avg_time_watched).unwrap_or(0.0) }

  /// The raw `actions` array as stored, `None` when Meta sent none.
  pub fn actions_json(&self) -> Option<Value> {
    if self.actions.is_empty() {
      None
    } else {
      serde_json::to_value(&self.actions).ok()
    }
  }
}

// ─── Leads ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct FieldData {
  pub name:   String,
  #[serde(default)]
  pub values: Vec<String>,
}

/// A lead-ads submission.
#[derive(Debug, Clone, Deserialize)]
pub struct LeadNode {
  pub id:            String,
  #[serde(default)]
  pub created_time:  Option<String>,
  #[serde(default)]
  pub ad_id:         Option<String>,
  #[serde(default)]
  pub ad_name:       Option<String>,
  #[serde(default)]
  pub adset_id:      Option<String>,
  #[serde(default)]
  pub adset_name:    Option<String>,
  #[serde(default)]
  pub campaign_id:   Option<String>,
  #[serde(default)]
  pub campaign_name: Option<String>,
  #[serde(default)]
  pub form_id:       Option<String>,
  #[serde(default)]
  pub form_name:     Option<String>,
  #[serde(default)]
  pub field_data:    Vec<FieldData>,
}

impl LeadNode {
  pub fn fields(&self) -> FormFields {
    FormFields::from_pairs(
      self
        .field_data
        .iter()
        .map(|f| (f.name.as_str(), f.values.iter().map(String::as_str))),
    )
  }

  /// A new CRM lead for this submission. `campaign_id` is the local campaign
  /// the submission's `campaign_id` maps to, if any.
  pub fn to_new_lead(&self, campaign_id: Option<Uuid>) -> NewLead {
    let fields = self.fields();
    let owned = |v: Option<&str>| v.map(str::to_owned);
    NewLead {
      name: owned(fields.name()),
      email: owned(fields.email()),
      phone: owned(fields.phone()),
      company: owned(fields.company()),
      external_lead_id: Some(self.id.clone()),
      campaign_id,
      ad_external_id: self.ad_id.clone(),
      adset_external_id: self.adset_id.clone(),
      lead_source_detail: Some(
        self
          .ad_name
          .clone()
          .or_else(|| self.campaign_name.clone())
          .unwrap_or_else(|| "Meta Lead Ads".into()),
      ),
      created_at: parse_meta_time(self.created_time.as_deref()),
      ..NewLead::titled(fields.title(&self.id), LeadSource::MetaAds)
    }
  }
}
