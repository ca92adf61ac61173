//! The `GraphApi` trait and the request types it takes.
//!
//! The sync engine depends on this trait rather than on [`GraphClient`]
//! directly, so it can be driven by a scripted fake in tests.
//!
//! [`GraphClient`]: crate::client::GraphClient

use std::future::Future;

use chrono::{Duration, NaiveDate, NaiveTime};
use insightfy_core::{dates::DateChunk, insight::InsightLevel};
use serde_json::{Value, json};

use crate::{
  error::{Error, Result},
  types::{AccountNode, AdNode, AdSetNode, CampaignNode, InsightRow, LeadNode},
};

/// Rows per insights page.
pub const INSIGHTS_PAGE_SIZE: usize = 1000;
/// Rows per page on hierarchy edges (`/campaigns`, `/adsets`, `/ads`).
pub const EDGE_PAGE_SIZE: usize = 100;
/// Largest page the `/leads` edge accepts.
pub const MAX_LEADS_PAGE_SIZE: usize = 500;

pub const CAMPAIGN_FIELDS: &[&str] =
  &["id", "name", "objective", "status", "daily_budget", "start_time", "stop_time"];

pub const AD_SET_FIELDS: &[&str] = &[
  "id",
  "name",
  "status",
  "optimization_goal",
  "billing_event",
  "bid_strategy",
  "targeting",
  "daily_budget",
  "lifetime_budget",
  "start_time",
  "end_time",
  "campaign_id",
];

pub const AD_FIELDS: &[&str] = &[
  "id",
  "name",
  "status",
  "adset_id",
  "campaign_id",
  "creative{id,image_url,thumbnail_url,object_story_spec,asset_feed_spec}",
  "created_time",
  "updated_time",
];

pub const LEAD_FIELDS: &[&str] = &[
  "id",
  "created_time",
  "ad_id",
  "ad_name",
  "adset_id",
  "adset_name",
  "campaign_id",
  "campaign_name",
  "form_id",
  "form_name",
  "field_data",
];

const CAMPAIGN_INSIGHT_FIELDS: &[&str] =
  &["campaign_id", "date_start", "date_stop", "spend", "impressions", "clicks", "reach", "frequency", "actions"];

const AD_SET_INSIGHT_FIELDS: &[&str] = &[
  "adset_id",
  "campaign_id",
  "date_start",
  "date_stop",
  "spend",
  "impressions",
  "clicks",
  "actions",
  "reach",
  "frequency",
  "link_clicks",
  "post_engagement",
];

const AD_INSIGHT_FIELDS: &[&str] = &[
  "ad_id",
  "adset_id",
  "campaign_id",
  "date_start",
  "date_stop",
  "spend",
  "impressions",
  "clicks",
  "actions",
  "reach",
  "frequency",
  "link_clicks",
  "post_engagement",
  "video_views",
  "video_avg_time_watched",
  "quality_ranking",
  "engagement_rate_ranking",
  "conversion_rate_ranking",
];

/// One insights request: a single account, level and date chunk, optionally
/// narrowed to specific campaigns, ad sets or ads (Meta ids).
#[derive(Debug, Clone, PartialEq)]
pub struct InsightRequest {
  /// Graph node, e.g. `act_1234`.
  pub account:      String,
  pub level:        InsightLevel,
  pub campaign_ids: Vec<String>,
  pub ad_set_ids:   Vec<String>,
  pub ad_ids:       Vec<String>,
  pub chunk:        DateChunk,
}

impl InsightRequest {
  pub fn fields(&self) -> &'static [&'static str] {
    match self.level {
      InsightLevel::Campaign => CAMPAIGN_INSIGHT_FIELDS,
      InsightLevel::AdSet => AD_SET_INSIGHT_FIELDS,
      InsightLevel::Ad => AD_INSIGHT_FIELDS,
    }
  }

  /// The `filtering` parameter: one `IN` clause per non-empty id list.
  pub fn filtering(&self) -> Value {
    let clauses: Vec<Value> = [
      ("campaign.id", &self.campaign_ids),
      ("adset.id", &self.ad_set_ids),
      ("ad.id", &self.ad_ids),
    ]
    .into_iter()
    .filter(|(_, ids)| !ids.is_empty())
    .map(|(field, ids)| json!({ "field": field, "operator": "IN", "value": ids }))
    .collect();
    Value::Array(clauses)
  }

  pub fn time_range(&self) -> Value {
    json!({
      "since": self.chunk.start.format("%Y-%m-%d").to_string(),
      "until": self.chunk.end.format("%Y-%m-%d").to_string(),
    })
  }

  /// Query parameters, without the access token.
  pub fn query(&self) -> Vec<(&'static str, String)> {
    vec![
      ("fields", self.fields().join(",")),
      ("level", self.level.graph_level().to_owned()),
      ("time_increment", "1".to_owned()),
      ("filtering", self.filtering().to_string()),
      ("time_range", self.time_range().to_string()),
      ("limit", INSIGHTS_PAGE_SIZE.to_string()),
    ]
  }
}

/// Lead-ads submissions for one account, created within `[since, until]`
/// (whole days, UTC), at most `limit` of them.
#[derive(Debug, Clone, PartialEq)]
pub struct LeadRequest {
  pub account: String,
  pub since:   NaiveDate,
  pub until:   NaiveDate,
  pub limit:   usize,
}

impl LeadRequest {
  fn unix(date: NaiveDate) -> i64 { date.and_time(NaiveTime::MIN).and_utc().timestamp() }

  pub fn filtering(&self) -> Value {
    json!([
      { "field": "time_created", "operator": "GREATER_THAN", "value": Self::unix(self.since).to_string() },
      {
        "field": "time_created",
        "operator": "LESS_THAN",
        "value": Self::unix(self.until + Duration::days(1)).to_string(),
      },
    ])
  }

  pub fn page_size(&self) -> usize { self.limit.clamp(1, MAX_LEADS_PAGE_SIZE) }

  pub fn query(&self) -> Vec<(&'static str, String)> {
    vec![
      ("fields", LEAD_FIELDS.join(",")),
      ("filtering", self.filtering().to_string()),
      ("limit", self.page_size().to_string()),
    ]
  }
}

/// The rows of a paged edge. A failure on a later page keeps the rows of the
/// pages before it; `error` then holds what cut pagination short.
#[derive(Debug)]
pub struct Collected<T> {
  pub rows:  Vec<T>,
  pub error: Option<Error>,
}

impl<T> Collected<T> {
  pub fn complete(rows: Vec<T>) -> Self { Self { rows, error: None } }

  pub fn partial(rows: Vec<T>, error: Error) -> Self { Self { rows, error: Some(error) } }
}

/// Read access to the Graph API. Every call takes the access token to use,
/// since tokens are resolved per ad account.
pub trait GraphApi: Send + Sync {
  /// `GET /<act_id>?fields=id,name`.
  fn account<'a>(
    &'a self,
    token: &'a str,
    account: &'a str,
  ) -> impl Future<Output = Result<AccountNode>> + Send + 'a;

  fn campaigns<'a>(
    &'a self,
    token: &'a str,
    account: &'a str,
  ) -> impl Future<Output = Result<Collected<CampaignNode>>> + Send + 'a;

  fn ad_sets<'a>(
    &'a self,
    token: &'a str,
    campaign_external_id: &'a str,
  ) -> impl Future<Output = Result<Collected<AdSetNode>>> + Send + 'a;

  fn ads<'a>(
    &'a self,
    token: &'a str,
    ad_set_external_id: &'a str,
  ) -> impl Future<Output = Result<Collected<AdNode>>> + Send + 'a;

  /// Every row of every page for one request. Paged methods fail outright
  /// only when the first page does.
  fn insights<'a>(
    &'a self,
    token: &'a str,
    request: &'a InsightRequest,
  ) -> impl Future<Output = Result<Collected<InsightRow>>> + Send + 'a;

  /// Up to `request.limit` leads. A rate limit or bad request part-way
  /// through ends the fetch with what was collected so far.
  fn leads<'a>(
    &'a self,
    token: &'a str,
    request: &'a LeadRequest,
  ) -> impl Future<Output = Result<Vec<LeadNode>>> + Send + 'a;

  /// A single submission by leadgen id.
  fn lead<'a>(
    &'a self,
    token: &'a str,
    leadgen_id: &'a str,
  ) -> impl Future<Output = Result<LeadNode>> + Send + 'a;
}

#[cfg(test)]
mod tests {
  use super::*;

  fn chunk() -> DateChunk {
    DateChunk {
      start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
      end:   NaiveDate::from_ymd_opt(2024, 1, 30).unwrap(),
    }
  }

  #[test]
  fn insight_filtering_skips_empty_lists() {
    let req = InsightRequest {
      account:      "act_1".into(),
      level:        InsightLevel::AdSet,
      campaign_ids: vec!["10".into(), "11".into()],
      ad_set_ids:   vec![],
      ad_ids:       vec![],
      chunk:        chunk(),
    };
    assert_eq!(
      req.filtering(),
      json!([{ "field": "campaign.id", "operator": "IN", "value": ["10", "11"] }])
    );
    assert_eq!(req.time_range(), json!({ "since": "2024-01-01", "until": "2024-01-30" }));
    let query = req.query();
    assert!(query.contains(&("level", "adset".into())));
    assert!(query.contains(&("time_increment", "1".into())));
    assert!(query.contains(&("limit", "1000".into())));
  }

  #[test]
  fn lead_window_covers_whole_until_day() {
    let req = LeadRequest {
      account: "act_1".into(),
      since:   NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
      until:   NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
      limit:   2000,
    };
    let f = req.filtering();
    assert_eq!(f[0]["value"], "1704067200");
    assert_eq!(f[1]["value"], "1704153600");
    assert_eq!(req.page_size(), 500);
  }
}
