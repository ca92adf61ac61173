//! Aggregated reporting over the daily insight tables.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  insight::{DerivedMetrics, InsightLevel},
};

/// A metrics request as received. Everything is optional here so that a
/// missing parameter is reported by name instead of as a parse failure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetricsRequest {
  pub since:          Option<NaiveDate>,
  pub until:          Option<NaiveDate>,
  #[serde(default)]
  pub ad_account_ids: Vec<Uuid>,
  #[serde(default)]
  pub campaign_ids:   Vec<Uuid>,
  #[serde(default)]
  pub ad_set_ids:     Vec<Uuid>,
  #[serde(default)]
  pub ad_ids:         Vec<Uuid>,
  pub level:          Option<InsightLevel>,
}

impl MetricsRequest {
  pub fn validate(self) -> Result<MetricsQuery> {
    let since = self.since.ok_or(Error::MissingParameter("since"))?;
    let until = self.until.ok_or(Error::MissingParameter("until"))?;
    let level = self.level.ok_or(Error::MissingParameter("level"))?;
    if self.ad_account_ids.is_empty() {
      return Err(Error::MissingParameter("ad_account_ids"));
    }
    if since > until {
      return Err(Error::InvertedWindow { since, until });
    }
    Ok(MetricsQuery {
      since,
      until,
      ad_account_ids: self.ad_account_ids,
      campaign_ids: self.campaign_ids,
      ad_set_ids: self.ad_set_ids,
      ad_ids: self.ad_ids,
      level,
    })
  }
}

/// A validated metrics query. Empty id lists mean "no filter".
///
/// Campaign and ad-set rows aggregate the ad-set daily table; ad rows the
/// ad daily table. Filters finer than the level (e.g. `ad_ids` at ad-set
/// level) are ignored.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsQuery {
  pub since:          NaiveDate,
  pub until:          NaiveDate,
  pub ad_account_ids: Vec<Uuid>,
  pub campaign_ids:   Vec<Uuid>,
  pub ad_set_ids:     Vec<Uuid>,
  pub ad_ids:         Vec<Uuid>,
  pub level:          InsightLevel,
}

/// Totals for one entity over the query range.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MetricsRow {
  pub id:              Uuid,
  pub name:            String,
  pub spend:           f64,
  pub impressions:     i64,
  pub clicks:          i64,
  pub leads_count:     i64,
  pub link_clicks:     i64,
  pub post_engagement: i64,
  pub derived:         DerivedMetrics,
}

impl MetricsRow {
  /// Fill in `derived` from the counters.
  pub fn with_derived(mut self) -> Self {
    self.derived = DerivedMetrics::compute(self.spend, self.impressions, self.clicks, self.leads_count);
    self
  }
}

// ─── Dashboard ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq)]
pub struct Totals {
  pub spend:       f64,
  pub impressions: i64,
  pub clicks:      i64,
  pub leads_count: i64,
  pub reach:       i64,
}

impl Totals {
  pub fn derived(&self) -> DerivedMetrics {
    DerivedMetrics::compute(self.spend, self.impressions, self.clicks, self.leads_count)
  }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DailyPoint {
  pub date:   NaiveDate,
  #[serde(flatten)]
  pub totals: Totals,
}

/// Impressions → clicks → leads → won deals.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq)]
pub struct Funnel {
  pub impressions: i64,
  pub clicks:      i64,
  /// CRM leads created in the range.
  pub leads:       i64,
  /// CRM leads created in the range that are now won.
  pub won:         i64,
}

impl Funnel {
  /// Step-to-step conversion rates in percent.
  pub fn rates(&self) -> FunnelRates {
    use crate::insight::ratio;
    FunnelRates {
      click_rate:   ratio(self.clicks as f64, self.impressions as f64) * 100.0,
      lead_rate:    ratio(self.leads as f64, self.clicks as f64) * 100.0,
      closing_rate: ratio(self.won as f64, self.leads as f64) * 100.0,
    }
  }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct FunnelRates {
  pub click_rate:   f64,
  pub lead_rate:    f64,
  pub closing_rate: f64,
}

/// Everything the dashboard needs for one organization and date range.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardSummary {
  pub since:        NaiveDate,
  pub until:        NaiveDate,
  pub totals:       Totals,
  pub derived:      DerivedMetrics,
  pub daily:        Vec<DailyPoint>,
  pub funnel:       Funnel,
  pub funnel_rates: FunnelRates,
  pub won_revenue:  f64,
}

impl DashboardSummary {
  pub fn new(
    since: NaiveDate,
    until: NaiveDate,
    daily: Vec<DailyPoint>,
    funnel: Funnel,
    won_revenue: f64,
  ) -> Self {
    let totals = daily.iter().fold(Totals::default(), |mut acc, p| {
      acc.spend += p.totals.spend;
      acc.impressions += p.totals.impressions;
      acc.clicks += p.totals.clicks;
      acc.leads_count += p.totals.leads_count;
      acc.reach += p.totals.reach;
      acc
    });
    Self {
      since,
      until,
      derived: totals.derived(),
      funnel_rates: funnel.rates(),
      totals,
      daily,
      funnel,
      won_revenue,
    }
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn required_parameters_are_named() {
    let req: MetricsRequest = serde_json::from_value(json!({
      "since": "2024-01-01",
      "until": "2024-01-31",
      "level": "adSet",
    }))
    .unwrap();
    assert!(matches!(req.validate(), Err(Error::MissingParameter("ad_account_ids"))));

    let req: MetricsRequest = serde_json::from_value(json!({ "until": "2024-01-31" })).unwrap();
    assert!(matches!(req.validate(), Err(Error::MissingParameter("since"))));
  }

  #[test]
  fn valid_request() {
    let account = Uuid::new_v4();
    let req: MetricsRequest = serde_json::from_value(json!({
      "since": "2024-01-01",
      "until": "2024-01-31",
      "level": "ad",
      "ad_account_ids": [account],
    }))
    .unwrap();
    let q = req.validate().unwrap();
    assert_eq!(q.level, InsightLevel::Ad);
    assert_eq!(q.ad_account_ids, vec![account]);
    assert!(q.campaign_ids.is_empty());
  }

  #[test]
  fn dashboard_totals_sum_daily_points() {
    let d1 = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let point = |date, spend, impressions, clicks, leads| DailyPoint {
      date,
      totals: Totals { spend, impressions, clicks, leads_count: leads, reach: 0 },
    };
    let daily = vec![point(d1, 10.0, 1000, 10, 1), point(d1.succ_opt().unwrap(), 30.0, 3000, 30, 3)];
    let funnel = Funnel { impressions: 4000, clicks: 40, leads: 4, won: 1 };
    let s = DashboardSummary::new(d1, d1, daily, funnel, 500.0);
    assert_eq!(s.totals.spend, 40.0);
    assert_eq!(s.derived.cpl, 10.0);
    assert_eq!(s.funnel_rates.closing_rate, 25.0);
  }
}
