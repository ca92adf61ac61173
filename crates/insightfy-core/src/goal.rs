//! Goal tracking.
//!
//! A goal pairs a metric with a target over a date period. Its current value
//! is recomputed on demand from CRM and ad-spend totals (see
//! [`evaluate`]); `custom` goals are only ever updated by hand.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result, insight::ratio};

/// Progress is reported as a percentage capped at this value.
pub const MAX_PROGRESS: f64 = 999.0;

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
pub enum GoalType {
  CrmRevenue,
  CrmLeadsGenerated,
  CrmLeadsConverted,
  CrmConversionRate,
  CrmPipelineValue,
  CrmAvgDealSize,
  MetaRoas,
  MetaCpl,
  MetaCpc,
  MetaCpm,
  MetaInvestment,
  MetaLeads,
  MetaImpressions,
  MetaClicks,
  MetaCtr,
  MetaFrequency,
  MetaReach,
  Custom,
}

impl GoalType {
  /// Cost metrics, where lower is better.
  pub fn lower_is_better(self) -> bool { matches!(self, Self::MetaCpl | Self::MetaCpc | Self::MetaCpm) }

  /// Whether the value depends on synced ad data.
  pub fn uses_ad_data(self) -> bool {
    matches!(
      self,
      Self::MetaRoas
        | Self::MetaCpl
        | Self::MetaCpc
        | Self::MetaCpm
        | Self::MetaInvestment
        | Self::MetaLeads
        | Self::MetaImpressions
        | Self::MetaClicks
        | Self::MetaCtr
        | Self::MetaFrequency
        | Self::MetaReach
    )
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum GoalStatus {
  #[default]
  Active,
  Completed,
  Paused,
  Archived,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ComputedStatus {
  Excellent,
  OnTrack,
  Behind,
  Critical,
}

// ─── Goal ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Goal {
  pub goal_id:          Uuid,
  pub organization_id:  Uuid,
  pub title:            String,
  pub description:      Option<String>,
  pub goal_type:        GoalType,
  pub target_value:     f64,
  pub current_value:    f64,
  pub start_value:      f64,
  pub period_start:     NaiveDate,
  /// Inclusive.
  pub period_end:       NaiveDate,
  /// Restricts ad metrics to one ad account.
  pub meta_account_id:  Option<Uuid>,
  /// Restricts ad metrics (and ROAS revenue) to one campaign.
  pub meta_campaign_id: Option<Uuid>,
  pub status:           GoalStatus,
  pub created_at:       DateTime<Utc>,
  pub updated_at:       DateTime<Utc>,
}

impl Goal {
  pub fn progress_percentage(&self) -> f64 { progress_percentage(self) }

  pub fn computed_status(&self, today: NaiveDate) -> ComputedStatus {
    computed_status(self.progress_percentage(), self.period_start, self.period_end, today)
  }
}

/// A goal as returned by the API, with its derived fields filled in.
#[derive(Debug, Clone, Serialize)]
pub struct GoalView {
  #[serde(flatten)]
  pub goal:                Goal,
  pub progress_percentage: f64,
  pub computed_status:     ComputedStatus,
}

impl GoalView {
  pub fn new(goal: Goal, today: NaiveDate) -> Self {
    Self {
      progress_percentage: goal.progress_percentage(),
      computed_status: goal.computed_status(today),
      goal,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewGoal {
  pub title:            String,
  #[serde(default)]
  pub description:      Option<String>,
  pub goal_type:        GoalType,
  pub target_value:     f64,
  #[serde(default)]
  pub start_value:      f64,
  pub period_start:     NaiveDate,
  pub period_end:       NaiveDate,
  #[serde(default)]
  pub meta_account_id:  Option<Uuid>,
  #[serde(default)]
  pub meta_campaign_id: Option<Uuid>,
}

impl NewGoal {
  pub fn validate(&self) -> Result<()> {
    validate_target(self.target_value)?;
    validate_period(self.period_start, self.period_end)
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GoalPatch {
  pub title:         Option<String>,
  pub description:   Option<String>,
  pub target_value:  Option<f64>,
  /// Only meaningful for `custom` goals; others are recomputed.
  pub current_value: Option<f64>,
  pub period_start:  Option<NaiveDate>,
  pub period_end:    Option<NaiveDate>,
  pub status:        Option<GoalStatus>,
}

impl GoalPatch {
  /// Apply to `goal`, validating the result.
  pub fn apply_to(&self, goal: &mut Goal) -> Result<()> {
    if let Some(v) = self.target_value {
      validate_target(v)?;
    }
    let start = self.period_start.unwrap_or(goal.period_start);
    let end = self.period_end.unwrap_or(goal.period_end);
    validate_period(start, end)?;

    if let Some(v) = &self.title {
      goal.title = v.clone();
    }
    if let Some(v) = &self.description {
      goal.description = Some(v.clone());
    }
    if let Some(v) = self.target_value {
      goal.target_value = v;
    }
    if let Some(v) = self.current_value {
      goal.current_value = v;
    }
    if let Some(v) = self.status {
      goal.status = v;
    }
    goal.period_start = start;
    goal.period_end = end;
    Ok(())
  }
}

fn validate_target(target: f64) -> Result<()> {
  if target.is_finite() && target > 0.0 { Ok(()) } else { Err(Error::InvalidTarget(target)) }
}

fn validate_period(since: NaiveDate, until: NaiveDate) -> Result<()> {
  if since > until {
    return Err(Error::InvertedWindow { since, until });
  }
  Ok(())
}

// ─── Evaluation ──────────────────────────────────────────────────────────────

/// Totals a goal's value is computed from, gathered over its period and
/// scope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct GoalInputs {
  /// Sum of `value` over leads won inside the period.
  pub won_revenue:     f64,
  /// Leads won inside the period.
  pub won_count:       i64,
  /// Leads created in the period that are now won.
  pub decided_won:     i64,
  /// Leads created in the period that are now lost.
  pub decided_lost:    i64,
  pub leads_created:   i64,
  /// Sum of `value` over open leads, regardless of period.
  pub pipeline_value:  f64,
  pub spend:           f64,
  pub impressions:     i64,
  pub clicks:          i64,
  pub ad_leads:        i64,
  pub reach:           i64,
  /// Number of campaign-day insight rows in the period.
  pub insight_days:    i64,
}

/// Share of impressions assumed to be unique when reach was never synced.
const REACH_ESTIMATE: f64 = 0.65;

/// The current value of a goal of type `goal_type`. `None` for `custom`
/// goals, whose value is entered manually.
pub fn evaluate(goal_type: GoalType, i: &GoalInputs) -> Option<f64> {
  let impressions = i.impressions as f64;
  let value = match goal_type {
    GoalType::CrmRevenue => i.won_revenue,
    GoalType::CrmLeadsGenerated => i.leads_created as f64,
    GoalType::CrmLeadsConverted => i.won_count as f64,
    GoalType::CrmConversionRate => {
      ratio(i.decided_won as f64, (i.decided_won + i.decided_lost) as f64) * 100.0
    }
    GoalType::CrmPipelineValue => i.pipeline_value,
    GoalType::CrmAvgDealSize => ratio(i.won_revenue, i.won_count as f64),
    GoalType::MetaRoas => ratio(i.won_revenue, i.spend),
    GoalType::MetaCpl => ratio(i.spend, i.ad_leads as f64),
    GoalType::MetaCpc => ratio(i.spend, i.clicks as f64),
    GoalType::MetaCpm => ratio(i.spend, impressions) * 1000.0,
    GoalType::MetaInvestment => i.spend,
    GoalType::MetaLeads => i.ad_leads as f64,
    GoalType::MetaImpressions => impressions,
    GoalType::MetaClicks => i.clicks as f64,
    GoalType::MetaCtr => ratio(i.clicks as f64, impressions) * 100.0,
    GoalType::MetaFrequency => {
      if i.reach > 0 {
        impressions / i.reach as f64
      } else {
        ratio(impressions, i.insight_days as f64)
      }
    }
    GoalType::MetaReach => {
      if i.reach > 0 {
        i.reach as f64
      } else {
        impressions * REACH_ESTIMATE
      }
    }
    GoalType::Custom => return None,
  };
  Some(value)
}

/// Percent of target reached, capped at [`MAX_PROGRESS`]. For cost metrics
/// reaching the target means getting *down* to it, so the ratio is inverted;
/// a cost of zero means nothing has been spent yet and reports 0.
pub fn progress_percentage(goal: &Goal) -> f64 {
  let pct = if goal.goal_type.lower_is_better() {
    ratio(goal.target_value, goal.current_value) * 100.0
  } else {
    ratio(goal.current_value, goal.target_value) * 100.0
  };
  pct.clamp(0.0, MAX_PROGRESS)
}

/// Compare progress with the share of the period already elapsed.
///
/// Before the period starts a goal is on track. At or above 100% it is
/// excellent. Otherwise progress is measured against the pace needed to
/// finish on time: ≥ 110% of pace is excellent, ≥ 90% on track, ≥ 60%
/// behind, anything less critical.
pub fn computed_status(
  progress: f64,
  period_start: NaiveDate,
  period_end: NaiveDate,
  today: NaiveDate,
) -> ComputedStatus {
  if progress >= 100.0 {
    return ComputedStatus::Excellent;
  }
  if today < period_start {
    return ComputedStatus::OnTrack;
  }
  let total = ((period_end - period_start).num_days() + 1).max(1) as f64;
  let elapsed = ((today.min(period_end) - period_start).num_days() + 1) as f64;
  let expected = elapsed / total * 100.0;
  let pace = progress / expected;
  if pace >= 1.1 {
    ComputedStatus::Excellent
  } else if pace >= 0.9 {
    ComputedStatus::OnTrack
  } else if pace >= 0.6 {
    ComputedStatus::Behind
  } else {
    ComputedStatus::Critical
  }
}
