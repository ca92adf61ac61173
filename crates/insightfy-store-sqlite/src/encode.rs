//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 strings with fixed microsecond precision
//! and a `Z` suffix, dates as `YYYY-MM-DD`. Enums use their `strum` names.
//! JSON blobs (targeting, creative data, actions) are stored as compact text.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, SecondsFormat, SubsecRound as _, Utc};
use insightfy_core::{
  activity::{Interaction, LeadActivity, Task},
  ads::{AdSet, Campaign},
  billing::Subscription,
  goal::Goal,
  lead::Lead,
  org::{AdAccount, MetaConnection, Organization},
};
use rusqlite::Row;
use serde_json::Value;
use uuid::Uuid;

use crate::{Error, Result};

/// The current time, truncated to what a timestamp column can hold so values
/// read back compare equal to the ones written.
pub fn now() -> DateTime<Utc> { Utc::now().trunc_subsecs(6) }

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

fn decode_opt_uuid(s: Option<String>) -> Result<Option<Uuid>> {
  s.as_deref().map(decode_uuid).transpose()
}

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339_opts(SecondsFormat::Micros, true) }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

fn decode_opt_dt(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
  s.as_deref().map(decode_dt).transpose()
}

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| Error::DateParse(e.to_string()))
}

/// Midnight UTC at the start of `d`, as stored text.
pub fn day_start(d: NaiveDate) -> String { encode_dt(d.and_time(NaiveTime::MIN).and_utc()) }

/// Midnight UTC at the start of the day after `d`: the exclusive upper
/// bound for "on or before `d`".
pub fn day_after(d: NaiveDate) -> String { day_start(d + chrono::Duration::days(1)) }

pub fn decode_enum<T: FromStr>(column: &'static str, s: &str) -> Result<T> {
  s.parse()
    .map_err(|_| Error::UnknownValue { column, value: s.to_owned() })
}

pub fn encode_json(v: Option<&Value>) -> Option<String> { v.map(Value::to_string) }

fn decode_json(s: Option<String>) -> Result<Option<Value>> {
  s.as_deref()
    .map(serde_json::from_str)
    .transpose()
    .map_err(Error::Json)
}

// ─── Row types ───────────────────────────────────────────────────────────────
//
// Each `Raw*` struct holds the strings read straight from a row. `COLUMNS`
// lists the select list `from_row` expects, in order.

pub struct RawOrganization {
  pub organization_id: String,
  pub name:            String,
  pub slug:            String,
  pub created_at:      String,
}

impl RawOrganization {
  pub const COLUMNS: &'static str = "organization_id, name, slug, created_at";

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      organization_id: row.get(0)?,
      name:            row.get(1)?,
      slug:            row.get(2)?,
      created_at:      row.get(3)?,
    })
  }

  pub fn into_organization(self) -> Result<Organization> {
    Ok(Organization {
      organization_id: decode_uuid(&self.organization_id)?,
      name:            self.name,
      slug:            self.slug,
      created_at:      decode_dt(&self.created_at)?,
    })
  }
}

pub struct RawAdAccount {
  pub ad_account_id:   String,
  pub organization_id: String,
  pub external_id:     String,
  pub provider:        String,
  pub business_name:   Option<String>,
  pub is_active:       bool,
  pub connected_by:    Option<String>,
  pub created_at:      String,
}

impl RawAdAccount {
  pub const COLUMNS: &'static str = "a.ad_account_id, a.organization_id, a.external_id, a.provider, \
                                     a.business_name, a.is_active, a.connected_by, a.created_at";

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      ad_account_id:   row.get(0)?,
      organization_id: row.get(1)?,
      external_id:     row.get(2)?,
      provider:        row.get(3)?,
      business_name:   row.get(4)?,
      is_active:       row.get(5)?,
      connected_by:    row.get(6)?,
      created_at:      row.get(7)?,
    })
  }

  pub fn into_account(self) -> Result<AdAccount> {
    Ok(AdAccount {
      ad_account_id:   decode_uuid(&self.ad_account_id)?,
      organization_id: decode_uuid(&self.organization_id)?,
      external_id:     self.external_id,
      provider:        decode_enum("provider", &self.provider)?,
      business_name:   self.business_name,
      is_active:       self.is_active,
      connected_by:    decode_opt_uuid(self.connected_by)?,
      created_at:      decode_dt(&self.created_at)?,
    })
  }
}

pub struct RawConnection {
  pub connection_id:    String,
  pub user_id:          String,
  pub access_token:     String,
  pub token_expires_at: Option<String>,
  pub is_active:        bool,
  pub connected_at:     String,
}

impl RawConnection {
  pub const COLUMNS: &'static str =
    "connection_id, user_id, access_token, token_expires_at, is_active, connected_at";

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      connection_id:    row.get(0)?,
      user_id:          row.get(1)?,
      access_token:     row.get(2)?,
      token_expires_at: row.get(3)?,
      is_active:        row.get(4)?,
      connected_at:     row.get(5)?,
    })
  }

  pub fn into_connection(self) -> Result<MetaConnection> {
    Ok(MetaConnection {
      connection_id:    decode_uuid(&self.connection_id)?,
      user_id:          decode_uuid(&self.user_id)?,
      access_token:     self.access_token,
      token_expires_at: decode_opt_dt(self.token_expires_at)?,
      is_active:        self.is_active,
      connected_at:     decode_dt(&self.connected_at)?,
    })
  }
}

pub struct RawCampaign {
  pub campaign_id:   String,
  pub ad_account_id: String,
  pub external_id:   String,
  pub name:          String,
  pub status:        Option<String>,
  pub objective:     Option<String>,
  pub daily_budget:  Option<f64>,
  pub start_time:    Option<String>,
  pub stop_time:     Option<String>,
  pub updated_at:    String,
}

impl RawCampaign {
  pub const COLUMNS: &'static str = "c.campaign_id, c.ad_account_id, c.external_id, c.name, c.status, \
                                     c.objective, c.daily_budget, c.start_time, c.stop_time, c.updated_at";

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      campaign_id:   row.get(0)?,
      ad_account_id: row.get(1)?,
      external_id:   row.get(2)?,
      name:          row.get(3)?,
      status:        row.get(4)?,
      objective:     row.get(5)?,
      daily_budget:  row.get(6)?,
      start_time:    row.get(7)?,
      stop_time:     row.get(8)?,
      updated_at:    row.get(9)?,
    })
  }

  pub fn into_campaign(self) -> Result<Campaign> {
    Ok(Campaign {
      campaign_id:   decode_uuid(&self.campaign_id)?,
      ad_account_id: decode_uuid(&self.ad_account_id)?,
      external_id:   self.external_id,
      name:          self.name,
      status:        self.status,
      objective:     self.objective,
      daily_budget:  self.daily_budget,
      start_time:    decode_opt_dt(self.start_time)?,
      stop_time:     decode_opt_dt(self.stop_time)?,
      updated_at:    decode_dt(&self.updated_at)?,
    })
  }
}

pub struct RawAdSet {
  pub ad_set_id:         String,
  pub campaign_id:       String,
  pub external_id:       String,
  pub name:              String,
  pub status:            Option<String>,
  pub optimization_goal: Option<String>,
  pub billing_event:     Option<String>,
  pub bid_strategy:      Option<String>,
  pub targeting:         Option<String>,
  pub daily_budget:      Option<f64>,
  pub lifetime_budget:   Option<f64>,
  pub start_time:        Option<String>,
  pub end_time:          Option<String>,
  pub updated_at:        String,
}

impl RawAdSet {
  pub const COLUMNS: &'static str = "s.ad_set_id, s.campaign_id, s.external_id, s.name, s.status, \
                                     s.optimization_goal, s.billing_event, s.bid_strategy, s.targeting, \
                                     s.daily_budget, s.lifetime_budget, s.start_time, s.end_time, s.updated_at";

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      ad_set_id:         row.get(0)?,
      campaign_id:       row.get(1)?,
      external_id:       row.get(2)?,
      name:              row.get(3)?,
      status:            row.get(4)?,
      optimization_goal: row.get(5)?,
      billing_event:     row.get(6)?,
      bid_strategy:      row.get(7)?,
      targeting:         row.get(8)?,
      daily_budget:      row.get(9)?,
      lifetime_budget:   row.get(10)?,
      start_time:        row.get(11)?,
      end_time:          row.get(12)?,
      updated_at:        row.get(13)?,
    })
  }

  pub fn into_ad_set(self) -> Result<AdSet> {
    Ok(AdSet {
      ad_set_id:         decode_uuid(&self.ad_set_id)?,
      campaign_id:       decode_uuid(&self.campaign_id)?,
      external_id:       self.external_id,
      name:              self.name,
      status:            self.status,
      optimization_goal: self.optimization_goal,
      billing_event:     self.billing_event,
      bid_strategy:      self.bid_strategy,
      targeting:         decode_json(self.targeting)?,
      daily_budget:      self.daily_budget,
      lifetime_budget:   self.lifetime_budget,
      start_time:        decode_opt_dt(self.start_time)?,
      end_time:          decode_opt_dt(self.end_time)?,
      updated_at:        decode_dt(&self.updated_at)?,
    })
  }
}

pub struct RawLead {
  pub lead_id:            String,
  pub organization_id:    String,
  pub title:              String,
  pub name:               Option<String>,
  pub email:              Option<String>,
  pub phone:              Option<String>,
  pub company:            Option<String>,
  pub description:        Option<String>,
  pub status:             String,
  pub source:             String,
  pub priority:           String,
  pub value:              f64,
  pub external_lead_id:   Option<String>,
  pub campaign_id:        Option<String>,
  pub ad_external_id:     Option<String>,
  pub adset_external_id:  Option<String>,
  pub lead_source_detail: Option<String>,
  pub assignee_id:        Option<String>,
  pub assignee_name:      Option<String>,
  pub lead_score:         i64,
  pub closed_won_at:      Option<String>,
  pub created_at:         String,
  pub updated_at:         String,
  pub deleted_at:         Option<String>,
}

impl RawLead {
  pub const COLUMNS: &'static str = "lead_id, organization_id, title, name, email, phone, company, \
                                     description, status, source, priority, value, external_lead_id, \
                                     campaign_id, ad_external_id, adset_external_id, lead_source_detail, \
                                     assignee_id, assignee_name, lead_score, closed_won_at, created_at, \
                                     updated_at, deleted_at";

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      lead_id:            row.get(0)?,
      organization_id:    row.get(1)?,
      title:              row.get(2)?,
      name:               row.get(3)?,
      email:              row.get(4)?,
      phone:              row.get(5)?,
      company:            row.get(6)?,
      description:        row.get(7)?,
      status:             row.get(8)?,
      source:             row.get(9)?,
      priority:           row.get(10)?,
      value:              row.get(11)?,
      external_lead_id:   row.get(12)?,
      campaign_id:        row.get(13)?,
      ad_external_id:     row.get(14)?,
      adset_external_id:  row.get(15)?,
      lead_source_detail: row.get(16)?,
      assignee_id:        row.get(17)?,
      assignee_name:      row.get(18)?,
      lead_score:         row.get(19)?,
      closed_won_at:      row.get(20)?,
      created_at:         row.get(21)?,
      updated_at:         row.get(22)?,
      deleted_at:         row.get(23)?,
    })
  }

  pub fn into_lead(self) -> Result<Lead> {
    Ok(Lead {
      lead_id:            decode_uuid(&self.lead_id)?,
      organization_id:    decode_uuid(&self.organization_id)?,
      title:              self.title,
      name:               self.name,
      email:              self.email,
      phone:              self.phone,
      company:            self.company,
      description:        self.description,
      status:             decode_enum("status", &self.status)?,
      source:             decode_enum("source", &self.source)?,
      priority:           decode_enum("priority", &self.priority)?,
      value:              self.value,
      external_lead_id:   self.external_lead_id,
      campaign_id:        decode_opt_uuid(self.campaign_id)?,
      ad_external_id:     self.ad_external_id,
      adset_external_id:  self.adset_external_id,
      lead_source_detail: self.lead_source_detail,
      assignee_id:        decode_opt_uuid(self.assignee_id)?,
      assignee_name:      self.assignee_name,
      lead_score:         self.lead_score,
      closed_won_at:      decode_opt_dt(self.closed_won_at)?,
      created_at:         decode_dt(&self.created_at)?,
      updated_at:         decode_dt(&self.updated_at)?,
      deleted_at:         decode_opt_dt(self.deleted_at)?,
    })
  }
}

pub struct RawInteraction {
  pub interaction_id:  String,
  pub organization_id: String,
  pub lead_id:         String,
  pub kind:            String,
  pub direction:       String,
  pub subject:         Option<String>,
  pub content:         Option<String>,
  pub user_name:       Option<String>,
  pub occurred_at:     String,
}

impl RawInteraction {
  pub const COLUMNS: &'static str = "interaction_id, organization_id, lead_id, kind, direction, \
                                     subject, content, user_name, occurred_at";

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      interaction_id:  row.get(0)?,
      organization_id: row.get(1)?,
      lead_id:         row.get(2)?,
      kind:            row.get(3)?,
      direction:       row.get(4)?,
      subject:         row.get(5)?,
      content:         row.get(6)?,
      user_name:       row.get(7)?,
      occurred_at:     row.get(8)?,
    })
  }

  pub fn into_interaction(self) -> Result<Interaction> {
    Ok(Interaction {
      interaction_id:  decode_uuid(&self.interaction_id)?,
      organization_id: decode_uuid(&self.organization_id)?,
      lead_id:         decode_uuid(&self.lead_id)?,
      kind:            decode_enum("kind", &self.kind)?,
      direction:       decode_enum("direction", &self.direction)?,
      subject:         self.subject,
      content:         self.content,
      user_name:       self.user_name,
      occurred_at:     decode_dt(&self.occurred_at)?,
    })
  }
}

pub struct RawTask {
  pub task_id:         String,
  pub organization_id: String,
  pub lead_id:         Option<String>,
  pub title:           String,
  pub description:     Option<String>,
  pub due_at:          Option<String>,
  pub completed_at:    Option<String>,
  pub created_at:      String,
}

impl RawTask {
  pub const COLUMNS: &'static str =
    "task_id, organization_id, lead_id, title, description, due_at, completed_at, created_at";

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      task_id:         row.get(0)?,
      organization_id: row.get(1)?,
      lead_id:         row.get(2)?,
      title:           row.get(3)?,
      description:     row.get(4)?,
      due_at:          row.get(5)?,
      completed_at:    row.get(6)?,
      created_at:      row.get(7)?,
    })
  }

  pub fn into_task(self) -> Result<Task> {
    Ok(Task {
      task_id:         decode_uuid(&self.task_id)?,
      organization_id: decode_uuid(&self.organization_id)?,
      lead_id:         decode_opt_uuid(self.lead_id)?,
      title:           self.title,
      description:     self.description,
      due_at:          decode_opt_dt(self.due_at)?,
      completed_at:    decode_opt_dt(self.completed_at)?,
      created_at:      decode_dt(&self.created_at)?,
    })
  }
}

pub struct RawActivity {
  pub activity_id: String,
  pub lead_id:     String,
  pub action:      String,
  pub from_status: Option<String>,
  pub to_status:   Option<String>,
  pub actor:       Option<String>,
  pub description: Option<String>,
  pub recorded_at: String,
}

impl RawActivity {
  pub const COLUMNS: &'static str = "a.activity_id, a.lead_id, a.action, a.from_status, a.to_status, \
                                     a.actor, a.description, a.recorded_at";

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      activity_id: row.get(0)?,
      lead_id:     row.get(1)?,
      action:      row.get(2)?,
      from_status: row.get(3)?,
      to_status:   row.get(4)?,
      actor:       row.get(5)?,
      description: row.get(6)?,
      recorded_at: row.get(7)?,
    })
  }

  pub fn into_activity(self) -> Result<LeadActivity> {
    Ok(LeadActivity {
      activity_id: decode_uuid(&self.activity_id)?,
      lead_id:     decode_uuid(&self.lead_id)?,
      action:      decode_enum("action", &self.action)?,
      from_status: self.from_status.as_deref().map(|s| decode_enum("from_status", s)).transpose()?,
      to_status:   self.to_status.as_deref().map(|s| decode_enum("to_status", s)).transpose()?,
      actor:       self.actor,
      description: self.description,
      recorded_at: decode_dt(&self.recorded_at)?,
    })
  }
}

pub struct RawGoal {
  pub goal_id:          String,
  pub organization_id:  String,
  pub title:            String,
  pub description:      Option<String>,
  pub goal_type:        String,
  pub target_value:     f64,
  pub current_value:    f64,
  pub start_value:      f64,
  pub period_start:     String,
  pub period_end:       String,
  pub meta_account_id:  Option<String>,
  pub meta_campaign_id: Option<String>,
  pub status:           String,
  pub created_at:       String,
  pub updated_at:       String,
}

impl RawGoal {
  pub const COLUMNS: &'static str = "goal_id, organization_id, title, description, goal_type, \
                                     target_value, current_value, start_value, period_start, period_end, \
                                     meta_account_id, meta_campaign_id, status, created_at, updated_at";

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      goal_id:          row.get(0)?,
      organization_id:  row.get(1)?,
      title:            row.get(2)?,
      description:      row.get(3)?,
      goal_type:        row.get(4)?,
      target_value:     row.get(5)?,
      current_value:    row.get(6)?,
      start_value:      row.get(7)?,
      period_start:     row.get(8)?,
      period_end:       row.get(9)?,
      meta_account_id:  row.get(10)?,
      meta_campaign_id: row.get(11)?,
      status:           row.get(12)?,
      created_at:       row.get(13)?,
      updated_at:       row.get(14)?,
    })
  }

  pub fn into_goal(self) -> Result<Goal> {
    Ok(Goal {
      goal_id:          decode_uuid(&self.goal_id)?,
      organization_id:  decode_uuid(&self.organization_id)?,
      title:            self.title,
      description:      self.description,
      goal_type:        decode_enum("goal_type", &self.goal_type)?,
      target_value:     self.target_value,
      current_value:    self.current_value,
      start_value:      self.start_value,
      period_start:     decode_date(&self.period_start)?,
      period_end:       decode_date(&self.period_end)?,
      meta_account_id:  decode_opt_uuid(self.meta_account_id)?,
      meta_campaign_id: decode_opt_uuid(self.meta_campaign_id)?,
      status:           decode_enum("status", &self.status)?,
      created_at:       decode_dt(&self.created_at)?,
      updated_at:       decode_dt(&self.updated_at)?,
    })
  }
}

pub struct RawSubscription {
  pub subscription_id:        String,
  pub organization_id:        String,
  pub plan_id:                String,
  pub status:                 String,
  pub stripe_subscription_id: Option<String>,
  pub stripe_customer_id:     Option<String>,
  pub current_period_start:   Option<String>,
  pub current_period_end:     Option<String>,
  pub last_payment_date:      Option<String>,
  pub last_payment_amount:    Option<f64>,
  pub canceled_at:            Option<String>,
  pub updated_at:             String,
}

impl RawSubscription {
  pub const COLUMNS: &'static str = "subscription_id, organization_id, plan_id, status, \
                                     stripe_subscription_id, stripe_customer_id, current_period_start, \
                                     current_period_end, last_payment_date, last_payment_amount, \
                                     canceled_at, updated_at";

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      subscription_id:        row.get(0)?,
      organization_id:        row.get(1)?,
      plan_id:                row.get(2)?,
      status:                 row.get(3)?,
      stripe_subscription_id: row.get(4)?,
      stripe_customer_id:     row.get(5)?,
      current_period_start:   row.get(6)?,
      current_period_end:     row.get(7)?,
      last_payment_date:      row.get(8)?,
      last_payment_amount:    row.get(9)?,
      canceled_at:            row.get(10)?,
      updated_at:             row.get(11)?,
    })
  }

  pub fn into_subscription(self) -> Result<Subscription> {
    Ok(Subscription {
      subscription_id:        decode_uuid(&self.subscription_id)?,
      organization_id:        decode_uuid(&self.organization_id)?,
      plan_id:                self.plan_id,
      status:                 decode_enum("status", &self.status)?,
      stripe_subscription_id: self.stripe_subscription_id,
      stripe_customer_id:     self.stripe_customer_id,
      current_period_start:   decode_opt_dt(self.current_period_start)?,
      current_period_end:     decode_opt_dt(self.current_period_end)?,
      last_payment_date:      decode_opt_dt(self.last_payment_date)?,
      last_payment_amount:    self.last_payment_amount,
      canceled_at:            decode_opt_dt(self.canceled_at)?,
      updated_at:             decode_dt(&self.updated_at)?,
    })
  }
}
