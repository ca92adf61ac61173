//! CRM leads.
//!
//! Leads are soft-deleted: a deleted lead keeps its row with `deleted_at`
//! set and disappears from every read. All reads and writes are scoped to an
//! organization.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Enums ───────────────────────────────────────────────────────────────────

/// Pipeline stage. The wire names are the ones the dashboard has always used.
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
pub enum LeadStatus {
  NovoLead,
  Qualificacao,
  Proposta,
  Negociacao,
  FechadoGanho,
  FechadoPerdido,
}

impl LeadStatus {
  /// Still in the pipeline (not won or lost).
  pub fn is_open(self) -> bool { !matches!(self, Self::FechadoGanho | Self::FechadoPerdido) }

  pub fn is_won(self) -> bool { self == Self::FechadoGanho }
}

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
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LeadSource {
  Manual,
  MetaAds,
  Email,
  Import,
  Form,
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
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Priority {
  Low,
  #[default]
  Medium,
  High,
}

// ─── Lead ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Lead {
  pub lead_id:            Uuid,
  pub organization_id:    Uuid,
  pub title:              String,
  pub name:               Option<String>,
  pub email:              Option<String>,
  pub phone:              Option<String>,
  pub company:            Option<String>,
  pub description:        Option<String>,
  pub status:             LeadStatus,
  pub source:             LeadSource,
  pub priority:           Priority,
  /// Deal value in currency units.
  pub value:              f64,
  /// Meta leadgen id, for leads that came from lead ads.
  pub external_lead_id:   Option<String>,
  pub campaign_id:        Option<Uuid>,
  pub ad_external_id:     Option<String>,
  pub adset_external_id:  Option<String>,
  pub lead_source_detail: Option<String>,
  pub assignee_id:        Option<Uuid>,
  pub assignee_name:      Option<String>,
  pub lead_score:         i64,
  pub closed_won_at:      Option<DateTime<Utc>>,
  pub created_at:         DateTime<Utc>,
  pub updated_at:         DateTime<Utc>,
  pub deleted_at:         Option<DateTime<Utc>>,
}

/// Input for creating a lead. `organization_id` comes from the route, not
/// the body.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct NewLead {
  pub title:              String,
  #[serde(default)]
  pub name:               Option<String>,
  #[serde(default)]
  pub email:              Option<String>,
  #[serde(default)]
  pub phone:              Option<String>,
  #[serde(default)]
  pub company:            Option<String>,
  #[serde(default)]
  pub description:        Option<String>,
  #[serde(default = "default_status")]
  pub status:             LeadStatus,
  #[serde(default = "default_source")]
  pub source:             LeadSource,
  #[serde(default)]
  pub priority:           Priority,
  #[serde(default)]
  pub value:              f64,
  #[serde(default)]
  pub external_lead_id:   Option<String>,
  #[serde(default)]
  pub campaign_id:        Option<Uuid>,
  #[serde(default)]
  pub ad_external_id:     Option<String>,
  #[serde(default)]
  pub adset_external_id:  Option<String>,
  #[serde(default)]
  pub lead_source_detail: Option<String>,
  #[serde(default)]
  pub assignee_id:        Option<Uuid>,
  #[serde(default)]
  pub assignee_name:      Option<String>,
  #[serde(default = "default_score")]
  pub lead_score:         i64,
  /// Backdated creation time, e.g. Meta's `created_time`. Defaults to now.
  #[serde(default)]
  pub created_at:         Option<DateTime<Utc>>,
}

fn default_status() -> LeadStatus { LeadStatus::NovoLead }
fn default_source() -> LeadSource { LeadSource::Manual }
fn default_score() -> i64 { 50 }

impl NewLead {
  /// A lead with only a title; everything else takes its default.
  pub fn titled(title: impl Into<String>, source: LeadSource) -> Self {
    Self {
      title: title.into(),
      name: None,
      email: None,
      phone: None,
      company: None,
      description: None,
      status: LeadStatus::NovoLead,
      source,
      priority: Priority::Medium,
      value: 0.0,
      external_lead_id: None,
      campaign_id: None,
      ad_external_id: None,
      adset_external_id: None,
      lead_source_detail: None,
      assignee_id: None,
      assignee_name: None,
      lead_score: default_score(),
      created_at: None,
    }
  }
}

/// Distinguishes "field absent" (`None`) from "set to null" (`Some(None)`).
fn double_option<'de, T, D>(de: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
  T: Deserialize<'de>,
  D: Deserializer<'de>,
{
  Option::<T>::deserialize(de).map(Some)
}

/// A partial update. Absent fields are left untouched; nullable fields can be
/// cleared with an explicit `null`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct LeadPatch {
  #[serde(default)]
  pub title:         Option<String>,
  #[serde(default, deserialize_with = "double_option")]
  pub name:          Option<Option<String>>,
  #[serde(default, deserialize_with = "double_option")]
  pub email:         Option<Option<String>>,
  #[serde(default, deserialize_with = "double_option")]
  pub phone:         Option<Option<String>>,
  #[serde(default, deserialize_with = "double_option")]
  pub company:       Option<Option<String>>,
  #[serde(default, deserialize_with = "double_option")]
  pub description:   Option<Option<String>>,
  #[serde(default)]
  pub status:        Option<LeadStatus>,
  #[serde(default)]
  pub priority:      Option<Priority>,
  #[serde(default)]
  pub value:         Option<f64>,
  #[serde(default, deserialize_with = "double_option")]
  pub campaign_id:   Option<Option<Uuid>>,
  #[serde(default, deserialize_with = "double_option")]
  pub assignee_id:   Option<Option<Uuid>>,
  #[serde(default, deserialize_with = "double_option")]
  pub assignee_name: Option<Option<String>>,
  #[serde(default)]
  pub lead_score:    Option<i64>,
  #[serde(default, deserialize_with = "double_option")]
  pub closed_won_at: Option<Option<DateTime<Utc>>>,
}

impl LeadPatch {
  pub fn is_empty(&self) -> bool { *self == Self::default() }

  /// Keep `closed_won_at` consistent with the status being written: moving
  /// to `fechado_ganho` stamps it (unless the caller supplied one), moving
  /// anywhere else clears it.
  pub fn normalize(mut self, now: DateTime<Utc>) -> Self {
    match self.status {
      Some(LeadStatus::FechadoGanho) => {
        if !matches!(self.closed_won_at, Some(Some(_))) {
          self.closed_won_at = Some(Some(now));
        }
      }
      Some(_) => self.closed_won_at = Some(None),
      None => {}
    }
    self
  }

  /// Apply to an in-memory lead. Backends that cannot express the patch in
  /// SQL directly use this to compute the new row.
  pub fn apply_to(&self, lead: &mut Lead) {
    if let Some(v) = &self.title {
      lead.title = v.clone();
    }
    set(&mut lead.name, &self.name);
    set(&mut lead.email, &self.email);
    set(&mut lead.phone, &self.phone);
    set(&mut lead.company, &self.company);
    set(&mut lead.description, &self.description);
    if let Some(v) = self.status {
      lead.status = v;
    }
    if let Some(v) = self.priority {
      lead.priority = v;
    }
    if let Some(v) = self.value {
      lead.value = v;
    }
    set(&mut lead.campaign_id, &self.campaign_id);
    set(&mut lead.assignee_id, &self.assignee_id);
    set(&mut lead.assignee_name, &self.assignee_name);
    if let Some(v) = self.lead_score {
      lead.lead_score = v;
    }
    set(&mut lead.closed_won_at, &self.closed_won_at);
  }
}

fn set<T: Clone>(slot: &mut Option<T>, patch: &Option<Option<T>>) {
  if let Some(v) = patch {
    slot.clone_from(v);
  }
}

/// Validated input for a bulk operation.
#[derive(Debug, Clone)]
pub struct LeadSelection {
  pub organization_id: Uuid,
  pub lead_ids:        Vec<Uuid>,
}

impl LeadSelection {
  pub fn new(organization_id: Uuid, mut lead_ids: Vec<Uuid>) -> Result<Self> {
    lead_ids.sort_unstable();
    lead_ids.dedup();
    if lead_ids.is_empty() {
      return Err(Error::EmptySelection);
    }
    Ok(Self { organization_id, lead_ids })
  }
}

// ─── Query ───────────────────────────────────────────────────────────────────

/// Filters for listing leads. Soft-deleted leads are never returned.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LeadQuery {
  pub status:         Option<LeadStatus>,
  pub source:         Option<LeadSource>,
  pub campaign_id:    Option<Uuid>,
  pub assignee_id:    Option<Uuid>,
  /// Case-insensitive substring over title, name, email and company.
  pub text:           Option<String>,
  pub created_after:  Option<DateTime<Utc>>,
  pub created_before: Option<DateTime<Utc>>,
  pub limit:          Option<usize>,
  pub offset:         Option<usize>,
}

// ─── Lead form fields ────────────────────────────────────────────────────────

/// Answers from a lead form, keyed by lowercased field name. Only the first
/// non-blank value of each field is kept.
#[derive(Debug, Clone, Default)]
pub struct FormFields(HashMap<String, String>);

impl FormFields {
  pub fn from_pairs<'a, I, V>(fields: I) -> Self
  where
    I: IntoIterator<Item = (&'a str, V)>,
    V: IntoIterator<Item = &'a str>,
  {
    let mut map = HashMap::new();
    for (name, values) in fields {
      if name.is_empty() {
        continue;
      }
      let key = name.to_lowercase();
      if map.contains_key(&key) {
        continue;
      }
      if let Some(first) = values.into_iter().map(str::trim).find(|v| !v.is_empty()) {
        map.insert(key, first.to_owned());
      }
    }
    Self(map)
  }

  /// The first present value among `keys`.
  pub fn get(&self, keys: &[&str]) -> Option<&str> {
    keys
      .iter()
      .find_map(|k| self.0.get(&k.to_lowercase()))
      .map(String::as_str)
  }

  pub fn name(&self) -> Option<&str> { self.get(&["full_name", "name", "nome", "first_name"]) }

  pub fn email(&self) -> Option<&str> { self.get(&["email", "e-mail"]) }

  pub fn phone(&self) -> Option<&str> { self.get(&["phone", "telefone", "phone_number"]) }

  pub fn company(&self) -> Option<&str> { self.get(&["company_name", "company", "empresa"]) }

  /// `"name - company"`, else the first of name, email, company, else
  /// `"Lead <first 8 chars of the external id>"`.
  pub fn title(&self, external_id: &str) -> String {
    match (self.name(), self.company(), self.email()) {
      (Some(n), Some(c), _) => format!("{n} - {c}"),
      (Some(n), None, _) => n.to_owned(),
      (None, _, Some(e)) => e.to_owned(),
      (None, Some(c), None) => c.to_owned(),
      (None, None, None) => {
        let short: String = external_id.chars().take(8).collect();
        format!("Lead {short}")
      }
    }
  }
}
