//! Things that happen around a lead: logged interactions, follow-up tasks,
//! and the audit trail of changes to the lead itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::lead::LeadStatus;

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
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum InteractionKind {
  Email,
  Call,
  Meeting,
  Whatsapp,
  Note,
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
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Direction {
  Inbound,
  Outbound,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Interaction {
  pub interaction_id:  Uuid,
  pub organization_id: Uuid,
  pub lead_id:         Uuid,
  pub kind:            InteractionKind,
  pub direction:       Direction,
  pub subject:         Option<String>,
  pub content:         Option<String>,
  pub user_name:       Option<String>,
  pub occurred_at:     DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewInteraction {
  pub kind:        InteractionKind,
  #[serde(default = "default_direction")]
  pub direction:   Direction,
  #[serde(default)]
  pub subject:     Option<String>,
  #[serde(default)]
  pub content:     Option<String>,
  #[serde(default)]
  pub user_name:   Option<String>,
  #[serde(default)]
  pub occurred_at: Option<DateTime<Utc>>,
}

fn default_direction() -> Direction { Direction::Outbound }

// ─── Tasks ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
  pub task_id:         Uuid,
  pub organization_id: Uuid,
  pub lead_id:         Option<Uuid>,
  pub title:           String,
  pub description:     Option<String>,
  pub due_at:          Option<DateTime<Utc>>,
  pub completed_at:    Option<DateTime<Utc>>,
  pub created_at:      DateTime<Utc>,
}

impl Task {
  pub fn is_done(&self) -> bool { self.completed_at.is_some() }

  /// Mark done. Completing an already completed task keeps the first
  /// completion time.
  pub fn complete(&mut self, now: DateTime<Utc>) {
    if self.completed_at.is_none() {
      self.completed_at = Some(now);
    }
  }

  pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
    !self.is_done() && self.due_at.is_some_and(|due| due < now)
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewTask {
  #[serde(default)]
  pub lead_id:     Option<Uuid>,
  pub title:       String,
  #[serde(default)]
  pub description: Option<String>,
  #[serde(default)]
  pub due_at:      Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskQuery {
  pub lead_id:   Option<Uuid>,
  /// `Some(false)` lists only open tasks.
  pub completed: Option<bool>,
}

// ─── Audit trail ─────────────────────────────────────────────────────────────

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
pub enum ActivityAction {
  Created,
  StatusChanged,
  Updated,
  Deleted,
  EmailReceived,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LeadActivity {
  pub activity_id: Uuid,
  pub lead_id:     Uuid,
  pub action:      ActivityAction,
  pub from_status: Option<LeadStatus>,
  pub to_status:   Option<LeadStatus>,
  pub actor:       Option<String>,
  pub description: Option<String>,
  pub recorded_at: DateTime<Utc>,
}

impl LeadActivity {
  pub fn new(lead_id: Uuid, action: ActivityAction, now: DateTime<Utc>) -> Self {
    Self {
      activity_id: Uuid::new_v4(),
      lead_id,
      action,
      from_status: None,
      to_status: None,
      actor: None,
      description: None,
      recorded_at: now,
    }
  }

  pub fn status_change(lead_id: Uuid, from: LeadStatus, to: LeadStatus, now: DateTime<Utc>) -> Self {
    Self {
      from_status: Some(from),
      to_status: Some(to),
      description: Some(format!("{from} → {to}")),
      ..Self::new(lead_id, ActivityAction::StatusChanged, now)
    }
  }

  pub fn with_description(mut self, text: impl Into<String>) -> Self {
    self.description = Some(text.into());
    self
  }
}

#[cfg(test)]
mod tests {
  use chrono::Duration;

  use super::*;

  fn task(due: Option<DateTime<Utc>>) -> Task {
    Task {
      task_id: Uuid::new_v4(),
      organization_id: Uuid::new_v4(),
      lead_id: None,
      title: "Ligar".into(),
      description: None,
      due_at: due,
      completed_at: None,
      created_at: Utc::now(),
    }
  }

  #[test]
  fn completing_twice_keeps_first_time() {
    let now = Utc::now();
    let mut t = task(None);
    t.complete(now);
    t.complete(now + Duration::hours(1));
    assert_eq!(t.completed_at, Some(now));
  }

  #[test]
  fn overdue_only_when_open() {
    let now = Utc::now();
    let mut t = task(Some(now - Duration::days(1)));
    assert!(t.is_overdue(now));
    t.complete(now);
    assert!(!t.is_overdue(now));
    assert!(!task(None).is_overdue(now));
  }

  #[test]
  fn status_change_describes_transition() {
    let a = LeadActivity::status_change(
      Uuid::new_v4(),
      LeadStatus::NovoLead,
      LeadStatus::Proposta,
      Utc::now(),
    );
    assert_eq!(a.action, ActivityAction::StatusChanged);
    assert_eq!(a.description.as_deref(), Some("novo_lead → proposta"));
  }
}
