//! [`CrmStore`] for [`SqliteStore`]: organizations, leads and everything
//! hanging off them, goals, and subscriptions.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, SubsecRound as _, Utc};
use insightfy_core::{
  activity::{ActivityAction, Interaction, LeadActivity, NewInteraction, NewTask, Task, TaskQuery},
  billing::{BillingEvent, Subscription, SubscriptionStatus},
  goal::{Goal, GoalInputs, GoalPatch, GoalStatus, NewGoal},
  lead::{Lead, LeadPatch, LeadQuery, LeadSelection, LeadStatus, NewLead},
  metrics::Funnel,
  org::Organization,
  store::{AdsStore as _, CrmStore, InsightScope},
};
use rusqlite::{Connection, OptionalExtension as _, params};
use uuid::Uuid;

use crate::{
  Error, Result,
  encode::{
    RawActivity, RawGoal, RawInteraction, RawLead, RawOrganization, RawSubscription, RawTask,
    day_after, day_start, encode_date, encode_dt, encode_uuid, now,
  },
  error::in_call,
  filter::Filter,
  store::SqliteStore,
};

const DEFAULT_LEAD_LIMIT: usize = 100;
const MAX_LEAD_LIMIT: usize = 1000;

/// Minimum length of an id prefix accepted as an inbound-email alias.
const MIN_ALIAS_PREFIX: usize = 8;

// ─── Row helpers ─────────────────────────────────────────────────────────────
//
// Plain functions over a connection so they can run inside one transaction.

fn load_live_lead(conn: &Connection, org: &str, id: &str) -> rusqlite::Result<Option<RawLead>> {
  let sql = format!(
    "SELECT {} FROM leads
     WHERE lead_id = ?1 AND organization_id = ?2 AND deleted_at IS NULL",
    RawLead::COLUMNS
  );
  conn.query_row(&sql, params![id, org], RawLead::from_row).optional()
}

/// Insert `lead`. With `skip_duplicate`, an existing external lead id in the
/// same organization makes this a no-op returning `false`.
fn insert_lead(conn: &Connection, lead: &Lead, skip_duplicate: bool) -> rusqlite::Result<bool> {
  let on_conflict = if skip_duplicate { "ON CONFLICT (organization_id, external_lead_id) DO NOTHING" } else { "" };
  let sql = format!(
    "INSERT INTO leads (
       lead_id, organization_id, title, name, email, phone, company, description,
       status, source, priority, value, external_lead_id, campaign_id, ad_external_id,
       adset_external_id, lead_source_detail, assignee_id, assignee_name, lead_score,
       closed_won_at, created_at, updated_at, deleted_at
     ) VALUES (
       ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12,
       ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, NULL
     ) {on_conflict}"
  );
  let written = conn.execute(&sql, params![
    encode_uuid(lead.lead_id),
    encode_uuid(lead.organization_id),
    lead.title,
    lead.name,
    lead.email,
    lead.phone,
    lead.company,
    lead.description,
    lead.status.to_string(),
    lead.source.to_string(),
    lead.priority.to_string(),
    lead.value,
    lead.external_lead_id,
    lead.campaign_id.map(encode_uuid),
    lead.ad_external_id,
    lead.adset_external_id,
    lead.lead_source_detail,
    lead.assignee_id.map(encode_uuid),
    lead.assignee_name,
    lead.lead_score,
    lead.closed_won_at.map(encode_dt),
    encode_dt(lead.created_at),
    encode_dt(lead.updated_at),
  ])?;
  Ok(written == 1)
}

/// Write back every mutable column of `lead`.
fn write_lead(conn: &Connection, lead: &Lead) -> rusqlite::Result<()> {
  conn.execute(
    "UPDATE leads SET
       title = ?2, name = ?3, email = ?4, phone = ?5, company = ?6, description = ?7,
       status = ?8, priority = ?9, value = ?10, campaign_id = ?11, assignee_id = ?12,
       assignee_name = ?13, lead_score = ?14, closed_won_at = ?15, updated_at = ?16
     WHERE lead_id = ?1",
    params![
      encode_uuid(lead.lead_id),
      lead.title,
      lead.name,
      lead.email,
      lead.phone,
      lead.company,
      lead.description,
      lead.status.to_string(),
      lead.priority.to_string(),
      lead.value,
      lead.campaign_id.map(encode_uuid),
      lead.assignee_id.map(encode_uuid),
      lead.assignee_name,
      lead.lead_score,
      lead.closed_won_at.map(encode_dt),
      encode_dt(lead.updated_at),
    ],
  )?;
  Ok(())
}

fn insert_activity(conn: &Connection, entry: &LeadActivity) -> rusqlite::Result<()> {
  conn.execute(
    "INSERT INTO lead_activity (
       activity_id, lead_id, action, from_status, to_status, actor, description, recorded_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    params![
      encode_uuid(entry.activity_id),
      encode_uuid(entry.lead_id),
      entry.action.to_string(),
      entry.from_status.map(|s| s.to_string()),
      entry.to_status.map(|s| s.to_string()),
      entry.actor,
      entry.description,
      encode_dt(entry.recorded_at),
    ],
  )?;
  Ok(())
}

/// Load, patch and write one live lead, recording what changed.
fn patch_lead(
  conn: &Connection,
  org: &str,
  id: &str,
  patch: &LeadPatch,
  now: DateTime<Utc>,
) -> tokio_rusqlite::Result<Option<Lead>> {
  let Some(raw) = load_live_lead(conn, org, id)? else {
    return Ok(None);
  };
  let mut lead = raw.into_lead().map_err(in_call)?;
  let before = lead.status;

  // Re-sending the current status must not restamp closed_won_at.
  let patch = if patch.status == Some(before) {
    LeadPatch { status: None, ..patch.clone() }
  } else {
    patch.clone().normalize(now)
  };
  patch.apply_to(&mut lead);
  lead.updated_at = now;
  write_lead(conn, &lead)?;

  let entry = if lead.status != before {
    LeadActivity::status_change(lead.lead_id, before, lead.status, now)
  } else {
    LeadActivity::new(lead.lead_id, ActivityAction::Updated, now)
  };
  insert_activity(conn, &entry)?;
  Ok(Some(lead))
}

fn soft_delete_lead(conn: &Connection, org: &str, id: &str, now: DateTime<Utc>) -> tokio_rusqlite::Result<bool> {
  let at = encode_dt(now);
  let n = conn.execute(
    "UPDATE leads SET deleted_at = ?1, updated_at = ?1
     WHERE lead_id = ?2 AND organization_id = ?3 AND deleted_at IS NULL",
    params![at, id, org],
  )?;
  if n == 0 {
    return Ok(false);
  }
  let lead_id = Uuid::parse_str(id).map_err(|e| in_call(e.into()))?;
  insert_activity(conn, &LeadActivity::new(lead_id, ActivityAction::Deleted, now))?;
  Ok(true)
}

fn lead_from_input(organization_id: Uuid, input: NewLead, now: DateTime<Utc>) -> Lead {
  Lead {
    lead_id: Uuid::new_v4(),
    organization_id,
    title: input.title,
    name: input.name,
    email: input.email,
    phone: input.phone,
    company: input.company,
    description: input.description,
    status: input.status,
    source: input.source,
    priority: input.priority,
    value: input.value,
    external_lead_id: input.external_lead_id,
    campaign_id: input.campaign_id,
    ad_external_id: input.ad_external_id,
    adset_external_id: input.adset_external_id,
    lead_source_detail: input.lead_source_detail,
    assignee_id: input.assignee_id,
    assignee_name: input.assignee_name,
    lead_score: input.lead_score,
    closed_won_at: input.status.is_won().then_some(now),
    created_at: input.created_at.map_or(now, |t| t.trunc_subsecs(6)),
    updated_at: now,
    deleted_at: None,
  }
}

fn select_subscription(conn: &Connection, id: &str) -> rusqlite::Result<Option<RawSubscription>> {
  let sql = format!("SELECT {} FROM subscriptions WHERE subscription_id = ?1", RawSubscription::COLUMNS);
  conn.query_row(&sql, params![id], RawSubscription::from_row).optional()
}

/// The local subscription most recently linked to a Stripe subscription.
fn subscription_for_stripe(conn: &Connection, stripe_id: &str) -> rusqlite::Result<Option<String>> {
  conn
    .query_row(
      "SELECT subscription_id FROM subscriptions
       WHERE stripe_subscription_id = ?1
       ORDER BY updated_at DESC LIMIT 1",
      params![stripe_id],
      |r| r.get(0),
    )
    .optional()
}

impl SqliteStore {
  async fn load_goal(&self, org: Uuid, goal_id: Uuid) -> Result<Option<Goal>> {
    let org_str = encode_uuid(org);
    let id_str  = encode_uuid(goal_id);

    let raw: Option<RawGoal> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {} FROM goals WHERE goal_id = ?1 AND organization_id = ?2",
          RawGoal::COLUMNS
        );
        Ok(conn.query_row(&sql, params![id_str, org_str], RawGoal::from_row).optional()?)
      })
      .await?;

    raw.map(RawGoal::into_goal).transpose()
  }

  async fn save_goal(&self, goal: &Goal) -> Result<()> {
    let id_str      = encode_uuid(goal.goal_id);
    let title       = goal.title.clone();
    let description = goal.description.clone();
    let target      = goal.target_value;
    let current     = goal.current_value;
    let start_str   = encode_date(goal.period_start);
    let end_str     = encode_date(goal.period_end);
    let status      = goal.status.to_string();
    let updated_str = encode_dt(goal.updated_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE goals SET
             title = ?2, description = ?3, target_value = ?4, current_value = ?5,
             period_start = ?6, period_end = ?7, status = ?8, updated_at = ?9
           WHERE goal_id = ?1",
          params![id_str, title, description, target, current, start_str, end_str, status, updated_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── CrmStore impl ───────────────────────────────────────────────────────────

impl CrmStore for SqliteStore {
  type Error = Error;

  // ── Organizations ─────────────────────────────────────────────────────────

  async fn create_organization(&self, name: String, slug: String) -> Result<Organization> {
    let org = Organization {
      organization_id: Uuid::new_v4(),
      name,
      slug: slug.trim().to_lowercase(),
      created_at: now(),
    };

    let id_str = encode_uuid(org.organization_id);
    let name   = org.name.clone();
    let slug   = org.slug.clone();
    let at_str = encode_dt(org.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO organizations (organization_id, name, slug, created_at) VALUES (?1, ?2, ?3, ?4)",
          params![id_str, name, slug, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(org)
  }

  async fn get_organization(&self, organization_id: Uuid) -> Result<Option<Organization>> {
    let id_str = encode_uuid(organization_id);

    let raw: Option<RawOrganization> = self
      .conn
      .call(move |conn| {
        let sql = format!("SELECT {} FROM organizations WHERE organization_id = ?1", RawOrganization::COLUMNS);
        Ok(conn.query_row(&sql, params![id_str], RawOrganization::from_row).optional()?)
      })
      .await?;

    raw.map(RawOrganization::into_organization).transpose()
  }

  async fn list_organizations(&self) -> Result<Vec<Organization>> {
    let raws: Vec<RawOrganization> = self
      .conn
      .call(|conn| {
        let sql = format!("SELECT {} FROM organizations ORDER BY name", RawOrganization::COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map([], RawOrganization::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawOrganization::into_organization).collect()
  }

  async fn find_organization_by_alias(&self, alias: String) -> Result<Option<Organization>> {
    let alias = alias.trim().to_lowercase();
    if alias.is_empty() {
      return Ok(None);
    }

    let raw: Option<RawOrganization> = self
      .conn
      .call(move |conn| {
        let by_slug = format!("SELECT {} FROM organizations WHERE slug = ?1", RawOrganization::COLUMNS);
        if let Some(raw) = conn.query_row(&by_slug, params![alias], RawOrganization::from_row).optional()? {
          return Ok(Some(raw));
        }
        if alias.len() < MIN_ALIAS_PREFIX {
          return Ok(None);
        }
        // An ambiguous prefix resolves to nothing.
        let by_prefix = format!(
          "SELECT {} FROM organizations
           WHERE substr(organization_id, 1, length(?1)) = ?1
           LIMIT 2",
          RawOrganization::COLUMNS
        );
        let mut stmt = conn.prepare(&by_prefix)?;
        let mut rows = stmt
          .query_map(params![alias], RawOrganization::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(if rows.len() == 1 { rows.pop() } else { None })
      })
      .await?;

    raw.map(RawOrganization::into_organization).transpose()
  }

  // ── Leads ─────────────────────────────────────────────────────────────────

  async fn create_lead(&self, organization_id: Uuid, input: NewLead) -> Result<Lead> {
    let now  = now();
    let lead = lead_from_input(organization_id, input, now);
    let row  = lead.clone();

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        insert_lead(&tx, &row, false)?;
        insert_activity(
          &tx,
          &LeadActivity::new(row.lead_id, ActivityAction::Created, now)
            .with_description(format!("source: {}", row.source)),
        )?;
        tx.commit()?;
        Ok(())
      })
      .await?;

    Ok(lead)
  }

  async fn create_lead_if_new(&self, organization_id: Uuid, input: NewLead) -> Result<Option<Lead>> {
    let now  = now();
    let lead = lead_from_input(organization_id, input, now);
    let row  = lead.clone();

    let inserted = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let inserted = insert_lead(&tx, &row, true)?;
        if inserted {
          insert_activity(
            &tx,
            &LeadActivity::new(row.lead_id, ActivityAction::Created, now)
              .with_description(format!("source: {}", row.source)),
          )?;
        }
        tx.commit()?;
        Ok(inserted)
      })
      .await?;

    Ok(inserted.then_some(lead))
  }

  async fn existing_external_leads(
    &self,
    organization_id: Uuid,
    external_ids: Vec<String>,
  ) -> Result<HashSet<String>> {
    if external_ids.is_empty() {
      return Ok(HashSet::new());
    }
    let mut filter = Filter::new();
    filter
      .eq("organization_id", encode_uuid(organization_id))
      .any_of("external_lead_id", external_ids);

    let found: Vec<String> = self
      .conn
      .call(move |conn| {
        let sql = format!("SELECT external_lead_id FROM leads {}", filter.clause());
        let mut stmt = conn.prepare(&sql)?;
        Ok(filter.query(&mut stmt, |r| r.get(0))?)
      })
      .await?;

    Ok(found.into_iter().collect())
  }

  async fn get_lead(&self, organization_id: Uuid, lead_id: Uuid) -> Result<Option<Lead>> {
    let org_str = encode_uuid(organization_id);
    let id_str  = encode_uuid(lead_id);

    let raw = self
      .conn
      .call(move |conn| Ok(load_live_lead(conn, &org_str, &id_str)?))
      .await?;

    raw.map(RawLead::into_lead).transpose()
  }

  async fn list_leads(&self, organization_id: Uuid, q: LeadQuery) -> Result<Vec<Lead>> {
    let mut filter = Filter::new();
    filter
      .eq("organization_id", encode_uuid(organization_id))
      .raw("deleted_at IS NULL")
      .eq_opt("status", q.status.map(|s| s.to_string()))
      .eq_opt("source", q.source.map(|s| s.to_string()))
      .eq_opt("campaign_id", q.campaign_id.map(encode_uuid))
      .eq_opt("assignee_id", q.assignee_id.map(encode_uuid));
    if let Some(after) = q.created_after {
      filter.cmp("created_at", ">=", encode_dt(after));
    }
    if let Some(before) = q.created_before {
      filter.cmp("created_at", "<", encode_dt(before));
    }
    if let Some(text) = q.text.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
      filter.contains(&["title", "name", "email", "company"], text);
    }
    let limit  = q.limit.unwrap_or(DEFAULT_LEAD_LIMIT).clamp(1, MAX_LEAD_LIMIT);
    let offset = q.offset.unwrap_or(0);

    let raws: Vec<RawLead> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {} FROM leads {} ORDER BY created_at DESC LIMIT {limit} OFFSET {offset}",
          RawLead::COLUMNS,
          filter.clause()
        );
        let mut stmt = conn.prepare(&sql)?;
        Ok(filter.query(&mut stmt, RawLead::from_row)?)
      })
      .await?;

    raws.into_iter().map(RawLead::into_lead).collect()
  }

  async fn update_lead(&self, organization_id: Uuid, lead_id: Uuid, patch: LeadPatch) -> Result<Option<Lead>> {
    let org_str = encode_uuid(organization_id);
    let id_str  = encode_uuid(lead_id);
    let now     = now();

    let lead = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let lead = patch_lead(&tx, &org_str, &id_str, &patch, now)?;
        tx.commit()?;
        Ok(lead)
      })
      .await?;

    Ok(lead)
  }

  async fn bulk_update_leads(&self, selection: LeadSelection, patch: LeadPatch) -> Result<usize> {
    let org_str = encode_uuid(selection.organization_id);
    let ids: Vec<String> = selection.lead_ids.into_iter().map(encode_uuid).collect();
    let now = now();

    let changed = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut changed = 0;
        for id in &ids {
          if patch_lead(&tx, &org_str, id, &patch, now)?.is_some() {
            changed += 1;
          }
        }
        tx.commit()?;
        Ok(changed)
      })
      .await?;

    tracing::debug!(changed, "bulk lead update");
    Ok(changed)
  }

  async fn delete_lead(&self, organization_id: Uuid, lead_id: Uuid) -> Result<bool> {
    let org_str = encode_uuid(organization_id);
    let id_str  = encode_uuid(lead_id);
    let now     = now();

    let deleted = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let deleted = soft_delete_lead(&tx, &org_str, &id_str, now)?;
        tx.commit()?;
        Ok(deleted)
      })
      .await?;

    Ok(deleted)
  }

  async fn bulk_delete_leads(&self, selection: LeadSelection) -> Result<usize> {
    let org_str = encode_uuid(selection.organization_id);
    let ids: Vec<String> = selection.lead_ids.into_iter().map(encode_uuid).collect();
    let now = now();

    let deleted = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut deleted = 0;
        for id in &ids {
          if soft_delete_lead(&tx, &org_str, id, now)? {
            deleted += 1;
          }
        }
        tx.commit()?;
        Ok(deleted)
      })
      .await?;

    tracing::debug!(deleted, "bulk lead delete");
    Ok(deleted)
  }

  // ── Interactions, activity, tasks ─────────────────────────────────────────

  async fn add_interaction(
    &self,
    organization_id: Uuid,
    lead_id: Uuid,
    input: NewInteraction,
  ) -> Result<Option<Interaction>> {
    let interaction = Interaction {
      interaction_id: Uuid::new_v4(),
      organization_id,
      lead_id,
      kind: input.kind,
      direction: input.direction,
      subject: input.subject,
      content: input.content,
      user_name: input.user_name,
      occurred_at: input.occurred_at.map_or_else(now, |t| t.trunc_subsecs(6)),
    };
    let row = interaction.clone();

    let inserted = self
      .conn
      .call(move |conn| {
        let org_str  = encode_uuid(row.organization_id);
        let lead_str = encode_uuid(row.lead_id);
        if load_live_lead(conn, &org_str, &lead_str)?.is_none() {
          return Ok(false);
        }
        conn.execute(
          "INSERT INTO interactions (
             interaction_id, organization_id, lead_id, kind, direction,
             subject, content, user_name, occurred_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
          params![
            encode_uuid(row.interaction_id),
            org_str,
            lead_str,
            row.kind.to_string(),
            row.direction.to_string(),
            row.subject,
            row.content,
            row.user_name,
            encode_dt(row.occurred_at),
          ],
        )?;
        Ok(true)
      })
      .await?;

    Ok(inserted.then_some(interaction))
  }

  async fn interactions(&self, organization_id: Uuid, lead_id: Uuid) -> Result<Vec<Interaction>> {
    let org_str  = encode_uuid(organization_id);
    let lead_str = encode_uuid(lead_id);

    let raws: Vec<RawInteraction> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {} FROM interactions
           WHERE organization_id = ?1 AND lead_id = ?2
           ORDER BY occurred_at DESC",
          RawInteraction::COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(params![org_str, lead_str], RawInteraction::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawInteraction::into_interaction).collect()
  }

  async fn record_activity(&self, entry: LeadActivity) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        insert_activity(conn, &entry)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn lead_activity(&self, organization_id: Uuid, lead_id: Uuid) -> Result<Vec<LeadActivity>> {
    let org_str  = encode_uuid(organization_id);
    let lead_str = encode_uuid(lead_id);

    let raws: Vec<RawActivity> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {} FROM lead_activity a
           JOIN leads l ON l.lead_id = a.lead_id
           WHERE l.organization_id = ?1 AND a.lead_id = ?2
           ORDER BY a.recorded_at DESC",
          RawActivity::COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(params![org_str, lead_str], RawActivity::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawActivity::into_activity).collect()
  }

  async fn create_task(&self, organization_id: Uuid, input: NewTask) -> Result<Task> {
    let task = Task {
      task_id: Uuid::new_v4(),
      organization_id,
      lead_id: input.lead_id,
      title: input.title,
      description: input.description,
      due_at: input.due_at.map(|t| t.trunc_subsecs(6)),
      completed_at: None,
      created_at: now(),
    };
    let row = task.clone();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO tasks (
             task_id, organization_id, lead_id, title, description, due_at, completed_at, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, ?7)",
          params![
            encode_uuid(row.task_id),
            encode_uuid(row.organization_id),
            row.lead_id.map(encode_uuid),
            row.title,
            row.description,
            row.due_at.map(encode_dt),
            encode_dt(row.created_at),
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(task)
  }

  async fn tasks(&self, organization_id: Uuid, q: TaskQuery) -> Result<Vec<Task>> {
    let mut filter = Filter::new();
    filter
      .eq("organization_id", encode_uuid(organization_id))
      .eq_opt("lead_id", q.lead_id.map(encode_uuid));
    if let Some(done) = q.completed {
      filter.raw(if done { "completed_at IS NOT NULL" } else { "completed_at IS NULL" });
    }

    let raws: Vec<RawTask> = self
      .conn
      .call(move |conn| {
        // Open tasks first, then by due date with undated tasks last.
        let sql = format!(
          "SELECT {} FROM tasks {}
           ORDER BY completed_at IS NOT NULL, due_at IS NULL, due_at, created_at",
          RawTask::COLUMNS,
          filter.clause()
        );
        let mut stmt = conn.prepare(&sql)?;
        Ok(filter.query(&mut stmt, RawTask::from_row)?)
      })
      .await?;

    raws.into_iter().map(RawTask::into_task).collect()
  }

  async fn complete_task(&self, organization_id: Uuid, task_id: Uuid) -> Result<Option<Task>> {
    let org_str = encode_uuid(organization_id);
    let id_str  = encode_uuid(task_id);
    let now     = now();

    let raw: Option<RawTask> = self
      .conn
      .call(move |conn| {
        // COALESCE keeps the first completion time.
        conn.execute(
          "UPDATE tasks SET completed_at = COALESCE(completed_at, ?1)
           WHERE task_id = ?2 AND organization_id = ?3",
          params![encode_dt(now), id_str, org_str],
        )?;
        let sql = format!(
          "SELECT {} FROM tasks WHERE task_id = ?1 AND organization_id = ?2",
          RawTask::COLUMNS
        );
        Ok(conn.query_row(&sql, params![id_str, org_str], RawTask::from_row).optional()?)
      })
      .await?;

    raw.map(RawTask::into_task).transpose()
  }

  // ── Goals ─────────────────────────────────────────────────────────────────

  async fn create_goal(&self, organization_id: Uuid, input: NewGoal) -> Result<Goal> {
    input.validate()?;
    let now = now();
    let goal = Goal {
      goal_id: Uuid::new_v4(),
      organization_id,
      title: input.title,
      description: input.description,
      goal_type: input.goal_type,
      target_value: input.target_value,
      current_value: input.start_value,
      start_value: input.start_value,
      period_start: input.period_start,
      period_end: input.period_end,
      meta_account_id: input.meta_account_id,
      meta_campaign_id: input.meta_campaign_id,
      status: GoalStatus::Active,
      created_at: now,
      updated_at: now,
    };
    let row = goal.clone();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO goals (
             goal_id, organization_id, title, description, goal_type, target_value,
             current_value, start_value, period_start, period_end, meta_account_id,
             meta_campaign_id, status, created_at, updated_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
          params![
            encode_uuid(row.goal_id),
            encode_uuid(row.organization_id),
            row.title,
            row.description,
            row.goal_type.to_string(),
            row.target_value,
            row.current_value,
            row.start_value,
            encode_date(row.period_start),
            encode_date(row.period_end),
            row.meta_account_id.map(encode_uuid),
            row.meta_campaign_id.map(encode_uuid),
            row.status.to_string(),
            encode_dt(row.created_at),
            encode_dt(row.updated_at),
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(goal)
  }

  async fn goals(&self, organization_id: Uuid) -> Result<Vec<Goal>> {
    let org_str = encode_uuid(organization_id);

    let raws: Vec<RawGoal> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {} FROM goals WHERE organization_id = ?1 ORDER BY created_at DESC",
          RawGoal::COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(params![org_str], RawGoal::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawGoal::into_goal).collect()
  }

  async fn get_goal(&self, organization_id: Uuid, goal_id: Uuid) -> Result<Option<Goal>> {
    self.load_goal(organization_id, goal_id).await
  }

  async fn update_goal(&self, organization_id: Uuid, goal_id: Uuid, patch: GoalPatch) -> Result<Option<Goal>> {
    let Some(mut goal) = self.load_goal(organization_id, goal_id).await? else {
      return Ok(None);
    };
    patch.apply_to(&mut goal)?;
    goal.updated_at = now();
    self.save_goal(&goal).await?;
    Ok(Some(goal))
  }

  async fn set_goal_value(&self, organization_id: Uuid, goal_id: Uuid, value: f64) -> Result<Option<Goal>> {
    let Some(mut goal) = self.load_goal(organization_id, goal_id).await? else {
      return Ok(None);
    };
    goal.current_value = value;
    goal.updated_at = now();
    self.save_goal(&goal).await?;
    Ok(Some(goal))
  }

  async fn delete_goal(&self, organization_id: Uuid, goal_id: Uuid) -> Result<bool> {
    let org_str = encode_uuid(organization_id);
    let id_str  = encode_uuid(goal_id);

    let n = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM goals WHERE goal_id = ?1 AND organization_id = ?2",
          params![id_str, org_str],
        )?)
      })
      .await?;

    Ok(n > 0)
  }

  async fn goal_inputs(&self, goal: Goal) -> Result<GoalInputs> {
    let org_str   = encode_uuid(goal.organization_id);
    let from_str  = day_start(goal.period_start);
    let until_str = day_after(goal.period_end);
    // Lead totals follow the campaign filter only for ad-driven goals (ROAS).
    let campaign_str = goal
      .goal_type
      .uses_ad_data()
      .then_some(goal.meta_campaign_id)
      .flatten()
      .map(encode_uuid);
    let won  = LeadStatus::FechadoGanho.to_string();
    let lost = LeadStatus::FechadoPerdido.to_string();

    let mut inputs: GoalInputs = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          "SELECT
             COALESCE(SUM(CASE WHEN status = ?5 AND closed_won_at >= ?2 AND closed_won_at < ?3
                               THEN value ELSE 0 END), 0),
             COALESCE(SUM(CASE WHEN status = ?5 AND closed_won_at >= ?2 AND closed_won_at < ?3
                               THEN 1 ELSE 0 END), 0),
             COALESCE(SUM(CASE WHEN status = ?5 AND created_at >= ?2 AND created_at < ?3
                               THEN 1 ELSE 0 END), 0),
             COALESCE(SUM(CASE WHEN status = ?6 AND created_at >= ?2 AND created_at < ?3
                               THEN 1 ELSE 0 END), 0),
             COALESCE(SUM(CASE WHEN created_at >= ?2 AND created_at < ?3 THEN 1 ELSE 0 END), 0),
             COALESCE(SUM(CASE WHEN status NOT IN (?5, ?6) THEN value ELSE 0 END), 0)
           FROM leads
           WHERE organization_id = ?1
             AND deleted_at IS NULL
             AND (?4 IS NULL OR campaign_id = ?4)",
          params![org_str, from_str, until_str, campaign_str, won, lost],
          |r| {
            Ok(GoalInputs {
              won_revenue: r.get(0)?,
              won_count: r.get(1)?,
              decided_won: r.get(2)?,
              decided_lost: r.get(3)?,
              leads_created: r.get(4)?,
              pipeline_value: r.get(5)?,
              ..GoalInputs::default()
            })
          },
        )?)
      })
      .await?;

    if goal.goal_type.uses_ad_data() {
      let (totals, days) = self
        .insight_totals(InsightScope {
          organization_id: goal.organization_id,
          since:           goal.period_start,
          until:           goal.period_end,
          ad_account_id:   goal.meta_account_id,
          campaign_id:     goal.meta_campaign_id,
        })
        .await?;
      inputs.spend = totals.spend;
      inputs.impressions = totals.impressions;
      inputs.clicks = totals.clicks;
      inputs.ad_leads = totals.leads_count;
      inputs.reach = totals.reach;
      inputs.insight_days = days;
    }

    Ok(inputs)
  }

  async fn funnel(&self, organization_id: Uuid, since: NaiveDate, until: NaiveDate) -> Result<(Funnel, f64)> {
    let org_str   = encode_uuid(organization_id);
    let from_str  = day_start(since);
    let until_str = day_after(until);
    let won       = LeadStatus::FechadoGanho.to_string();

    let (leads, won_count, revenue): (i64, i64, f64) = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          "SELECT
             COUNT(*),
             COALESCE(SUM(CASE WHEN status = ?4 THEN 1 ELSE 0 END), 0),
             COALESCE(SUM(CASE WHEN status = ?4 THEN value ELSE 0 END), 0)
           FROM leads
           WHERE organization_id = ?1
             AND deleted_at IS NULL
             AND created_at >= ?2 AND created_at < ?3",
          params![org_str, from_str, until_str, won],
          |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )?)
      })
      .await?;

    let (totals, _) = self
      .insight_totals(InsightScope {
        organization_id,
        since,
        until,
        ad_account_id: None,
        campaign_id: None,
      })
      .await?;

    let funnel = Funnel {
      impressions: totals.impressions,
      clicks:      totals.clicks,
      leads,
      won:         won_count,
    };
    Ok((funnel, revenue))
  }

  // ── Billing ───────────────────────────────────────────────────────────────

  async fn create_subscription(&self, organization_id: Uuid, plan_id: String) -> Result<Subscription> {
    let sub = Subscription {
      subscription_id:        Uuid::new_v4(),
      organization_id,
      plan_id,
      status:                 SubscriptionStatus::Trialing,
      stripe_subscription_id: None,
      stripe_customer_id:     None,
      current_period_start:   None,
      current_period_end:     None,
      last_payment_date:      None,
      last_payment_amount:    None,
      canceled_at:            None,
      updated_at:             now(),
    };
    let row = sub.clone();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO subscriptions (subscription_id, organization_id, plan_id, status, updated_at)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          params![
            encode_uuid(row.subscription_id),
            encode_uuid(row.organization_id),
            row.plan_id,
            row.status.to_string(),
            encode_dt(row.updated_at),
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(sub)
  }

  async fn subscription(&self, organization_id: Uuid) -> Result<Option<Subscription>> {
    let org_str = encode_uuid(organization_id);

    let raw: Option<RawSubscription> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {} FROM subscriptions WHERE organization_id = ?1 ORDER BY updated_at DESC LIMIT 1",
          RawSubscription::COLUMNS
        );
        Ok(conn.query_row(&sql, params![org_str], RawSubscription::from_row).optional()?)
      })
      .await?;

    raw.map(RawSubscription::into_subscription).transpose()
  }

  async fn apply_billing_event(&self, event: BillingEvent, now: DateTime<Utc>) -> Result<Option<Subscription>> {
    if let BillingEvent::Ignored(reason) = &event {
      tracing::debug!(%reason, "billing event ignored");
      return Ok(None);
    }
    let at_str = encode_dt(now.trunc_subsecs(6));

    let raw: Option<RawSubscription> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let id = match event {
          BillingEvent::CheckoutCompleted { subscription_id, stripe_subscription_id, stripe_customer_id } => {
            let id = encode_uuid(subscription_id);
            let n = tx.execute(
              "UPDATE subscriptions SET
                 status                 = ?2,
                 stripe_subscription_id = COALESCE(?3, stripe_subscription_id),
                 stripe_customer_id     = COALESCE(?4, stripe_customer_id),
                 updated_at             = ?5
               WHERE subscription_id = ?1",
              params![
                id,
                SubscriptionStatus::Active.to_string(),
                stripe_subscription_id,
                stripe_customer_id,
                at_str,
              ],
            )?;
            (n > 0).then_some(id)
          }
          BillingEvent::PaymentSucceeded { stripe_subscription_id, invoice_id, amount, status, paid_at } => {
            let id = subscription_for_stripe(&tx, &stripe_subscription_id)?;
            if let Some(id) = &id {
              let paid_str = paid_at.map(encode_dt);
              tx.execute(
                "INSERT INTO subscription_payments (
                   payment_id, subscription_id, external_invoice_id, amount, status, paid_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT (external_invoice_id) DO UPDATE SET
                   amount  = excluded.amount,
                   status  = excluded.status,
                   paid_at = excluded.paid_at",
                params![encode_uuid(Uuid::new_v4()), id, invoice_id, amount, status, paid_str],
              )?;
              tx.execute(
                "UPDATE subscriptions SET
                   status              = ?2,
                   last_payment_date   = COALESCE(?3, ?5),
                   last_payment_amount = ?4,
                   updated_at          = ?5
                 WHERE subscription_id = ?1",
                params![id, SubscriptionStatus::Active.to_string(), paid_str, amount, at_str],
              )?;
            }
            id
          }
          BillingEvent::PaymentFailed { stripe_subscription_id } => {
            let id = subscription_for_stripe(&tx, &stripe_subscription_id)?;
            if let Some(id) = &id {
              tx.execute(
                "UPDATE subscriptions SET status = ?2, updated_at = ?3 WHERE subscription_id = ?1",
                params![id, SubscriptionStatus::PastDue.to_string(), at_str],
              )?;
            }
            id
          }
          BillingEvent::SubscriptionDeleted { stripe_subscription_id } => {
            let id = subscription_for_stripe(&tx, &stripe_subscription_id)?;
            if let Some(id) = &id {
              tx.execute(
                "UPDATE subscriptions SET status = ?2, canceled_at = ?3, updated_at = ?3
                 WHERE subscription_id = ?1",
                params![id, SubscriptionStatus::Canceled.to_string(), at_str],
              )?;
            }
            id
          }
          BillingEvent::Ignored(_) => None,
        };
        let raw = match id {
          Some(id) => select_subscription(&tx, &id)?,
          None => None,
        };
        tx.commit()?;
        Ok(raw)
      })
      .await?;

    raw.map(RawSubscription::into_subscription).transpose()
  }
}
