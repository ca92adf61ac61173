//! Storage traits.
//!
//! [`AdsStore`] holds the mirrored Meta hierarchy and its daily insights;
//! [`CrmStore`] holds tenants, leads and everything hanging off them. Both
//! are implemented by `insightfy-store-sqlite`. The sync engine, the API and
//! the webhooks depend only on these traits.
//!
//! All methods return `Send` futures so implementations can be shared across
//! tokio worker threads behind an `Arc`.

use std::{
  collections::{HashMap, HashSet},
  future::Future,
};

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::{
  activity::{Interaction, LeadActivity, NewInteraction, NewTask, Task, TaskQuery},
  ads::{AdRef, AdSet, AdSetRef, AdSetUpsert, AdUpsert, Campaign, CampaignUpsert},
  billing::{BillingEvent, Subscription},
  goal::{Goal, GoalInputs, GoalPatch, NewGoal},
  insight::{AdDailyInsight, AdSetDailyInsight, CampaignDailyInsight},
  lead::{Lead, LeadPatch, LeadQuery, LeadSelection, NewLead},
  metrics::{DailyPoint, Funnel, MetricsQuery, MetricsRow, Totals},
  org::{AdAccount, MetaConnection, NewAdAccount, Organization},
};

/// Which ad accounts to load. Empty id lists mean "any".
#[derive(Debug, Clone, Default)]
pub struct AccountFilter {
  pub organization_id: Option<Uuid>,
  pub ad_account_ids:  Vec<Uuid>,
  /// Meta ids, with or without the `act_` prefix.
  pub external_ids:    Vec<String>,
  pub active_only:     bool,
}

/// Scope for ad-spend totals.
#[derive(Debug, Clone, Copy)]
pub struct InsightScope {
  pub organization_id: Uuid,
  pub since:           NaiveDate,
  pub until:           NaiveDate,
  pub ad_account_id:   Option<Uuid>,
  pub campaign_id:     Option<Uuid>,
}

// ─── Ads ─────────────────────────────────────────────────────────────────────

pub trait AdsStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Accounts and connections ──────────────────────────────────────────

  /// Register an ad account. Re-registering the same external id for the
  /// same organization returns the existing row.
  fn add_ad_account(
    &self,
    input: NewAdAccount,
  ) -> impl Future<Output = Result<AdAccount, Self::Error>> + Send + '_;

  fn get_ad_account(
    &self,
    ad_account_id: Uuid,
  ) -> impl Future<Output = Result<Option<AdAccount>, Self::Error>> + Send + '_;

  fn ad_accounts(
    &self,
    filter: AccountFilter,
  ) -> impl Future<Output = Result<Vec<AdAccount>, Self::Error>> + Send + '_;

  fn add_meta_connection(
    &self,
    user_id: Uuid,
    access_token: String,
    token_expires_at: Option<DateTime<Utc>>,
  ) -> impl Future<Output = Result<MetaConnection, Self::Error>> + Send + '_;

  /// The user's most recently connected, active, unexpired connection.
  fn usable_connection(
    &self,
    user_id: Uuid,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<Option<MetaConnection>, Self::Error>> + Send + '_;

  // ── Hierarchy ─────────────────────────────────────────────────────────

  /// Insert or update on `external_id`. Returns the number of rows written.
  fn upsert_campaigns(
    &self,
    rows: Vec<CampaignUpsert>,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  fn upsert_ad_sets(
    &self,
    rows: Vec<AdSetUpsert>,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  fn upsert_ads(
    &self,
    rows: Vec<AdUpsert>,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  fn campaigns(
    &self,
    ad_account_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Campaign>, Self::Error>> + Send + '_;

  fn ad_sets(
    &self,
    ad_account_id: Uuid,
  ) -> impl Future<Output = Result<Vec<AdSet>, Self::Error>> + Send + '_;

  /// Look a campaign up by its Meta id, across all accounts.
  fn find_campaign(
    &self,
    external_id: String,
  ) -> impl Future<Output = Result<Option<Campaign>, Self::Error>> + Send + '_;

  // ── ID maps (external id → internal ids) ──────────────────────────────

  fn campaign_map(
    &self,
    ad_account_id: Uuid,
  ) -> impl Future<Output = Result<HashMap<String, Uuid>, Self::Error>> + Send + '_;

  fn ad_set_map(
    &self,
    ad_account_id: Uuid,
  ) -> impl Future<Output = Result<HashMap<String, AdSetRef>, Self::Error>> + Send + '_;

  fn ad_map(
    &self,
    ad_account_id: Uuid,
  ) -> impl Future<Output = Result<HashMap<String, AdRef>, Self::Error>> + Send + '_;

  // ── Insights ──────────────────────────────────────────────────────────

  /// Upsert on `(campaign_id, date)`. Returns rows written.
  fn upsert_campaign_insights(
    &self,
    rows: Vec<CampaignDailyInsight>,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  /// Upsert on `(ad_set_id, date)`.
  fn upsert_ad_set_insights(
    &self,
    rows: Vec<AdSetDailyInsight>,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  /// Upsert on `(ad_id, date)`.
  fn upsert_ad_insights(
    &self,
    rows: Vec<AdDailyInsight>,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  // ── Reporting ─────────────────────────────────────────────────────────

  /// Per-entity totals at the query's level, restricted to accounts that
  /// belong to `organization_id`.
  fn metrics(
    &self,
    organization_id: Uuid,
    query: MetricsQuery,
  ) -> impl Future<Output = Result<Vec<MetricsRow>, Self::Error>> + Send + '_;

  /// Campaign insights summed per day for an organization, ascending.
  fn daily_series(
    &self,
    organization_id: Uuid,
    since: NaiveDate,
    until: NaiveDate,
  ) -> impl Future<Output = Result<Vec<DailyPoint>, Self::Error>> + Send + '_;

  /// Campaign insight totals and the number of rows summed.
  fn insight_totals(
    &self,
    scope: InsightScope,
  ) -> impl Future<Output = Result<(Totals, i64), Self::Error>> + Send + '_;
}

// ─── CRM ─────────────────────────────────────────────────────────────────────

/// Every lead, task, interaction and goal method takes the caller's
/// organization and never touches rows outside it.
pub trait CrmStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Organizations ─────────────────────────────────────────────────────

  fn create_organization(
    &self,
    name: String,
    slug: String,
  ) -> impl Future<Output = Result<Organization, Self::Error>> + Send + '_;

  fn get_organization(
    &self,
    organization_id: Uuid,
  ) -> impl Future<Output = Result<Option<Organization>, Self::Error>> + Send + '_;

  fn list_organizations(
    &self,
  ) -> impl Future<Output = Result<Vec<Organization>, Self::Error>> + Send + '_;

  /// Resolve an inbound-email local part: exact slug first, then a unique
  /// organization whose id starts with it (at least 8 characters).
  fn find_organization_by_alias(
    &self,
    alias: String,
  ) -> impl Future<Output = Result<Option<Organization>, Self::Error>> + Send + '_;

  // ── Leads ─────────────────────────────────────────────────────────────

  /// Insert a lead and its `created` activity entry.
  fn create_lead(
    &self,
    organization_id: Uuid,
    input: NewLead,
  ) -> impl Future<Output = Result<Lead, Self::Error>> + Send + '_;

  /// Like [`create_lead`](Self::create_lead), but returns `None` without
  /// writing when a lead with the same `external_lead_id` already exists in
  /// the organization.
  fn create_lead_if_new(
    &self,
    organization_id: Uuid,
    input: NewLead,
  ) -> impl Future<Output = Result<Option<Lead>, Self::Error>> + Send + '_;

  /// The subset of `external_ids` already present in the organization.
  fn existing_external_leads(
    &self,
    organization_id: Uuid,
    external_ids: Vec<String>,
  ) -> impl Future<Output = Result<HashSet<String>, Self::Error>> + Send + '_;

  fn get_lead(
    &self,
    organization_id: Uuid,
    lead_id: Uuid,
  ) -> impl Future<Output = Result<Option<Lead>, Self::Error>> + Send + '_;

  fn list_leads(
    &self,
    organization_id: Uuid,
    query: LeadQuery,
  ) -> impl Future<Output = Result<Vec<Lead>, Self::Error>> + Send + '_;

  /// Apply a patch, normalizing `closed_won_at` when the status changes.
  /// `None` if the lead does not exist, belongs to another organization, or
  /// is deleted.
  fn update_lead(
    &self,
    organization_id: Uuid,
    lead_id: Uuid,
    patch: LeadPatch,
  ) -> impl Future<Output = Result<Option<Lead>, Self::Error>> + Send + '_;

  /// Apply one patch to every selected lead in a single transaction.
  /// Returns the number of leads changed.
  fn bulk_update_leads(
    &self,
    selection: LeadSelection,
    patch: LeadPatch,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  /// Soft delete. Returns whether a live lead was deleted.
  fn delete_lead(
    &self,
    organization_id: Uuid,
    lead_id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  fn bulk_delete_leads(
    &self,
    selection: LeadSelection,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  // ── Interactions, activity, tasks ─────────────────────────────────────

  /// `None` if the lead is not a live lead of the organization.
  fn add_interaction(
    &self,
    organization_id: Uuid,
    lead_id: Uuid,
    input: NewInteraction,
  ) -> impl Future<Output = Result<Option<Interaction>, Self::Error>> + Send + '_;

  fn interactions(
    &self,
    organization_id: Uuid,
    lead_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Interaction>, Self::Error>> + Send + '_;

  fn record_activity(
    &self,
    entry: LeadActivity,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Newest first.
  fn lead_activity(
    &self,
    organization_id: Uuid,
    lead_id: Uuid,
  ) -> impl Future<Output = Result<Vec<LeadActivity>, Self::Error>> + Send + '_;

  fn create_task(
    &self,
    organization_id: Uuid,
    input: NewTask,
  ) -> impl Future<Output = Result<Task, Self::Error>> + Send + '_;

  fn tasks(
    &self,
    organization_id: Uuid,
    query: TaskQuery,
  ) -> impl Future<Output = Result<Vec<Task>, Self::Error>> + Send + '_;

  fn complete_task(
    &self,
    organization_id: Uuid,
    task_id: Uuid,
  ) -> impl Future<Output = Result<Option<Task>, Self::Error>> + Send + '_;

  // ── Goals ─────────────────────────────────────────────────────────────

  fn create_goal(
    &self,
    organization_id: Uuid,
    input: NewGoal,
  ) -> impl Future<Output = Result<Goal, Self::Error>> + Send + '_;

  fn goals(
    &self,
    organization_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Goal>, Self::Error>> + Send + '_;

  fn get_goal(
    &self,
    organization_id: Uuid,
    goal_id: Uuid,
  ) -> impl Future<Output = Result<Option<Goal>, Self::Error>> + Send + '_;

  fn update_goal(
    &self,
    organization_id: Uuid,
    goal_id: Uuid,
    patch: GoalPatch,
  ) -> impl Future<Output = Result<Option<Goal>, Self::Error>> + Send + '_;

  fn set_goal_value(
    &self,
    organization_id: Uuid,
    goal_id: Uuid,
    value: f64,
  ) -> impl Future<Output = Result<Option<Goal>, Self::Error>> + Send + '_;

  fn delete_goal(
    &self,
    organization_id: Uuid,
    goal_id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// CRM and ad totals over the goal's period and scope.
  fn goal_inputs(
    &self,
    goal: Goal,
  ) -> impl Future<Output = Result<GoalInputs, Self::Error>> + Send + '_;

  /// Funnel counts and won revenue for leads created in the range.
  fn funnel(
    &self,
    organization_id: Uuid,
    since: NaiveDate,
    until: NaiveDate,
  ) -> impl Future<Output = Result<(Funnel, f64), Self::Error>> + Send + '_;

  // ── Billing ───────────────────────────────────────────────────────────

  fn create_subscription(
    &self,
    organization_id: Uuid,
    plan_id: String,
  ) -> impl Future<Output = Result<Subscription, Self::Error>> + Send + '_;

  fn subscription(
    &self,
    organization_id: Uuid,
  ) -> impl Future<Output = Result<Option<Subscription>, Self::Error>> + Send + '_;

  /// Apply a Stripe-driven transition. Returns the updated subscription, or
  /// `None` when the event is ignored or names an unknown subscription.
  fn apply_billing_event(
    &self,
    event: BillingEvent,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<Option<Subscription>, Self::Error>> + Send + '_;
}
