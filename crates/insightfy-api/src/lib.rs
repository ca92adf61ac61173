//! JSON REST API for Insightfy.
//!
//! Exposes an axum [`Router`] over any store implementing both
//! [`AdsStore`] and [`CrmStore`]. Every organization-scoped route takes the
//! organization from the path and never reads or writes rows of another
//! one. Auth, TLS, and transport concerns are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", insightfy_api::api_router(store.clone()))
//! ```

pub mod activity;
pub mod error;
pub mod goals;
pub mod leads;
pub mod orgs;
pub mod reports;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use insightfy_core::store::{AdsStore, CrmStore};

pub use error::ApiError;

/// Build a fully-materialised API router for `store`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(store: Arc<S>) -> Router<()>
where
  S: AdsStore + CrmStore + 'static,
{
  Router::new()
    // Organizations
    .route("/orgs", get(orgs::list::<S>).post(orgs::create::<S>))
    .route("/orgs/{org_id}", get(orgs::get_one::<S>))
    // Leads
    .route("/orgs/{org_id}/leads", get(leads::list::<S>).post(leads::create::<S>))
    .route("/orgs/{org_id}/leads/bulk-update", post(leads::bulk_update::<S>))
    .route("/orgs/{org_id}/leads/bulk-delete", post(leads::bulk_delete::<S>))
    .route(
      "/orgs/{org_id}/leads/{id}",
      get(leads::get_one::<S>)
        .patch(leads::update::<S>)
        .delete(leads::delete_one::<S>),
    )
    .route(
      "/orgs/{org_id}/leads/{id}/interactions",
      get(activity::list_interactions::<S>).post(activity::add_interaction::<S>),
    )
    .route("/orgs/{org_id}/leads/{id}/activity", get(activity::lead_activity::<S>))
    // Tasks
    .route("/orgs/{org_id}/tasks", get(activity::list_tasks::<S>).post(activity::create_task::<S>))
    .route("/orgs/{org_id}/tasks/{id}/complete", post(activity::complete_task::<S>))
    // Goals
    .route("/orgs/{org_id}/goals", get(goals::list::<S>).post(goals::create::<S>))
    .route(
      "/orgs/{org_id}/goals/{id}",
      get(goals::get_one::<S>)
        .patch(goals::update::<S>)
        .delete(goals::delete_one::<S>),
    )
    .route("/orgs/{org_id}/goals/{id}/refresh", post(goals::refresh::<S>))
    // Reporting
    .route("/orgs/{org_id}/ad-accounts", get(reports::ad_accounts::<S>))
    .route("/orgs/{org_id}/metrics", post(reports::metrics::<S>))
    .route("/orgs/{org_id}/dashboard", get(reports::dashboard::<S>))
    .route("/orgs/{org_id}/subscription", get(reports::subscription::<S>))
    .with_state(store)
}

#[cfg(test)]
mod tests;
