//! Interactions, the per-lead audit trail, and tasks.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/leads/{id}/interactions` | Newest first |
//! | `POST` | `/leads/{id}/interactions` | Body: [`NewInteraction`]; returns 201 |
//! | `GET`  | `/leads/{id}/activity` | Newest first |
//! | `GET`  | `/tasks` | Optional `?lead_id=..&completed=false` |
//! | `POST` | `/tasks` | Body: [`NewTask`]; returns 201 |
//! | `POST` | `/tasks/{id}/complete` | Idempotent |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use insightfy_core::{
  activity::{Interaction, LeadActivity, NewInteraction, NewTask, Task, TaskQuery},
  store::CrmStore,
};
use uuid::Uuid;

use crate::{
  error::{ApiError, JsonBody, QueryParams},
  leads, orgs,
};

// ─── Interactions ─────────────────────────────────────────────────────────────

/// `GET /orgs/{org_id}/leads/{id}/interactions`
pub async fn list_interactions<S: CrmStore>(
  State(store): State<Arc<S>>,
  Path((org_id, lead_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Vec<Interaction>>, ApiError> {
  leads::require(store.as_ref(), org_id, lead_id).await?;
  let interactions = store.interactions(org_id, lead_id).await.map_err(ApiError::store)?;
  Ok(Json(interactions))
}

/// `POST /orgs/{org_id}/leads/{id}/interactions`
pub async fn add_interaction<S: CrmStore>(
  State(store): State<Arc<S>>,
  Path((org_id, lead_id)): Path<(Uuid, Uuid)>,
  JsonBody(body): JsonBody<NewInteraction>,
) -> Result<impl IntoResponse, ApiError> {
  let interaction = store
    .add_interaction(org_id, lead_id, body)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("lead {lead_id} not found")))?;
  Ok((StatusCode::CREATED, Json(interaction)))
}

// ─── Activity ─────────────────────────────────────────────────────────────────

/// `GET /orgs/{org_id}/leads/{id}/activity`
pub async fn lead_activity<S: CrmStore>(
  State(store): State<Arc<S>>,
  Path((org_id, lead_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Vec<LeadActivity>>, ApiError> {
  leads::require(store.as_ref(), org_id, lead_id).await?;
  let entries = store.lead_activity(org_id, lead_id).await.map_err(ApiError::store)?;
  Ok(Json(entries))
}

// ─── Tasks ────────────────────────────────────────────────────────────────────

/// `GET /orgs/{org_id}/tasks`
pub async fn list_tasks<S: CrmStore>(
  State(store): State<Arc<S>>,
  Path(org_id): Path<Uuid>,
  QueryParams(query): QueryParams<TaskQuery>,
) -> Result<Json<Vec<Task>>, ApiError> {
  orgs::require(store.as_ref(), org_id).await?;
  let tasks = store.tasks(org_id, query).await.map_err(ApiError::store)?;
  Ok(Json(tasks))
}

/// `POST /orgs/{org_id}/tasks`
pub async fn create_task<S: CrmStore>(
  State(store): State<Arc<S>>,
  Path(org_id): Path<Uuid>,
  JsonBody(body): JsonBody<NewTask>,
) -> Result<impl IntoResponse, ApiError> {
  if body.title.trim().is_empty() {
    return Err(ApiError::BadRequest("title must not be empty".into()));
  }
  orgs::require(store.as_ref(), org_id).await?;
  if let Some(lead_id) = body.lead_id {
    leads::require(store.as_ref(), org_id, lead_id).await?;
  }
  let task = store.create_task(org_id, body).await.map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(task)))
}

/// `POST /orgs/{org_id}/tasks/{id}/complete`
pub async fn complete_task<S: CrmStore>(
  State(store): State<Arc<S>>,
  Path((org_id, task_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Task>, ApiError> {
  let task = store
    .complete_task(org_id, task_id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("task {task_id} not found")))?;
  Ok(Json(task))
}
