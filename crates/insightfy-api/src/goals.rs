//! Handlers for `/orgs/{org_id}/goals` endpoints.
//!
//! Goals are returned as [`GoalView`]s, with progress and computed status
//! evaluated against today's date.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/goals` | |
//! | `POST`   | `/goals` | Body: [`NewGoal`]; returns 201 |
//! | `GET`    | `/goals/{id}` | |
//! | `PATCH`  | `/goals/{id}` | Body: [`GoalPatch`] |
//! | `DELETE` | `/goals/{id}` | 204 |
//! | `POST`   | `/goals/{id}/refresh` | Recompute `current_value` from CRM and ad data |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use chrono::{NaiveDate, Utc};
use insightfy_core::{
  goal::{Goal, GoalPatch, GoalView, NewGoal, evaluate},
  store::CrmStore,
};
use uuid::Uuid;

use crate::{
  error::{ApiError, JsonBody},
  orgs,
};

fn today() -> NaiveDate { Utc::now().date_naive() }

async fn require<S: CrmStore>(store: &S, org_id: Uuid, goal_id: Uuid) -> Result<Goal, ApiError> {
  store
    .get_goal(org_id, goal_id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("goal {goal_id} not found")))
}

// ─── List / create ────────────────────────────────────────────────────────────

/// `GET /orgs/{org_id}/goals`
pub async fn list<S: CrmStore>(
  State(store): State<Arc<S>>,
  Path(org_id): Path<Uuid>,
) -> Result<Json<Vec<GoalView>>, ApiError> {
  orgs::require(store.as_ref(), org_id).await?;
  let today = today();
  let goals = store.goals(org_id).await.map_err(ApiError::store)?;
  Ok(Json(goals.into_iter().map(|g| GoalView::new(g, today)).collect()))
}

/// `POST /orgs/{org_id}/goals`
pub async fn create<S: CrmStore>(
  State(store): State<Arc<S>>,
  Path(org_id): Path<Uuid>,
  JsonBody(body): JsonBody<NewGoal>,
) -> Result<impl IntoResponse, ApiError> {
  body.validate()?;
  if body.title.trim().is_empty() {
    return Err(ApiError::BadRequest("title must not be empty".into()));
  }
  orgs::require(store.as_ref(), org_id).await?;

  let goal = store.create_goal(org_id, body).await.map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(GoalView::new(goal, today()))))
}

// ─── Get / update / delete ────────────────────────────────────────────────────

/// `GET /orgs/{org_id}/goals/{id}`
pub async fn get_one<S: CrmStore>(
  State(store): State<Arc<S>>,
  Path((org_id, goal_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<GoalView>, ApiError> {
  let goal = require(store.as_ref(), org_id, goal_id).await?;
  Ok(Json(GoalView::new(goal, today())))
}

/// `PATCH /orgs/{org_id}/goals/{id}`
pub async fn update<S: CrmStore>(
  State(store): State<Arc<S>>,
  Path((org_id, goal_id)): Path<(Uuid, Uuid)>,
  JsonBody(patch): JsonBody<GoalPatch>,
) -> Result<Json<GoalView>, ApiError> {
  // Validate against the current row first so a bad patch is a 400.
  let mut preview = require(store.as_ref(), org_id, goal_id).await?;
  patch.apply_to(&mut preview)?;

  let goal = store
    .update_goal(org_id, goal_id, patch)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("goal {goal_id} not found")))?;
  Ok(Json(GoalView::new(goal, today())))
}

/// `DELETE /orgs/{org_id}/goals/{id}`
pub async fn delete_one<S: CrmStore>(
  State(store): State<Arc<S>>,
  Path((org_id, goal_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, ApiError> {
  if store.delete_goal(org_id, goal_id).await.map_err(ApiError::store)? {
    Ok(StatusCode::NO_CONTENT)
  } else {
    Err(ApiError::NotFound(format!("goal {goal_id} not found")))
  }
}

// ─── Refresh ──────────────────────────────────────────────────────────────────

/// `POST /orgs/{org_id}/goals/{id}/refresh`
///
/// Custom goals have no data source and are returned unchanged.
pub async fn refresh<S: CrmStore>(
  State(store): State<Arc<S>>,
  Path((org_id, goal_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<GoalView>, ApiError> {
  let goal = require(store.as_ref(), org_id, goal_id).await?;
  let goal_type = goal.goal_type;
  let inputs = store.goal_inputs(goal.clone()).await.map_err(ApiError::store)?;

  let Some(value) = evaluate(goal_type, &inputs) else {
    return Ok(Json(GoalView::new(goal, today())));
  };
  let goal = store
    .set_goal_value(org_id, goal_id, value)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("goal {goal_id} not found")))?;
  tracing::debug!(%goal_id, %goal_type, value, "goal refreshed");
  Ok(Json(GoalView::new(goal, today())))
}
