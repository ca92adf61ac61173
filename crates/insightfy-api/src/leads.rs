//! Handlers for `/orgs/{org_id}/leads` endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/leads` | Filters: `status`, `source`, `campaign_id`, `assignee_id`, `text`, `created_after`, `created_before`, `limit`, `offset` |
//! | `POST`   | `/leads` | Body: [`NewLead`]; returns 201, or 409 for a taken `external_lead_id` |
//! | `GET`    | `/leads/{id}` | |
//! | `PATCH`  | `/leads/{id}` | Body: [`LeadPatch`]; `null` clears a field |
//! | `DELETE` | `/leads/{id}` | Soft delete; 204 |
//! | `POST`   | `/leads/bulk-update` | Body: `{"lead_ids":[..],"updates":{..}}` |
//! | `POST`   | `/leads/bulk-delete` | Body: `{"lead_ids":[..]}` |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use insightfy_core::{
  lead::{Lead, LeadPatch, LeadQuery, LeadSelection, NewLead},
  store::CrmStore,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  error::{ApiError, JsonBody, QueryParams},
  orgs,
};

pub(crate) async fn require<S: CrmStore>(store: &S, org_id: Uuid, lead_id: Uuid) -> Result<Lead, ApiError> {
  store
    .get_lead(org_id, lead_id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("lead {lead_id} not found")))
}

// ─── List ─────────────────────────────────────────────────────────────────────

/// `GET /orgs/{org_id}/leads`
pub async fn list<S: CrmStore>(
  State(store): State<Arc<S>>,
  Path(org_id): Path<Uuid>,
  QueryParams(query): QueryParams<LeadQuery>,
) -> Result<Json<Vec<Lead>>, ApiError> {
  orgs::require(store.as_ref(), org_id).await?;
  let leads = store.list_leads(org_id, query).await.map_err(ApiError::store)?;
  Ok(Json(leads))
}

// ─── Create ───────────────────────────────────────────────────────────────────

/// `POST /orgs/{org_id}/leads`
pub async fn create<S: CrmStore>(
  State(store): State<Arc<S>>,
  Path(org_id): Path<Uuid>,
  JsonBody(mut body): JsonBody<NewLead>,
) -> Result<impl IntoResponse, ApiError> {
  body.title = body.title.trim().to_owned();
  if body.title.is_empty() {
    return Err(ApiError::BadRequest("title must not be empty".into()));
  }
  orgs::require(store.as_ref(), org_id).await?;

  let lead = match body.external_lead_id.clone() {
    Some(external_id) => store
      .create_lead_if_new(org_id, body)
      .await
      .map_err(ApiError::store)?
      .ok_or_else(|| ApiError::Conflict(format!("a lead with external_lead_id {external_id:?} already exists")))?,
    None => store.create_lead(org_id, body).await.map_err(ApiError::store)?,
  };
  Ok((StatusCode::CREATED, Json(lead)))
}

// ─── Get / update / delete ────────────────────────────────────────────────────

/// `GET /orgs/{org_id}/leads/{id}`
pub async fn get_one<S: CrmStore>(
  State(store): State<Arc<S>>,
  Path((org_id, lead_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Lead>, ApiError> {
  Ok(Json(require(store.as_ref(), org_id, lead_id).await?))
}

/// `PATCH /orgs/{org_id}/leads/{id}`
pub async fn update<S: CrmStore>(
  State(store): State<Arc<S>>,
  Path((org_id, lead_id)): Path<(Uuid, Uuid)>,
  JsonBody(patch): JsonBody<LeadPatch>,
) -> Result<Json<Lead>, ApiError> {
  if patch.is_empty() {
    return Err(ApiError::BadRequest("no fields to update".into()));
  }
  if patch.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
    return Err(ApiError::BadRequest("title must not be empty".into()));
  }
  let lead = store
    .update_lead(org_id, lead_id, patch)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("lead {lead_id} not found")))?;
  Ok(Json(lead))
}

/// `DELETE /orgs/{org_id}/leads/{id}`
pub async fn delete_one<S: CrmStore>(
  State(store): State<Arc<S>>,
  Path((org_id, lead_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, ApiError> {
  if store.delete_lead(org_id, lead_id).await.map_err(ApiError::store)? {
    Ok(StatusCode::NO_CONTENT)
  } else {
    Err(ApiError::NotFound(format!("lead {lead_id} not found")))
  }
}

// ─── Bulk ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct BulkUpdateBody {
  pub lead_ids: Vec<Uuid>,
  pub updates:  LeadPatch,
}

#[derive(Debug, Deserialize)]
pub struct BulkDeleteBody {
  pub lead_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct BulkResult {
  pub affected: usize,
}

/// `POST /orgs/{org_id}/leads/bulk-update`
pub async fn bulk_update<S: CrmStore>(
  State(store): State<Arc<S>>,
  Path(org_id): Path<Uuid>,
  JsonBody(body): JsonBody<BulkUpdateBody>,
) -> Result<Json<BulkResult>, ApiError> {
  if body.updates.is_empty() {
    return Err(ApiError::BadRequest("no fields to update".into()));
  }
  let selection = LeadSelection::new(org_id, body.lead_ids)?;
  let affected = store
    .bulk_update_leads(selection, body.updates)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(BulkResult { affected }))
}

/// `POST /orgs/{org_id}/leads/bulk-delete`
pub async fn bulk_delete<S: CrmStore>(
  State(store): State<Arc<S>>,
  Path(org_id): Path<Uuid>,
  JsonBody(body): JsonBody<BulkDeleteBody>,
) -> Result<Json<BulkResult>, ApiError> {
  let selection = LeadSelection::new(org_id, body.lead_ids)?;
  let affected = store.bulk_delete_leads(selection).await.map_err(ApiError::store)?;
  Ok(Json(BulkResult { affected }))
}
