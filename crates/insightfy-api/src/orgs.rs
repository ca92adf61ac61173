//! Handlers for `/orgs` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/orgs` | |
//! | `POST` | `/orgs` | Body: `{"name":"Acme","slug":"acme"}`; slug defaults to the name |
//! | `GET`  | `/orgs/{org_id}` | 404 if not found |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use insightfy_core::{
  org::{Organization, slugify},
  store::CrmStore,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{ApiError, JsonBody};

/// The organization named in the path, or 404.
pub(crate) async fn require<S: CrmStore>(store: &S, organization_id: Uuid) -> Result<Organization, ApiError> {
  store
    .get_organization(organization_id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("organization {organization_id} not found")))
}

// ─── List ─────────────────────────────────────────────────────────────────────

/// `GET /orgs`
pub async fn list<S: CrmStore>(State(store): State<Arc<S>>) -> Result<Json<Vec<Organization>>, ApiError> {
  let orgs = store.list_organizations().await.map_err(ApiError::store)?;
  Ok(Json(orgs))
}

// ─── Create ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateBody {
  pub name: String,
  #[serde(default)]
  pub slug: Option<String>,
}

/// `POST /orgs`
pub async fn create<S: CrmStore>(
  State(store): State<Arc<S>>,
  JsonBody(body): JsonBody<CreateBody>,
) -> Result<impl IntoResponse, ApiError> {
  let name = body.name.trim().to_owned();
  if name.is_empty() {
    return Err(ApiError::BadRequest("name must not be empty".into()));
  }
  let slug = slugify(body.slug.as_deref().unwrap_or(&name));
  if slug.is_empty() {
    return Err(ApiError::BadRequest("slug must contain letters or digits".into()));
  }

  let taken = store
    .list_organizations()
    .await
    .map_err(ApiError::store)?
    .iter()
    .any(|o| o.slug == slug);
  if taken {
    return Err(ApiError::BadRequest(format!("slug {slug:?} is already in use")));
  }

  let org = store.create_organization(name, slug).await.map_err(ApiError::store)?;
  tracing::info!(organization_id = %org.organization_id, slug = %org.slug, "organization created");
  Ok((StatusCode::CREATED, Json(org)))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

/// `GET /orgs/{org_id}`
pub async fn get_one<S: CrmStore>(
  State(store): State<Arc<S>>,
  Path(org_id): Path<Uuid>,
) -> Result<Json<Organization>, ApiError> {
  Ok(Json(require(store.as_ref(), org_id).await?))
}
