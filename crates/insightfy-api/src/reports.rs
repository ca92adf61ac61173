//! Read-only analytics: ad accounts, aggregated metrics, the dashboard and
//! the organization's subscription.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/ad-accounts` | |
//! | `POST` | `/metrics` | Body: [`MetricsRequest`]; `since`, `until`, `level`, `ad_account_ids` required |
//! | `GET`  | `/dashboard` | Optional `?since=..&until=..`, default the last 30 days |
//! | `GET`  | `/subscription` | 404 when the organization has none |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
};
use chrono::{NaiveDate, Utc};
use insightfy_core::{
  billing::Subscription,
  dates::{INSIGHTS_LOOKBACK_DAYS, SyncWindow},
  metrics::{DashboardSummary, MetricsRequest, MetricsRow},
  org::AdAccount,
  store::{AccountFilter, AdsStore, CrmStore},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
  error::{ApiError, JsonBody, QueryParams},
  orgs,
};

/// `GET /orgs/{org_id}/ad-accounts`
pub async fn ad_accounts<S: AdsStore + CrmStore>(
  State(store): State<Arc<S>>,
  Path(org_id): Path<Uuid>,
) -> Result<Json<Vec<AdAccount>>, ApiError> {
  orgs::require(store.as_ref(), org_id).await?;
  let accounts = store
    .ad_accounts(AccountFilter { organization_id: Some(org_id), ..AccountFilter::default() })
    .await
    .map_err(ApiError::store)?;
  Ok(Json(accounts))
}

/// `POST /orgs/{org_id}/metrics`
pub async fn metrics<S: AdsStore + CrmStore>(
  State(store): State<Arc<S>>,
  Path(org_id): Path<Uuid>,
  JsonBody(body): JsonBody<MetricsRequest>,
) -> Result<Json<Vec<MetricsRow>>, ApiError> {
  let query = body.validate()?;
  orgs::require(store.as_ref(), org_id).await?;
  let rows = store.metrics(org_id, query).await.map_err(ApiError::store)?;
  Ok(Json(rows))
}

#[derive(Debug, Default, Deserialize)]
pub struct RangeParams {
  pub since: Option<NaiveDate>,
  pub until: Option<NaiveDate>,
}

/// `GET /orgs/{org_id}/dashboard`
pub async fn dashboard<S: AdsStore + CrmStore>(
  State(store): State<Arc<S>>,
  Path(org_id): Path<Uuid>,
  QueryParams(range): QueryParams<RangeParams>,
) -> Result<Json<DashboardSummary>, ApiError> {
  let window = SyncWindow::resolve(range.since, range.until, Utc::now().date_naive(), INSIGHTS_LOOKBACK_DAYS)?;
  orgs::require(store.as_ref(), org_id).await?;

  let daily = store
    .daily_series(org_id, window.since, window.until)
    .await
    .map_err(ApiError::store)?;
  let (funnel, won_revenue) = store
    .funnel(org_id, window.since, window.until)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(DashboardSummary::new(window.since, window.until, daily, funnel, won_revenue)))
}

/// `GET /orgs/{org_id}/subscription`
pub async fn subscription<S: CrmStore>(
  State(store): State<Arc<S>>,
  Path(org_id): Path<Uuid>,
) -> Result<Json<Subscription>, ApiError> {
  let sub = store
    .subscription(org_id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("organization {org_id} has no subscription")))?;
  Ok(Json(sub))
}
