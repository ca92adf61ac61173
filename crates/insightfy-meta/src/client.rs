//! `reqwest`-backed implementation of [`GraphApi`].

use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use reqwest::Client;
use serde::{Deserialize, de::DeserializeOwned};
use tracing::{debug, warn};
use url::Url;

use crate::{
  api::{
    AD_FIELDS, AD_SET_FIELDS, CAMPAIGN_FIELDS, Collected, EDGE_PAGE_SIZE, GraphApi, InsightRequest, LEAD_FIELDS,
    LeadRequest,
  },
  error::{Error, IsRetryable, Result, graph_error_code},
  types::{AccountNode, AdNode, AdSetNode, CampaignNode, InsightRow, LeadNode, Paged},
};

pub const DEFAULT_BASE_URL: &str = "https://graph.facebook.com";
pub const DEFAULT_API_VERSION: &str = "v24.0";

/// Client settings. Deserialisable so it can sit in the server config as a
/// `[meta]` table; every field has a default.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
  pub base_url:       String,
  pub api_version:    String,
  /// Pause between consecutive pages of one request.
  pub page_delay_ms:  u64,
  /// First retry delay; later retries back off exponentially.
  pub retry_delay_ms: u64,
  pub max_retries:    usize,
  pub timeout_secs:   u64,
}

impl Default for GraphConfig {
  fn default() -> Self {
    Self {
      base_url:       DEFAULT_BASE_URL.to_owned(),
      api_version:    DEFAULT_API_VERSION.to_owned(),
      page_delay_ms:  120,
      retry_delay_ms: 800,
      max_retries:    3,
      timeout_secs:   30,
    }
  }
}

/// Replace the value of any `access_token` query parameter with `***`.
pub fn sanitize_url(raw: &str) -> String {
  let Ok(mut url) = Url::parse(raw) else {
    return raw.to_owned();
  };
  if !url.query_pairs().any(|(k, _)| k == "access_token") {
    return raw.to_owned();
  }
  let pairs: Vec<(String, String)> = url
    .query_pairs()
    .map(|(k, v)| {
      let v = if k == "access_token" { "***".to_owned() } else { v.into_owned() };
      (k.into_owned(), v)
    })
    .collect();
  url.query_pairs_mut().clear().extend_pairs(pairs);
  url.to_string()
}

/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct GraphClient {
  http:       Client,
  base:       Url,
  page_delay: Duration,
  retry:      ExponentialBuilder,
}

impl GraphClient {
  pub fn new(config: &GraphConfig) -> Result<Self> {
    let http = Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .build()
      .map_err(|source| Error::Http { url: config.base_url.clone(), source })?;
    let base = Url::parse(&format!(
      "{}/{}/",
      config.base_url.trim_end_matches('/'),
      config.api_version.trim_matches('/'),
    ))?;
    let retry = ExponentialBuilder::default()
      .with_min_delay(Duration::from_millis(config.retry_delay_ms))
      .with_max_times(config.max_retries)
      .with_jitter();
    Ok(Self { http, base, page_delay: Duration::from_millis(config.page_delay_ms), retry })
  }

  /// `<base>/<version>/<path>?<params>&access_token=<token>`.
  fn url(&self, path: &str, token: &str, params: &[(&str, String)]) -> Result<Url> {
    let mut url = self.base.join(path.trim_start_matches('/'))?;
    {
      let mut q = url.query_pairs_mut();
      for (k, v) in params {
        q.append_pair(k, v);
      }
      q.append_pair("access_token", token);
    }
    Ok(url)
  }

  async fn get_once<T: DeserializeOwned>(&self, url: &Url) -> Result<T> {
    let safe = sanitize_url(url.as_str());
    debug!(url = %safe, "GET graph");
    let resp = self
      .http
      .get(url.clone())
      .send()
      .await
      .map_err(|source| Error::Http { url: safe.clone(), source })?;
    let status = resp.status();
    let body = resp
      .text()
      .await
      .map_err(|source| Error::Http { url: safe.clone(), source })?;
    if !status.is_success() {
      return Err(Error::Api { status, code: graph_error_code(&body), url: safe, body });
    }
    serde_json::from_str(&body).map_err(|source| Error::Decode { url: safe, source })
  }

  /// GET with retries on 429, 5xx and Graph rate-limit codes.
  async fn get_json<T: DeserializeOwned>(&self, url: &Url) -> Result<T> {
    (|| self.get_once::<T>(url))
      .retry(self.retry)
      .when(|e: &Error| e.is_retryable())
      .notify(|err: &Error, dur: Duration| {
        warn!(status = ?err.status(), retry_in = ?dur, "graph request failed, retrying: {err}");
      })
      .await
  }

  /// Follow `paging.next` from `first` until it runs out. Only a failing
  /// first page is an `Err`; later failures keep the rows already read.
  async fn collect<T: DeserializeOwned>(&self, first: Url) -> Result<Collected<T>> {
    let mut rows = Vec::new();
    let mut next = Some(first);
    let mut pages = 0usize;
    while let Some(url) = next.take() {
      if pages > 0 {
        tokio::time::sleep(self.page_delay).await;
      }
      let page: Paged<T> = match self.get_json(&url).await {
        Ok(page) => page,
        Err(e) if pages == 0 => return Err(e),
        Err(e) => {
          warn!(pages, rows = rows.len(), "pagination cut short: {e}");
          return Ok(Collected::partial(rows, e));
        }
      };
      pages += 1;
      let parsed_next = page.next_url().map(Url::parse).transpose();
      rows.extend(page.data);
      next = match parsed_next {
        Ok(next) => next,
        Err(e) => return Ok(Collected::partial(rows, e.into())),
      };
    }
    debug!(pages, rows = rows.len(), "pagination finished");
    Ok(Collected::complete(rows))
  }

  fn edge_params(fields: &[&str]) -> Vec<(&'static str, String)> {
    vec![("fields", fields.join(",")), ("limit", EDGE_PAGE_SIZE.to_string())]
  }
}

impl GraphApi for GraphClient {
  async fn account(&self, token: &str, account: &str) -> Result<AccountNode> {
    let url = self.url(account, token, &[("fields", "id,name".to_owned())])?;
    self.get_json(&url).await
  }

  async fn campaigns(&self, token: &str, account: &str) -> Result<Collected<CampaignNode>> {
    let mut params = Self::edge_params(CAMPAIGN_FIELDS);
    params.push(("effective_status", r#"["ACTIVE","PAUSED","ARCHIVED"]"#.to_owned()));
    let url = self.url(&format!("{account}/campaigns"), token, &params)?;
    self.collect(url).await
  }

  async fn ad_sets(&self, token: &str, campaign_external_id: &str) -> Result<Collected<AdSetNode>> {
    let url = self.url(&format!("{campaign_external_id}/adsets"), token, &Self::edge_params(AD_SET_FIELDS))?;
    self.collect(url).await
  }

  async fn ads(&self, token: &str, ad_set_external_id: &str) -> Result<Collected<AdNode>> {
    let url = self.url(&format!("{ad_set_external_id}/ads"), token, &Self::edge_params(AD_FIELDS))?;
    self.collect(url).await
  }

  async fn insights(&self, token: &str, request: &InsightRequest) -> Result<Collected<InsightRow>> {
    let url = self.url(&format!("{}/insights", request.account), token, &request.query())?;
    self.collect(url).await
  }

  async fn leads(&self, token: &str, request: &LeadRequest) -> Result<Vec<LeadNode>> {
    let first = self.url(&format!("{}/leads", request.account), token, &request.query())?;
    let mut leads: Vec<LeadNode> = Vec::new();
    let mut next = Some(first);
    while let Some(url) = next.take() {
      if !leads.is_empty() {
        tokio::time::sleep(self.page_delay).await;
      }
      let page: Paged<LeadNode> = match self.get_json(&url).await {
        Ok(page) => page,
        Err(e) if e.is_rate_limited() || e.status() == Some(reqwest::StatusCode::BAD_REQUEST) => {
          warn!(account = %request.account, fetched = leads.len(), "stopping lead fetch: {e}");
          break;
        }
        Err(e) => return Err(e),
      };
      next = page.next_url().map(Url::parse).transpose()?;
      leads.extend(page.data);
      if leads.len() >= request.limit {
        leads.truncate(request.limit);
        break;
      }
    }
    Ok(leads)
  }

  async fn lead(&self, token: &str, leadgen_id: &str) -> Result<LeadNode> {
    let url = self.url(leadgen_id, token, &[("fields", LEAD_FIELDS.join(","))])?;
    self.get_json(&url).await
  }
}

#[cfg(test)]
mod tests {
  use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
  };

  use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    routing::get,
  };
  use chrono::NaiveDate;
  use insightfy_core::{dates::DateChunk, insight::InsightLevel};
  use serde_json::{Value, json};

  use super::*;

  type Params = Query<std::collections::HashMap<String, String>>;

  async fn spawn(app: impl FnOnce(String) -> Router) -> (GraphClient, String) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let router = app(base.clone());
    tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
    let config = GraphConfig {
      base_url: base.clone(),
      page_delay_ms: 1,
      retry_delay_ms: 1,
      ..Default::default()
    };
    (GraphClient::new(&config).unwrap(), base)
  }

  fn request() -> InsightRequest {
    InsightRequest {
      account:      "act_1".into(),
      level:        InsightLevel::Campaign,
      campaign_ids: vec!["10".into()],
      ad_set_ids:   vec![],
      ad_ids:       vec![],
      chunk:        DateChunk {
        start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        end:   NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
      },
    }
  }

  #[tokio::test]
  async fn follows_paging_next() {
    let (client, _) = spawn(|base| {
      Router::new()
        .route(
          "/v24.0/act_1/insights",
          get(move |Query(q): Params| {
            let base = base.clone();
            async move {
              assert_eq!(q.get("level").map(String::as_str), Some("campaign"));
              assert_eq!(q.get("access_token").map(String::as_str), Some("tok"));
              let filtering: Value = serde_json::from_str(&q["filtering"]).unwrap();
              assert_eq!(filtering[0]["value"], json!(["10"]));
              Json(json!({
                "data": [{ "campaign_id": "10", "date_start": "2024-01-01", "spend": "1.5" }],
                "paging": { "next": format!("{base}/page2") }
              }))
            }
          }),
        )
        .route(
          "/page2",
          get(|| async { Json(json!({ "data": [{ "campaign_id": "10", "date_start": "2024-01-02" }] })) }),
        )
    })
    .await;

    let rows = client.insights("tok", &request()).await.unwrap();
    assert!(rows.error.is_none());
    let rows = rows.rows;
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].metrics().spend, 1.5);
    assert_eq!(rows[1].date_start, "2024-01-02");
  }

  #[tokio::test]
  async fn retries_server_errors() {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let (client, _) = spawn(move |_| {
      Router::new().route(
        "/v24.0/act_1/insights",
        get(move || {
          let counter = counter.clone();
          async move {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
              (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "error": { "message": "busy" } })))
            } else {
              (StatusCode::OK, Json(json!({ "data": [] })))
            }
          }
        }),
      )
    })
    .await;

    let rows = client.insights("tok", &request()).await.unwrap();
    assert!(rows.rows.is_empty());
    assert_eq!(hits.load(Ordering::SeqCst), 3);
  }

  #[tokio::test]
  async fn client_errors_are_not_retried() {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let (client, _) = spawn(move |_| {
      Router::new().route(
        "/v24.0/act_1/insights",
        get(move || {
          let counter = counter.clone();
          async move {
            counter.fetch_add(1, Ordering::SeqCst);
            (StatusCode::BAD_REQUEST, Json(json!({ "error": { "message": "bad field", "code": 100 } })))
          }
        }),
      )
    })
    .await;

    let err = client.insights("secret-token", &request()).await.unwrap_err();
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    match &err {
      Error::Api { status, code, url, .. } => {
        assert_eq!(*status, StatusCode::BAD_REQUEST);
        assert_eq!(*code, Some(100));
        assert!(!url.contains("secret-token"));
      }
      other => panic!("unexpected {other:?}"),
    }
  }

  #[tokio::test]
  async fn failing_later_page_keeps_earlier_rows() {
    let (client, _) = spawn(|base| {
      Router::new()
        .route(
          "/v24.0/act_1/insights",
          get(move || {
            let base = base.clone();
            async move {
              Json(json!({
                "data": [
                  { "campaign_id": "10", "date_start": "2024-01-01", "spend": "2" },
                  { "campaign_id": "10", "date_start": "2024-01-02", "spend": "3" }
                ],
                "paging": { "next": format!("{base}/broken") }
              }))
            }
          }),
        )
        .route(
          "/broken",
          get(|| async { (StatusCode::BAD_REQUEST, Json(json!({ "error": { "message": "expired cursor", "code": 100 } }))) }),
        )
    })
    .await;

    let collected = client.insights("tok", &request()).await.unwrap();
    assert_eq!(collected.rows.len(), 2);
    assert_eq!(collected.rows[1].metrics().spend, 3.0);
    let err = collected.error.expect("second page error is kept");
    assert_eq!(err.status(), Some(StatusCode::BAD_REQUEST));
    assert!(!err.is_rate_limited());
  }

  #[tokio::test]
  async fn leads_stop_at_limit_and_on_rate_limit() {
    let (client, _) = spawn(|base| {
      Router::new()
        .route(
          "/v24.0/act_1/leads",
          get(move || {
            let base = base.clone();
            async move {
              Json(json!({
                "data": [{ "id": "1" }, { "id": "2" }],
                "paging": { "next": format!("{base}/limited") }
              }))
            }
          }),
        )
        .route(
          "/limited",
          get(|| async { (StatusCode::BAD_REQUEST, Json(json!({ "error": { "code": 17 } }))) }),
        )
    })
    .await;

    let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let mut req = LeadRequest { account: "act_1".into(), since: day, until: day, limit: 10 };
    let leads = client.leads("tok", &req).await.unwrap();
    assert_eq!(leads.len(), 2);

    req.limit = 1;
    let leads = client.leads("tok", &req).await.unwrap();
    assert_eq!(leads.len(), 1);
    assert_eq!(leads[0].id, "1");
  }

  #[test]
  fn tokens_are_masked() {
    let url = "https://graph.facebook.com/v24.0/act_1?fields=id&access_token=EAAB123";
    let safe = sanitize_url(url);
    assert!(safe.contains("access_token=***") || safe.contains("access_token=%2A%2A%2A"));
    assert!(!safe.contains("EAAB123"));
    assert_eq!(sanitize_url("not a url"), "not a url");
  }
}
