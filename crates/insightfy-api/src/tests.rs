//! Router tests: every request goes through `oneshot` against an in-memory
//! SQLite store.

use std::sync::Arc;

use axum::{
  Router,
  body::Body,
  http::{Request, StatusCode, header},
};
use chrono::{Duration, Utc};
use insightfy_core::{org::Organization, store::CrmStore};
use insightfy_store_sqlite::SqliteStore;
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

use crate::api_router;

async fn app() -> (Router, Arc<SqliteStore>) {
  let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
  (api_router(store.clone()), store)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
  let mut builder = Request::builder().method(method).uri(uri);
  let body = match body {
    Some(v) => {
      builder = builder.header(header::CONTENT_TYPE, "application/json");
      Body::from(v.to_string())
    }
    None => Body::empty(),
  };
  let resp = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
  let status = resp.status();
  let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
  let json = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
  (status, json)
}

async fn org(store: &SqliteStore) -> Organization {
  store.create_organization("Acme".into(), "acme".into()).await.unwrap()
}

async fn new_lead(app: &Router, org_id: Uuid, title: &str) -> Uuid {
  let (status, body) = send(
    app,
    "POST",
    &format!("/orgs/{org_id}/leads"),
    Some(json!({ "title": title, "email": "lead@acme.test", "value": 1500.0 })),
  )
  .await;
  assert_eq!(status, StatusCode::CREATED, "{body}");
  body["lead_id"].as_str().unwrap().parse().unwrap()
}

// ── Organizations ───────────────────────────────────────────────────────────

#[tokio::test]
async fn organizations_are_created_with_unique_slugs() {
  let (app, _) = app().await;

  let (status, body) = send(&app, "POST", "/orgs", Some(json!({ "name": "Acme Corp" }))).await;
  assert_eq!(status, StatusCode::CREATED);
  assert_eq!(body["slug"], "acme-corp");
  let id = body["organization_id"].as_str().unwrap().to_owned();

  let (status, body) = send(&app, "POST", "/orgs", Some(json!({ "name": "Other", "slug": "ACME corp" }))).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert!(body["error"].as_str().unwrap().contains("already in use"));

  let (status, body) = send(&app, "GET", &format!("/orgs/{id}"), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["name"], "Acme Corp");

  let (_, body) = send(&app, "GET", "/orgs", None).await;
  assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn unknown_organization_is_a_json_404() {
  let (app, _) = app().await;
  let (status, body) = send(&app, "GET", &format!("/orgs/{}/leads", Uuid::new_v4()), None).await;
  assert_eq!(status, StatusCode::NOT_FOUND);
  assert!(body["error"].as_str().unwrap().contains("not found"));
}

// ── Leads ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn lead_lifecycle() {
  let (app, store) = app().await;
  let org = org(&store).await;
  let base = format!("/orgs/{}/leads", org.organization_id);
  let lead_id = new_lead(&app, org.organization_id, "Website enquiry").await;

  let (status, body) = send(&app, "GET", &format!("{base}/{lead_id}"), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["status"], "novo_lead");
  assert_eq!(body["source"], "manual");

  let (status, body) = send(
    &app,
    "PATCH",
    &format!("{base}/{lead_id}"),
    Some(json!({ "status": "fechado_ganho", "email": null })),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert!(body["closed_won_at"].is_string());
  assert!(body["email"].is_null());

  let (_, body) = send(&app, "GET", &format!("{base}?status=fechado_ganho"), None).await;
  assert_eq!(body.as_array().unwrap().len(), 1);

  let (_, body) = send(&app, "GET", &format!("{base}/{lead_id}/activity"), None).await;
  let actions: Vec<&str> = body.as_array().unwrap().iter().map(|a| a["action"].as_str().unwrap()).collect();
  assert!(actions.contains(&"created"));
  assert!(actions.contains(&"status_changed"));

  let (status, _) = send(&app, "DELETE", &format!("{base}/{lead_id}"), None).await;
  assert_eq!(status, StatusCode::NO_CONTENT);
  let (status, _) = send(&app, "GET", &format!("{base}/{lead_id}"), None).await;
  assert_eq!(status, StatusCode::NOT_FOUND);
  let (status, _) = send(&app, "DELETE", &format!("{base}/{lead_id}"), None).await;
  assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_lead_requests_are_rejected() {
  let (app, store) = app().await;
  let org = org(&store).await;
  let base = format!("/orgs/{}/leads", org.organization_id);

  let (status, _) = send(&app, "POST", &base, Some(json!({ "title": "  " }))).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);

  let (status, body) = send(&app, "POST", &base, Some(json!({ "title": "x", "status": "bogus" }))).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert!(body["error"].is_string());

  let lead_id = new_lead(&app, org.organization_id, "Call back").await;
  let (status, _) = send(&app, "PATCH", &format!("{base}/{lead_id}"), Some(json!({}))).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);

  let (status, _) = send(&app, "GET", &format!("{base}?limit=lots"), None).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn duplicate_external_lead_id_is_a_conflict() {
  let (app, store) = app().await;
  let org = org(&store).await;
  let base = format!("/orgs/{}/leads", org.organization_id);
  let body = json!({ "title": "Imported", "source": "meta_ads", "external_lead_id": "lg_77" });

  let (status, _) = send(&app, "POST", &base, Some(body.clone())).await;
  assert_eq!(status, StatusCode::CREATED);

  let (status, resp) = send(&app, "POST", &base, Some(body)).await;
  assert_eq!(status, StatusCode::CONFLICT);
  assert!(resp["error"].as_str().unwrap().contains("lg_77"));

  let (_, listed) = send(&app, "GET", &base, None).await;
  assert_eq!(listed.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn bulk_operations_report_affected_rows() {
  let (app, store) = app().await;
  let org = org(&store).await;
  let base = format!("/orgs/{}/leads", org.organization_id);
  let a = new_lead(&app, org.organization_id, "A").await;
  let b = new_lead(&app, org.organization_id, "B").await;

  let (status, body) = send(
    &app,
    "POST",
    &format!("{base}/bulk-update"),
    Some(json!({ "lead_ids": [a, b, Uuid::new_v4()], "updates": { "priority": "high" } })),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["affected"], 2);

  let (status, _) = send(
    &app,
    "POST",
    &format!("{base}/bulk-update"),
    Some(json!({ "lead_ids": [a], "updates": {} })),
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);

  let (status, _) = send(&app, "POST", &format!("{base}/bulk-delete"), Some(json!({ "lead_ids": [] }))).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);

  let (_, body) = send(&app, "POST", &format!("{base}/bulk-delete"), Some(json!({ "lead_ids": [a] }))).await;
  assert_eq!(body["affected"], 1);
  let (_, body) = send(&app, "GET", &base, None).await;
  assert_eq!(body.as_array().unwrap().len(), 1);
  assert_eq!(body[0]["priority"], "high");
}

#[tokio::test]
async fn leads_are_invisible_to_other_organizations() {
  let (app, store) = app().await;
  let acme = org(&store).await;
  let other = store.create_organization("Other".into(), "other".into()).await.unwrap();
  let lead_id = new_lead(&app, acme.organization_id, "Private").await;

  let uri = format!("/orgs/{}/leads/{lead_id}", other.organization_id);
  let (status, _) = send(&app, "GET", &uri, None).await;
  assert_eq!(status, StatusCode::NOT_FOUND);
  let (status, _) = send(&app, "PATCH", &uri, Some(json!({ "title": "Mine now" }))).await;
  assert_eq!(status, StatusCode::NOT_FOUND);
}

// ── Interactions and tasks ──────────────────────────────────────────────────

#[tokio::test]
async fn interactions_and_tasks() {
  let (app, store) = app().await;
  let org = org(&store).await;
  let org_id = org.organization_id;
  let lead_id = new_lead(&app, org_id, "Demo request").await;

  let (status, _) = send(
    &app,
    "POST",
    &format!("/orgs/{org_id}/leads/{}/interactions", Uuid::new_v4()),
    Some(json!({ "kind": "call" })),
  )
  .await;
  assert_eq!(status, StatusCode::NOT_FOUND);

  let (status, body) = send(
    &app,
    "POST",
    &format!("/orgs/{org_id}/leads/{lead_id}/interactions"),
    Some(json!({ "kind": "call", "content": "Left a voicemail" })),
  )
  .await;
  assert_eq!(status, StatusCode::CREATED);
  assert_eq!(body["direction"], "outbound");
  let (_, body) = send(&app, "GET", &format!("/orgs/{org_id}/leads/{lead_id}/interactions"), None).await;
  assert_eq!(body.as_array().unwrap().len(), 1);

  let due = (Utc::now() + Duration::days(1)).to_rfc3339();
  let (status, task) = send(
    &app,
    "POST",
    &format!("/orgs/{org_id}/tasks"),
    Some(json!({ "lead_id": lead_id, "title": "Send proposal", "due_at": due })),
  )
  .await;
  assert_eq!(status, StatusCode::CREATED);
  let task_id = task["task_id"].as_str().unwrap();

  let (status, body) = send(&app, "POST", &format!("/orgs/{org_id}/tasks/{task_id}/complete"), None).await;
  assert_eq!(status, StatusCode::OK);
  assert!(body["completed_at"].is_string());

  let (_, body) = send(&app, "GET", &format!("/orgs/{org_id}/tasks?completed=false"), None).await;
  assert!(body.as_array().unwrap().is_empty());
  let (_, body) = send(&app, "GET", &format!("/orgs/{org_id}/tasks"), None).await;
  assert_eq!(body.as_array().unwrap().len(), 1);
}

// ── Goals ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn goals_validate_and_refresh() {
  let (app, store) = app().await;
  let org = org(&store).await;
  let org_id = org.organization_id;
  let today = Utc::now().date_naive();
  let period = json!({
    "period_start": (today - Duration::days(1)).to_string(),
    "period_end": (today + Duration::days(29)).to_string(),
  });

  let mut bad = period.clone();
  bad["title"] = json!("Leads");
  bad["goal_type"] = json!("crm_leads_generated");
  bad["target_value"] = json!(0);
  let (status, _) = send(&app, "POST", &format!("/orgs/{org_id}/goals"), Some(bad)).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);

  let mut good = period.clone();
  good["title"] = json!("Leads this month");
  good["goal_type"] = json!("crm_leads_generated");
  good["target_value"] = json!(4);
  let (status, goal) = send(&app, "POST", &format!("/orgs/{org_id}/goals"), Some(good)).await;
  assert_eq!(status, StatusCode::CREATED);
  assert_eq!(goal["current_value"], 0.0);
  let goal_uri = format!("/orgs/{org_id}/goals/{}", goal["goal_id"].as_str().unwrap());

  new_lead(&app, org_id, "One").await;
  new_lead(&app, org_id, "Two").await;

  let (status, body) = send(&app, "POST", &format!("{goal_uri}/refresh"), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["current_value"], 2.0);
  assert_eq!(body["progress_percentage"], 50.0);
  assert!(body["computed_status"].is_string());

  let inverted = json!({ "period_end": (today - Duration::days(10)).to_string() });
  let (status, _) = send(&app, "PATCH", &goal_uri, Some(inverted)).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);

  let (status, body) = send(&app, "PATCH", &goal_uri, Some(json!({ "target_value": 8 }))).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["progress_percentage"], 25.0);

  let (status, _) = send(&app, "DELETE", &goal_uri, None).await;
  assert_eq!(status, StatusCode::NO_CONTENT);
  let (status, _) = send(&app, "GET", &goal_uri, None).await;
  assert_eq!(status, StatusCode::NOT_FOUND);
}

// ── Reporting ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn metrics_name_missing_parameters() {
  let (app, store) = app().await;
  let org = org(&store).await;
  let (status, body) = send(
    &app,
    "POST",
    &format!("/orgs/{}/metrics", org.organization_id),
    Some(json!({ "since": "2024-01-01", "until": "2024-01-31", "level": "campaign" })),
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert!(body["error"].as_str().unwrap().contains("ad_account_ids"));
}

#[tokio::test]
async fn dashboard_and_subscription() {
  let (app, store) = app().await;
  let org = org(&store).await;
  let org_id = org.organization_id;
  new_lead(&app, org_id, "Fresh").await;

  let (status, body) = send(&app, "GET", &format!("/orgs/{org_id}/dashboard"), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["funnel"]["leads"], 1);
  assert_eq!(body["totals"]["spend"], 0.0);
  assert!(body["daily"].as_array().unwrap().is_empty());

  let (status, _) = send(
    &app,
    "GET",
    &format!("/orgs/{org_id}/dashboard?since=2024-02-01&until=2024-01-01"),
    None,
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);

  let (status, _) = send(&app, "GET", &format!("/orgs/{org_id}/subscription"), None).await;
  assert_eq!(status, StatusCode::NOT_FOUND);
  store.create_subscription(org_id, "pro".into()).await.unwrap();
  let (status, body) = send(&app, "GET", &format!("/orgs/{org_id}/subscription"), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["plan_id"], "pro");

  let (status, body) = send(&app, "GET", &format!("/orgs/{org_id}/ad-accounts"), None).await;
  assert_eq!(status, StatusCode::OK);
  assert!(body.as_array().unwrap().is_empty());
}
