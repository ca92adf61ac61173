//! Full-router tests: auth, sync endpoints and signed webhooks, driven with
//! `oneshot` over an in-memory store and a stub Graph API.

use axum::{
  Router,
  body::Body,
  http::{Request, StatusCode, header},
};
use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use chrono::Utc;
use hmac::{Hmac, Mac};
use insightfy_core::{
  org::{NewAdAccount, Organization},
  store::{AdsStore, CrmStore},
};
use insightfy_meta::{
  Collected, GraphApi, InsightRequest, LeadRequest,
  types::{AccountNode, AdNode, AdSetNode, CampaignNode, InsightRow, LeadNode},
};
use insightfy_store_sqlite::SqliteStore;
use serde_json::{Value, json};
use sha2::Sha256;
use tower::ServiceExt;

use crate::{AppState, ServerConfig, auth::hash_password, router};

// ─── Stub Graph API ──────────────────────────────────────────────────────────

#[derive(Default)]
struct StubGraph {
  rate_limited: bool,
}

impl GraphApi for StubGraph {
  async fn account<'a>(&'a self, _token: &'a str, account: &'a str) -> insightfy_meta::Result<AccountNode> {
    Ok(AccountNode { id: account.to_owned(), name: None })
  }

  async fn campaigns<'a>(
    &'a self,
    _token: &'a str,
    _account: &'a str,
  ) -> insightfy_meta::Result<Collected<CampaignNode>> {
    if self.rate_limited {
      return Err(insightfy_meta::Error::Api {
        status: StatusCode::TOO_MANY_REQUESTS,
        code:   Some(17),
        url:    "https://graph.test".into(),
        body:   String::new(),
      });
    }
    let node = serde_json::from_value(json!({ "id": "900", "name": "Leads BR", "status": "ACTIVE" })).unwrap();
    Ok(Collected::complete(vec![node]))
  }

  async fn ad_sets<'a>(&'a self, _token: &'a str, _campaign: &'a str) -> insightfy_meta::Result<Collected<AdSetNode>> {
    Ok(Collected::complete(Vec::new()))
  }

  async fn ads<'a>(&'a self, _token: &'a str, _ad_set: &'a str) -> insightfy_meta::Result<Collected<AdNode>> {
    Ok(Collected::complete(Vec::new()))
  }

  async fn insights<'a>(
    &'a self,
    _token: &'a str,
    _request: &'a InsightRequest,
  ) -> insightfy_meta::Result<Collected<InsightRow>> {
    Ok(Collected::complete(Vec::new()))
  }

  async fn leads<'a>(&'a self, _token: &'a str, _request: &'a LeadRequest) -> insightfy_meta::Result<Vec<LeadNode>> {
    Ok(Vec::new())
  }

  async fn lead<'a>(&'a self, _token: &'a str, leadgen_id: &'a str) -> insightfy_meta::Result<LeadNode> {
    Ok(serde_json::from_value(json!({
      "id": leadgen_id,
      "campaign_id": "900",
      "field_data": [
        { "name": "full_name", "values": ["Ana Souza"] },
        { "name": "email", "values": ["ana@acme.test"] },
      ],
    }))
    .unwrap())
  }
}

// ─── Fixture ─────────────────────────────────────────────────────────────────

struct Fixture {
  app:   Router,
  store: SqliteStore,
  org:   Organization,
}

fn config() -> ServerConfig {
  ServerConfig {
    auth_password_hash: hash_password("secret").unwrap(),
    meta_fallback_token: Some("app-token".into()),
    meta_app_secret: Some("app-secret".into()),
    meta_verify_token: Some("verify-me".into()),
    mailgun_signing_key: Some("mg-key".into()),
    stripe_webhook_secret: Some("whsec".into()),
    ..ServerConfig::default()
  }
}

async fn fixture_with(graph: StubGraph, config: ServerConfig) -> Fixture {
  let store = SqliteStore::open_in_memory().await.unwrap();
  let org = store.create_organization("Acme".into(), "acme".into()).await.unwrap();
  store
    .add_ad_account(NewAdAccount {
      organization_id: org.organization_id,
      external_id:     "act_1".into(),
      business_name:   Some("Acme Ads".into()),
      connected_by:    None,
    })
    .await
    .unwrap();

  let app = router(AppState::new(store.clone(), graph, config));
  Fixture { app, store, org }
}

async fn fixture() -> Fixture { fixture_with(StubGraph::default(), config()).await }

fn basic(user: &str, pass: &str) -> String { format!("Basic {}", B64.encode(format!("{user}:{pass}"))) }

fn hmac_hex(key: &str, parts: &[&[u8]]) -> String {
  let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(key.as_bytes()).unwrap();
  for part in parts {
    mac.update(part);
  }
  hex::encode(mac.finalize().into_bytes())
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
  let resp = app.clone().oneshot(req).await.unwrap();
  let status = resp.status();
  let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
  let body = serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into()));
  (status, body)
}

fn authed(method: &str, uri: &str, body: impl Into<Body>) -> Request<Body> {
  Request::builder()
    .method(method)
    .uri(uri)
    .header(header::AUTHORIZATION, basic("admin", "secret"))
    .body(body.into())
    .unwrap()
}

// ─── Health and auth ─────────────────────────────────────────────────────────

#[tokio::test]
async fn health_needs_no_credentials() {
  let f = fixture().await;
  let req = Request::get("/health").body(Body::empty()).unwrap();
  let (status, body) = send(&f.app, req).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn api_requires_basic_auth() {
  let f = fixture().await;

  let resp = f
    .app
    .clone()
    .oneshot(Request::get("/api/orgs").body(Body::empty()).unwrap())
    .await
    .unwrap();
  assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
  assert!(resp.headers().contains_key(header::WWW_AUTHENTICATE));

  let req = Request::get("/api/orgs")
    .header(header::AUTHORIZATION, basic("admin", "wrong"))
    .body(Body::empty())
    .unwrap();
  assert_eq!(send(&f.app, req).await.0, StatusCode::UNAUTHORIZED);

  let (status, body) = send(&f.app, authed("GET", "/api/orgs", Body::empty())).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body[0]["slug"], "acme");
}

// ─── Sync endpoints ──────────────────────────────────────────────────────────

#[tokio::test]
async fn sync_endpoint_runs_the_engine() {
  let f = fixture().await;

  let req = Request::post("/sync/campaigns").body(Body::empty()).unwrap();
  assert_eq!(send(&f.app, req).await.0, StatusCode::UNAUTHORIZED);

  let (status, body) = send(&f.app, authed("POST", "/sync/campaigns", Body::empty())).await;
  assert_eq!(status, StatusCode::OK, "{body}");
  assert_eq!(body["accounts_processed"], 1);
  assert_eq!(body["total_upserts"], 1);

  let (status, body) = send(&f.app, authed("POST", "/sync/leads", r#"{"dry_run": true}"#)).await;
  assert_eq!(status, StatusCode::OK, "{body}");
  assert_eq!(body["dry_run"], true);
  assert_eq!(body["new_leads"], 0);
}

#[tokio::test]
async fn unknown_sync_kind_is_404() {
  let f = fixture().await;
  let (status, body) = send(&f.app, authed("POST", "/sync/everything", Body::empty())).await;
  assert_eq!(status, StatusCode::NOT_FOUND);
  assert!(body["error"].as_str().unwrap().contains("everything"));

  let (status, _) = send(&f.app, authed("POST", "/sync/ads", "{not json")).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn rate_limited_sync_completes_with_the_limit_flagged() {
  let f = fixture_with(StubGraph { rate_limited: true }, config()).await;
  let (status, body) = send(&f.app, authed("POST", "/sync/campaigns", Body::empty())).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["rate_limited"], true);
  assert_eq!(body["accounts_processed"], 0);
  assert_eq!(body["errors"].as_array().unwrap().len(), 1);
}

// ─── Meta webhook ────────────────────────────────────────────────────────────

#[tokio::test]
async fn meta_verification_echoes_the_challenge() {
  let f = fixture().await;

  let req = Request::get("/webhooks/meta-leads?hub.mode=subscribe&hub.verify_token=verify-me&hub.challenge=12345")
    .body(Body::empty())
    .unwrap();
  let (status, body) = send(&f.app, req).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body, json!(12345));

  let req = Request::get("/webhooks/meta-leads?hub.mode=subscribe&hub.verify_token=nope&hub.challenge=1")
    .body(Body::empty())
    .unwrap();
  assert_eq!(send(&f.app, req).await.0, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn signed_leadgen_delivery_creates_a_lead() {
  let f = fixture().await;
  send(&f.app, authed("POST", "/sync/campaigns", Body::empty())).await;

  let payload = json!({
    "object": "page",
    "entry": [{ "id": "p1", "changes": [{ "field": "leadgen", "value": { "leadgen_id": "lg-77" } }] }],
  })
  .to_string();

  let unsigned = Request::post("/webhooks/meta-leads").body(Body::from(payload.clone())).unwrap();
  assert_eq!(send(&f.app, unsigned).await.0, StatusCode::UNAUTHORIZED);

  let signature = format!("sha256={}", hmac_hex("app-secret", &[payload.as_bytes()]));
  let signed = || {
    Request::post("/webhooks/meta-leads")
      .header("x-hub-signature-256", signature.as_str())
      .body(Body::from(payload.clone()))
      .unwrap()
  };
  let (status, body) = send(&f.app, signed()).await;
  assert_eq!(status, StatusCode::OK, "{body}");
  assert_eq!(body["received"], 1);
  assert_eq!(body["outcomes"][0]["outcome"], "created");
  assert_eq!(body["outcomes"][0]["organization_id"], json!(f.org.organization_id));

  let (_, body) = send(&f.app, signed()).await;
  assert_eq!(body["outcomes"][0]["outcome"], "duplicate");
}

// ─── Mailgun webhook ─────────────────────────────────────────────────────────

fn mailgun_form(timestamp: i64, recipient: &str) -> String {
  let ts = timestamp.to_string();
  let signature = hmac_hex("mg-key", &[ts.as_bytes(), b"tok-1"]);
  serde_urlencoded::to_string([
    ("timestamp", ts.as_str()),
    ("token", "tok-1"),
    ("signature", signature.as_str()),
    ("sender", "Jane Doe <jane@example.com>"),
    ("recipient", recipient),
    ("subject", "Quote request"),
    ("body-plain", "Hello, I need a quote."),
  ])
  .unwrap()
}

fn mailgun_request(form: String) -> Request<Body> {
  Request::post("/webhooks/mailgun")
    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
    .body(Body::from(form))
    .unwrap()
}

#[tokio::test]
async fn inbound_email_becomes_a_lead() {
  let f = fixture().await;

  let (status, body) = send(&f.app, mailgun_request(mailgun_form(Utc::now().timestamp(), "acme@in.test"))).await;
  assert_eq!(status, StatusCode::OK, "{body}");
  let lead_id = body["lead_id"].as_str().unwrap().to_owned();
  let org_id = f.org.organization_id;

  let (_, lead) = send(&f.app, authed("GET", &format!("/api/orgs/{org_id}/leads/{lead_id}"), Body::empty())).await;
  assert_eq!(lead["title"], "Quote request");
  assert_eq!(lead["source"], "email");
  assert_eq!(lead["status"], "novo_lead");
  assert_eq!(lead["email"], "jane@example.com");

  let uri = format!("/api/orgs/{org_id}/leads/{lead_id}/interactions");
  let (_, interactions) = send(&f.app, authed("GET", &uri, Body::empty())).await;
  assert_eq!(interactions[0]["direction"], "inbound");
  assert_eq!(interactions[0]["content"], "Hello, I need a quote.");

  let uri = format!("/api/orgs/{org_id}/leads/{lead_id}/activity");
  let (_, activity) = send(&f.app, authed("GET", &uri, Body::empty())).await;
  let actions: Vec<&str> = activity.as_array().unwrap().iter().filter_map(|a| a["action"].as_str()).collect();
  assert!(actions.contains(&"email_received"));
  assert!(actions.contains(&"created"));
}

#[tokio::test]
async fn inbound_email_with_attachments_arrives_as_multipart() {
  let f = fixture().await;

  let boundary = "mg-boundary-42";
  let ts = Utc::now().timestamp().to_string();
  let signature = hmac_hex("mg-key", &[ts.as_bytes(), b"tok-2"]);
  let mut body = String::new();
  for (name, value) in [
    ("timestamp", ts.as_str()),
    ("token", "tok-2"),
    ("signature", signature.as_str()),
    ("sender", "bob@example.com"),
    ("recipient", "acme@in.test"),
    ("body-plain", "See the attached brief."),
  ] {
    body.push_str(&format!("--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"));
  }
  body.push_str(&format!(
    "--{boundary}\r\nContent-Disposition: form-data; name=\"attachment-1\"; filename=\"brief.pdf\"\r\n\
     Content-Type: application/pdf\r\n\r\n%PDF-1.4\r\n--{boundary}--\r\n"
  ));
  let req = Request::post("/webhooks/mailgun")
    .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={boundary}"))
    .body(Body::from(body))
    .unwrap();

  let (status, created) = send(&f.app, req).await;
  assert_eq!(status, StatusCode::OK, "{created}");
  let org_id = f.org.organization_id;
  let lead_id = created["lead_id"].as_str().unwrap();

  let (_, lead) = send(&f.app, authed("GET", &format!("/api/orgs/{org_id}/leads/{lead_id}"), Body::empty())).await;
  assert_eq!(lead["title"], "Contato: bob@example.com");
  assert_eq!(lead["email"], "bob@example.com");

  let uri = format!("/api/orgs/{org_id}/leads/{lead_id}/interactions");
  let (_, interactions) = send(&f.app, authed("GET", &uri, Body::empty())).await;
  assert_eq!(interactions[0]["content"], "See the attached brief.");
}

#[tokio::test]
async fn stale_or_misaddressed_email_is_rejected() {
  let f = fixture().await;

  let stale = mailgun_form(Utc::now().timestamp() - 20 * 60, "acme@in.test");
  assert_eq!(send(&f.app, mailgun_request(stale)).await.0, StatusCode::UNAUTHORIZED);

  let unknown = mailgun_form(Utc::now().timestamp(), "nobody@in.test");
  assert_eq!(send(&f.app, mailgun_request(unknown)).await.0, StatusCode::NOT_ACCEPTABLE);

  let leads = f
    .store
    .list_leads(f.org.organization_id, Default::default())
    .await
    .unwrap();
  assert!(leads.is_empty());
}

// ─── Stripe webhook ──────────────────────────────────────────────────────────

fn stripe_request(payload: &str, secret: &str) -> Request<Body> {
  let t = Utc::now().timestamp().to_string();
  let sig = hmac_hex(secret, &[t.as_bytes(), b".", payload.as_bytes()]);
  Request::post("/webhooks/stripe")
    .header("stripe-signature", format!("t={t},v1={sig}"))
    .body(Body::from(payload.to_owned()))
    .unwrap()
}

#[tokio::test]
async fn stripe_checkout_activates_the_subscription() {
  let f = fixture().await;
  let sub = f.store.create_subscription(f.org.organization_id, "pro".into()).await.unwrap();

  let payload = json!({
    "type": "checkout.session.completed",
    "data": { "object": {
      "client_reference_id": sub.subscription_id.to_string(),
      "subscription": "sub_123",
      "customer": "cus_9",
    } },
  })
  .to_string();

  assert_eq!(send(&f.app, stripe_request(&payload, "wrong")).await.0, StatusCode::UNAUTHORIZED);

  let (status, body) = send(&f.app, stripe_request(&payload, "whsec")).await;
  assert_eq!(status, StatusCode::OK, "{body}");
  assert_eq!(body["status"], "active");

  let stored = f.store.subscription(f.org.organization_id).await.unwrap().unwrap();
  assert_eq!(stored.stripe_subscription_id.as_deref(), Some("sub_123"));
}

#[tokio::test]
async fn unrelated_stripe_events_are_acknowledged() {
  let f = fixture().await;
  let payload = json!({ "type": "customer.created", "data": { "object": {} } }).to_string();
  let (status, body) = send(&f.app, stripe_request(&payload, "whsec")).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["received"], true);
  assert_eq!(body["ignored"], "customer.created");
}

#[tokio::test]
async fn unconfigured_secrets_skip_verification() {
  let config = ServerConfig { stripe_webhook_secret: None, ..config() };
  let f = fixture_with(StubGraph::default(), config).await;
  let payload = json!({ "type": "customer.created" }).to_string();
  let req = Request::post("/webhooks/stripe").body(Body::from(payload)).unwrap();
  assert_eq!(send(&f.app, req).await.0, StatusCode::OK);
}
