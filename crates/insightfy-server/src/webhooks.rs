//! Inbound webhooks. None of these routes use Basic auth; each checks its
//! sender's signature instead, or logs a warning and skips the check when
//! the corresponding secret is not configured.
//!
//! | Method | Path                   | Sender                            |
//! |--------|------------------------|-----------------------------------|
//! | GET    | `/webhooks/meta-leads` | Meta subscription handshake       |
//! | POST   | `/webhooks/meta-leads` | Meta lead-ads `leadgen` changes   |
//! | POST   | `/webhooks/mailgun`    | Mailgun inbound route (form data) |
//! | POST   | `/webhooks/stripe`     | Stripe billing events             |

use axum::{
  Json,
  extract::{FromRequest, Multipart, Query, Request, State},
  http::HeaderMap,
  response::IntoResponse,
};
use bytes::Bytes;
use chrono::Utc;
use insightfy_core::{
  activity::{ActivityAction, Direction, InteractionKind, LeadActivity, NewInteraction},
  billing::BillingEvent,
  lead::{LeadSource, NewLead},
  store::{AdsStore, CrmStore},
};
use insightfy_meta::GraphApi;
use insightfy_sync::LeadgenNotification;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::{AppState, error::Error, signature};

/// Longest lead title taken from an email subject, in characters.
const MAX_TITLE_CHARS: usize = 120;

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
  headers.get(name).and_then(|v| v.to_str().ok())
}

// ─── Meta ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct HubParams {
  #[serde(rename = "hub.mode")]
  mode:         Option<String>,
  #[serde(rename = "hub.verify_token")]
  verify_token: Option<String>,
  #[serde(rename = "hub.challenge")]
  challenge:    Option<String>,
}

/// Subscription handshake: echo `hub.challenge` back as plain text.
pub async fn meta_verify<S, G>(
  State(state): State<AppState<S, G>>,
  Query(params): Query<HubParams>,
) -> Result<String, Error>
where
  S: AdsStore + CrmStore + 'static,
  G: GraphApi + 'static,
{
  let expected = state.config.meta_verify_token().ok_or(Error::Forbidden)?;
  match (params.mode.as_deref(), params.verify_token.as_deref(), params.challenge) {
    (Some("subscribe"), Some(token), Some(challenge)) if token == expected => {
      info!("meta webhook subscription verified");
      Ok(challenge)
    }
    _ => Err(Error::Forbidden),
  }
}

pub async fn meta_leads<S, G>(
  State(state): State<AppState<S, G>>,
  headers: HeaderMap,
  body: Bytes,
) -> Result<impl IntoResponse, Error>
where
  S: AdsStore + CrmStore + 'static,
  G: GraphApi + 'static,
{
  match state.config.meta_app_secret() {
    Some(secret) => signature::verify_meta(
      secret,
      header(&headers, "x-hub-signature-256"),
      header(&headers, "x-hub-signature"),
      &body,
    )?,
    None => warn!("meta app secret not configured, skipping signature check"),
  }

  let notification: LeadgenNotification =
    serde_json::from_slice(&body).map_err(|e| Error::BadRequest(format!("invalid notification: {e}")))?;
  let outcomes = state.engine.ingest_notification(&notification).await;
  info!(object = ?notification.object, received = outcomes.len(), "meta leadgen delivery");

  Ok(Json(json!({ "received": outcomes.len(), "outcomes": outcomes })))
}

// ─── Mailgun ─────────────────────────────────────────────────────────────────

/// The fields of a Mailgun inbound-route POST this handler reads.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct MailgunForm {
  timestamp:     String,
  token:         String,
  signature:     String,
  sender:        Option<String>,
  from:          Option<String>,
  recipient:     Option<String>,
  subject:       Option<String>,
  #[serde(rename = "body-plain")]
  body_plain:    Option<String>,
  #[serde(rename = "stripped-text")]
  stripped_text: Option<String>,
  #[serde(rename = "stripped-html")]
  stripped_html: Option<String>,
}

/// Mailgun posts `application/x-www-form-urlencoded` for plain messages and
/// `multipart/form-data` when the message carries attachments. Attachments
/// themselves are dropped.
async fn read_mailgun_form(request: Request) -> Result<MailgunForm, Error> {
  let multipart = header(request.headers(), "content-type")
    .is_some_and(|ct| ct.trim_start().to_ascii_lowercase().starts_with("multipart/form-data"));
  if !multipart {
    let body = Bytes::from_request(request, &())
      .await
      .map_err(|e| Error::BadRequest(format!("unreadable body: {e}")))?;
    return serde_urlencoded::from_bytes(&body).map_err(|e| Error::BadRequest(format!("invalid form body: {e}")));
  }

  let invalid = |e: axum::extract::multipart::MultipartError| Error::BadRequest(format!("invalid multipart body: {e}"));
  let mut multipart = Multipart::from_request(request, &())
    .await
    .map_err(|e| Error::BadRequest(format!("invalid multipart body: {e}")))?;
  let mut fields = serde_json::Map::new();
  while let Some(field) = multipart.next_field().await.map_err(invalid)? {
    let Some(name) = field.name().map(str::to_owned) else {
      continue;
    };
    if let Some(file) = field.file_name() {
      debug!(%name, %file, "skipping attachment");
      continue;
    }
    let value = field.text().await.map_err(invalid)?;
    fields.insert(name, Value::String(value));
  }
  serde_json::from_value(Value::Object(fields)).map_err(|e| Error::BadRequest(format!("invalid form body: {e}")))
}

fn present(v: &Option<String>) -> Option<&str> { v.as_deref().map(str::trim).filter(|s| !s.is_empty()) }

/// Split `Jane Doe <jane@example.com>` into display name and address.
fn parse_mailbox(raw: &str) -> (Option<&str>, &str) {
  let raw = raw.trim();
  match (raw.find('<'), raw.rfind('>')) {
    (Some(open), Some(close)) if open < close => {
      let name = raw[..open].trim().trim_matches('"').trim();
      let addr = raw[open + 1..close].trim();
      ((!name.is_empty()).then_some(name), addr)
    }
    _ => (None, raw),
  }
}

impl MailgunForm {
  fn sender(&self) -> Option<&str> { present(&self.sender).or_else(|| present(&self.from)) }

  /// Local part of the first recipient, which names the organization.
  fn recipient_alias(&self) -> Option<String> {
    let first = present(&self.recipient)?.split(',').next()?;
    let (_, addr) = parse_mailbox(first);
    let local = addr.split('@').next()?.trim();
    (!local.is_empty()).then(|| local.to_lowercase())
  }

  fn body(&self) -> &str {
    present(&self.stripped_html)
      .or_else(|| present(&self.stripped_text))
      .or_else(|| present(&self.body_plain))
      .unwrap_or("(empty body)")
  }

  fn title(&self) -> String {
    let title = match (present(&self.subject), self.sender()) {
      (Some(subject), _) => subject.to_owned(),
      (None, Some(sender)) => format!("Contato: {sender}"),
      (None, None) => return "New email".to_owned(),
    };
    title.chars().take(MAX_TITLE_CHARS).collect()
  }

  fn description(&self) -> String {
    let mut lines = Vec::new();
    if let Some(sender) = self.sender() {
      lines.push(format!("From: {sender}"));
    }
    if let Some(recipient) = present(&self.recipient) {
      lines.push(format!("To: {recipient}"));
    }
    if let Some(subject) = present(&self.subject) {
      lines.push(format!("Subject: {subject}"));
    }
    lines.push(String::new());
    lines.push(self.body().to_owned());
    lines.join("\n")
  }

  fn new_lead(&self) -> NewLead {
    let mut lead = NewLead::titled(self.title(), LeadSource::Email);
    if let Some((name, addr)) = self.sender().map(parse_mailbox) {
      lead.name = name.map(str::to_owned);
      lead.email = addr.contains('@').then(|| addr.to_owned());
    }
    lead.description = Some(self.description());
    lead.lead_source_detail = Some("mailgun".to_owned());
    lead
  }
}

/// Turn an inbound email into a lead with an inbound email interaction.
/// Unknown recipients get `406`, which Mailgun treats as final.
pub async fn mailgun<S, G>(State(state): State<AppState<S, G>>, request: Request) -> Result<impl IntoResponse, Error>
where
  S: AdsStore + CrmStore + 'static,
  G: GraphApi + 'static,
{
  let form = read_mailgun_form(request).await?;
  let now = Utc::now();

  match state.config.mailgun_signing_key() {
    Some(key) => signature::verify_mailgun(key, &form.timestamp, &form.token, &form.signature, now)?,
    None => warn!("mailgun signing key not configured, skipping signature check"),
  }

  let alias = form
    .recipient_alias()
    .ok_or_else(|| Error::NotAcceptable("no recipient".into()))?;
  let org = state
    .store
    .find_organization_by_alias(alias.clone())
    .await
    .map_err(Error::store)?
    .ok_or_else(|| Error::NotAcceptable(format!("no organization for recipient {alias}")))?;

  let lead = state
    .store
    .create_lead(org.organization_id, form.new_lead())
    .await
    .map_err(Error::store)?;

  state
    .store
    .add_interaction(org.organization_id, lead.lead_id, NewInteraction {
      kind:        InteractionKind::Email,
      direction:   Direction::Inbound,
      subject:     present(&form.subject).map(str::to_owned),
      content:     Some(form.body().to_owned()),
      user_name:   Some("Email (inbound)".to_owned()),
      occurred_at: Some(now),
    })
    .await
    .map_err(Error::store)?;

  let mut activity = LeadActivity::new(lead.lead_id, ActivityAction::EmailReceived, now)
    .with_description(format!("Email received from {}", form.sender().unwrap_or("unknown sender")));
  activity.actor = Some("Mailgun".to_owned());
  state.store.record_activity(activity).await.map_err(Error::store)?;

  info!(organization_id = %org.organization_id, lead_id = %lead.lead_id, "inbound email captured");
  Ok(Json(json!({
    "lead_id": lead.lead_id,
    "organization_id": org.organization_id,
  })))
}

// ─── Stripe ──────────────────────────────────────────────────────────────────

pub async fn stripe<S, G>(
  State(state): State<AppState<S, G>>,
  headers: HeaderMap,
  body: Bytes,
) -> Result<impl IntoResponse, Error>
where
  S: AdsStore + CrmStore + 'static,
  G: GraphApi + 'static,
{
  match state.config.stripe_webhook_secret() {
    Some(secret) => {
      let sig = header(&headers, "stripe-signature").ok_or(signature::SignatureError::Missing)?;
      signature::verify_stripe(secret, sig, &body)?;
    }
    None => warn!("stripe webhook secret not configured, skipping signature check"),
  }

  let event: Value =
    serde_json::from_slice(&body).map_err(|e| Error::BadRequest(format!("invalid event: {e}")))?;
  let billing = BillingEvent::from_stripe(&event);
  if let BillingEvent::Ignored(reason) = &billing {
    debug!(%reason, "stripe event ignored");
    return Ok(Json(json!({ "received": true, "ignored": reason })));
  }

  let updated = state
    .store
    .apply_billing_event(billing, Utc::now())
    .await
    .map_err(Error::store)?;
  match &updated {
    Some(sub) => info!(subscription_id = %sub.subscription_id, status = %sub.status, "subscription updated"),
    None => warn!(event = ?event.get("type"), "stripe event names no known subscription"),
  }

  Ok(Json(json!({
    "received": true,
    "subscription_id": updated.as_ref().map(|s| s.subscription_id),
    "status": updated.as_ref().map(|s| s.status),
  })))
}
