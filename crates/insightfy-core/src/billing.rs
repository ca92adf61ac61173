//! Organization subscriptions and the Stripe events that move them between
//! states.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SubscriptionStatus {
  #[default]
  Trialing,
  Active,
  PastDue,
  Canceled,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Subscription {
  pub subscription_id:        Uuid,
  pub organization_id:        Uuid,
  pub plan_id:                String,
  pub status:                 SubscriptionStatus,
  pub stripe_subscription_id: Option<String>,
  pub stripe_customer_id:     Option<String>,
  pub current_period_start:   Option<DateTime<Utc>>,
  pub current_period_end:     Option<DateTime<Utc>>,
  pub last_payment_date:      Option<DateTime<Utc>>,
  pub last_payment_amount:    Option<f64>,
  pub canceled_at:            Option<DateTime<Utc>>,
  pub updated_at:             DateTime<Utc>,
}

/// One paid (or attempted) invoice. Unique on `external_invoice_id`, so a
/// redelivered webhook updates the same row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubscriptionPayment {
  pub payment_id:          Uuid,
  pub subscription_id:     Uuid,
  pub external_invoice_id: String,
  pub amount:              f64,
  pub status:              String,
  pub paid_at:             Option<DateTime<Utc>>,
}

// ─── Stripe events ───────────────────────────────────────────────────────────

/// The subset of Stripe events that change a subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum BillingEvent {
  /// Checkout finished; the local subscription id travels in
  /// `client_reference_id` (or `metadata.subscription_id`).
  CheckoutCompleted {
    subscription_id:        Uuid,
    stripe_subscription_id: Option<String>,
    stripe_customer_id:     Option<String>,
  },
  PaymentSucceeded {
    stripe_subscription_id: String,
    invoice_id:             String,
    /// Currency units.
    amount:                 f64,
    status:                 String,
    paid_at:                Option<DateTime<Utc>>,
  },
  PaymentFailed {
    stripe_subscription_id: String,
  },
  SubscriptionDeleted {
    stripe_subscription_id: String,
  },
  /// Acknowledged and otherwise ignored. Carries the event type, or a
  /// reason when a known event is missing the fields it needs.
  Ignored(String),
}

impl BillingEvent {
  /// Interpret a decoded Stripe event envelope (`{type, data: {object}}`).
  pub fn from_stripe(event: &Value) -> Self {
    let kind = event.get("type").and_then(Value::as_str).unwrap_or_default();
    let obj = event.pointer("/data/object").unwrap_or(&Value::Null);
    let text = |key: &str| obj.get(key).and_then(Value::as_str).map(str::to_owned);

    match kind {
      "checkout.session.completed" => {
        let reference = text("client_reference_id")
          .or_else(|| obj.pointer("/metadata/subscription_id").and_then(Value::as_str).map(str::to_owned));
        match reference.and_then(|r| Uuid::parse_str(&r).ok()) {
          Some(subscription_id) => Self::CheckoutCompleted {
            subscription_id,
            stripe_subscription_id: text("subscription"),
            stripe_customer_id: text("customer"),
          },
          None => Self::Ignored(format!("{kind} without subscription reference")),
        }
      }
      "invoice.payment_succeeded" => {
        let (Some(stripe_subscription_id), Some(invoice_id)) = (text("subscription"), text("id")) else {
          return Self::Ignored(format!("{kind} without subscription"));
        };
        let cents = obj
          .get("amount_paid")
          .and_then(Value::as_f64)
          .or_else(|| obj.get("amount_due").and_then(Value::as_f64))
          .unwrap_or(0.0);
        let paid_at = obj
          .pointer("/status_transitions/paid_at")
          .and_then(Value::as_i64)
          .or_else(|| obj.get("created").and_then(Value::as_i64))
          .and_then(|ts| Utc.timestamp_opt(ts, 0).single());
        Self::PaymentSucceeded {
          stripe_subscription_id,
          invoice_id,
          amount: cents / 100.0,
          status: text("status").unwrap_or_else(|| "paid".into()).to_uppercase(),
          paid_at,
        }
      }
      "invoice.payment_failed" => match text("subscription") {
        Some(stripe_subscription_id) => Self::PaymentFailed { stripe_subscription_id },
        None => Self::Ignored(format!("{kind} without subscription")),
      },
      "customer.subscription.deleted" => match text("id") {
        Some(stripe_subscription_id) => Self::SubscriptionDeleted { stripe_subscription_id },
        None => Self::Ignored(format!("{kind} without id")),
      },
      other => Self::Ignored(other.to_owned()),
    }
  }
}
