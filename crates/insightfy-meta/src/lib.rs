//! Meta Graph API client for Insightfy.
//!
//! [`GraphApi`] is the seam the sync engine talks to; [`GraphClient`] is the
//! HTTP implementation, with pagination over `paging.next` and bounded
//! retries on rate limits and server errors. [`types`] holds the raw
//! response shapes and their mapping onto `insightfy-core` types, and
//! [`creative`] the ad creative summarizer.

pub mod api;
pub mod client;
pub mod creative;
pub mod error;
pub mod types;

pub use api::{Collected, GraphApi, InsightRequest, LeadRequest};
pub use client::{GraphClient, GraphConfig, sanitize_url};
pub use error::{Error, IsRetryable, Result};
