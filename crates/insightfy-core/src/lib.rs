//! Core types and trait definitions for Insightfy.
//!
//! This crate is deliberately free of HTTP and database dependencies. It holds
//! the domain model (organizations, the mirrored Meta Ads hierarchy, daily
//! insights, CRM leads, goals, subscriptions), the pure arithmetic shared by
//! the sync jobs and the reporting endpoints, and the storage traits every
//! backend implements.

// Native `async fn` in traits; the `Send` bounds are spelled out on the
// returned futures where it matters.
#![allow(async_fn_in_trait)]

pub mod activity;
pub mod ads;
pub mod billing;
pub mod dates;
pub mod error;
pub mod goal;
pub mod insight;
pub mod lead;
pub mod metrics;
pub mod org;
pub mod store;

pub use error::{Error, Result};
