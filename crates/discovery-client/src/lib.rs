//! Typed clients for the frontend discovery service.
//!
//! This crate provides:
//! - `ConsumerClient` - Reads the micro-frontends a user is served
//! - `AdminClient` - Projects, micro-frontends, versions and deployments
//! - `FetchPolicy` - Timeout and retry settings shared by both clients
//! - `RetryPolicy` - Bounded retry with backoff at the call boundary

mod admin;
mod client;
mod consumer;
mod retry;

pub use admin::*;
pub use client::*;
pub use consumer::*;
pub use retry::*;
