//! Rollout observation for the frontend discovery service.
//!
//! A fixed population of simulated users polls the consumer API until
//! every one of them is served the new version of a micro-frontend.
//!
//! - `SessionStore` - Per-user request count, version, URL and session token
//! - `ClientPoller` - One consumer API interaction for one user
//! - `RolloutMonitor` - Round loop, rendering and termination
//! - `ConsoleRenderer` - In-place table of the session store

mod config;
mod monitor;
mod poller;
mod render;
mod session;

pub use config::*;
pub use monitor::*;
pub use poller::*;
pub use render::*;
pub use session::*;
