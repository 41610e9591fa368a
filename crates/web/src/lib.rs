//! Conformance Autopilot Dashboard
//!
//! HTTP API behind the dashboard UI: launch and stop plan runs, edit plan
//! configuration files, look up plans on the conformance server, and follow
//! progress through a server-sent event feed.

pub mod server;
pub mod state;

pub use server::{serve, DashboardServer};
pub use state::{DashboardConfig, DashboardState, HealthResponse, RunState, MAX_LOG_LINES};
