//! Conformance Autopilot CLI
//!
//! Command-line interface for running conformance plans, validating plan
//! configuration files and starting the dashboard.

pub mod commands;
pub mod output;
