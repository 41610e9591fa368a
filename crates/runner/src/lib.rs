//! Conformance Autopilot Execution Engine
//!
//! This crate drives conformance test modules on a remote conformance
//! suite from registration to a terminal state:
//! - Registers each module of a plan and polls its status
//! - Navigates a Playwright-controlled browser through redirect flows
//! - Executes configured HTTP / browser actions while a module is WAITING
//! - Captures variables from every response for templated follow-ups
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        PlanRunner                           │
//! │    for each module (sequential):                            │
//! │      ├── launcher.launch() -> BrowserSession                │
//! │      ├── api.register_runner() -> runner id                 │
//! │      ├── ModulePoller::poll()                               │
//! │      │     ├── api.get_module_info()      (every interval)  │
//! │      │     ├── api.get_runner_info() + navigate (once)      │
//! │      │     └── api.get_module_logs() + ActionExecutor       │
//! │      └── browser.close()                                    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ActionExecutor: template -> HTTP call / navigate -> capture │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod actions;
pub mod api;
pub mod error;
pub mod events;
pub mod http;
pub mod playwright;
pub mod poller;
pub mod runner;

pub use actions::ActionExecutor;
pub use api::{ConformanceApi, ConformanceClient, ModuleInfo, RunnerInfo};
pub use error::{PlanAborted, RunnerError, RunnerResult};
pub use events::{Reporter, RunEvent};
pub use http::HttpClient;
pub use playwright::{BrowserLauncher, BrowserSession, PlaywrightConfig, PlaywrightLauncher};
pub use poller::{ModuleContext, ModulePoller, PollSettings, TerminalState};
pub use runner::PlanRunner;

/// Default seconds between status polls
pub const POLL_INTERVAL_SECONDS_DEFAULT: u64 = 5;

/// Default seconds before a module poll loop gives up
pub const TIMEOUT_SECONDS_DEFAULT: u64 = 240;

/// Captured variable holding a client callback URL to open after the redirect
pub const CALLBACK_VARIABLE_NAME: &str = "redirect_to";

/// Default per-request timeout in seconds
pub const REQUEST_TIMEOUT_SECONDS_DEFAULT: u64 = 30;
