//! CLI Commands

pub mod run;
pub mod serve;
pub mod validate;

/// Every module ran and none failed
pub const EXIT_OK: i32 = 0;
/// A module failed or was interrupted, or the run was stopped
pub const EXIT_FAILURES: i32 = 1;
/// The plan aborted or its configuration is invalid
pub const EXIT_ABORTED: i32 = 2;
