//! Core library for the Cherry Servers machine driver.
//!
//! The crate exposes the lifecycle contract a host orchestrator drives
//! (pre-create check → create → start/stop/restart/kill → remove, plus state
//! and address queries) and a Cherry Servers implementation of it.

pub mod cherry;
pub mod command;
pub mod config;
pub mod driver;
pub mod ssh;
pub mod test_support;
pub mod user_data;
pub mod util;

pub use cherry::{CherryApi, CherryDriver, CherryDriverError, HttpCherryApi};
pub use command::{CommandRunner, ProcessCommandRunner};
pub use config::CherryConfig;
pub use driver::{Driver, MachineContext, MachineState, ServerRequest, ServerRequestBuilder};
