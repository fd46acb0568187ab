//! Command-line interface definitions for the `cherry-machine` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::{Args, Parser};

/// Default root for machine key material.
pub(crate) const DEFAULT_STORE_PATH: &str = "~/.cherry-machine";

/// Top-level CLI for the `cherry-machine` binary.
#[derive(Debug, Parser)]
#[command(
    name = "cherry-machine",
    about = "Provision and manage Cherry Servers machines",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Verify settings, create a server, and wait until it is active.
    #[command(name = "create", about = "Create a server and wait until it is active")]
    Create(CreateCommand),
    /// Power a server on.
    #[command(name = "start", about = "Power a server on")]
    Start(ServerCommand),
    /// Power a server off.
    #[command(name = "stop", about = "Power a server off")]
    Stop(ServerCommand),
    /// Reboot a server.
    #[command(name = "restart", about = "Reboot a server")]
    Restart(ServerCommand),
    /// Forcibly power a server off.
    #[command(name = "kill", about = "Forcibly power a server off")]
    Kill(ServerCommand),
    /// Delete a server.
    #[command(name = "rm", about = "Delete a server")]
    Remove(ServerCommand),
    /// Print a server's lifecycle state.
    #[command(name = "status", about = "Print a server's lifecycle state")]
    Status(ServerCommand),
    /// Print a server's primary IP address.
    #[command(name = "ip", about = "Print a server's primary IP address")]
    Ip(ServerCommand),
    /// Print the daemon URL of a running server.
    #[command(name = "url", about = "Print the daemon URL of a running server")]
    Url(ServerCommand),
}

/// Machine identity shared by every subcommand.
#[derive(Debug, Args)]
pub(crate) struct MachineArgs {
    /// Machine name; also the label of a newly registered SSH key.
    #[arg(long, value_name = "NAME")]
    pub(crate) name: Option<String>,
    /// Directory under which machine key material is stored.
    #[arg(long, value_name = "PATH", default_value = DEFAULT_STORE_PATH)]
    pub(crate) store_path: String,
}

/// Arguments for the `cherry-machine create` subcommand.
#[derive(Debug, Args)]
pub(crate) struct CreateCommand {
    #[command(flatten)]
    pub(crate) machine: MachineArgs,
    /// Override the configured hostname.
    #[arg(long, value_name = "HOSTNAME")]
    pub(crate) hostname: Option<String>,
    /// Override the configured image.
    #[arg(long, value_name = "IMAGE")]
    pub(crate) image: Option<String>,
    /// Override the configured region.
    #[arg(long, value_name = "REGION")]
    pub(crate) region: Option<String>,
    /// Override the configured plan.
    #[arg(long, value_name = "PLAN")]
    pub(crate) plan: Option<String>,
}

/// Arguments for subcommands that act on an existing server.
#[derive(Debug, Args)]
pub(crate) struct ServerCommand {
    /// Provider identifier of the server.
    #[arg(value_name = "SERVER_ID")]
    pub(crate) server_id: String,
    #[command(flatten)]
    pub(crate) machine: MachineArgs,
}
