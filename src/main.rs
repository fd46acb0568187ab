//! Binary entry point for the `cherry-machine` CLI.

use std::io::{self, Write};
use std::process;

use camino::Utf8PathBuf;
use clap::Parser;
use thiserror::Error;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use cherry_machine::util::expand_tilde;
use cherry_machine::{
    CherryConfig, CherryDriver, CherryDriverError, Driver, MachineContext, MachineState,
};

mod cli;

use cli::{Cli, CreateCommand, MachineArgs, ServerCommand};

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Driver(#[from] CherryDriverError),
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let exit_code = match dispatch(cli).await {
        Ok(()) => 0,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

async fn dispatch(cli: Cli) -> Result<(), CliError> {
    match cli {
        Cli::Create(command) => create(command).await,
        Cli::Start(command) => attach(&command)?.start().await.map_err(CliError::from),
        Cli::Stop(command) => attach(&command)?.stop().await.map_err(CliError::from),
        Cli::Restart(command) => attach(&command)?.restart().await.map_err(CliError::from),
        Cli::Kill(command) => attach(&command)?.kill().await.map_err(CliError::from),
        Cli::Remove(command) => attach(&command)?.remove().await.map_err(CliError::from),
        Cli::Status(command) => {
            let result = attach(&command)?.state().await;
            print_line(&MachineState::observed(&result).to_string());
            result.map(drop).map_err(CliError::from)
        }
        Cli::Ip(command) => {
            let address = attach(&command)?.ip().await?;
            print_line(&address);
            Ok(())
        }
        Cli::Url(command) => {
            let url = attach(&command)?.url().await?;
            print_line(&url);
            Ok(())
        }
    }
}

fn load_config() -> Result<CherryConfig, CliError> {
    CherryConfig::load_without_cli_args().map_err(|err| CliError::Config(err.to_string()))
}

fn machine_context(args: &MachineArgs, fallback_name: impl FnOnce() -> String) -> MachineContext {
    let name = args.name.clone().unwrap_or_else(fallback_name);
    MachineContext::new(name, Utf8PathBuf::from(expand_tilde(&args.store_path)))
}

fn attach(command: &ServerCommand) -> Result<CherryDriver, CliError> {
    let config = load_config()?;
    let context = machine_context(&command.machine, || command.server_id.clone());
    Ok(CherryDriver::new(config, context)?.with_server_id(&command.server_id))
}

async fn create(command: CreateCommand) -> Result<(), CliError> {
    let mut config = load_config()?;
    apply_overrides(&mut config, &command);
    let context = machine_context(&command.machine, || {
        format!("cherry-{}", Uuid::new_v4().simple())
    });

    let mut driver = CherryDriver::new(config, context)?;
    driver.pre_create_check().await?;
    driver.create().await?;

    print_line(&format!(
        "machine: {}",
        driver.context().machine_name
    ));
    if let Some(server_id) = driver.server_id() {
        print_line(&format!("server id: {server_id}"));
    }
    if let Some(address) = driver.ip_address() {
        print_line(&format!("ip: {address}"));
    }
    print_line(&format!("ssh key: {}", driver.ssh_key_path()));
    Ok(())
}

fn apply_overrides(config: &mut CherryConfig, command: &CreateCommand) {
    let overrides = [
        (&mut config.hostname, &command.hostname),
        (&mut config.image, &command.image),
        (&mut config.region, &command.region),
        (&mut config.plan, &command.plan),
    ];
    for (target, value) in overrides {
        if let Some(value) = value {
            target.clone_from(value);
        }
    }
}

fn print_line(line: &str) {
    writeln!(io::stdout(), "{line}").ok();
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}
