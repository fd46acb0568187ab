//! Cherry Servers implementation of the machine lifecycle.

mod api;
mod error;
mod keys;
mod types;
mod wait;

use std::time::Duration;

use camino::Utf8PathBuf;
use tracing::info;

use crate::command::{CommandRunner, ProcessCommandRunner};
use crate::config::CherryConfig;
use crate::driver::{
    Driver, DriverFuture, MachineContext, MachineState, ServerRequest, daemon_url,
};
use crate::ssh::KeyGenerator;
use crate::user_data::load_user_data;

pub use api::{CherryApi, DEFAULT_API_BASE, HttpCherryApi};
pub use error::CherryDriverError;
pub use keys::verify_fingerprint;
pub use types::{ACTIVE_STATE, IpAddressRecord, PRIMARY_IP_TYPE, PowerAction, Server, SshKey};

/// Name reported through [`Driver::driver_name`].
pub const DRIVER_NAME: &str = "cherryservers";
/// Interval between provisioning polls.
pub const POLL_INTERVAL: Duration = Duration::from_secs(10);
/// Number of provisioning polls before giving up.
pub const MAX_POLL_ATTEMPTS: u32 = 300;

/// Driver that provisions servers through the Cherry Servers API.
#[derive(Clone, Debug)]
pub struct CherryDriver<A = HttpCherryApi, R = ProcessCommandRunner>
where
    R: CommandRunner,
{
    api: A,
    keygen: KeyGenerator<R>,
    config: CherryConfig,
    context: MachineContext,
    server_id: Option<String>,
    ssh_key_id: Option<String>,
    ip_address: Option<String>,
    poll_interval: Duration,
    max_attempts: u32,
}

impl CherryDriver {
    /// Constructs a driver that talks to the public API and generates keys
    /// with the system `ssh-keygen`.
    ///
    /// # Errors
    ///
    /// Returns [`CherryDriverError::Config`] when the configuration fails
    /// validation.
    pub fn new(config: CherryConfig, context: MachineContext) -> Result<Self, CherryDriverError> {
        let api = HttpCherryApi::new(config.auth_token.clone());
        Self::with_parts(config, context, api, ProcessCommandRunner)
    }
}

impl<A: CherryApi, R: CommandRunner> CherryDriver<A, R> {
    /// Constructs a driver from explicit collaborators.
    ///
    /// # Errors
    ///
    /// Returns [`CherryDriverError::Config`] when the configuration fails
    /// validation.
    pub fn with_parts(
        config: CherryConfig,
        context: MachineContext,
        api: A,
        runner: R,
    ) -> Result<Self, CherryDriverError> {
        config.validate()?;
        Ok(Self {
            api,
            keygen: KeyGenerator::new(runner),
            config,
            context,
            server_id: None,
            ssh_key_id: None,
            ip_address: None,
            poll_interval: POLL_INTERVAL,
            max_attempts: MAX_POLL_ATTEMPTS,
        })
    }

    /// Overrides the provisioning poll interval and attempt bound.
    #[must_use]
    pub fn with_poll_settings(mut self, interval: Duration, max_attempts: u32) -> Self {
        self.poll_interval = interval;
        self.max_attempts = max_attempts;
        self
    }

    /// Attaches the driver to a server created earlier.
    #[must_use]
    pub fn with_server_id(mut self, server_id: impl Into<String>) -> Self {
        self.server_id = Some(server_id.into());
        self
    }

    /// Identifier of the server this driver manages, once known.
    #[must_use]
    pub fn server_id(&self) -> Option<&str> {
        self.server_id.as_deref()
    }

    /// Identifier of the SSH key authorised on the server, once resolved.
    #[must_use]
    pub fn ssh_key_id(&self) -> Option<&str> {
        self.ssh_key_id.as_deref()
    }

    /// Primary IP recorded by the provisioning wait loop.
    #[must_use]
    pub fn ip_address(&self) -> Option<&str> {
        self.ip_address.as_deref()
    }

    /// Host-assigned machine identity.
    #[must_use]
    pub const fn context(&self) -> &MachineContext {
        &self.context
    }

    fn require_server_id(&self) -> Result<&str, CherryDriverError> {
        self.server_id
            .as_deref()
            .ok_or_else(|| CherryDriverError::ServerNotCreated {
                machine: self.context.machine_name.clone(),
            })
    }

    fn build_request(&self, ssh_key_id: &str) -> Result<ServerRequest, CherryDriverError> {
        let hostname = if self.config.hostname.trim().is_empty() {
            self.context.machine_name.as_str()
        } else {
            self.config.hostname.as_str()
        };
        let user_data = load_user_data(self.config.userdata.as_deref())?;
        Ok(ServerRequest::builder()
            .project_id(&self.config.project_id)
            .hostname(hostname)
            .image(&self.config.image)
            .region(&self.config.region)
            .plan(&self.config.plan)
            .ssh_key_id(ssh_key_id)
            .user_data(user_data)
            .tags(self.config.parsed_tags())
            .build()?)
    }

    async fn deploy(&mut self) -> Result<(), CherryDriverError> {
        info!(machine = %self.context.machine_name, "deploying Cherry Servers node");
        let key_path = self.context.ssh_key_path();
        let ssh_key_id = self.provision_key(&key_path).await?;
        let request = self.build_request(&ssh_key_id)?;

        let server = self.api.create_server(&request).await?;
        info!(server_id = %server.id, "server created");
        self.server_id = Some(server.id.clone());

        info!(server_id = %server.id, "waiting for server to be deployed");
        let address = self.wait_for_server(&server.id).await?;
        info!(server_id = %server.id, ip = %address, "server is active");
        self.ip_address = Some(address);
        Ok(())
    }

    async fn power(&self, action: PowerAction) -> Result<(), CherryDriverError> {
        let server_id = self.require_server_id()?;
        info!(%server_id, action = action.as_str(), "sending power action");
        self.api.server_action(server_id, action).await
    }

    async fn fetch_state(&self) -> Result<MachineState, CherryDriverError> {
        let server_id = self.require_server_id()?;
        let server = self.api.get_server(server_id).await?;
        Ok(MachineState::from_status(&server.state))
    }

    async fn resolve_ip(&self) -> Result<String, CherryDriverError> {
        if let Some(address) = &self.ip_address {
            return Ok(address.clone());
        }
        let server_id = self.require_server_id()?;
        let server = self.api.get_server(server_id).await?;
        server
            .primary_ip()
            .map(str::to_owned)
            .ok_or_else(|| CherryDriverError::IpNotSet {
                server_id: server_id.to_owned(),
            })
    }

    async fn resolve_url(&self) -> Result<String, CherryDriverError> {
        let state = self.fetch_state().await?;
        if state != MachineState::Running {
            return Err(CherryDriverError::NotRunning {
                state: state.to_string(),
            });
        }
        let address = self.resolve_ip().await?;
        Ok(daemon_url(&address))
    }
}

impl<A, R> Driver for CherryDriver<A, R>
where
    A: CherryApi + Send + Sync,
    R: CommandRunner + Send + Sync,
{
    type Error = CherryDriverError;

    fn driver_name(&self) -> &'static str {
        DRIVER_NAME
    }

    fn pre_create_check(&mut self) -> DriverFuture<'_, (), Self::Error> {
        Box::pin(async move { self.check_existing_key().await })
    }

    fn create(&mut self) -> DriverFuture<'_, (), Self::Error> {
        Box::pin(async move { self.deploy().await })
    }

    fn start(&self) -> DriverFuture<'_, (), Self::Error> {
        Box::pin(async move { self.power(PowerAction::PowerOn).await })
    }

    fn stop(&self) -> DriverFuture<'_, (), Self::Error> {
        Box::pin(async move { self.power(PowerAction::PowerOff).await })
    }

    fn restart(&self) -> DriverFuture<'_, (), Self::Error> {
        Box::pin(async move { self.power(PowerAction::Reboot).await })
    }

    fn kill(&self) -> DriverFuture<'_, (), Self::Error> {
        Box::pin(async move { self.power(PowerAction::PowerOff).await })
    }

    fn remove(&self) -> DriverFuture<'_, (), Self::Error> {
        Box::pin(async move {
            let server_id = self.require_server_id()?;
            info!(%server_id, "deleting server");
            self.api.delete_server(server_id).await
        })
    }

    fn state(&self) -> DriverFuture<'_, MachineState, Self::Error> {
        Box::pin(async move { self.fetch_state().await })
    }

    fn ip(&self) -> DriverFuture<'_, String, Self::Error> {
        Box::pin(async move { self.resolve_ip().await })
    }

    fn url(&self) -> DriverFuture<'_, String, Self::Error> {
        Box::pin(async move { self.resolve_url().await })
    }

    fn ssh_username(&self) -> &str {
        &self.config.ssh_user
    }

    fn ssh_port(&self) -> u16 {
        self.config.ssh_port
    }

    fn ssh_key_path(&self) -> Utf8PathBuf {
        self.context.ssh_key_path()
    }
}

#[cfg(test)]
mod tests;
