//! Lifecycle contract between a host orchestrator and a provisioning driver.

use std::fmt;
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::pin::Pin;
use std::str::FromStr;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

/// TCP port of the remote container daemon exposed by provisioned machines.
pub const DAEMON_PORT: u16 = 2376;

/// Coarse state of a remote server as observed by a driver.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MachineState {
    /// The provider is still provisioning the server.
    Starting,
    /// The server is active.
    Running,
    /// The server is being torn down or is powered off.
    Stopped,
    /// The state query itself failed.
    Error,
    /// The provider reported a status this driver does not recognise.
    Unknown,
}

impl MachineState {
    /// Maps a provider status string onto a [`MachineState`].
    ///
    /// The mapping is total: unrecognised statuses yield
    /// [`MachineState::Unknown`].
    #[must_use]
    pub fn from_status(status: &str) -> Self {
        match status {
            "provisioning" => Self::Starting,
            "active" => Self::Running,
            "terminating" => Self::Stopped,
            _ => Self::Unknown,
        }
    }

    /// Collapses a state query result into the state a host should record.
    #[must_use]
    pub const fn observed<E>(result: &Result<Self, E>) -> Self {
        match result {
            Ok(state) => *state,
            Err(_) => Self::Error,
        }
    }
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Starting => "Starting",
            Self::Running => "Running",
            Self::Stopped => "Stopped",
            Self::Error => "Error",
            Self::Unknown => "Unknown",
        };
        f.write_str(label)
    }
}

/// Host-assigned identity of a machine and the directory holding its files.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MachineContext {
    /// Machine name chosen by the host; also used as the SSH key label.
    pub machine_name: String,
    /// Root of the host's storage tree.
    pub store_path: Utf8PathBuf,
}

impl MachineContext {
    /// Creates a context for `machine_name` rooted at `store_path`.
    #[must_use]
    pub fn new(machine_name: impl Into<String>, store_path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            machine_name: machine_name.into(),
            store_path: store_path.into(),
        }
    }

    /// Directory reserved for this machine's files.
    #[must_use]
    pub fn machine_dir(&self) -> Utf8PathBuf {
        self.store_path.join("machines").join(&self.machine_name)
    }

    /// Path of the machine's private SSH key. The public half sits next to it
    /// with a `.pub` suffix.
    #[must_use]
    pub fn ssh_key_path(&self) -> Utf8PathBuf {
        self.machine_dir().join("id_rsa")
    }
}

/// Returns the path of the public key paired with `private_key`.
#[must_use]
pub fn public_key_path(private_key: &Utf8Path) -> Utf8PathBuf {
    Utf8PathBuf::from(format!("{private_key}.pub"))
}

/// Builds the daemon URL (`tcp://host:2376`) for an address, bracketing IPv6.
#[must_use]
pub fn daemon_url(ip: &str) -> String {
    IpAddr::from_str(ip).map_or_else(
        |_| format!("tcp://{ip}:{DAEMON_PORT}"),
        |addr| format!("tcp://{}", SocketAddr::new(addr, DAEMON_PORT)),
    )
}

/// Parameters sent to the provider when creating a server.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ServerRequest {
    /// Project that owns and bills the server.
    pub project_id: String,
    /// Hostname assigned to the server.
    pub hostname: String,
    /// Operating system image label.
    pub image: String,
    /// Region in which to deploy.
    pub region: String,
    /// Plan identifier.
    pub plan: String,
    /// Remote SSH key identifiers authorised on the server.
    pub ssh_key_ids: Vec<String>,
    /// Base64 encoded cloud-init user data.
    pub user_data: Option<String>,
    /// Key/value tags applied to the server.
    pub tags: Vec<(String, String)>,
}

impl ServerRequest {
    /// Starts a builder for a [`ServerRequest`].
    #[must_use]
    pub fn builder() -> ServerRequestBuilder {
        ServerRequestBuilder::new()
    }

    /// Validates the request, naming the first empty required field.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Validation`] when a required field is empty.
    pub fn validate(&self) -> Result<(), DriverError> {
        let required = [
            ("project_id", &self.project_id),
            ("hostname", &self.hostname),
            ("image", &self.image),
            ("region", &self.region),
            ("plan", &self.plan),
        ];
        for (field, value) in required {
            if value.is_empty() {
                return Err(DriverError::Validation(field.to_owned()));
            }
        }
        if self.ssh_key_ids.iter().any(String::is_empty) {
            return Err(DriverError::Validation(String::from("ssh_key_ids")));
        }
        Ok(())
    }
}

/// Builder for [`ServerRequest`] that trims input before validating.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ServerRequestBuilder {
    project_id: String,
    hostname: String,
    image: String,
    region: String,
    plan: String,
    ssh_key_ids: Vec<String>,
    user_data: Option<String>,
    tags: Vec<(String, String)>,
}

impl ServerRequestBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the project identifier.
    #[must_use]
    pub fn project_id(mut self, value: impl Into<String>) -> Self {
        self.project_id = value.into();
        self
    }

    /// Sets the hostname.
    #[must_use]
    pub fn hostname(mut self, value: impl Into<String>) -> Self {
        self.hostname = value.into();
        self
    }

    /// Sets the image label.
    #[must_use]
    pub fn image(mut self, value: impl Into<String>) -> Self {
        self.image = value.into();
        self
    }

    /// Sets the region.
    #[must_use]
    pub fn region(mut self, value: impl Into<String>) -> Self {
        self.region = value.into();
        self
    }

    /// Sets the plan.
    #[must_use]
    pub fn plan(mut self, value: impl Into<String>) -> Self {
        self.plan = value.into();
        self
    }

    /// Adds an SSH key identifier.
    #[must_use]
    pub fn ssh_key_id(mut self, value: impl Into<String>) -> Self {
        self.ssh_key_ids.push(value.into());
        self
    }

    /// Sets the encoded user data.
    #[must_use]
    pub fn user_data(mut self, value: Option<String>) -> Self {
        self.user_data = value;
        self
    }

    /// Sets the tags.
    #[must_use]
    pub fn tags(mut self, value: Vec<(String, String)>) -> Self {
        self.tags = value;
        self
    }

    /// Builds and validates the [`ServerRequest`].
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Validation`] when a required field is empty.
    pub fn build(self) -> Result<ServerRequest, DriverError> {
        let request = ServerRequest {
            project_id: self.project_id.trim().to_owned(),
            hostname: self.hostname.trim().to_owned(),
            image: self.image.trim().to_owned(),
            region: self.region.trim().to_owned(),
            plan: self.plan.trim().to_owned(),
            ssh_key_ids: self
                .ssh_key_ids
                .into_iter()
                .map(|id| id.trim().to_owned())
                .collect(),
            user_data: self.user_data,
            tags: self.tags,
        };
        request.validate()?;
        Ok(request)
    }
}

/// Errors shared by every driver.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum DriverError {
    /// Raised when a request is missing a required field.
    #[error("missing or empty field: {0}")]
    Validation(String),
}

/// Future returned by driver operations.
pub type DriverFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Lifecycle operations a host invokes on a provisioning driver.
///
/// A host calls [`Driver::pre_create_check`] before [`Driver::create`]; the
/// remaining verbs operate on the server created there.
pub trait Driver {
    /// Provider specific error type returned by the driver.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Short provider name.
    fn driver_name(&self) -> &'static str;

    /// Validates inputs that can be checked before anything is created.
    fn pre_create_check(&mut self) -> DriverFuture<'_, (), Self::Error>;

    /// Creates the server and waits until it is reachable.
    fn create(&mut self) -> DriverFuture<'_, (), Self::Error>;

    /// Powers the server on.
    fn start(&self) -> DriverFuture<'_, (), Self::Error>;

    /// Powers the server off.
    fn stop(&self) -> DriverFuture<'_, (), Self::Error>;

    /// Reboots the server.
    fn restart(&self) -> DriverFuture<'_, (), Self::Error>;

    /// Forcibly powers the server off.
    fn kill(&self) -> DriverFuture<'_, (), Self::Error>;

    /// Deletes the server.
    fn remove(&self) -> DriverFuture<'_, (), Self::Error>;

    /// Reports the server's current state.
    fn state(&self) -> DriverFuture<'_, MachineState, Self::Error>;

    /// Returns the server's primary IP address.
    fn ip(&self) -> DriverFuture<'_, String, Self::Error>;

    /// Returns the daemon URL for a running server.
    fn url(&self) -> DriverFuture<'_, String, Self::Error>;

    /// Returns the host name used for SSH connections.
    fn ssh_hostname(&self) -> DriverFuture<'_, String, Self::Error> {
        self.ip()
    }

    /// User name for SSH connections.
    fn ssh_username(&self) -> &str;

    /// Port for SSH connections.
    fn ssh_port(&self) -> u16;

    /// Path of the private key used for SSH connections.
    fn ssh_key_path(&self) -> Utf8PathBuf;
}
