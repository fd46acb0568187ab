//! Test support utilities shared across unit and integration tests.
//!
//! [`ScriptedApi`] answers Cherry Servers calls from pre-seeded responses and
//! records what the driver asked for; [`ScriptedKeygen`] stands in for
//! `ssh-keygen` by writing a fixed key pair.

use std::collections::{BTreeSet, VecDeque};
use std::env;
use std::ffi::OsString;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::cherry::{CherryApi, CherryDriverError, IpAddressRecord, PowerAction, Server, SshKey};
use crate::command::{CommandError, CommandOutput, CommandRunner};
use crate::driver::{DriverFuture, ServerRequest};

/// OpenSSH public key used as a deterministic fixture.
pub const FIXTURE_PUBLIC_KEY: &str = "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAII2WN5WREuNkq/FyK0/ikZTW8vpS/4eGIp4MM0jFMon3 fixture";

/// MD5 fingerprint of [`FIXTURE_PUBLIC_KEY`] without separators.
pub const FIXTURE_FINGERPRINT: &str = "a3f6ae6e22a9c6a6f25e3d6bb0223afc";

/// MD5 fingerprint of [`FIXTURE_PUBLIC_KEY`] as the provider renders it.
pub const FIXTURE_FINGERPRINT_COLONS: &str = "a3:f6:ae:6e:22:a9:c6:a6:f2:5e:3d:6b:b0:22:3a:fc";

/// Builds a server record with `(type, address)` IP entries.
#[must_use]
pub fn server(id: &str, state: &str, ips: &[(&str, &str)]) -> Server {
    Server {
        id: id.to_owned(),
        hostname: String::new(),
        state: state.to_owned(),
        ip_addresses: ips
            .iter()
            .map(|(address_type, address)| IpAddressRecord {
                address: (*address).to_owned(),
                address_type: (*address_type).to_owned(),
            })
            .collect(),
    }
}

/// Builds an SSH key record.
#[must_use]
pub fn ssh_key(id: &str, label: &str, fingerprint: &str) -> SshKey {
    SshKey {
        id: id.to_owned(),
        label: label.to_owned(),
        fingerprint: fingerprint.to_owned(),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct ApiState {
    server_responses: VecDeque<Result<Server, CherryDriverError>>,
    created_server_id: Option<String>,
    ssh_keys: Vec<SshKey>,
    create_server_error: Option<CherryDriverError>,
    action_error: Option<CherryDriverError>,
    created_servers: Vec<ServerRequest>,
    registered_keys: Vec<(String, String)>,
    actions: Vec<(String, PowerAction)>,
    deleted: Vec<String>,
    get_server_calls: usize,
}

/// Scripted [`CherryApi`] double.
///
/// `get_server` pops responses in FIFO order and fails once the queue is
/// empty.
#[derive(Clone, Debug, Default)]
pub struct ScriptedApi {
    state: Arc<Mutex<ApiState>>,
}

impl ScriptedApi {
    /// Creates an API double with no scripted responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a server record for the next `get_server` call.
    pub fn push_server(&self, server: Server) {
        lock(&self.state).server_responses.push_back(Ok(server));
    }

    /// Queues a failure for the next `get_server` call.
    pub fn push_fetch_error(&self, message: &str) {
        lock(&self.state)
            .server_responses
            .push_back(Err(CherryDriverError::Provider {
                message: message.to_owned(),
            }));
    }

    /// Sets the identifier returned by `create_server`.
    pub fn set_created_server_id(&self, id: &str) {
        lock(&self.state).created_server_id = Some(id.to_owned());
    }

    /// Replaces the keys returned by `list_ssh_keys`.
    pub fn set_ssh_keys(&self, keys: Vec<SshKey>) {
        lock(&self.state).ssh_keys = keys;
    }

    /// Makes `create_server` fail with `error`.
    pub fn fail_create_server(&self, error: CherryDriverError) {
        lock(&self.state).create_server_error = Some(error);
    }

    /// Makes every power action fail with `error`.
    pub fn fail_actions(&self, error: CherryDriverError) {
        lock(&self.state).action_error = Some(error);
    }

    /// Requests passed to `create_server`.
    #[must_use]
    pub fn created_servers(&self) -> Vec<ServerRequest> {
        lock(&self.state).created_servers.clone()
    }

    /// `(label, public key)` pairs passed to `create_ssh_key`.
    #[must_use]
    pub fn registered_keys(&self) -> Vec<(String, String)> {
        lock(&self.state).registered_keys.clone()
    }

    /// Power actions performed, in order.
    #[must_use]
    pub fn actions(&self) -> Vec<(String, PowerAction)> {
        lock(&self.state).actions.clone()
    }

    /// Server identifiers passed to `delete_server`.
    #[must_use]
    pub fn deleted(&self) -> Vec<String> {
        lock(&self.state).deleted.clone()
    }

    /// Number of `get_server` calls made so far.
    #[must_use]
    pub fn get_server_calls(&self) -> usize {
        lock(&self.state).get_server_calls
    }
}

impl CherryApi for ScriptedApi {
    fn get_server<'a>(&'a self, server_id: &'a str) -> DriverFuture<'a, Server, CherryDriverError> {
        let response = {
            let mut state = lock(&self.state);
            state.get_server_calls += 1;
            state.server_responses.pop_front()
        };
        Box::pin(async move {
            response.unwrap_or_else(|| {
                Err(CherryDriverError::Api {
                    status: 404,
                    message: format!("no scripted response for server {server_id}"),
                })
            })
        })
    }

    fn create_server<'a>(
        &'a self,
        request: &'a ServerRequest,
    ) -> DriverFuture<'a, Server, CherryDriverError> {
        let result = {
            let mut state = lock(&self.state);
            state.created_servers.push(request.clone());
            state.create_server_error.clone().map_or_else(
                || {
                    let id = state
                        .created_server_id
                        .clone()
                        .unwrap_or_else(|| String::from("1001"));
                    Ok(server(&id, "provisioning", &[]))
                },
                Err,
            )
        };
        Box::pin(async move { result })
    }

    fn server_action<'a>(
        &'a self,
        server_id: &'a str,
        action: PowerAction,
    ) -> DriverFuture<'a, (), CherryDriverError> {
        let result = {
            let mut state = lock(&self.state);
            state.actions.push((server_id.to_owned(), action));
            state.action_error.clone().map_or(Ok(()), Err)
        };
        Box::pin(async move { result })
    }

    fn delete_server<'a>(&'a self, server_id: &'a str) -> DriverFuture<'a, (), CherryDriverError> {
        lock(&self.state).deleted.push(server_id.to_owned());
        Box::pin(async move { Ok(()) })
    }

    fn list_ssh_keys(&self) -> DriverFuture<'_, Vec<SshKey>, CherryDriverError> {
        let keys = lock(&self.state).ssh_keys.clone();
        Box::pin(async move { Ok(keys) })
    }

    fn create_ssh_key<'a>(
        &'a self,
        label: &'a str,
        public_key: &'a str,
    ) -> DriverFuture<'a, SshKey, CherryDriverError> {
        let key = {
            let mut state = lock(&self.state);
            state
                .registered_keys
                .push((label.to_owned(), public_key.to_owned()));
            let id = format!("{}", 500 + state.registered_keys.len());
            ssh_key(&id, label, FIXTURE_FINGERPRINT_COLONS)
        };
        Box::pin(async move { Ok(key) })
    }
}

/// Records a single invocation made through [`ScriptedKeygen`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandInvocation {
    /// Program name as passed to the runner.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<OsString>,
}

impl CommandInvocation {
    /// Returns a shell-like command string for assertions.
    #[must_use]
    pub fn command_string(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.clone());
        parts.extend(
            self.args
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned()),
        );
        parts.join(" ")
    }
}

/// [`CommandRunner`] that imitates `ssh-keygen -f <path>` by writing
/// [`FIXTURE_PUBLIC_KEY`] and a placeholder private key.
#[derive(Clone, Debug, Default)]
pub struct ScriptedKeygen {
    invocations: Arc<Mutex<Vec<CommandInvocation>>>,
    fail: bool,
}

impl ScriptedKeygen {
    /// Creates a generator that succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a generator that exits with status 1 without writing files.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Returns a snapshot of all invocations recorded so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<CommandInvocation> {
        lock(&self.invocations).clone()
    }
}

impl CommandRunner for ScriptedKeygen {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, CommandError> {
        lock(&self.invocations).push(CommandInvocation {
            program: program.to_owned(),
            args: args.to_vec(),
        });

        if self.fail {
            return Ok(CommandOutput {
                code: Some(1),
                stderr: String::from("simulated failure"),
            });
        }

        let target = args
            .iter()
            .skip_while(|arg| arg.as_os_str() != "-f")
            .nth(1)
            .ok_or_else(|| CommandError::Spawn {
                program: program.to_owned(),
                message: String::from("missing -f argument"),
            })?;
        let write_err = |err: std::io::Error| CommandError::Spawn {
            program: program.to_owned(),
            message: err.to_string(),
        };
        let mut public = target.clone();
        public.push(".pub");
        std::fs::write(target, "FIXTURE PRIVATE KEY\n").map_err(write_err)?;
        std::fs::write(public, format!("{FIXTURE_PUBLIC_KEY}\n")).map_err(write_err)?;

        Ok(CommandOutput {
            code: Some(0),
            stderr: String::new(),
        })
    }
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: tokio::sync::Mutex<()> = tokio::sync::Mutex::const_new(());

/// Guard that holds the env mutex and restores variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: tokio::sync::MutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets and removes environment variables while holding a global mutex.
    ///
    /// Keys in `unset` are removed for the guard's lifetime so ambient
    /// `CHERRYSERVERS_*` values cannot leak into a test.
    pub async fn set_vars(pairs: &[(&str, &str)], unset: &[&str]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs
                    .iter()
                    .map(|(key, _)| *key)
                    .chain(unset.iter().copied())
                    .all(|key| seen.insert(key))
            },
            "duplicate environment variable keys passed to EnvGuard::set_vars"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len() + unset.len());
        for (key, value) in pairs {
            previous.push(((*key).to_owned(), env::var_os(key)));
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::set_var(key, value) };
        }
        for key in unset {
            previous.push(((*key).to_owned(), env::var_os(key)));
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::remove_var(key) };
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in self.previous.iter().rev() {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
