//! HTTP client for the Cherry Servers REST API.

use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;

use crate::driver::{DriverFuture, ServerRequest};

use super::error::CherryDriverError;
use super::types::{
    ActionBody, ApiErrorBody, CreateServerBody, CreateSshKeyBody, PowerAction, Server, SshKey,
};

/// Base URL of the public API.
pub const DEFAULT_API_BASE: &str = "https://api.cherryservers.com/v1";

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Remote calls the driver makes against the provider.
///
/// Implementations are cheap to share; the driver holds one for its whole
/// lifetime.
pub trait CherryApi {
    /// Fetches a server by identifier.
    fn get_server<'a>(&'a self, server_id: &'a str) -> DriverFuture<'a, Server, CherryDriverError>;

    /// Creates a server in the request's project.
    fn create_server<'a>(
        &'a self,
        request: &'a ServerRequest,
    ) -> DriverFuture<'a, Server, CherryDriverError>;

    /// Performs a power action on a server.
    fn server_action<'a>(
        &'a self,
        server_id: &'a str,
        action: PowerAction,
    ) -> DriverFuture<'a, (), CherryDriverError>;

    /// Deletes a server.
    fn delete_server<'a>(&'a self, server_id: &'a str) -> DriverFuture<'a, (), CherryDriverError>;

    /// Lists the SSH keys visible to the token.
    fn list_ssh_keys(&self) -> DriverFuture<'_, Vec<SshKey>, CherryDriverError>;

    /// Registers a public key under `label`.
    fn create_ssh_key<'a>(
        &'a self,
        label: &'a str,
        public_key: &'a str,
    ) -> DriverFuture<'a, SshKey, CherryDriverError>;
}

/// [`CherryApi`] implementation backed by `reqwest`.
#[derive(Clone, Debug)]
pub struct HttpCherryApi {
    client: Client,
    base_url: String,
    auth_token: String,
}

impl HttpCherryApi {
    /// Creates a client for the public API authenticated with `auth_token`.
    #[must_use]
    pub fn new(auth_token: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent(concat!("cherry-machine/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            base_url: DEFAULT_API_BASE.to_owned(),
            auth_token: auth_token.into(),
        }
    }

    /// Points the client at a different API root.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_owned();
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    async fn execute(&self, builder: RequestBuilder) -> Result<Vec<u8>, CherryDriverError> {
        let response = builder.bearer_auth(&self.auth_token).send().await?;
        let status = response.status();
        let body = response.bytes().await?.to_vec();
        if status.is_success() {
            return Ok(body);
        }

        Err(CherryDriverError::Api {
            status: status.as_u16(),
            message: error_message(&body),
        })
    }

    async fn execute_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> Result<T, CherryDriverError> {
        let body = self.execute(builder).await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

fn error_message(body: &[u8]) -> String {
    serde_json::from_slice::<ApiErrorBody>(body)
        .ok()
        .map(|parsed| parsed.message)
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| String::from_utf8_lossy(body).into_owned())
}

impl CherryApi for HttpCherryApi {
    fn get_server<'a>(&'a self, server_id: &'a str) -> DriverFuture<'a, Server, CherryDriverError> {
        Box::pin(async move {
            let request = self.client.get(self.url(&format!("servers/{server_id}")));
            self.execute_json(request).await
        })
    }

    fn create_server<'a>(
        &'a self,
        request: &'a ServerRequest,
    ) -> DriverFuture<'a, Server, CherryDriverError> {
        Box::pin(async move {
            let url = self.url(&format!("projects/{}/servers", request.project_id));
            let builder = self
                .client
                .post(url)
                .json(&CreateServerBody::from(request));
            self.execute_json(builder).await
        })
    }

    fn server_action<'a>(
        &'a self,
        server_id: &'a str,
        action: PowerAction,
    ) -> DriverFuture<'a, (), CherryDriverError> {
        Box::pin(async move {
            let builder = self
                .client
                .post(self.url(&format!("servers/{server_id}/actions")))
                .json(&ActionBody {
                    action_type: action.as_str(),
                });
            self.execute(builder).await.map(drop)
        })
    }

    fn delete_server<'a>(&'a self, server_id: &'a str) -> DriverFuture<'a, (), CherryDriverError> {
        Box::pin(async move {
            let builder = self.client.delete(self.url(&format!("servers/{server_id}")));
            self.execute(builder).await.map(drop)
        })
    }

    fn list_ssh_keys(&self) -> DriverFuture<'_, Vec<SshKey>, CherryDriverError> {
        Box::pin(async move {
            let builder = self.client.get(self.url("ssh-keys"));
            self.execute_json(builder).await
        })
    }

    fn create_ssh_key<'a>(
        &'a self,
        label: &'a str,
        public_key: &'a str,
    ) -> DriverFuture<'a, SshKey, CherryDriverError> {
        Box::pin(async move {
            let builder = self.client.post(self.url("ssh-keys")).json(&CreateSshKeyBody {
                label,
                key: public_key,
            });
            self.execute_json(builder).await
        })
    }
}
