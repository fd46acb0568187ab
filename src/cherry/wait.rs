//! Provisioning wait loop for the Cherry Servers driver.

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::command::CommandRunner;

use super::{CherryApi, CherryDriver, CherryDriverError};

impl<A: CherryApi, R: CommandRunner> CherryDriver<A, R> {
    /// Polls the server until one observation is both `active` and carries a
    /// primary IP, returning that address.
    ///
    /// Fetch failures are logged and count as an unsuccessful attempt.
    pub(super) async fn wait_for_server(&self, server_id: &str) -> Result<String, CherryDriverError> {
        for attempt in 1..=self.max_attempts {
            match self.api.get_server(server_id).await {
                Ok(server) => {
                    if let Some(address) = server.ready_address() {
                        return Ok(address.to_owned());
                    }
                    debug!(%server_id, attempt, state = %server.state, "server not ready yet");
                }
                Err(err) => {
                    warn!(%server_id, attempt, error = %err, "failed to fetch server while waiting");
                }
            }

            if attempt < self.max_attempts {
                sleep(self.poll_interval).await;
            }
        }

        Err(CherryDriverError::Timeout {
            server_id: server_id.to_owned(),
            attempts: self.max_attempts,
        })
    }
}
