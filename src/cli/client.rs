
use crate::config::ServerAddress;
use crate::daemon::connection::{PingOutcome, await_pong};
use crate::error::{PingdError, Result};
use crate::logging::log_warning;
use crate::protocol::Command;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

/// Client for sending one-shot commands to a pingd server
pub struct DaemonClient {
    pub address: ServerAddress,
    pub timeout: Duration,
}

impl DaemonClient {
    pub fn new(address: ServerAddress) -> Self {
        Self {
            address,
            timeout: Duration::from_secs(5),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Open a connection to the server
    pub async fn connect(&self) -> Result<TcpStream> {
        let target = (self.address.host.as_str(), self.address.port);
        let stream = timeout(self.timeout, TcpStream::connect(target))
            .await
            .map_err(|_| {
                PingdError::ConnectionError(format!("Timeout connecting to {}", self.address))
            })?
            .map_err(|e| {
                PingdError::ConnectionError(format!(
                    "Failed to connect to {}: {e}",
                    self.address
                ))
            })?;

        debug!("Connected to {}", self.address);
        Ok(stream)
    }

    /// Write the command bytes as-is, without waiting for anything back
    pub async fn send_command(&self, stream: &mut TcpStream, command: &Command) -> Result<()> {
        stream.write_all(command.as_bytes()).await.map_err(|e| {
            PingdError::ConnectionError(format!("Failed to send {command}: {e}"))
        })?;
        debug!("Sent command: {command}");
        Ok(())
    }

    /// Tell the server to stop. Fire-and-forget.
    pub async fn stop(&self) -> Result<()> {
        let mut stream = self.connect().await?;
        self.send_command(&mut stream, &Command::Stop).await?;
        // The server acts on the bytes alone
        if let Err(e) = stream.shutdown().await {
            debug!("Shutdown after stop failed: {e}");
        }
        Ok(())
    }

    /// Send `ping` and wait for the answer
    pub async fn ping(&self) -> Result<PingOutcome> {
        let mut stream = self.connect().await?;
        self.send_command(&mut stream, &Command::Ping).await?;

        let outcome = await_pong(&mut stream).await;
        if outcome == PingOutcome::NoReply {
            let target = self.address.to_string();
            log_warning(
                "client",
                "Connection ended before pong arrived",
                Some(target.as_str()),
            );
        }
        Ok(outcome)
    }

    /// Check if the server is running by trying to connect
    pub async fn is_daemon_running(&self) -> bool {
        self.connect().await.is_ok()
    }

    /// Wait for the server to accept connections (useful after starting it)
    pub async fn wait_for_daemon(&self, max_wait: Duration) -> Result<()> {
        let start = std::time::Instant::now();

        while start.elapsed() < max_wait {
            if self.is_daemon_running().await {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        Err(PingdError::ConnectionError(format!(
            "Timeout waiting for server at {}",
            self.address
        )))
    }
}
