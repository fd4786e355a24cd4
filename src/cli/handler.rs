
use crate::cli::client::DaemonClient;
use crate::cli::commands::{CliResult, Commands};
use crate::config::ServerAddress;
use crate::daemon::{
    DaemonController, DaemonServer, DetachedLauncher, PingOutcome, ProcessLauncher, StartMode,
};
use crate::error::{PingdError, Result};
use std::ffi::OsString;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Main CLI handler that runs the server or talks to it
pub struct CliHandler {
    pub client: DaemonClient,
    pub verbose: bool,
    launcher: Arc<dyn ProcessLauncher>,
    startup_wait: Duration,
}

impl CliHandler {
    pub fn new(address: ServerAddress) -> Self {
        Self {
            client: DaemonClient::new(address),
            verbose: false,
            launcher: Arc::new(DetachedLauncher),
            startup_wait: Duration::from_secs(5),
        }
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.client = self.client.with_timeout(timeout);
        self
    }

    pub fn with_launcher(mut self, launcher: Arc<dyn ProcessLauncher>) -> Self {
        self.launcher = launcher;
        self
    }

    /// How long `start` waits for a background server to come up
    pub fn with_startup_wait(mut self, wait: Duration) -> Self {
        self.startup_wait = wait;
        self
    }

    /// Main entry point for handling CLI commands
    pub async fn handle_command(&self, command: &Commands) -> Result<CliResult> {
        match command {
            Commands::Start { no_daemon } => self.start(*no_daemon).await,
            Commands::Stop => self.stop().await,
            Commands::Ping => self.ping().await,
        }
    }

    /// Serve here, or hand off to a detached copy of this executable
    async fn start(&self, no_daemon: bool) -> Result<CliResult> {
        let controller = DaemonController::new(self.launcher.clone());
        let detaching = !no_daemon && !controller.should_run_foreground();

        if detaching && self.client.is_daemon_running().await {
            return Ok(CliResult::Error(format!(
                "Server is already running on {}",
                self.client.address
            )));
        }

        let args: Vec<OsString> = std::env::args_os().collect();
        match controller.prepare(&args, no_daemon)? {
            StartMode::Relaunched => self.await_background_server().await,
            StartMode::Foreground => self.serve().await,
        }
    }

    async fn serve(&self) -> Result<CliResult> {
        let server = DaemonServer::bind(&self.client.address).await?;
        info!("Socket server listening on {}", self.client.address);

        let handle = server.handle();
        let ctrl_c = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received Ctrl+C, shutting down...");
                handle.close();
            }
        });

        let result = server.run().await;
        ctrl_c.abort();
        result?;

        Ok(CliResult::Success("Server stopped".to_string()))
    }

    async fn await_background_server(&self) -> Result<CliResult> {
        if self.verbose {
            eprintln!("Waiting for background server on {}", self.client.address);
        }

        match self.client.wait_for_daemon(self.startup_wait).await {
            Ok(()) => Ok(CliResult::Success(format!(
                "Server started in the background on {}",
                self.client.address
            ))),
            Err(e) => Ok(CliResult::Error(format!(
                "Background server did not come up: {e}"
            ))),
        }
    }

    async fn stop(&self) -> Result<CliResult> {
        self.client.stop().await?;
        Ok(CliResult::Success(format!(
            "Stop sent to {}",
            self.client.address
        )))
    }

    async fn ping(&self) -> Result<CliResult> {
        match self.client.ping().await? {
            PingOutcome::Pong => Ok(CliResult::Success("pong".to_string())),
            PingOutcome::NoReply => Ok(CliResult::Success(format!(
                "No reply from {}",
                self.client.address
            ))),
        }
    }
}

impl From<PingdError> for CliResult {
    fn from(error: PingdError) -> Self {
        CliResult::Error(format!("[{}] {error}", error.error_code()))
    }
}
