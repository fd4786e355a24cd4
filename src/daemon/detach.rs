
use crate::error::{PingdError, Result};
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Arc;
use tracing::{debug, info};

/// Environment variable marking the re-executed background copy
pub const DAEMON_FLAG: &str = "PINGD_DETACHED";
pub const DAEMON_FLAG_VALUE: &str = "true";

/// Everything needed to start the background copy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    /// Variables added on top of the inherited environment
    pub env: Vec<(OsString, OsString)>,
}

/// Starts a process without waiting for it
#[cfg_attr(test, mockall::automock)]
pub trait ProcessLauncher: Send + Sync {
    fn launch(&self, request: &LaunchRequest) -> Result<()>;
}

/// Spawns a real OS process detached from this one
#[derive(Debug, Default, Clone, Copy)]
pub struct DetachedLauncher;

impl ProcessLauncher for DetachedLauncher {
    fn launch(&self, request: &LaunchRequest) -> Result<()> {
        let mut cmd = Command::new(&request.program);
        cmd.args(&request.args)
            .envs(request.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        // New session: no controlling terminal, no signals from the launching shell
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            unsafe {
                cmd.pre_exec(|| {
                    if libc::setsid() == -1 {
                        return Err(std::io::Error::last_os_error());
                    }
                    Ok(())
                });
            }
        }

        let child = cmd.spawn().map_err(|e| {
            PingdError::LaunchError(format!(
                "Failed to start {}: {e}",
                request.program.display()
            ))
        })?;

        debug!("Background process spawned with PID: {}", child.id());

        // Dropping the handle neither waits for nor kills the child; once this
        // process exits the child is reparented to init.
        drop(child);
        Ok(())
    }
}

/// How `start` should proceed in this process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartMode {
    /// Run the server here
    Foreground,
    /// A detached copy was started; this invocation is done
    Relaunched,
}

/// Decides between serving in this process and handing off to a background copy
pub struct DaemonController {
    launcher: Arc<dyn ProcessLauncher>,
    environment: Vec<(OsString, OsString)>,
    executable: Option<PathBuf>,
}

impl DaemonController {
    /// Controller over the environment this process inherited
    pub fn new(launcher: Arc<dyn ProcessLauncher>) -> Self {
        Self::with_environment(launcher, std::env::vars_os().collect())
    }

    pub fn with_environment(
        launcher: Arc<dyn ProcessLauncher>,
        environment: Vec<(OsString, OsString)>,
    ) -> Self {
        Self {
            launcher,
            environment,
            executable: None,
        }
    }

    /// Relaunch this path instead of the running executable
    pub fn with_executable(mut self, executable: PathBuf) -> Self {
        self.executable = Some(executable);
        self
    }

    /// True when this process is already the detached copy
    pub fn should_run_foreground(&self) -> bool {
        self.environment
            .iter()
            .any(|(key, value)| key == DAEMON_FLAG && value == DAEMON_FLAG_VALUE)
    }

    /// Start a detached copy of this executable with the same arguments
    ///
    /// `args` is the full argument vector including the program name, which
    /// is replaced by the located executable.
    pub fn detach_and_relaunch(&self, args: &[OsString]) -> Result<()> {
        let program = match &self.executable {
            Some(path) => path.clone(),
            None => std::env::current_exe().map_err(|e| {
                PingdError::LaunchError(format!("Failed to get current executable: {e}"))
            })?,
        };

        let request = LaunchRequest {
            program,
            args: args.iter().skip(1).cloned().collect(),
            env: vec![(OsString::from(DAEMON_FLAG), OsString::from(DAEMON_FLAG_VALUE))],
        };

        debug!("Relaunching detached: {:?}", request);
        self.launcher.launch(&request)?;
        info!("Server started in the background");
        Ok(())
    }

    pub fn prepare(&self, args: &[OsString], no_daemon: bool) -> Result<StartMode> {
        if no_daemon {
            debug!("Daemonization disabled, serving in the foreground");
            return Ok(StartMode::Foreground);
        }

        if self.should_run_foreground() {
            debug!("{DAEMON_FLAG} is set, serving in this process");
            return Ok(StartMode::Foreground);
        }

        self.detach_and_relaunch(args)?;
        Ok(StartMode::Relaunched)
    }
}
