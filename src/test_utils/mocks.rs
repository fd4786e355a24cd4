use crate::daemon::{DaemonController, LaunchRequest, ProcessLauncher};
use crate::error::Result;
use std::sync::{Arc, Mutex as StdMutex};

/// Launcher that records requests instead of starting processes
///
/// Clones share the same record, so a controller built for a simulated child
/// reports its own launches to the same place.
#[derive(Debug, Clone, Default)]
pub struct InProcessLauncher {
    launches: Arc<StdMutex<Vec<LaunchRequest>>>,
}

impl InProcessLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn launches(&self) -> Vec<LaunchRequest> {
        self.launches.lock().unwrap().clone()
    }

    pub fn launch_count(&self) -> usize {
        self.launches.lock().unwrap().len()
    }

    /// The controller the relaunched copy would build from its environment
    pub fn controller_for(&self, request: &LaunchRequest) -> DaemonController {
        DaemonController::with_environment(Arc::new(self.clone()), request.env.clone())
            .with_executable(request.program.clone())
    }
}

impl ProcessLauncher for InProcessLauncher {
    fn launch(&self, request: &LaunchRequest) -> Result<()> {
        self.launches.lock().unwrap().push(request.clone());
        Ok(())
    }
}
