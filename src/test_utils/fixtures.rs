use crate::config::ServerAddress;
use crate::daemon::{DaemonServer, ServerHandle, SessionRegistry};
use crate::error::Result;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::task::JoinHandle;

/// A server bound to an ephemeral loopback port and running on a task
pub struct RunningServer {
    pub addr: SocketAddr,
    pub handle: ServerHandle,
    pub registry: SessionRegistry,
    pub task: JoinHandle<Result<()>>,
}

impl RunningServer {
    pub async fn start() -> Result<Self> {
        let server = DaemonServer::bind(&ServerAddress::new("127.0.0.1", 0)).await?;
        let addr = server.local_addr()?;
        let handle = server.handle();
        let registry = server.registry();
        let task = tokio::spawn(server.run());

        Ok(Self {
            addr,
            handle,
            registry,
            task,
        })
    }

    pub fn address(&self) -> ServerAddress {
        ServerAddress::new(self.addr.ip().to_string(), self.addr.port())
    }
}

/// Poll `condition` until it holds or `max_wait` elapses
pub async fn wait_until<F>(max_wait: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let start = std::time::Instant::now();
    while start.elapsed() < max_wait {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}
