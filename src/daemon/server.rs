
use crate::config::ServerAddress;
use crate::daemon::connection::Session;
use crate::daemon::registry::SessionRegistry;
use crate::error::{PingdError, Result};
use crate::logging::{log_debug, log_error, log_info};
use std::io;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{self, error::TrySendError};

/// Listens for control connections and runs one session per client
pub struct DaemonServer {
    listener: TcpListener,
    registry: SessionRegistry,
    shutdown_tx: mpsc::Sender<()>,
    shutdown_rx: mpsc::Receiver<()>,
}

/// What a single wait in the accept loop produced
enum AcceptEvent {
    Accepted(TcpStream, SocketAddr),
    Failed(io::Error),
    Closed,
}

impl DaemonServer {
    /// Bind the listening socket
    pub async fn bind(address: &ServerAddress) -> Result<Self> {
        let listener = TcpListener::bind((address.host.as_str(), address.port))
            .await
            .map_err(|e| PingdError::BindError(format!("Failed to bind to {address}: {e}")))?;

        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        Ok(Self {
            listener,
            registry: SessionRegistry::new(),
            shutdown_tx,
            shutdown_rx,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn registry(&self) -> SessionRegistry {
        self.registry.clone()
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            shutdown_tx: self.shutdown_tx.clone(),
        }
    }

    /// Accept connections until the server is closed
    ///
    /// The listening socket is released when this returns, so the port can be
    /// bound again immediately. Sessions still running are left alone.
    pub async fn run(mut self) -> Result<()> {
        if let Ok(addr) = self.listener.local_addr() {
            log_info("server", &format!("Listening on {addr}"), None);
        }

        loop {
            let event = tokio::select! {
                biased;

                _ = self.shutdown_rx.recv() => AcceptEvent::Closed,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => AcceptEvent::Accepted(stream, peer),
                    Err(e) => AcceptEvent::Failed(e),
                },
            };

            match event {
                AcceptEvent::Accepted(stream, peer) => self.spawn_session(stream, peer),
                AcceptEvent::Failed(e) => {
                    log_error("server", &format!("Accept failed: {e}"), None);
                }
                AcceptEvent::Closed => {
                    log_info("server", "Listener closed", None);
                    break;
                }
            }
        }

        Ok(())
    }

    fn spawn_session(&self, stream: TcpStream, peer: SocketAddr) {
        let registration = self.registry.register(peer);
        log_info("server", "New client", Some(registration.key()));

        let session = Session::new(stream, registration, self.handle());
        tokio::spawn(session.run());
    }
}

/// Lets sessions and signal handlers close the listener
#[derive(Debug, Clone)]
pub struct ServerHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl ServerHandle {
    /// Ask the accept loop to stop. Safe to call any number of times.
    pub fn close(&self) {
        match self.shutdown_tx.try_send(()) {
            Ok(()) => log_debug("server", "Close requested", None),
            Err(TrySendError::Full(())) => {
                log_debug("server", "Close already pending", None)
            }
            Err(TrySendError::Closed(())) => {
                log_debug("server", "Listener already closed", None)
            }
        }
    }

    /// A handle wired to a bare channel instead of a listener
    #[cfg(test)]
    pub(crate) fn detached() -> (Self, mpsc::Receiver<()>) {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        (Self { shutdown_tx }, shutdown_rx)
    }
}
