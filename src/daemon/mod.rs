pub mod connection;
pub mod detach;
pub mod registry;
pub mod server;

pub use connection::{PingOutcome, ReadOutcome, Session, SessionState, await_pong};
pub use detach::{
    DAEMON_FLAG, DaemonController, DetachedLauncher, LaunchRequest, ProcessLauncher, StartMode,
};
pub use registry::{SessionGuard, SessionHandle, SessionRegistry};
pub use server::{DaemonServer, ServerHandle};
