#[cfg(test)]
mod tests {
    use super::*;
    use crate::daemon::registry::SessionRegistry;
    use std::collections::VecDeque;
    use std::net::SocketAddr;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadBuf, duplex};
    use tokio::time::timeout;

    /// Stream that replays scripted reads, then reports end-of-stream
    struct ScriptedStream {
        reads: VecDeque<io::Result<Vec<u8>>>,
        fail_writes: bool,
        written: Vec<u8>,
    }

    impl ScriptedStream {
        fn new(reads: Vec<io::Result<Vec<u8>>>) -> Self {
            Self {
                reads: reads.into(),
                fail_writes: false,
                written: Vec::new(),
            }
        }

        fn failing_writes(mut self) -> Self {
            self.fail_writes = true;
            self
        }
    }

    impl AsyncRead for ScriptedStream {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            match self.reads.pop_front() {
                Some(Ok(bytes)) => {
                    buf.put_slice(&bytes);
                    Poll::Ready(Ok(()))
                }
                Some(Err(e)) => Poll::Ready(Err(e)),
                None => Poll::Ready(Ok(())),
            }
        }
    }

    impl AsyncWrite for ScriptedStream {
        fn poll_write(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            if self.fail_writes {
                return Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "broken")));
            }
            self.written.extend_from_slice(buf);
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    fn reset() -> io::Error {
        io::Error::new(io::ErrorKind::ConnectionReset, "reset")
    }

    fn test_peer() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 40000))
    }

    #[test]
    fn test_transition_on_read() {
        assert_eq!(
            SessionState::on_read(ReadOutcome::EndOfStream),
            SessionState::Closing
        );
        assert_eq!(
            SessionState::on_read(ReadOutcome::Message("ping".to_string())),
            SessionState::Dispatching(Command::Ping)
        );
        assert_eq!(
            SessionState::on_read(ReadOutcome::Message("hello".to_string())),
            SessionState::Dispatching(Command::Unknown("hello".to_string()))
        );
        let failed = ReadOutcome::Failed(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset",
        ));
        assert_eq!(SessionState::on_read(failed), SessionState::Closing);
    }

    #[test]
    fn test_client_transition_on_read() {
        assert_eq!(
            ReplyState::on_read(ReadOutcome::Message("pong".to_string())),
            ReplyState::Done(PingOutcome::Pong)
        );
        assert_eq!(
            ReplyState::on_read(ReadOutcome::Message("noise".to_string())),
            ReplyState::Waiting
        );
        assert_eq!(
            ReplyState::on_read(ReadOutcome::EndOfStream),
            ReplyState::Done(PingOutcome::NoReply)
        );
    }

    #[tokio::test]
    async fn test_read_message_outcomes() {
        let (mut client, mut server) = duplex(64);
        let mut buffer = [0u8; READ_BUFFER_SIZE];

        client.write_all(b"ping").await.unwrap();
        match read_message(&mut server, &mut buffer).await {
            ReadOutcome::Message(text) => assert_eq!(text, "ping"),
            other => panic!("Expected message, got {other:?}"),
        }

        drop(client);
        assert!(matches!(
            read_message(&mut server, &mut buffer).await,
            ReadOutcome::EndOfStream
        ));
    }

    #[tokio::test]
    async fn test_session_answers_ping_and_cleans_up() {
        let registry = SessionRegistry::new();
        let (server, _closed) = ServerHandle::detached();
        let (mut client, stream) = duplex(1024);

        let guard = registry.register(test_peer());
        let session = Session::new(stream, guard, server);
        let task = tokio::spawn(session.run());

        client.write_all(b"ping").await.unwrap();
        let mut reply = [0u8; 16];
        let n = client.read(&mut reply).await.unwrap();
        assert_eq!(&reply[..n], b"pong");
        assert_eq!(registry.len(), 1);

        drop(client);
        timeout(Duration::from_secs(2), task).await.unwrap().unwrap();
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_session_ignores_unknown_command() {
        let registry = SessionRegistry::new();
        let (server, _closed) = ServerHandle::detached();
        let (mut client, stream) = duplex(1024);

        let session = Session::new(stream, registry.register(test_peer()), server);
        let task = tokio::spawn(session.run());

        client.write_all(b"hello").await.unwrap();
        let mut reply = [0u8; 16];
        let silent = timeout(Duration::from_millis(200), client.read(&mut reply)).await;
        assert!(silent.is_err(), "Unknown command should get no reply");

        client.write_all(b"ping").await.unwrap();
        let n = client.read(&mut reply).await.unwrap();
        assert_eq!(&reply[..n], b"pong");

        drop(client);
        timeout(Duration::from_secs(2), task).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_session_stop_closes_listener_without_reply() {
        let registry = SessionRegistry::new();
        let (server, mut closed) = ServerHandle::detached();
        let (mut client, stream) = duplex(1024);

        let session = Session::new(stream, registry.register(test_peer()), server);
        let task = tokio::spawn(session.run());

        client.write_all(b"stop").await.unwrap();
        timeout(Duration::from_secs(2), closed.recv())
            .await
            .expect("close signal should arrive")
            .expect("channel should stay open");

        // The session closes its side without writing anything
        let mut reply = [0u8; 16];
        let n = client.read(&mut reply).await.unwrap();
        assert_eq!(n, 0);

        timeout(Duration::from_secs(2), task).await.unwrap().unwrap();
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_session_read_failure_ends_session() {
        let registry = SessionRegistry::new();
        let (server, mut closed) = ServerHandle::detached();
        // A further ping after the failure would be answered if the session kept going
        let stream = ScriptedStream::new(vec![Err(reset()), Ok(b"ping".to_vec())]);

        let session = Session::new(stream, registry.register(test_peer()), server);
        timeout(Duration::from_secs(2), session.run()).await.unwrap();

        assert!(registry.is_empty());
        assert!(closed.try_recv().is_err(), "Read failure must not close the listener");
    }

    #[tokio::test]
    async fn test_session_pong_write_failure_ends_session() {
        let registry = SessionRegistry::new();
        let (server, mut closed) = ServerHandle::detached();
        let stream = ScriptedStream::new(vec![Ok(b"ping".to_vec()), Ok(b"ping".to_vec())])
            .failing_writes();

        let session = Session::new(stream, registry.register(test_peer()), server);
        timeout(Duration::from_secs(2), session.run()).await.unwrap();

        assert!(registry.is_empty());
        assert!(closed.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_session_writes_pong_per_ping() {
        let registry = SessionRegistry::new();
        let (server, _closed) = ServerHandle::detached();
        let mut stream = ScriptedStream::new(vec![Ok(b"ping".to_vec()), Ok(b"ping".to_vec())]);

        let session = Session::new(&mut stream, registry.register(test_peer()), server);
        timeout(Duration::from_secs(2), session.run()).await.unwrap();

        assert_eq!(stream.written, b"pongpong");
    }

    #[tokio::test]
    async fn test_await_pong_read_failure_is_no_reply() {
        let mut reader = ScriptedStream::new(vec![Ok(b"noise".to_vec()), Err(reset())]);
        assert_eq!(await_pong(&mut reader).await, PingOutcome::NoReply);
        assert!(reader.reads.is_empty(), "Both scripted reads should be consumed");
    }

    #[tokio::test]
    async fn test_await_pong() {
        let (mut server, mut client) = duplex(64);
        server.write_all(b"pong").await.unwrap();
        assert_eq!(await_pong(&mut client).await, PingOutcome::Pong);

        drop(server);
        assert_eq!(await_pong(&mut client).await, PingOutcome::NoReply);
    }
}

use crate::daemon::registry::SessionGuard;
use crate::daemon::server::ServerHandle;
use crate::logging::{log_debug, log_error, log_info, log_warning};
use crate::protocol::{Command, PONG, decode};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Size of the single buffer each read fills
pub const READ_BUFFER_SIZE: usize = 1024;

/// Result of one read on a connection
#[derive(Debug)]
pub enum ReadOutcome {
    Message(String),
    EndOfStream,
    Failed(io::Error),
}

/// Perform a single read. Messages larger than the buffer, or split across
/// segments, arrive in pieces and are not reassembled.
pub async fn read_message<R>(reader: &mut R, buffer: &mut [u8]) -> ReadOutcome
where
    R: AsyncRead + Unpin,
{
    match reader.read(buffer).await {
        Ok(0) => ReadOutcome::EndOfStream,
        Ok(n) => ReadOutcome::Message(decode(&buffer[..n])),
        Err(e) => ReadOutcome::Failed(e),
    }
}

/// Server-side session states
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Reading,
    Dispatching(Command),
    Closing,
    Closed,
}

impl SessionState {
    pub fn on_read(outcome: ReadOutcome) -> Self {
        match outcome {
            ReadOutcome::Message(text) => SessionState::Dispatching(Command::parse(&text)),
            ReadOutcome::EndOfStream | ReadOutcome::Failed(_) => SessionState::Closing,
        }
    }
}

/// Handles one accepted connection until the peer leaves or sends `stop`
pub struct Session<S> {
    stream: S,
    peer: String,
    server: ServerHandle,
    _registration: SessionGuard,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, registration: SessionGuard, server: ServerHandle) -> Self {
        Self {
            stream,
            peer: registration.key().to_string(),
            server,
            _registration: registration,
        }
    }

    pub async fn run(mut self) {
        let mut buffer = [0u8; READ_BUFFER_SIZE];
        let mut state = SessionState::Reading;

        loop {
            state = match state {
                SessionState::Reading => {
                    let outcome = read_message(&mut self.stream, &mut buffer).await;
                    self.log_read(&outcome);
                    SessionState::on_read(outcome)
                }
                SessionState::Dispatching(command) => self.dispatch(command).await,
                SessionState::Closing => {
                    if let Err(e) = self.stream.shutdown().await {
                        log_debug("session", &format!("Shutdown failed: {e}"), Some(self.peer.as_str()));
                    }
                    SessionState::Closed
                }
                SessionState::Closed => break,
            };
        }

        let peer = std::mem::take(&mut self.peer);
        // Dropping the session closes the stream and releases the registry entry
        drop(self);
        log_info("session", "Client disconnected", Some(peer.as_str()));
    }

    fn log_read(&self, outcome: &ReadOutcome) {
        match outcome {
            ReadOutcome::Message(text) => log_info(
                "session",
                &format!("Received message: {text}"),
                Some(self.peer.as_str()),
            ),
            ReadOutcome::EndOfStream => {
                log_debug("session", "Peer closed the connection", Some(self.peer.as_str()))
            }
            ReadOutcome::Failed(e) => {
                log_error("session", &format!("Read failed: {e}"), Some(self.peer.as_str()))
            }
        }
    }

    async fn dispatch(&mut self, command: Command) -> SessionState {
        match command {
            Command::Stop => {
                log_info("session", "Stop requested", Some(self.peer.as_str()));
                self.server.close();
                SessionState::Closing
            }
            Command::Ping => match self.reply(PONG).await {
                Ok(()) => SessionState::Reading,
                Err(e) => {
                    log_error("session", &format!("Failed to send pong: {e}"), Some(self.peer.as_str()));
                    SessionState::Closing
                }
            },
            Command::Unknown(text) => {
                log_warning(
                    "session",
                    &format!("Ignoring unrecognized command: {text:?}"),
                    Some(self.peer.as_str()),
                );
                SessionState::Reading
            }
        }
    }

    async fn reply(&mut self, text: &str) -> io::Result<()> {
        self.stream.write_all(text.as_bytes()).await?;
        self.stream.flush().await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingOutcome {
    Pong,
    /// The server closed the connection or the read failed first
    NoReply,
}

/// Client-side states while waiting for `pong`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyState {
    Waiting,
    Done(PingOutcome),
}

impl ReplyState {
    pub fn on_read(outcome: ReadOutcome) -> Self {
        match outcome {
            ReadOutcome::Message(text) if text == PONG => ReplyState::Done(PingOutcome::Pong),
            ReadOutcome::Message(_) => ReplyState::Waiting,
            ReadOutcome::EndOfStream | ReadOutcome::Failed(_) => {
                ReplyState::Done(PingOutcome::NoReply)
            }
        }
    }
}

/// Read until the server answers `pong` or the connection ends
pub async fn await_pong<R>(reader: &mut R) -> PingOutcome
where
    R: AsyncRead + Unpin,
{
    let mut buffer = [0u8; READ_BUFFER_SIZE];

    loop {
        let outcome = read_message(reader, &mut buffer).await;
        match &outcome {
            ReadOutcome::Message(text) => {
                log_debug("client", &format!("Received message: {text}"), None)
            }
            ReadOutcome::EndOfStream => {
                log_debug("client", "Server closed the connection", None)
            }
            ReadOutcome::Failed(e) => log_error("client", &format!("Read failed: {e}"), None),
        }

        if let ReplyState::Done(result) = ReplyState::on_read(outcome) {
            return result;
        }
    }
}
