#![allow(dead_code)]

use assert_cmd::Command;
use std::path::{Path, PathBuf};
use std::process::{Child, Stdio};
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// Path to the `pingd` binary built for this test run
pub fn get_binary_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_pingd"))
}

/// A loopback port that was free a moment ago
pub fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("Failed to bind probe");
    listener.local_addr().unwrap().port()
}

/// Isolated HOME and port for one test
pub struct TestEnvironment {
    temp_dir: TempDir,
    pub port: u16,
}

impl TestEnvironment {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        std::fs::create_dir_all(temp_dir.path().join("home")).unwrap();
        Self {
            temp_dir,
            port: free_port(),
        }
    }

    pub fn home_dir(&self) -> PathBuf {
        self.temp_dir.path().join("home")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.home_dir().join(".pingd").join("logs")
    }

    fn address_args(&self) -> [String; 4] {
        [
            "--host".to_string(),
            "127.0.0.1".to_string(),
            "--port".to_string(),
            self.port.to_string(),
        ]
    }

    /// `pingd <subcommand>` aimed at this environment's port
    pub fn pingd_cmd(&self, subcommand: &str) -> Command {
        let mut cmd = Command::new(get_binary_path());
        cmd.env("HOME", self.home_dir())
            .env_remove("PINGD_DETACHED")
            .env_remove("RUST_LOG")
            .arg(subcommand)
            .args(self.address_args())
            .timeout(Duration::from_secs(20));
        cmd
    }

    /// Run `pingd start --no-daemon` as a child process
    pub fn spawn_foreground_server(&self) -> Child {
        std::process::Command::new(get_binary_path())
            .env("HOME", self.home_dir())
            .env_remove("PINGD_DETACHED")
            .args(["start", "--no-daemon"])
            .args(self.address_args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .expect("Failed to spawn pingd")
    }

    pub fn is_listening(&self) -> bool {
        std::net::TcpStream::connect(("127.0.0.1", self.port)).is_ok()
    }

    pub fn wait_for_listening(&self, max_wait: Duration) -> bool {
        wait_for(max_wait, || self.is_listening())
    }

    pub fn wait_for_port_free(&self, max_wait: Duration) -> bool {
        wait_for(max_wait, || {
            std::net::TcpListener::bind(("127.0.0.1", self.port)).is_ok()
        })
    }

    pub fn log_contains(&self, file: &str, needle: &str) -> bool {
        read_to_string_lossy(&self.log_dir().join(file)).contains(needle)
    }
}

impl Drop for TestEnvironment {
    fn drop(&mut self) {
        // Best effort: never leave a background server behind
        if let Ok(mut stream) = std::net::TcpStream::connect(("127.0.0.1", self.port)) {
            use std::io::Write;
            let _ = stream.write_all(b"stop");
        }
    }
}

pub fn wait_for<F>(max_wait: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let start = Instant::now();
    while start.elapsed() < max_wait {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    condition()
}

/// Wait for a child to exit, killing it if it overstays
pub fn wait_for_exit(child: &mut Child, max_wait: Duration) -> Option<std::process::ExitStatus> {
    let start = Instant::now();
    while start.elapsed() < max_wait {
        if let Ok(Some(status)) = child.try_wait() {
            return Some(status);
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    let _ = child.kill();
    let _ = child.wait();
    None
}

fn read_to_string_lossy(path: &Path) -> String {
    std::fs::read(path)
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}
