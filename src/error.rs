
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PingdError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Launch error: {0}")]
    LaunchError(String),

    #[error("Bind error: {0}")]
    BindError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<toml::de::Error> for PingdError {
    fn from(error: toml::de::Error) -> Self {
        PingdError::ConfigError(error.to_string())
    }
}

impl PingdError {
    /// Startup failures that abort the invocation rather than a single session
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PingdError::ConfigError(_)
                | PingdError::LaunchError(_)
                | PingdError::BindError(_)
                | PingdError::ConnectionError(_)
        )
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            PingdError::ConfigError(_) => "CONFIG_ERROR",
            PingdError::LaunchError(_) => "LAUNCH_ERROR",
            PingdError::BindError(_) => "BIND_ERROR",
            PingdError::ConnectionError(_) => "CONNECTION_ERROR",
            PingdError::IoError(_) => "IO_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, PingdError>;
