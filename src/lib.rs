pub mod cli;
pub mod config;
pub mod daemon;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod test_utils;

pub use error::{PingdError, Result};
