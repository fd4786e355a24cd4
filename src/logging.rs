
use crate::config::GlobalConfig;
use crate::error::{PingdError, Result};
use std::path::PathBuf;
use std::sync::Once;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*, registry::Registry};

static LOGGER_INIT: Once = Once::new();

/// Initialize the logging system for a specific component
fn init_component_logging(
    config: &GlobalConfig,
    component: &str,
    log_to_console: bool,
) -> Result<()> {
    let mut init_result = Ok(());

    LOGGER_INIT.call_once(|| {
        init_result = init_component_logging_internal(config, component, log_to_console);
    });

    init_result
}

fn log_file_path(config: &GlobalConfig, component: &str) -> Option<PathBuf> {
    config
        .logging
        .file_enabled
        .then(|| config.get_log_dir().join(format!("{component}.log")))
}

fn init_component_logging_internal(
    config: &GlobalConfig,
    component: &str,
    log_to_console: bool,
) -> Result<()> {
    let log_level = config.logging.level.to_lowercase();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&log_level))
        .map_err(|e| PingdError::ConfigError(format!("Invalid log level '{log_level}': {e}")))?;

    let file_layer = if config.logging.file_enabled {
        let log_dir = config.get_log_dir();
        std::fs::create_dir_all(&log_dir).map_err(|e| {
            PingdError::ConfigError(format!("Failed to create log directory: {e}"))
        })?;

        let file_appender = tracing_appender::rolling::never(&log_dir, format!("{component}.log"));
        Some(
            fmt::layer()
                .with_writer(file_appender)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true),
        )
    } else {
        None
    };

    // Console output goes to stderr so command results on stdout stay clean
    let console_layer = log_to_console.then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .with_target(false)
    });

    Registry::default()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|e| PingdError::ConfigError(format!("Failed to install logger: {e}")))?;

    debug!("{} logging initialized with level: {}", component, log_level);
    if let Some(log_path) = log_file_path(config, component) {
        debug!("Log file: {}", log_path.display());
    }

    Ok(())
}

/// Initialize logging for the server process
///
/// A detached server has its stdio pointed at the null device, so it only
/// leaves a trace when file logging is enabled.
pub fn init_daemon_logging(config: &GlobalConfig) -> Result<()> {
    init_component_logging(config, "daemon", true)?;
    info!("Daemon logging initialized");
    Ok(())
}

/// Initialize logging for one-shot client commands
pub fn init_cli_logging(config: &GlobalConfig) -> Result<()> {
    let mut cli_config = config.clone();
    cli_config.logging.level = cli_log_level(&config.logging.level);

    init_component_logging(&cli_config, "cli", true)?;
    debug!("CLI logging initialized");
    Ok(())
}

/// Use info level for the CLI unless explicitly set to debug/trace
fn cli_log_level(configured: &str) -> String {
    let level = configured.to_lowercase();
    if matches!(level.as_str(), "debug" | "trace") {
        level
    } else {
        "info".to_string()
    }
}

/// Log an error with context
pub fn log_error(component: &str, error: &str, context: Option<&str>) {
    if let Some(ctx) = context {
        error!(component = component, error = error, context = ctx);
    } else {
        error!(component = component, error = error);
    }
}

/// Log a warning with context
pub fn log_warning(component: &str, warning: &str, context: Option<&str>) {
    if let Some(ctx) = context {
        warn!(component = component, warning = warning, context = ctx);
    } else {
        warn!(component = component, warning = warning);
    }
}

/// Log debug information
pub fn log_debug(component: &str, message: &str, context: Option<&str>) {
    if let Some(ctx) = context {
        debug!(component = component, message = message, context = ctx);
    } else {
        debug!(component = component, message = message);
    }
}

/// Log info information
pub fn log_info(component: &str, message: &str, context: Option<&str>) {
    if let Some(ctx) = context {
        info!(component = component, message = message, context = ctx);
    } else {
        info!(component = component, message = message);
    }
}
