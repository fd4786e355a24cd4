use clap::Parser;
use pingd::cli::{CliArgs, CliHandler, CliResult};
use pingd::config::GlobalConfig;
use pingd::logging;
use std::process;
use tracing::{error, warn};

#[tokio::main]
async fn main() {
    // Argument errors print usage and exit here
    let args = CliArgs::parse();

    let config_result = match &args.config {
        Some(path) => GlobalConfig::load_from_path(path).await,
        None => GlobalConfig::load().await,
    };
    let global_config = match config_result {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: Failed to load configuration ({e}), using defaults");
            GlobalConfig::default()
        }
    };

    let logging_result = if args.command.is_server() {
        logging::init_daemon_logging(&global_config)
    } else {
        logging::init_cli_logging(&global_config)
    };
    if let Err(e) = logging_result {
        eprintln!("Warning: Failed to initialize logging: {e}");
    }

    let address = global_config.server_address(args.host.clone(), args.port);
    let handler = CliHandler::new(address)
        .with_verbose(args.verbose)
        .with_connect_timeout(global_config.connect_timeout());

    let result = match handler.handle_command(&args.command).await {
        Ok(result) => result,
        Err(e) => {
            if e.is_fatal() {
                error!("{e}");
            } else {
                warn!("{e}");
            }
            CliResult::from(e)
        }
    };

    match result {
        CliResult::Success(msg) => {
            println!("{msg}");
            process::exit(0);
        }
        CliResult::Error(msg) => {
            eprintln!("{msg}");
            process::exit(1);
        }
    }
}
