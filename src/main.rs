mod cli;
mod utils;

use bmtree::{BmError, Config, ErrorKind, Result};
use clap::Parser;
use log::{debug, LevelFilter};
use std::process::ExitCode;

fn load_config(args: &cli::Cli) -> Result<Config> {
    if let Some(config_path) = &args.config {
        return Config::load_from_path(config_path);
    }
    let default_path = utils::default_config_path();
    if default_path.is_file() {
        debug!("Loading configuration from {}", default_path.display());
        Config::load_from_path(&default_path)
    } else {
        Ok(Config::default())
    }
}

fn exit_code(err: &BmError) -> u8 {
    match err {
        BmError::Io(io) if io.kind() == std::io::ErrorKind::NotFound => 4,
        _ => match err.kind() {
            ErrorKind::Format => 2,
            ErrorKind::UnsupportedOperation => 3,
            ErrorKind::NotFound => 4,
            _ => 1,
        },
    }
}

fn run(args: cli::Cli) -> Result<()> {
    let config = load_config(&args)?;
    cli::handle_args(args, config)
}

fn main() -> ExitCode {
    let args = cli::Cli::parse();

    // Initialize logger
    let mut logger = env_logger::Builder::from_default_env();
    if args.debug {
        logger.filter_level(LevelFilter::Debug);
    }
    logger.init();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error[{}]: {}", err.kind(), err);
            ExitCode::from(exit_code(&err))
        }
    }
}
