mod core;

use crate::core::{run_snapshot, AppConfig, SnapshotOptions, SystemClipboard};
use std::path::Path;
use std::process::ExitCode;

const APP_NAME: &str = "dctx";
const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let mut target: Option<String> = None;
    let mut clipboard = false;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "-h" | "--help" => {
                print_usage();
                return ExitCode::SUCCESS;
            }
            "-v" | "--version" => {
                println!("{APP_NAME} v{APP_VERSION}");
                return ExitCode::SUCCESS;
            }
            "-c" | "--clipboard" => clipboard = true,
            other if other.starts_with('-') => {
                log::error!("Unrecognized option: {other}");
                print_usage();
                return ExitCode::FAILURE;
            }
            other => {
                if target.is_some() {
                    log::error!("More than one target directory given.");
                    print_usage();
                    return ExitCode::FAILURE;
                }
                target = Some(other.to_string());
            }
        }
    }
    let target = target.unwrap_or_else(|| ".".to_string());

    log::info!("{APP_NAME} v{APP_VERSION} starting.");
    let config = AppConfig::load();
    let clipboard_backend = SystemClipboard::new();

    match run_snapshot(
        Path::new(&target),
        SnapshotOptions { clipboard },
        &config,
        &clipboard_backend,
    ) {
        Ok(()) => {
            log::info!("{APP_NAME} run finished.");
            ExitCode::SUCCESS
        }
        Err(err) => {
            log::error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn print_usage() {
    println!("Usage: {APP_NAME} [target_directory] [options]");
    println!("Creates a versioned context snapshot of the specified directory (default: \".\").");
    println!("Behavior is controlled by ~/.config/dircontxt/config");
    println!();
    println!("Options:");
    println!("  -c, --clipboard  Copy the context to the clipboard instead of writing a file.");
    println!("                   This leaves no files behind.");
    println!("  -h, --help       Show this help message and exit.");
    println!("  -v, --version    Show version information and exit.");
}
