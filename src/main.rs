use ble_tracker::app::{Options, RunError, run_with_radio};
use ble_tracker::radio::bluer::BluerRadio;
use clap::Parser;
use std::panic::{self, PanicHookInfo};

/// Exit codes for the application
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_PANIC: i32 = 2;

/// Resolves on Ctrl-C. If the handler cannot be installed the tracker runs
/// until it is killed.
async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!(%error, "failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

async fn run(options: Options) -> Result<(), RunError> {
    let radio = BluerRadio::new(options.scan_duration).await?;
    run_with_radio(options, radio, std::io::stdout(), shutdown_signal()).await?;
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Set up panic hook to ensure clean exit codes for process managers
    // (e.g., systemd, Telegraf execd) that monitor exit status
    panic::set_hook(Box::new(move |info: &PanicHookInfo| {
        eprintln!("Panic! {}", info);
        std::process::exit(EXIT_PANIC);
    }));

    let options = Options::parse();
    ble_tracker::logging::init(options.verbose);

    match run(options).await {
        Ok(()) => std::process::exit(EXIT_SUCCESS),
        Err(why) => {
            tracing::error!(error = %why, "exiting");
            eprintln!("error: {}", why);
            std::process::exit(EXIT_ERROR);
        }
    }
}
