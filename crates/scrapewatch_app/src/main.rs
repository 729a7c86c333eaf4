mod logging;
mod terminal;

use std::sync::Arc;

use anyhow::ensure;
use clap::Parser;

use client_logging::client_info;
use scrapewatch_client::{
    ClientSettings, DEFAULT_BASE_URL, HttpCancelRequester, SessionHandle, SseEventChannel,
};

use crate::logging::LogDestination;
use crate::terminal::{SessionOutcome, TerminalObserver};

/// Runs a server-side scrape job and streams its progress to the terminal.
#[derive(Parser, Debug)]
#[command(author, version, about = "Watch a server-side scrape job from the terminal")]
struct Cli {
    /// Area to scrape, passed to the server as `area_id`.
    area_id: String,

    /// Base url of the scrape server.
    #[arg(long, default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Where log output goes.
    #[arg(long, value_enum, default_value = "file")]
    log: LogDestination,

    /// Log at debug level instead of info.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::initialize(cli.log, cli.verbose);
    ensure!(!cli.area_id.trim().is_empty(), "area id must not be empty");

    client_info!("starting scrape watch for area {}", cli.area_id);
    let settings = ClientSettings {
        base_url: cli.base_url.clone(),
        ..ClientSettings::default()
    };
    let channel = Arc::new(SseEventChannel::new(settings.clone()));
    let requester = Arc::new(HttpCancelRequester::new(settings));
    let (observer, mut done_rx) = TerminalObserver::new(cli.base_url);

    let handle = SessionHandle::spawn(channel, requester, observer);
    handle.start(cli.area_id);

    let mut cancel_requested = false;
    let outcome = loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                if cancel_requested {
                    // Second interrupt quits without waiting for the server.
                    break None;
                }
                cancel_requested = true;
                client_info!("cancellation requested from the terminal");
                println!("Cancelling; press Ctrl-C again to quit without waiting.");
                handle.cancel();
            }
            outcome = done_rx.recv() => break outcome,
        }
    };
    handle.shutdown().await;

    match outcome {
        Some(SessionOutcome::Failed) => std::process::exit(1),
        Some(_) => {}
        None => std::process::exit(130),
    }
    Ok(())
}
