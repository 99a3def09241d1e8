use clap::Parser;
use log::{error, info, warn};
use roster::daemon::server::{RosterServer, ServerConfig};
use roster::util::config::AppConfig;
use roster::util::logging::setup_logging;
use roster::util::threading::ThreadRegistry;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Watches the roster source files and publishes the merged roster.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory holding the source files
    #[arg(long, value_name = "DIR")]
    dir: Option<PathBuf>,

    /// Endpoint to publish on, e.g. tcp://*:5556
    #[arg(long, value_name = "ENDPOINT")]
    bind: Option<String>,

    /// Seconds between directory scans
    #[arg(long, value_name = "SECS")]
    interval: Option<f64>,

    /// Seconds to wait for subscribers before the first publish
    #[arg(long, value_name = "SECS")]
    grace: Option<f64>,

    #[arg(long, short, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn apply_overrides(config: &mut AppConfig, cli: Cli) {
    if let Some(dir) = cli.dir {
        config.database_dir = dir;
    }
    if let Some(bind) = cli.bind {
        config.publish_endpoint = bind;
    }
    if let Some(interval) = cli.interval {
        config.poll_interval_secs = interval;
    }
    if let Some(grace) = cli.grace {
        config.connect_grace_secs = grace;
    }
}

fn main() {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let mut config = match AppConfig::load() {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };
    apply_overrides(&mut config, cli);

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Ctrl+C received, sending shutdown signal");
        flag.store(true, Ordering::SeqCst);
    }) {
        error!("Failed to install Ctrl+C handler: {}", e);
        process::exit(1);
    }

    println!(
        "rosterd: watching {} and publishing on {}",
        config.database_dir.display(),
        config.publish_endpoint
    );

    let threads = ThreadRegistry::with_slots(["pub-acceptor", "publisher-worker"]);
    let mut server = RosterServer::new(ServerConfig::from(&config), threads.clone());
    if let Err(e) = server.run(&shutdown) {
        error!("Server failed: {:#}", e);
        process::exit(1);
    }

    let stats = server.publisher().stats();
    info!(
        "Exiting: {} messages sent, {} dropped, {} records offered",
        stats.messages_sent(),
        stats.messages_dropped(),
        stats.records_sent()
    );
    let lingering = threads.active_thread_names();
    if !lingering.is_empty() {
        warn!("Threads still running at exit: {:?}", lingering);
    }
}
