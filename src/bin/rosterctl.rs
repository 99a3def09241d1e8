use clap::Parser;
use log::error;
use roster::client::{Command, RosterClient};
use roster::util::config::AppConfig;
use roster::util::logging::setup_logging;
use roster::util::threading::ThreadRegistry;
use std::io::{self, BufRead, Write};
use std::process;

/// Subscribes to a roster server and shows what it publishes.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Server endpoint, e.g. tcp://localhost:5556
    #[arg(long, short, value_name = "ENDPOINT")]
    server: Option<String>,

    /// Only accept payloads starting with this prefix
    #[arg(long, value_name = "PREFIX")]
    filter: Option<String>,

    #[arg(long, short, action = clap::ArgAction::Count)]
    verbose: u8,
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
    if let Some(server) = cli.server {
        config.subscribe_endpoint = server;
    }
    if let Some(filter) = cli.filter {
        config.topic_filter = filter;
    }

    let mut client = RosterClient::new(&config, ThreadRegistry::with_slots(["subscriber-worker"]));
    if let Err(e) = client.start() {
        eprintln!("{:#}", e);
        process::exit(1);
    }
    println!("Connected to {}, waiting for data...", config.subscribe_endpoint);

    let stdin = io::stdin();
    let mut input = stdin.lock();
    loop {
        print!("Commands: [p]rint, [s]tatus, [q]uit: ");
        let _ = io::stdout().flush();

        let mut line = String::new();
        match input.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                error!("Failed to read command: {}", e);
                break;
            }
        }

        match Command::parse(&line) {
            Command::Print => print!("{}", client.print_current()),
            Command::Status => print!("{}", client.status()),
            Command::Quit => break,
            Command::Empty => {}
            Command::Unknown => println!("Unknown command. Available: p, s, q"),
        }
    }

    client.stop();
    println!("Client stopped");
}
