use crate::daemon::subscriber::{AsyncSubscriber, SubscriberStats};
use crate::util::config::AppConfig;
use crate::util::threading::ThreadRegistry;
use anyhow::{Result, bail};
use log::{debug, error};
use roster_core::Record;
use std::fmt::Write as _;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

const RULE_WIDTH: usize = 72;
const RAW_PREVIEW_LEN: usize = 100;

#[derive(Debug, Clone, Default)]
pub struct ClientState {
    pub roster: Vec<Record>,
    pub update_count: usize,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Print,
    Status,
    Quit,
    Empty,
    Unknown,
}

impl Command {
    pub fn parse(input: &str) -> Self {
        match input.trim() {
            "p" | "print" => Self::Print,
            "s" | "status" => Self::Status,
            "q" | "quit" => Self::Quit,
            "" => Self::Empty,
            _ => Self::Unknown,
        }
    }
}

/// Subscribes to the roster feed and keeps the latest roster for display.
pub struct RosterClient {
    endpoint: String,
    filter: String,
    subscriber: AsyncSubscriber,
    state: Arc<Mutex<ClientState>>,
}

impl RosterClient {
    pub fn new(config: &AppConfig, threads: ThreadRegistry) -> Self {
        let subscriber =
            AsyncSubscriber::with_registry(config.recv_hwm, config.recv_idle(), threads);
        let mut client = Self {
            endpoint: config.subscribe_endpoint.clone(),
            filter: config.topic_filter.clone(),
            subscriber,
            state: Arc::new(Mutex::new(ClientState::default())),
        };
        client.wire_handlers();
        client
    }

    fn wire_handlers(&mut self) {
        let state = Arc::clone(&self.state);
        let stats = self.subscriber.stats();
        self.subscriber.on_data(move |roster| {
            let mut st = lock(&state);
            st.roster = roster.to_vec();
            st.update_count += 1;
            println!("Update #{}: {} records", st.update_count, roster.len());
            println!(
                "  totals: {} messages, {} records",
                stats.messages_received(),
                stats.records_received()
            );
            if st.update_count == 1 {
                println!();
                print!("{}", render_table(roster));
            } else {
                println!("  enter 'p' to show the roster");
            }
        });

        self.subscriber.on_raw(|payload| {
            let text = String::from_utf8_lossy(payload);
            let preview: String = text.chars().take(RAW_PREVIEW_LEN).collect();
            let ellipsis = if text.chars().count() > RAW_PREVIEW_LEN {
                "..."
            } else {
                ""
            };
            debug!("Raw payload: {}{}", preview, ellipsis);
        });

        let state = Arc::clone(&self.state);
        self.subscriber.on_error(move |message| {
            error!("Subscriber error: {}", message);
            lock(&state).last_error = Some(message.to_string());
        });
    }

    pub fn start(&mut self) -> Result<()> {
        if !self.subscriber.start(&self.endpoint, &self.filter) {
            bail!("Failed to connect to {}", self.endpoint);
        }
        Ok(())
    }

    pub fn stop(&mut self) {
        self.subscriber.stop();
    }

    pub fn is_running(&self) -> bool {
        self.subscriber.is_running()
    }

    pub fn is_connected(&self) -> bool {
        self.subscriber.is_connected()
    }

    pub fn stats(&self) -> Arc<SubscriberStats> {
        self.subscriber.stats()
    }

    pub fn state(&self) -> ClientState {
        lock(&self.state).clone()
    }

    pub fn print_current(&self) -> String {
        let st = lock(&self.state);
        if st.roster.is_empty() {
            return "No roster received yet\n".to_string();
        }
        render_table(&st.roster)
    }

    pub fn status(&self) -> String {
        let st = lock(&self.state);
        let stats = self.subscriber.stats();
        let mut out = String::new();
        let _ = writeln!(out, "Client status");
        let _ = writeln!(out, "{}", "=".repeat(18));
        let _ = writeln!(out, "Server:          {}", self.endpoint);
        let connection = match (self.subscriber.is_running(), self.subscriber.is_connected()) {
            (false, _) => "inactive",
            (true, true) => "connected",
            (true, false) => "reconnecting",
        };
        let _ = writeln!(out, "Connection:      {}", connection);
        let _ = writeln!(out, "Updates:         {}", st.update_count);
        let _ = writeln!(out, "Current roster:  {}", st.roster.len());
        let _ = writeln!(out, "Messages total:  {}", stats.messages_received());
        let _ = writeln!(out, "Records total:   {}", stats.records_received());
        if let Some(err) = &st.last_error {
            let _ = writeln!(out, "Last error:      {}", err);
        }
        out
    }
}

fn lock(state: &Mutex<ClientState>) -> MutexGuard<'_, ClientState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let kept: String = text.chars().take(width.saturating_sub(3)).collect();
    format!("{kept}...")
}

pub fn render_table(roster: &[Record]) -> String {
    let mut out = String::new();
    if roster.is_empty() {
        out.push_str("Nothing to display\n");
        return out;
    }

    let _ = writeln!(out, "Roster ({} records)", roster.len());
    let _ = writeln!(out, "{}", "=".repeat(RULE_WIDTH));
    let _ = writeln!(
        out,
        "{:<6}{:<20}{:<15}{:<15}",
        "ID", "Last name", "First name", "Birth date"
    );
    let _ = writeln!(out, "{}", "-".repeat(RULE_WIDTH));
    for record in roster {
        let _ = writeln!(
            out,
            "{:<6}{:<20}{:<15}{:<15}",
            record.id(),
            truncate(record.last_name(), 18),
            truncate(record.first_name(), 13),
            record.birth_date_text()
        );
    }
    let _ = writeln!(out, "{}", "=".repeat(RULE_WIDTH));
    let valid = roster.iter().filter(|r| r.is_valid()).count();
    let _ = writeln!(out, "Valid: {}/{}", valid, roster.len());
    out
}
