use crate::daemon::publisher::AsyncPublisher;
use crate::daemon::tracker::ChangeTracker;
use crate::util::config::AppConfig;
use crate::util::threading::ThreadRegistry;
use anyhow::{Result, bail};
use log::{debug, error, info, warn};
use roster_core::Record;
use roster_core::merge::{self, MergeResult};
use roster_core::source::SourceReader;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub database_dir: PathBuf,
    pub file_prefix: String,
    pub publish_endpoint: String,
    pub poll_interval: Duration,
    pub connect_grace: Duration,
    pub send_hwm: usize,
}

impl From<&AppConfig> for ServerConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            database_dir: cfg.database_dir.clone(),
            file_prefix: cfg.file_prefix.clone(),
            publish_endpoint: cfg.publish_endpoint.clone(),
            poll_interval: cfg.poll_interval(),
            connect_grace: cfg.connect_grace(),
            send_hwm: cfg.send_hwm,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// No source file changed.
    Idle,
    /// Files changed but none of them could be read.
    Unreadable,
    /// The merged roster was empty; nothing was queued.
    Empty,
    Published {
        records: usize,
        duplicates_removed: usize,
    },
}

/// Detect, read, merge and publish, once per polling interval.
///
/// The last good parse of every source file is kept, so a change to one file
/// republishes the merge of all of them. A file that disappears from disk is
/// dropped from that cache and the remaining sources are republished. Files
/// that fail to read are not acknowledged and are picked up again next tick.
pub struct RosterServer {
    config: ServerConfig,
    tracker: ChangeTracker,
    reader: SourceReader,
    publisher: AsyncPublisher,
    sources: BTreeMap<PathBuf, Vec<Record>>,
    grace_elapsed: bool,
    last_merge: Option<MergeResult>,
}

impl RosterServer {
    pub fn new(config: ServerConfig, threads: ThreadRegistry) -> Self {
        let tracker = ChangeTracker::new(&config.database_dir, config.file_prefix.clone());
        let publisher = AsyncPublisher::with_registry(config.send_hwm, threads);
        Self {
            config,
            tracker,
            reader: SourceReader::new(),
            publisher,
            sources: BTreeMap::new(),
            grace_elapsed: false,
            last_merge: None,
        }
    }

    pub fn start(&mut self) -> Result<()> {
        if !self.publisher.start(&self.config.publish_endpoint) {
            bail!(
                "Failed to start publisher on {}",
                self.config.publish_endpoint
            );
        }
        info!(
            "Watching {} for {}*.txt every {:?}",
            self.config.database_dir.display(),
            self.config.file_prefix,
            self.config.poll_interval
        );
        Ok(())
    }

    pub fn stop(&mut self) {
        self.publisher.stop();
    }

    pub fn publisher(&self) -> &AsyncPublisher {
        &self.publisher
    }

    pub fn last_merge(&self) -> Option<&MergeResult> {
        self.last_merge.as_ref()
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    pub fn tick(&mut self) -> Result<TickOutcome> {
        self.tick_until(&AtomicBool::new(false))
    }

    /// One tick; the first-publish grace wait ends early once `shutdown` is set.
    fn tick_until(&mut self, shutdown: &AtomicBool) -> Result<TickOutcome> {
        let changes = self.tracker.pending_changes()?;
        let removed = self.forget_deleted_sources();
        if changes.is_empty() && removed == 0 {
            return Ok(TickOutcome::Idle);
        }
        if !changes.is_empty() {
            info!("{} source file(s) changed", changes.len());
        }

        let mut loaded = 0usize;
        for change in changes {
            let report = self.reader.parse_file(&change.path);
            if !report.opened {
                for err in &report.errors {
                    warn!("{}", err);
                }
                continue;
            }
            info!(
                "Parsed {}: {} lines, {} valid, {} errors",
                change.path.display(),
                report.total_lines,
                report.valid_lines,
                report.errors.len()
            );
            for err in &report.errors {
                warn!("{}", err);
            }
            let valid = merge::filter_valid(&report.records);
            self.sources.insert(change.path.clone(), valid);
            self.tracker.acknowledge(&change);
            loaded += 1;
        }
        if loaded == 0 && removed == 0 {
            return Ok(TickOutcome::Unreadable);
        }

        if !self.grace_elapsed {
            if !self.config.connect_grace.is_zero() {
                info!(
                    "First publish, waiting {:?} for subscribers to connect",
                    self.config.connect_grace
                );
                sleep_unless_shutdown(self.config.connect_grace, shutdown);
            }
            self.grace_elapsed = true;
        }

        let sources: Vec<&Vec<Record>> = self.sources.values().collect();
        let result = merge::merge(&sources);
        info!(
            "Merged {} sources: {} records in, {} unique, {} duplicates removed",
            sources.len(),
            result.total_input,
            result.unique_count(),
            result.duplicates_removed
        );
        for dup in &result.duplicates {
            debug!("Duplicate: {}", dup);
        }

        let outcome = if result.merged.is_empty() {
            warn!("Merged roster is empty, nothing to publish");
            TickOutcome::Empty
        } else {
            self.publisher.publish(&result.merged);
            TickOutcome::Published {
                records: result.merged.len(),
                duplicates_removed: result.duplicates_removed,
            }
        };
        self.last_merge = Some(result);
        Ok(outcome)
    }

    fn forget_deleted_sources(&mut self) -> usize {
        let before = self.sources.len();
        self.sources.retain(|path, _| {
            let present = path.is_file();
            if !present {
                info!("Source {} was removed, dropping its records", path.display());
            }
            present
        });
        before - self.sources.len()
    }

    /// Starts the publisher unless already started, then ticks until
    /// `shutdown` is raised and stops the publisher, draining its queue.
    pub fn run(&mut self, shutdown: &AtomicBool) -> Result<()> {
        if !self.publisher.is_running() {
            self.start()?;
        }
        while !shutdown.load(Ordering::SeqCst) {
            match self.tick_until(shutdown) {
                Ok(TickOutcome::Idle) => {}
                Ok(outcome) => debug!("Tick finished: {:?}", outcome),
                Err(e) => error!("Tick failed: {:#}", e),
            }
            sleep_unless_shutdown(self.config.poll_interval, shutdown);
        }
        info!("Shutdown requested, stopping publisher");
        self.stop();
        Ok(())
    }
}

fn sleep_unless_shutdown(total: Duration, shutdown: &AtomicBool) {
    let deadline = Instant::now() + total;
    while !shutdown.load(Ordering::SeqCst) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        thread::sleep(SHUTDOWN_POLL.min(deadline - now));
    }
}
