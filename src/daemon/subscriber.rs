use crate::util::threading::{ThreadHandle, ThreadRegistry};
use log::{debug, error, info, warn};
use roster_common::lifecycle::{Lifecycle, LifecycleState};
use roster_core::Record;
use roster_core::codec;
use roster_transport::{SubSocket, TransportError, TransportResult};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

pub const DEFAULT_RECV_IDLE: Duration = Duration::from_millis(10);
const RECONNECT_MIN: Duration = Duration::from_millis(50);
const RECONNECT_MAX: Duration = Duration::from_secs(2);

pub type DataHandler = Box<dyn Fn(&[Record]) + Send + Sync + 'static>;
pub type RawHandler = Box<dyn Fn(&[u8]) + Send + Sync + 'static>;
pub type ErrorHandler = Box<dyn Fn(&str) + Send + Sync + 'static>;

#[derive(Default)]
struct Handlers {
    data: Option<DataHandler>,
    raw: Option<RawHandler>,
    error: Option<ErrorHandler>,
}

impl Handlers {
    fn report(&self, message: &str) {
        if let Some(handler) = &self.error {
            handler(message);
        }
    }
}

/// Where the worker reconnects to after the publisher goes away.
struct Link {
    endpoint: String,
    filter: Vec<u8>,
    recv_hwm: usize,
}

impl Link {
    fn connect(&self) -> TransportResult<SubSocket> {
        SubSocket::connect(&self.endpoint, &self.filter, self.recv_hwm)
    }
}

#[derive(Debug, Default)]
pub struct SubscriberStats {
    messages_received: AtomicUsize,
    records_received: AtomicUsize,
}

impl SubscriberStats {
    pub fn messages_received(&self) -> usize {
        self.messages_received.load(Ordering::Relaxed)
    }

    pub fn records_received(&self) -> usize {
        self.records_received.load(Ordering::Relaxed)
    }
}

/// Polls the transport on a worker thread and dispatches each payload to the
/// registered handlers.
///
/// When the publisher closes the connection the worker keeps reconnecting
/// with exponential backoff until it is stopped; [`is_connected`](Self::is_connected)
/// reports whether a connection is currently up.
///
/// Handlers run on the worker thread, one payload at a time, so a slow
/// handler slows down receiving. A handler must never call
/// [`stop`](Self::stop) on the subscriber that invoked it; that deadlocks.
pub struct AsyncSubscriber {
    recv_hwm: usize,
    idle: Duration,
    threads: ThreadRegistry,
    lifecycle: Lifecycle,
    stats: Arc<SubscriberStats>,
    handlers: Arc<Handlers>,
    running: Arc<AtomicBool>,
    connected: Arc<AtomicBool>,
    worker: Option<ThreadHandle>,
}

impl AsyncSubscriber {
    pub fn new(recv_hwm: usize) -> Self {
        Self::with_registry(recv_hwm, DEFAULT_RECV_IDLE, ThreadRegistry::new())
    }

    pub fn with_registry(recv_hwm: usize, idle: Duration, threads: ThreadRegistry) -> Self {
        Self {
            recv_hwm,
            idle,
            threads,
            lifecycle: Lifecycle::new(),
            stats: Arc::new(SubscriberStats::default()),
            handlers: Arc::new(Handlers::default()),
            running: Arc::new(AtomicBool::new(false)),
            connected: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    fn handlers_mut(&mut self) -> Option<&mut Handlers> {
        let handlers = Arc::get_mut(&mut self.handlers);
        if handlers.is_none() {
            warn!("Subscriber handlers can only be changed while stopped");
        }
        handlers
    }

    pub fn on_data<F>(&mut self, handler: F)
    where
        F: Fn(&[Record]) + Send + Sync + 'static,
    {
        if let Some(h) = self.handlers_mut() {
            h.data = Some(Box::new(handler));
        }
    }

    pub fn on_raw<F>(&mut self, handler: F)
    where
        F: Fn(&[u8]) + Send + Sync + 'static,
    {
        if let Some(h) = self.handlers_mut() {
            h.raw = Some(Box::new(handler));
        }
    }

    pub fn on_error<F>(&mut self, handler: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        if let Some(h) = self.handlers_mut() {
            h.error = Some(Box::new(handler));
        }
    }

    /// Connects and spawns the worker. On a failed connect the error handler
    /// runs before this returns false.
    pub fn start(&mut self, endpoint: &str, topic_filter: &str) -> bool {
        if !self
            .lifecycle
            .transition(LifecycleState::Stopped, LifecycleState::Starting)
        {
            warn!("Subscriber already {}", self.lifecycle.get());
            return false;
        }

        let link = Link {
            endpoint: endpoint.to_string(),
            filter: topic_filter.as_bytes().to_vec(),
            recv_hwm: self.recv_hwm,
        };
        let socket = match link.connect() {
            Ok(s) => s,
            Err(e) => {
                let message = format!("failed to connect to {}: {}", endpoint, e);
                error!("Subscriber {}", message);
                self.handlers.report(&message);
                self.lifecycle.set(LifecycleState::Stopped);
                return false;
            }
        };

        self.running.store(true, Ordering::SeqCst);
        self.connected.store(true, Ordering::SeqCst);
        let worker = Worker {
            link,
            running: Arc::clone(&self.running),
            connected: Arc::clone(&self.connected),
            handlers: Arc::clone(&self.handlers),
            stats: Arc::clone(&self.stats),
            idle: self.idle,
        };

        match self
            .threads
            .spawn("subscriber-worker", move || worker.run(socket))
        {
            Ok(handle) => self.worker = Some(handle),
            Err(e) => {
                let message = format!("failed to start subscriber worker: {}", e);
                error!("{}", message);
                self.handlers.report(&message);
                self.running.store(false, Ordering::SeqCst);
                self.connected.store(false, Ordering::SeqCst);
                self.lifecycle.set(LifecycleState::Stopped);
                return false;
            }
        }

        self.lifecycle.set(LifecycleState::Running);
        info!("Subscriber started on {} (filter {:?})", endpoint, topic_filter);
        true
    }

    pub fn stop(&mut self) {
        if !self
            .lifecycle
            .transition(LifecycleState::Running, LifecycleState::Stopping)
        {
            return;
        }
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.worker.take() {
            if let Err(e) = handle.join() {
                error!("Subscriber worker panicked: {:?}", e);
            }
        }
        self.connected.store(false, Ordering::SeqCst);
        self.lifecycle.set(LifecycleState::Stopped);
        info!(
            "Subscriber stopped: {} messages, {} records received",
            self.stats.messages_received(),
            self.stats.records_received()
        );
    }

    pub fn stats(&self) -> Arc<SubscriberStats> {
        Arc::clone(&self.stats)
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.get()
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle.is_running()
    }

    /// False while the worker is waiting to reconnect, and whenever stopped.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl Drop for AsyncSubscriber {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Worker {
    link: Link,
    running: Arc<AtomicBool>,
    connected: Arc<AtomicBool>,
    handlers: Arc<Handlers>,
    stats: Arc<SubscriberStats>,
    idle: Duration,
}

impl Worker {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn run(self, socket: SubSocket) {
        debug!("Subscriber worker started");
        let mut socket = Some(socket);
        let mut backoff = RECONNECT_MIN;
        while self.is_running() {
            let Some(current) = socket.as_mut() else {
                match self.link.connect() {
                    Ok(fresh) => {
                        info!("Subscriber reconnected to {}", self.link.endpoint);
                        self.connected.store(true, Ordering::SeqCst);
                        backoff = RECONNECT_MIN;
                        socket = Some(fresh);
                    }
                    Err(e) => {
                        debug!(
                            "Reconnect to {} failed: {}, retrying in {:?}",
                            self.link.endpoint, e, backoff
                        );
                        self.sleep(backoff);
                        backoff = (backoff * 2).min(RECONNECT_MAX);
                    }
                }
                continue;
            };

            match current.try_recv() {
                Ok(Some(payload)) => dispatch(&payload, &self.handlers, &self.stats),
                Ok(None) => thread::sleep(self.idle),
                Err(TransportError::Closed) => {
                    warn!(
                        "Publisher at {} closed the connection, reconnecting",
                        current.peer_addr()
                    );
                    self.connected.store(false, Ordering::SeqCst);
                    self.handlers.report("publisher closed the connection");
                    socket = None;
                }
                Err(e) => {
                    let message = format!("receive failed: {}", e);
                    warn!("{}", message);
                    self.handlers.report(&message);
                    thread::sleep(self.idle);
                }
            }
        }
        debug!("Subscriber worker exiting");
    }

    /// Sleeps in `idle` slices so `stop` is not held up by a long backoff.
    fn sleep(&self, total: Duration) {
        let deadline = Instant::now() + total;
        while self.is_running() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep(self.idle.min(deadline - now));
        }
    }
}

fn dispatch(payload: &[u8], handlers: &Handlers, stats: &SubscriberStats) {
    stats.messages_received.fetch_add(1, Ordering::Relaxed);

    if let Some(raw) = &handlers.raw {
        raw(payload);
    }

    match codec::decode(payload) {
        Ok(roster) => {
            stats
                .records_received
                .fetch_add(roster.len(), Ordering::Relaxed);
            debug!("Received roster of {} records", roster.len());
            if let Some(data) = &handlers.data {
                data(&roster);
            }
        }
        Err(e) => {
            let message = format!("failed to decode payload of {} bytes: {}", payload.len(), e);
            debug!("{}", message);
            handlers.report(&message);
        }
    }
}
