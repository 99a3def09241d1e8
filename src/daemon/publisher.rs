use crate::util::threading::{ThreadHandle, ThreadRegistry};
use crossbeam_channel::{Receiver, Sender, select, unbounded};
use log::{debug, error, info, warn};
use roster_common::lifecycle::{Lifecycle, LifecycleState};
use roster_core::Record;
use roster_core::codec;
use roster_transport::{PubSocket, TransportError};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct PublisherStats {
    messages_sent: AtomicUsize,
    records_sent: AtomicUsize,
    messages_dropped: AtomicUsize,
}

impl PublisherStats {
    /// Payloads the transport accepted.
    pub fn messages_sent(&self) -> usize {
        self.messages_sent.load(Ordering::Relaxed)
    }

    /// Records handed to [`AsyncPublisher::publish`], counted when queued
    /// rather than when sent. This is offered volume, not delivered volume.
    pub fn records_sent(&self) -> usize {
        self.records_sent.load(Ordering::Relaxed)
    }

    /// Payloads dropped because the transport would have blocked or failed.
    pub fn messages_dropped(&self) -> usize {
        self.messages_dropped.load(Ordering::Relaxed)
    }
}

enum ControlMsg {
    Stop,
}

/// Queues payloads and hands them to the transport on a dedicated worker so
/// the caller never waits on the network.
pub struct AsyncPublisher {
    send_hwm: usize,
    threads: ThreadRegistry,
    lifecycle: Lifecycle,
    stats: Arc<PublisherStats>,
    queue_tx: Option<Sender<Vec<u8>>>,
    control_tx: Option<Sender<ControlMsg>>,
    socket: Option<Arc<PubSocket>>,
    worker: Option<ThreadHandle>,
}

impl AsyncPublisher {
    pub fn new(send_hwm: usize) -> Self {
        Self::with_registry(send_hwm, ThreadRegistry::new())
    }

    pub fn with_registry(send_hwm: usize, threads: ThreadRegistry) -> Self {
        Self {
            send_hwm,
            threads,
            lifecycle: Lifecycle::new(),
            stats: Arc::new(PublisherStats::default()),
            queue_tx: None,
            control_tx: None,
            socket: None,
            worker: None,
        }
    }

    /// Binds `endpoint` and spawns the worker. Returns false if the publisher
    /// is already started or the bind fails.
    pub fn start(&mut self, endpoint: &str) -> bool {
        if !self
            .lifecycle
            .transition(LifecycleState::Stopped, LifecycleState::Starting)
        {
            warn!("Publisher already {}", self.lifecycle.get());
            return false;
        }

        let socket = match PubSocket::bind(endpoint, self.send_hwm, &self.threads) {
            Ok(s) => Arc::new(s),
            Err(e) => {
                error!("Failed to bind publisher to {}: {}", endpoint, e);
                self.lifecycle.set(LifecycleState::Stopped);
                return false;
            }
        };

        let (queue_tx, queue_rx) = unbounded::<Vec<u8>>();
        let (control_tx, control_rx) = unbounded::<ControlMsg>();
        let worker_socket = Arc::clone(&socket);
        let stats = Arc::clone(&self.stats);

        let worker = match self.threads.spawn("publisher-worker", move || {
            run_worker(worker_socket, queue_rx, control_rx, stats)
        }) {
            Ok(handle) => handle,
            Err(e) => {
                error!("Failed to start publisher worker: {}", e);
                socket.close();
                self.lifecycle.set(LifecycleState::Stopped);
                return false;
            }
        };

        self.queue_tx = Some(queue_tx);
        self.control_tx = Some(control_tx);
        self.socket = Some(socket);
        self.worker = Some(worker);
        self.lifecycle.set(LifecycleState::Running);
        info!("Publisher started on {}", endpoint);
        true
    }

    /// Signals the worker, waits for it to drain the queue and closes the
    /// socket. Does nothing unless running.
    pub fn stop(&mut self) {
        if !self
            .lifecycle
            .transition(LifecycleState::Running, LifecycleState::Stopping)
        {
            return;
        }

        if let Some(tx) = self.control_tx.take() {
            let _ = tx.send(ControlMsg::Stop);
        }
        if let Some(handle) = self.worker.take() {
            if let Err(e) = handle.join() {
                error!("Publisher worker panicked: {:?}", e);
            }
        }
        self.queue_tx = None;
        if let Some(socket) = self.socket.take() {
            socket.close();
        }

        self.lifecycle.set(LifecycleState::Stopped);
        info!(
            "Publisher stopped: {} messages sent, {} dropped, {} records offered",
            self.stats.messages_sent(),
            self.stats.messages_dropped(),
            self.stats.records_sent()
        );
    }

    pub fn publish_payload(&self, payload: Vec<u8>) {
        if !self.lifecycle.is_running() {
            warn!("Publisher not running, payload discarded");
            return;
        }
        if let Some(tx) = &self.queue_tx {
            if tx.send(payload).is_err() {
                warn!("Publisher queue closed, payload discarded");
            }
        }
    }

    /// Encodes `roster` and queues it. `records_sent` grows by the roster
    /// length here, before anything is on the wire.
    pub fn publish(&self, roster: &[Record]) {
        if !self.lifecycle.is_running() {
            warn!("Publisher not running, roster of {} discarded", roster.len());
            return;
        }
        let payload = match codec::encode(roster) {
            Ok(p) => p,
            Err(e) => {
                error!("Failed to encode roster: {}", e);
                return;
            }
        };
        self.stats
            .records_sent
            .fetch_add(roster.len(), Ordering::Relaxed);
        self.publish_payload(payload);
    }

    pub fn queue_depth(&self) -> usize {
        self.queue_tx.as_ref().map_or(0, Sender::len)
    }

    pub fn stats(&self) -> Arc<PublisherStats> {
        Arc::clone(&self.stats)
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.get()
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle.is_running()
    }

    pub fn local_endpoint(&self) -> Option<String> {
        self.socket.as_ref().map(|s| s.local_endpoint())
    }

    pub fn subscriber_count(&self) -> usize {
        self.socket.as_ref().map_or(0, |s| s.subscriber_count())
    }
}

impl Drop for AsyncPublisher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_worker(
    socket: Arc<PubSocket>,
    queue_rx: Receiver<Vec<u8>>,
    control_rx: Receiver<ControlMsg>,
    stats: Arc<PublisherStats>,
) {
    debug!("Publisher worker started");
    loop {
        select! {
            recv(queue_rx) -> msg => match msg {
                Ok(payload) => send_one(&socket, &payload, &stats),
                Err(_) => break,
            },
            // Stop or a dropped control sender: drain, then exit.
            recv(control_rx) -> _ => {
                let mut drained = 0usize;
                while let Ok(payload) = queue_rx.try_recv() {
                    send_one(&socket, &payload, &stats);
                    drained += 1;
                }
                debug!("Publisher worker drained {} queued payloads", drained);
                break;
            }
        }
    }
    debug!("Publisher worker exiting");
}

fn send_one(socket: &PubSocket, payload: &[u8], stats: &PublisherStats) {
    match socket.try_send(payload) {
        Ok(()) => {
            stats.messages_sent.fetch_add(1, Ordering::Relaxed);
        }
        Err(TransportError::WouldBlock) => {
            stats.messages_dropped.fetch_add(1, Ordering::Relaxed);
            debug!("Transport at high-water mark, dropped {} byte payload", payload.len());
        }
        Err(e) => {
            stats.messages_dropped.fetch_add(1, Ordering::Relaxed);
            warn!("Send failed, dropped payload: {}", e);
        }
    }
}
