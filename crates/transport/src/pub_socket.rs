use crate::endpoint::Endpoint;
use crate::error::{TransportError, TransportResult};
use crate::frame;
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use log::{debug, info, warn};
use roster_common::threading::{ThreadHandle, ThreadRegistry};
use std::io::{ErrorKind, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

const ACCEPT_POLL: Duration = Duration::from_millis(5);
/// How long `close` waits for peers to flush frames already queued.
const CLOSE_LINGER: Duration = Duration::from_millis(100);

type Frame = Arc<[u8]>;

struct Peer {
    addr: SocketAddr,
    tx: Sender<Frame>,
    stream: TcpStream,
    writer: ThreadHandle,
}

impl Peer {
    fn close(self, linger: Duration) {
        let Peer {
            addr,
            tx,
            stream,
            writer,
        } = self;
        drop(tx);
        let deadline = Instant::now() + linger;
        while !writer.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        let _ = stream.shutdown(Shutdown::Both);
        if writer.join().is_err() {
            warn!("Writer thread for subscriber {} panicked", addr);
        }
    }
}

type Peers = Arc<Mutex<Vec<Peer>>>;

fn lock(peers: &Peers) -> MutexGuard<'_, Vec<Peer>> {
    peers.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Publishing side of the transport. Binds once, accepts subscribers in the
/// background and fans every frame out to all of them.
pub struct PubSocket {
    local_addr: SocketAddr,
    peers: Peers,
    shutdown: Arc<AtomicBool>,
    acceptor: Mutex<Option<ThreadHandle>>,
}

impl PubSocket {
    pub fn bind(endpoint: &str, send_hwm: usize, threads: &ThreadRegistry) -> TransportResult<Self> {
        let endpoint = Endpoint::parse(endpoint)?;
        let listener = TcpListener::bind(endpoint.bind_addr())?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;
        info!("Publisher socket bound on {} (hwm {})", local_addr, send_hwm);

        let peers: Peers = Arc::new(Mutex::new(Vec::new()));
        let shutdown = Arc::new(AtomicBool::new(false));

        let acceptor = {
            let peers = Arc::clone(&peers);
            let shutdown = Arc::clone(&shutdown);
            let registry = threads.clone();
            threads
                .spawn("pub-acceptor", move || {
                    accept_loop(listener, peers, shutdown, send_hwm.max(1), registry)
                })
                .map_err(|e| TransportError::Thread(e.to_string()))?
        };

        Ok(Self {
            local_addr,
            peers,
            shutdown,
            acceptor: Mutex::new(Some(acceptor)),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Endpoint a subscriber on this host can connect to.
    pub fn local_endpoint(&self) -> String {
        let ip = if self.local_addr.ip().is_unspecified() {
            "127.0.0.1".to_string()
        } else {
            self.local_addr.ip().to_string()
        };
        format!("tcp://{}:{}", ip, self.local_addr.port())
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.peers).len()
    }

    /// Offers `payload` to every subscriber without blocking.
    ///
    /// With no subscribers the frame is silently discarded. A subscriber whose
    /// queue is full misses this frame; [`TransportError::WouldBlock`] is
    /// returned only when every subscriber was full.
    pub fn try_send(&self, payload: &[u8]) -> TransportResult<()> {
        let frame: Frame = frame::encode(payload)?.into();
        let mut accepted = 0usize;
        let mut full = 0usize;
        let mut gone = Vec::new();

        {
            let mut peers = lock(&self.peers);
            let mut i = 0;
            while i < peers.len() {
                match peers[i].tx.try_send(Arc::clone(&frame)) {
                    Ok(()) => accepted += 1,
                    Err(TrySendError::Full(_)) => {
                        debug!("Subscriber {} at high-water mark, frame skipped", peers[i].addr);
                        full += 1;
                    }
                    Err(TrySendError::Disconnected(_)) => {
                        gone.push(peers.swap_remove(i));
                        continue;
                    }
                }
                i += 1;
            }
        }

        for peer in gone {
            info!("Subscriber {} disconnected", peer.addr);
            peer.close(Duration::ZERO);
        }

        if full > 0 && accepted == 0 {
            return Err(TransportError::WouldBlock);
        }
        Ok(())
    }

    /// Stops accepting, disconnects every subscriber and releases the port.
    /// Safe to call more than once.
    pub fn close(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        let acceptor = self
            .acceptor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(acceptor) = acceptor {
            if acceptor.join().is_err() {
                warn!("Publisher acceptor thread panicked");
            }
        }
        let peers: Vec<Peer> = lock(&self.peers).drain(..).collect();
        for peer in peers {
            peer.close(CLOSE_LINGER);
        }
    }
}

impl Drop for PubSocket {
    fn drop(&mut self) {
        self.close();
    }
}

fn accept_loop(
    listener: TcpListener,
    peers: Peers,
    shutdown: Arc<AtomicBool>,
    send_hwm: usize,
    threads: ThreadRegistry,
) {
    while !shutdown.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, addr)) => match register_peer(stream, addr, send_hwm, &threads) {
                Ok(peer) => {
                    info!("Subscriber connected from {}", addr);
                    lock(&peers).push(peer);
                }
                Err(e) => warn!("Failed to register subscriber {}: {}", addr, e),
            },
            Err(e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
            Err(e) => {
                warn!("Accept failed: {}", e);
                thread::sleep(ACCEPT_POLL);
            }
        }
    }
    debug!("Publisher acceptor stopped");
}

fn register_peer(
    stream: TcpStream,
    addr: SocketAddr,
    send_hwm: usize,
    threads: &ThreadRegistry,
) -> TransportResult<Peer> {
    stream.set_nonblocking(false)?;
    stream.set_nodelay(true)?;
    let writer_stream = stream.try_clone()?;
    let (tx, rx) = bounded::<Frame>(send_hwm);
    let writer = threads
        .spawn(format!("pub-peer-{}", addr), move || {
            write_loop(writer_stream, rx, addr)
        })
        .map_err(|e| TransportError::Thread(e.to_string()))?;
    Ok(Peer {
        addr,
        tx,
        stream,
        writer,
    })
}

fn write_loop(mut stream: TcpStream, rx: Receiver<Frame>, addr: SocketAddr) {
    for frame in rx.iter() {
        if let Err(e) = stream.write_all(&frame) {
            debug!("Write to subscriber {} failed: {}", addr, e);
            return;
        }
    }
    let _ = stream.flush();
}
