use crate::endpoint::Endpoint;
use crate::error::{TransportError, TransportResult};
use crate::frame::FrameDecoder;
use log::{debug, info};
use std::collections::VecDeque;
use std::io::{ErrorKind, Read};
use std::net::{SocketAddr, TcpStream};

const READ_CHUNK: usize = 64 * 1024;
const MAX_READS_PER_POLL: usize = 64;

/// Subscribing side of the transport. Non-blocking; frames that do not start
/// with the topic filter are discarded on arrival.
pub struct SubSocket {
    stream: TcpStream,
    peer: SocketAddr,
    decoder: FrameDecoder,
    filter: Vec<u8>,
    pending: VecDeque<Vec<u8>>,
    recv_hwm: usize,
    closed: bool,
    dropped: usize,
}

impl SubSocket {
    /// Connects immediately; a refused connection is an error here rather
    /// than a silent retry.
    pub fn connect(endpoint: &str, filter: &[u8], recv_hwm: usize) -> TransportResult<Self> {
        let endpoint = Endpoint::parse(endpoint)?;
        let stream = TcpStream::connect(endpoint.connect_addr())?;
        stream.set_nonblocking(true)?;
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr()?;
        info!("Subscriber connected to {} (filter {:?})", peer, String::from_utf8_lossy(filter));

        Ok(Self {
            stream,
            peer,
            decoder: FrameDecoder::new(),
            filter: filter.to_vec(),
            pending: VecDeque::new(),
            recv_hwm: recv_hwm.max(1),
            closed: false,
            dropped: 0,
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Frames discarded because the receive queue was at its high-water mark.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Returns the next matching payload, `Ok(None)` when nothing is ready.
    /// Once the publisher has gone away and every buffered frame has been
    /// handed out, returns [`TransportError::Closed`].
    pub fn try_recv(&mut self) -> TransportResult<Option<Vec<u8>>> {
        if let Some(frame) = self.pending.pop_front() {
            return Ok(Some(frame));
        }
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.fill()?;
        match self.pending.pop_front() {
            Some(frame) => Ok(Some(frame)),
            None if self.closed => Err(TransportError::Closed),
            None => Ok(None),
        }
    }

    fn fill(&mut self) -> TransportResult<()> {
        let mut buf = vec![0u8; READ_CHUNK];
        for _ in 0..MAX_READS_PER_POLL {
            match self.stream.read(&mut buf) {
                Ok(0) => {
                    debug!("Publisher {} closed the connection", self.peer);
                    self.closed = true;
                    break;
                }
                Ok(n) => {
                    self.decoder.push(&buf[..n]);
                    if let Err(e) = self.drain_frames() {
                        // The stream is out of sync; nothing after this header can be trusted.
                        self.closed = true;
                        return Err(e);
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.closed = true;
                    return Err(e.into());
                }
            }
        }
        Ok(())
    }

    fn drain_frames(&mut self) -> TransportResult<()> {
        while let Some(frame) = self.decoder.next_frame()? {
            if !frame.starts_with(&self.filter) {
                continue;
            }
            if self.pending.len() >= self.recv_hwm {
                self.dropped += 1;
                continue;
            }
            self.pending.push_back(frame);
        }
        Ok(())
    }
}
