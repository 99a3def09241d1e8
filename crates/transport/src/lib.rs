//! Minimal TCP publish/subscribe transport.
//!
//! One [`PubSocket`] fans length-prefixed frames out to every connected
//! [`SubSocket`]. Each subscriber has its own bounded outbound queue (the send
//! high-water mark); a subscriber whose queue is full simply misses the frame.
//! Nothing is replayed to late joiners.

pub mod endpoint;
pub mod error;
pub mod frame;
pub mod pub_socket;
pub mod sub_socket;

pub use endpoint::Endpoint;
pub use error::{TransportError, TransportResult};
pub use pub_socket::PubSocket;
pub use sub_socket::SubSocket;
