//! The narrow interface the core asks of a transport.
//!
//! A reply goes back as one finished record to wherever the call came from.
//! The trait is object-safe (boxed futures) so a call can carry its
//! transport without knowing whether it arrived over TCP, UDP, or a test
//! harness.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;

use sunrpc_stream::{DatagramFramer, FrameError, RecordFramer};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::Mutex;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Where replies to a call are written.
pub trait ReplyTransport: Send + Sync {
    /// Send one complete reply record to the peer.
    fn send_reply(&self, record: Vec<u8>) -> BoxFuture<'_, io::Result<()>>;

    /// The peer the call came from.
    fn peer_addr(&self) -> SocketAddr;
}

/// Reply side of a TCP connection. Handlers for different calls on the same
/// connection may finish in any order; the write lock keeps whole records
/// intact while allowing out-of-order completion.
pub(crate) struct TcpReplyTransport {
    pub(crate) writer: Arc<Mutex<RecordFramer<OwnedWriteHalf>>>,
    pub(crate) peer: SocketAddr,
}

impl ReplyTransport for TcpReplyTransport {
    fn send_reply(&self, record: Vec<u8>) -> BoxFuture<'_, io::Result<()>> {
        Box::pin(async move {
            let mut writer = self.writer.lock().await;
            writer.send(&record).await.map_err(|e| match e {
                FrameError::Io(e) => e,
                other => io::Error::new(io::ErrorKind::InvalidData, other.to_string()),
            })
        })
    }

    fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}

/// Reply side of a UDP call: one datagram back to the source address,
/// best effort, no retry.
pub(crate) struct UdpReplyTransport {
    pub(crate) framer: Arc<DatagramFramer>,
    pub(crate) peer: SocketAddr,
}

impl ReplyTransport for UdpReplyTransport {
    fn send_reply(&self, record: Vec<u8>) -> BoxFuture<'_, io::Result<()>> {
        Box::pin(async move { self.framer.send_to(&record, self.peer).await })
    }

    fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}
