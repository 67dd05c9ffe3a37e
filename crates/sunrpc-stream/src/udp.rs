//! Datagram transport: each UDP datagram is exactly one record.
//!
//! No header, no reassembly state. Oversized traffic is dropped in both
//! directions with a log line, never an error to the caller.

use std::io;
use std::net::SocketAddr;

use tokio::net::UdpSocket;
use tracing::{debug, warn};

/// Largest payload a UDP datagram can carry (IPv4, no jumbograms).
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

/// A record-per-datagram transport over a bound UDP socket.
#[derive(Debug)]
pub struct DatagramFramer {
    socket: UdpSocket,
    max_record_size: usize,
}

impl DatagramFramer {
    pub fn new(socket: UdpSocket) -> Self {
        Self::with_max_record_size(socket, MAX_DATAGRAM_SIZE)
    }

    /// Cap inbound records below the datagram limit.
    pub fn with_max_record_size(socket: UdpSocket, max_record_size: usize) -> Self {
        Self {
            socket,
            max_record_size: max_record_size.min(MAX_DATAGRAM_SIZE),
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Receive the next record and its source address.
    ///
    /// Datagrams above the configured record ceiling are dropped silently
    /// (logged) and the wait continues.
    pub async fn recv(&self) -> io::Result<(Vec<u8>, SocketAddr)> {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        loop {
            let (len, peer) = self.socket.recv_from(&mut buf).await?;
            if len > self.max_record_size {
                debug!(%peer, len, max = self.max_record_size, "dropping oversized datagram");
                continue;
            }
            let mut record = buf;
            record.truncate(len);
            return Ok((record, peer));
        }
    }

    /// Send one record to a destination. An oversized record cannot be
    /// expressed as a datagram and is dropped with a warning.
    pub async fn send_to(&self, record: &[u8], peer: SocketAddr) -> io::Result<()> {
        if record.len() > MAX_DATAGRAM_SIZE {
            warn!(%peer, len = record.len(), "dropping reply too large for a datagram");
            return Ok(());
        }
        self.socket.send_to(record, peer).await?;
        Ok(())
    }
}
