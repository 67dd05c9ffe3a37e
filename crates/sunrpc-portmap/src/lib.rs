#![deny(unsafe_code)]

//! Portmapper client (RFC 1833, program 100000 version 2).
//!
//! A small single-socket UDP RPC client used by servers to publish their
//! (program, version, protocol, port) mappings and by anyone to look one
//! up. Calls use AUTH_NONE, correlate replies by xid, and retransmit once
//! on timeout.

use std::fmt;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use sunrpc_wire::{
    AcceptStatus, AuthCredential, AuthVerifier, CallHeader, RejectStatus, ReplyBody, RpcMessage,
    WireError,
};
use sunrpc_xdr::{Xdr, XdrDecode, XdrEncode, XdrError};
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::debug;

/// Well-known portmapper port.
pub const PORTMAP_PORT: u16 = 111;

/// Portmapper program number.
pub const PORTMAP_PROGRAM: u32 = 100000;

/// Portmapper protocol version spoken here.
pub const PORTMAP_VERSION: u32 = 2;

/// Portmapper procedure numbers.
pub mod procedure {
    pub const NULL: u32 = 0;
    pub const SET: u32 = 1;
    pub const UNSET: u32 = 2;
    pub const GETPORT: u32 = 3;
    pub const DUMP: u32 = 4;
}

/// IP protocol numbers used in mappings.
pub mod protocol {
    pub const TCP: u32 = 6;
    pub const UDP: u32 = 17;
}

/// Translate a netid ("tcp"/"udp", with their v6 forms) to the protocol
/// number portmap v2 carries.
pub fn netid_to_protocol(netid: &str) -> Option<u32> {
    match netid {
        "tcp" | "tcp6" => Some(protocol::TCP),
        "udp" | "udp6" => Some(protocol::UDP),
        _ => None,
    }
}

/// RFC 5665 universal address of an IP endpoint: the textual address with
/// the port appended as two dot-separated octets.
pub fn universal_address(addr: SocketAddr) -> String {
    let port = addr.port();
    format!("{}.{}.{}", addr.ip(), port >> 8, port & 0xFF)
}

/// Recover the port from a universal address, if well-formed.
pub fn universal_address_port(uaddr: &str) -> Option<u16> {
    let (rest, low) = uaddr.rsplit_once('.')?;
    let (_, high) = rest.rsplit_once('.')?;
    let low: u16 = low.parse().ok()?;
    let high: u16 = high.parse().ok()?;
    if low > 0xFF || high > 0xFF {
        return None;
    }
    Some(high << 8 | low)
}

/// One portmap table entry.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Mapping {
    pub prog: u32,
    pub vers: u32,
    pub prot: u32,
    pub port: u32,
}

impl Mapping {
    pub fn new(prog: u32, vers: u32, prot: u32, port: u32) -> Self {
        Self { prog, vers, prot, port }
    }
}

impl XdrEncode for Mapping {
    fn encode_xdr(&self, xdr: &mut Xdr) -> Result<(), XdrError> {
        xdr.encode_u32(self.prog)?;
        xdr.encode_u32(self.vers)?;
        xdr.encode_u32(self.prot)?;
        xdr.encode_u32(self.port)
    }
}

impl XdrDecode for Mapping {
    fn decode_xdr(xdr: &mut Xdr) -> Result<Self, XdrError> {
        Ok(Mapping {
            prog: xdr.decode_u32()?,
            vers: xdr.decode_u32()?,
            prot: xdr.decode_u32()?,
            port: xdr.decode_u32()?,
        })
    }
}

/// Error talking to the portmapper.
#[derive(Debug)]
pub enum PortmapError {
    Io(io::Error),
    /// No reply within the timeout, including one retransmission.
    Timeout,
    /// The portmapper denied the call.
    Denied(RejectStatus),
    /// The portmapper accepted but did not succeed.
    Failed(AcceptStatus),
    /// The reply did not decode.
    Wire(WireError),
    Xdr(XdrError),
    /// A netid this client cannot translate.
    BadNetid(String),
    /// A universal address without a parseable port.
    BadUniversalAddress(String),
}

impl fmt::Display for PortmapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortmapError::Io(e) => write!(f, "i/o error: {e}"),
            PortmapError::Timeout => write!(f, "portmapper did not reply"),
            PortmapError::Denied(r) => write!(f, "call denied: {r:?}"),
            PortmapError::Failed(s) => write!(f, "call failed: {s:?}"),
            PortmapError::Wire(e) => write!(f, "bad reply: {e}"),
            PortmapError::Xdr(e) => write!(f, "bad reply body: {e}"),
            PortmapError::BadNetid(n) => write!(f, "unknown netid {n:?}"),
            PortmapError::BadUniversalAddress(a) => {
                write!(f, "universal address {a:?} has no port")
            }
        }
    }
}

impl std::error::Error for PortmapError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PortmapError::Io(e) => Some(e),
            PortmapError::Wire(e) => Some(e),
            PortmapError::Xdr(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for PortmapError {
    fn from(e: io::Error) -> Self {
        PortmapError::Io(e)
    }
}

impl From<WireError> for PortmapError {
    fn from(e: WireError) -> Self {
        PortmapError::Wire(e)
    }
}

impl From<XdrError> for PortmapError {
    fn from(e: XdrError) -> Self {
        PortmapError::Xdr(e)
    }
}

const MAX_REPLY: usize = 65_507;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// UDP client for one portmapper.
#[derive(Debug)]
pub struct PortmapClient {
    socket: UdpSocket,
    dest: SocketAddr,
    timeout: Duration,
    xid: AtomicU32,
}

impl PortmapClient {
    /// Bind an ephemeral local socket pointed at `dest`.
    pub async fn connect(dest: SocketAddr) -> io::Result<Self> {
        let bind_addr: SocketAddr = match dest.ip() {
            IpAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            IpAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let socket = UdpSocket::bind(bind_addr).await?;
        Ok(Self {
            socket,
            dest,
            timeout: DEFAULT_TIMEOUT,
            xid: AtomicU32::new(1),
        })
    }

    /// Connect to the portmapper on `host` at the well-known port.
    pub async fn connect_host(host: IpAddr) -> io::Result<Self> {
        Self::connect((host, PORTMAP_PORT).into()).await
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Ping the portmapper.
    pub async fn null(&self) -> Result<(), PortmapError> {
        self.call(procedure::NULL, &()).await.map(|_| ())
    }

    /// Register `prog`/`vers` on the transport named by `netid` at the port
    /// taken from `uaddr`. Returns whether the portmapper accepted it.
    ///
    /// The owner string is part of the rpcbind v3 surface; portmap v2 has
    /// no place for it on the wire, so it is accepted and ignored here.
    pub async fn set(
        &self,
        prog: u32,
        vers: u32,
        netid: &str,
        uaddr: &str,
        _owner: &str,
    ) -> Result<bool, PortmapError> {
        let prot = netid_to_protocol(netid)
            .ok_or_else(|| PortmapError::BadNetid(netid.to_string()))?;
        let port = universal_address_port(uaddr)
            .ok_or_else(|| PortmapError::BadUniversalAddress(uaddr.to_string()))?;
        let mapping = Mapping::new(prog, vers, prot, port as u32);
        debug!(?mapping, "portmap set");
        let mut reply = self.call(procedure::SET, &mapping).await?;
        Ok(reply.decode_bool()?)
    }

    /// Remove every registration of `prog`/`vers`.
    pub async fn unset(&self, prog: u32, vers: u32) -> Result<bool, PortmapError> {
        let mapping = Mapping::new(prog, vers, 0, 0);
        debug!(?mapping, "portmap unset");
        let mut reply = self.call(procedure::UNSET, &mapping).await?;
        Ok(reply.decode_bool()?)
    }

    /// Look up the port of `prog`/`vers` on the transport named by `netid`.
    /// Zero means not registered.
    pub async fn get_port(
        &self,
        prog: u32,
        vers: u32,
        netid: &str,
    ) -> Result<u16, PortmapError> {
        let prot = netid_to_protocol(netid)
            .ok_or_else(|| PortmapError::BadNetid(netid.to_string()))?;
        let mapping = Mapping::new(prog, vers, prot, 0);
        let mut reply = self.call(procedure::GETPORT, &mapping).await?;
        Ok(reply.decode_u32()? as u16)
    }

    /// Fetch the whole mapping table.
    pub async fn dump(&self) -> Result<Vec<Mapping>, PortmapError> {
        let mut reply = self.call(procedure::DUMP, &()).await?;
        let mut entries = Vec::new();
        while reply.decode_bool()? {
            entries.push(Mapping::decode_xdr(&mut reply)?);
        }
        Ok(entries)
    }

    /// One call: encode, send, wait for the matching xid, decode the reply
    /// header. Returns the stream positioned at the result body.
    async fn call(&self, proc: u32, args: &impl XdrEncode) -> Result<Xdr, PortmapError> {
        let xid = self.xid.fetch_add(1, Ordering::Relaxed);
        let header = CallHeader {
            xid,
            program: PORTMAP_PROGRAM,
            version: PORTMAP_VERSION,
            procedure: proc,
            credential: AuthCredential::None,
            verifier: AuthVerifier::none(),
        };
        let mut xdr = Xdr::new(128);
        xdr.begin_encoding();
        header.encode_xdr(&mut xdr).map_err(PortmapError::Xdr)?;
        args.encode_xdr(&mut xdr).map_err(PortmapError::Xdr)?;
        xdr.end_encoding();
        let request = xdr.into_bytes();

        // One retransmission: the portmapper is local, a single loss is the
        // common failure.
        for attempt in 0..2 {
            if attempt > 0 {
                debug!(xid, "retransmitting portmap call");
            }
            self.socket.send_to(&request, self.dest).await?;
            match timeout(self.timeout, self.recv_reply(xid)).await {
                Ok(reply) => return reply,
                Err(_) => continue,
            }
        }
        Err(PortmapError::Timeout)
    }

    async fn recv_reply(&self, xid: u32) -> Result<Xdr, PortmapError> {
        let mut buf = vec![0u8; MAX_REPLY];
        loop {
            let (len, _peer) = self.socket.recv_from(&mut buf).await?;
            let mut xdr = Xdr::from_bytes(buf[..len].to_vec());
            xdr.begin_decoding();
            let reply = match RpcMessage::decode(&mut xdr) {
                Ok(RpcMessage::Reply(reply)) if reply.xid == xid => reply,
                Ok(_) => continue,
                Err(e) => {
                    debug!(error = %e, "ignoring undecodable datagram");
                    continue;
                }
            };
            return match reply.body {
                ReplyBody::Accepted { status: AcceptStatus::Success, .. } => Ok(xdr),
                ReplyBody::Accepted { status, .. } => Err(PortmapError::Failed(status)),
                ReplyBody::Denied(reject) => Err(PortmapError::Denied(reject)),
            };
        }
    }
}
