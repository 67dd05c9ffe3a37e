//! The RPC service: configuration, listeners, and the per-record pipeline.
//!
//! `start` binds the configured port (or the first usable port of a range)
//! for TCP and/or UDP, spawns the receive loops, and optionally publishes
//! every registered program to the local portmapper. It completes once the
//! listeners are bound, so a caller can immediately look up the bound
//! address.
//!
//! Concurrency model: one task per TCP connection, so a connection's
//! records are processed in order, one at a time; UDP datagrams dispatch as
//! independent tasks bounded by the worker limit.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use sunrpc_portmap::{universal_address, PortmapClient, PORTMAP_PORT};
use sunrpc_stream::{
    DatagramFramer, RecordFramer, DEFAULT_FRAGMENT_SIZE, DEFAULT_MAX_RECORD_SIZE,
};
use sunrpc_wire::{OncRpcProgram, RejectStatus, RpcMessage, WireError, RPC_VERSION};
use sunrpc_xdr::Xdr;
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::auth::gss::GssSessionManager;
use crate::auth::{AuthFilter, AuthOutcome};
use crate::call::{send_denied, RpcCall};
use crate::dispatch::{Dispatcher, RpcDispatchable};
use crate::errors::SvcError;
use crate::transport::{ReplyTransport, TcpReplyTransport, UdpReplyTransport};

/// Default service name, used for logging and portmapper ownership.
pub const DEFAULT_SERVICE_NAME: &str = "ONCRPC Service";

/// Which transports the service binds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Protocols {
    Tcp,
    Udp,
    #[default]
    TcpAndUdp,
}

impl Protocols {
    fn tcp(self) -> bool {
        matches!(self, Protocols::Tcp | Protocols::TcpAndUdp)
    }

    fn udp(self) -> bool {
        matches!(self, Protocols::Udp | Protocols::TcpAndUdp)
    }
}

/// One concrete transport, for address lookups and netids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    pub fn netid(self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        }
    }
}

/// Builder for [`OncRpcSvc`].
pub struct OncRpcSvcBuilder {
    port_low: u16,
    port_high: u16,
    protocols: Protocols,
    publish: bool,
    service_name: String,
    worker_limit: usize,
    gss_manager: Option<Arc<GssSessionManager>>,
    max_record_size: usize,
    idle_timeout: Option<Duration>,
    portmap_addr: SocketAddr,
    bind_ip: IpAddr,
}

impl OncRpcSvcBuilder {
    /// Serve on a single port. Port 0 binds an ephemeral port per
    /// transport; with both transports enabled the two ports then differ.
    pub fn new(port: u16) -> Self {
        Self::port_range(port, port)
    }

    /// Serve on the first bindable port in `low..=high`.
    pub fn port_range(low: u16, high: u16) -> Self {
        assert!(low <= high, "port range is backwards");
        Self {
            port_low: low,
            port_high: high,
            protocols: Protocols::default(),
            publish: true,
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            worker_limit: 16,
            gss_manager: None,
            max_record_size: DEFAULT_MAX_RECORD_SIZE,
            idle_timeout: None,
            portmap_addr: (Ipv4Addr::LOCALHOST, PORTMAP_PORT).into(),
            bind_ip: Ipv4Addr::UNSPECIFIED.into(),
        }
    }

    pub fn with_protocols(mut self, protocols: Protocols) -> Self {
        self.protocols = protocols;
        self
    }

    /// Register bound programs with the local portmapper on start (and
    /// withdraw them on stop). On by default.
    pub fn publish_to_portmap(mut self, publish: bool) -> Self {
        self.publish = publish;
        self
    }

    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = name.into();
        self
    }

    /// Cap on concurrently dispatched UDP calls. TCP needs no cap: each
    /// connection is already serialized.
    pub fn with_worker_limit(mut self, limit: usize) -> Self {
        assert!(limit >= 1, "worker limit must be at least 1");
        self.worker_limit = limit;
        self
    }

    /// Enable RPCSEC_GSS with this session manager.
    pub fn with_gss_session_manager(mut self, manager: Arc<GssSessionManager>) -> Self {
        self.gss_manager = Some(manager);
        self
    }

    /// Ceiling on a reassembled TCP record.
    pub fn with_max_record_size(mut self, max: usize) -> Self {
        self.max_record_size = max;
        self
    }

    /// Close TCP connections idle for this long. Default: never.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    /// Address of the portmapper to publish to. Default: localhost:111.
    pub fn with_portmap_address(mut self, addr: SocketAddr) -> Self {
        self.portmap_addr = addr;
        self
    }

    /// Local address to bind. Default: all interfaces.
    pub fn with_bind_ip(mut self, ip: IpAddr) -> Self {
        self.bind_ip = ip;
        self
    }

    pub fn build(self) -> OncRpcSvc {
        let auth = Arc::new(AuthFilter::new(self.gss_manager.clone()));
        OncRpcSvc {
            dispatcher: Arc::new(Dispatcher::new()),
            auth,
            config: self,
            running: Mutex::new(None),
        }
    }
}

struct Running {
    tcp: Option<(SocketAddr, JoinHandle<()>)>,
    udp: Option<(SocketAddr, JoinHandle<()>)>,
    sweeper: Option<JoinHandle<()>>,
    published: Vec<(OncRpcProgram, Protocol)>,
}

/// An ONC RPC server over TCP and/or UDP.
pub struct OncRpcSvc {
    dispatcher: Arc<Dispatcher>,
    auth: Arc<AuthFilter>,
    config: OncRpcSvcBuilder,
    running: Mutex<Option<Running>>,
}

impl OncRpcSvc {
    pub fn builder(port: u16) -> OncRpcSvcBuilder {
        OncRpcSvcBuilder::new(port)
    }

    /// Register a program handler. An existing registration for the same
    /// (program, version) is replaced. Programs registered after `start`
    /// serve traffic immediately but are not published to the portmapper
    /// until the next `start`.
    pub fn register(&self, program: OncRpcProgram, handler: Arc<dyn RpcDispatchable>) {
        self.dispatcher.register(program, handler);
    }

    pub fn unregister(&self, program: &OncRpcProgram) {
        self.dispatcher.unregister(program);
    }

    /// The address a transport is bound to, once running.
    pub async fn local_addr(&self, protocol: Protocol) -> Option<SocketAddr> {
        let running = self.running.lock().await;
        let running = running.as_ref()?;
        match protocol {
            Protocol::Tcp => running.tcp.as_ref().map(|(addr, _)| *addr),
            Protocol::Udp => running.udp.as_ref().map(|(addr, _)| *addr),
        }
    }

    /// Bind listeners, spawn the receive loops, and publish to the
    /// portmapper when configured. Completes once everything is bound.
    pub async fn start(&self) -> Result<(), SvcError> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Err(SvcError::AlreadyRunning);
        }

        let (tcp_listener, udp_socket) = self.bind().await?;

        let tcp = match tcp_listener {
            Some(listener) => {
                let addr = listener.local_addr()?;
                info!(%addr, name = %self.config.service_name, "tcp listener bound");
                let handle = tokio::spawn(accept_loop(
                    listener,
                    self.dispatcher.clone(),
                    self.auth.clone(),
                    self.config.max_record_size,
                    self.config.idle_timeout,
                ));
                Some((addr, handle))
            }
            None => None,
        };

        let udp = match udp_socket {
            Some(socket) => {
                let addr = socket.local_addr()?;
                info!(%addr, name = %self.config.service_name, "udp socket bound");
                let framer = Arc::new(DatagramFramer::with_max_record_size(
                    socket,
                    self.config.max_record_size,
                ));
                let handle = tokio::spawn(udp_loop(
                    framer,
                    self.dispatcher.clone(),
                    self.auth.clone(),
                    self.config.worker_limit,
                ));
                Some((addr, handle))
            }
            None => None,
        };

        let sweeper = self.config.gss_manager.as_ref().map(|manager| {
            let manager = manager.clone();
            tokio::spawn(async move {
                let mut tick = tokio::time::interval(Duration::from_secs(60));
                loop {
                    tick.tick().await;
                    manager.sweep_expired();
                }
            })
        });

        let mut state = Running { tcp, udp, sweeper, published: Vec::new() };

        if self.config.publish {
            if let Err(e) = self.publish(&mut state).await {
                // Listeners come down again; a half-started service helps
                // nobody.
                abort_running(&mut state);
                return Err(e);
            }
        }

        *running = Some(state);
        Ok(())
    }

    /// Stop the receive loops and withdraw portmapper registrations.
    pub async fn stop(&self) {
        let mut running = self.running.lock().await;
        let Some(mut state) = running.take() else {
            return;
        };
        if !state.published.is_empty() {
            if let Err(e) = self.unpublish(&state).await {
                warn!(error = %e, "failed to unregister from portmapper");
            }
        }
        abort_running(&mut state);
        info!(name = %self.config.service_name, "service stopped");
    }

    async fn bind(&self) -> Result<(Option<TcpListener>, Option<UdpSocket>), SvcError> {
        let want_tcp = self.config.protocols.tcp();
        let want_udp = self.config.protocols.udp();
        let ip = self.config.bind_ip;

        for port in self.config.port_low..=self.config.port_high {
            let tcp = if want_tcp {
                match TcpListener::bind((ip, port)).await {
                    Ok(listener) => Some(listener),
                    Err(e) => {
                        debug!(port, error = %e, "tcp bind failed, trying next port");
                        continue;
                    }
                }
            } else {
                None
            };
            // Both transports share the port number, so a UDP failure on a
            // nonzero port sends us to the next candidate.
            let udp_port = match (&tcp, port) {
                (Some(listener), 0) => listener.local_addr()?.port(),
                _ => port,
            };
            let udp = if want_udp {
                match UdpSocket::bind((ip, udp_port)).await {
                    Ok(socket) => Some(socket),
                    Err(e) if port == 0 && tcp.is_some() => {
                        // Ephemeral TCP port taken on UDP; fall back to
                        // independent ephemeral ports.
                        debug!(udp_port, error = %e, "udp bind on tcp's ephemeral port failed");
                        Some(UdpSocket::bind((ip, 0)).await?)
                    }
                    Err(e) => {
                        debug!(port = udp_port, error = %e, "udp bind failed, trying next port");
                        continue;
                    }
                }
            } else {
                None
            };
            return Ok((tcp, udp));
        }
        Err(SvcError::NoUsablePort {
            low: self.config.port_low,
            high: self.config.port_high,
        })
    }

    async fn publish(&self, state: &mut Running) -> Result<(), SvcError> {
        let client = PortmapClient::connect(self.config.portmap_addr).await?;
        // A portmapper that does not even answer NULL makes the whole start
        // fail; per-program refusals below are only logged.
        client.null().await.map_err(SvcError::Portmap)?;
        let owner = std::env::var("USER").unwrap_or_else(|_| self.config.service_name.clone());
        let programs = self.dispatcher.registrations();
        let mut endpoints = Vec::new();
        if let Some((addr, _)) = &state.tcp {
            endpoints.push((Protocol::Tcp, *addr));
        }
        if let Some((addr, _)) = &state.udp {
            endpoints.push((Protocol::Udp, *addr));
        }
        for program in programs {
            for (protocol, addr) in &endpoints {
                let uaddr = universal_address(*addr);
                match client
                    .set(program.number, program.version, protocol.netid(), &uaddr, &owner)
                    .await
                {
                    Ok(true) => {
                        info!(%program, netid = protocol.netid(), %uaddr, "published to portmapper");
                        state.published.push((program, *protocol));
                    }
                    Ok(false) => {
                        error!(%program, netid = protocol.netid(), "portmapper refused registration")
                    }
                    Err(e) => {
                        error!(%program, netid = protocol.netid(), error = %e, "portmap registration failed")
                    }
                }
            }
        }
        Ok(())
    }

    async fn unpublish(&self, state: &Running) -> Result<(), SvcError> {
        let client = PortmapClient::connect(self.config.portmap_addr).await?;
        let mut withdrawn = std::collections::HashSet::new();
        for (program, _) in &state.published {
            // UNSET covers every transport of the program at once.
            if withdrawn.insert(*program) {
                if let Err(e) = client.unset(program.number, program.version).await {
                    warn!(%program, error = %e, "portmap unregistration failed");
                }
            }
        }
        Ok(())
    }
}

fn abort_running(state: &mut Running) {
    if let Some((_, handle)) = &state.tcp {
        handle.abort();
    }
    if let Some((_, handle)) = &state.udp {
        handle.abort();
    }
    if let Some(handle) = &state.sweeper {
        handle.abort();
    }
}

async fn accept_loop(
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
    auth: Arc<AuthFilter>,
    max_record_size: usize,
    idle_timeout: Option<Duration>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                debug!(%peer, "tcp connection accepted");
                let dispatcher = dispatcher.clone();
                let auth = auth.clone();
                tokio::spawn(async move {
                    handle_connection(stream, peer, dispatcher, auth, max_record_size, idle_timeout)
                        .await;
                });
            }
            Err(e) => {
                warn!(error = %e, "tcp accept failed");
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}

/// Serve one TCP connection until EOF, idle timeout, or a fatal error.
/// Records are processed one at a time; the connection is the unit of
/// serialization.
async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    dispatcher: Arc<Dispatcher>,
    auth: Arc<AuthFilter>,
    max_record_size: usize,
    idle_timeout: Option<Duration>,
) {
    match serve_connection(stream, peer, dispatcher, auth, max_record_size, idle_timeout).await {
        Ok(()) => debug!(%peer, "connection closed"),
        Err(e) => warn!(%peer, error = %e, "closing connection"),
    }
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    dispatcher: Arc<Dispatcher>,
    auth: Arc<AuthFilter>,
    max_record_size: usize,
    idle_timeout: Option<Duration>,
) -> Result<(), SvcError> {
    let (read_half, write_half) = stream.into_split();
    let mut reader = RecordFramer::with_limits(read_half, max_record_size, DEFAULT_FRAGMENT_SIZE);
    let writer = Arc::new(Mutex::new(RecordFramer::with_limits(
        write_half,
        max_record_size,
        DEFAULT_FRAGMENT_SIZE,
    )));
    let transport: Arc<dyn ReplyTransport> = Arc::new(TcpReplyTransport { writer, peer });

    loop {
        let record = match idle_timeout {
            Some(limit) => match tokio::time::timeout(limit, reader.recv()).await {
                Ok(result) => result?,
                Err(_) => {
                    debug!(%peer, "closing idle connection");
                    return Ok(());
                }
            },
            None => reader.recv().await?,
        };
        match record {
            Some(record) => process_record(record, &transport, &dispatcher, &auth, true).await?,
            None => return Ok(()),
        }
    }
}

/// Receive datagrams and dispatch each as its own task, bounded by the
/// worker limit. No per-source serialization.
async fn udp_loop(
    framer: Arc<DatagramFramer>,
    dispatcher: Arc<Dispatcher>,
    auth: Arc<AuthFilter>,
    worker_limit: usize,
) {
    let workers = Arc::new(Semaphore::new(worker_limit));
    loop {
        let (record, peer) = match framer.recv().await {
            Ok(received) => received,
            Err(e) => {
                warn!(error = %e, "udp receive failed");
                continue;
            }
        };
        let permit = match workers.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return,
        };
        let transport: Arc<dyn ReplyTransport> =
            Arc::new(UdpReplyTransport { framer: framer.clone(), peer });
        let dispatcher = dispatcher.clone();
        let auth = auth.clone();
        tokio::spawn(async move {
            let _permit = permit;
            if let Err(e) = process_record(record, &transport, &dispatcher, &auth, false).await {
                debug!(%peer, error = %e, "dropping udp call");
            }
        });
    }
}

/// The per-record pipeline: decode the header, apply the auth filter,
/// dispatch. Returns `Err` only for conditions fatal to a TCP connection;
/// on UDP the caller just drops the datagram.
async fn process_record(
    record: Vec<u8>,
    transport: &Arc<dyn ReplyTransport>,
    dispatcher: &Dispatcher,
    auth: &AuthFilter,
    fatal_decode_errors: bool,
) -> Result<(), SvcError> {
    let mut xdr = Xdr::from_bytes(record);
    xdr.begin_decoding();
    let header = match RpcMessage::decode(&mut xdr) {
        Ok(RpcMessage::Call(header)) => header,
        Ok(RpcMessage::Reply(reply)) => {
            // A server has no outstanding calls; stray replies are noise.
            debug!(xid = reply.xid, "ignoring unsolicited reply");
            return Ok(());
        }
        Err(WireError::VersionMismatch { xid, version }) => {
            debug!(xid, version, "rpc version mismatch");
            return send_denied(
                transport.as_ref(),
                xid,
                RejectStatus::RpcMismatch { low: RPC_VERSION, high: RPC_VERSION },
            )
            .await;
        }
        Err(WireError::BadAuth { xid, status }) => {
            debug!(xid, ?status, "rejecting unparseable auth material");
            return send_denied(transport.as_ref(), xid, RejectStatus::AuthError(status)).await;
        }
        Err(e @ (WireError::Xdr(_) | WireError::MalformedReply { .. })) => {
            debug!(error = %e, "undecodable record");
            return if fatal_decode_errors { Err(e.into()) } else { Ok(()) };
        }
        Err(WireError::UnknownMessageType { xid, code }) => {
            debug!(xid, code, "unknown message type");
            return Ok(());
        }
    };

    debug!(
        xid = header.xid,
        program = header.program,
        version = header.version,
        procedure = header.procedure,
        "call received"
    );

    match auth.verify(&header, xdr, transport).await? {
        AuthOutcome::Accepted { context, args } => {
            let call = RpcCall::new(
                header.xid,
                header.program,
                header.version,
                header.procedure,
                context,
                args,
                transport.clone(),
            );
            dispatcher.dispatch(call).await
        }
        AuthOutcome::Denied(status) => {
            debug!(xid = header.xid, ?status, "authentication denied");
            send_denied(transport.as_ref(), header.xid, RejectStatus::AuthError(status)).await
        }
        AuthOutcome::ReplySent | AuthOutcome::Drop => Ok(()),
    }
}
