//! A single in-flight call as seen by a program handler.
//!
//! The handler gets the decoded header fields, the verified authentication
//! context, an XDR stream positioned at the procedure arguments, and the
//! reply operations. Reply headers are built here; the handler only supplies
//! the result body.

use std::net::SocketAddr;
use std::sync::Arc;

use sunrpc_wire::{AcceptStatus, AuthVerifier, RejectStatus, ReplyBody, ReplyHeader};
use sunrpc_xdr::{Xdr, XdrDecode, XdrEncode};
use tracing::debug;

use crate::auth::AuthContext;
use crate::errors::SvcError;
use crate::transport::ReplyTransport;

/// One decoded, authenticated RPC call.
pub struct RpcCall {
    xid: u32,
    program: u32,
    version: u32,
    procedure: u32,
    auth: AuthContext,
    args: Xdr,
    transport: Arc<dyn ReplyTransport>,
}

impl RpcCall {
    pub(crate) fn new(
        xid: u32,
        program: u32,
        version: u32,
        procedure: u32,
        auth: AuthContext,
        args: Xdr,
        transport: Arc<dyn ReplyTransport>,
    ) -> Self {
        Self { xid, program, version, procedure, auth, args, transport }
    }

    pub fn xid(&self) -> u32 {
        self.xid
    }

    pub fn program(&self) -> u32 {
        self.program
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn procedure(&self) -> u32 {
        self.procedure
    }

    /// The verified authentication context of this call.
    pub fn auth(&self) -> &AuthContext {
        &self.auth
    }

    /// Source address of the call.
    pub fn peer(&self) -> SocketAddr {
        self.transport.peer_addr()
    }

    /// Decode the procedure arguments.
    pub fn retrieve_args<T: XdrDecode>(&mut self) -> Result<T, sunrpc_xdr::XdrError> {
        T::decode_xdr(&mut self.args)
    }

    /// Direct access to the argument stream for hand-rolled decoding.
    pub fn args_mut(&mut self) -> &mut Xdr {
        &mut self.args
    }

    /// Send a successful reply carrying `result` as the body.
    pub async fn reply<T: XdrEncode + ?Sized>(&self, result: &T) -> Result<(), SvcError> {
        let mut body = Xdr::new(256);
        body.begin_encoding();
        result.encode_xdr(&mut body)?;
        body.end_encoding();
        let sealed = self.auth.seal_reply_body(body.into_bytes())?;
        let verifier = self.auth.reply_verifier()?;
        debug!(xid = self.xid, len = sealed.len(), "sending reply");
        send_accepted(
            self.transport.as_ref(),
            self.xid,
            verifier,
            AcceptStatus::Success,
            &sealed,
        )
        .await
    }

    async fn fail(&self, status: AcceptStatus) -> Result<(), SvcError> {
        let verifier = self
            .auth
            .reply_verifier()
            .unwrap_or_else(|_| AuthVerifier::none());
        send_accepted(self.transport.as_ref(), self.xid, verifier, status, &[]).await
    }

    /// The program has no such procedure.
    pub async fn fail_procedure_unavailable(&self) -> Result<(), SvcError> {
        self.fail(AcceptStatus::ProcUnavail).await
    }

    /// The argument bytes did not decode.
    pub async fn fail_garbage_args(&self) -> Result<(), SvcError> {
        self.fail(AcceptStatus::GarbageArgs).await
    }

    /// The handler hit an internal error.
    pub async fn fail_system_error(&self) -> Result<(), SvcError> {
        self.fail(AcceptStatus::SystemErr).await
    }

    pub(crate) async fn fail_program_unavailable(&self) -> Result<(), SvcError> {
        self.fail(AcceptStatus::ProgUnavail).await
    }

    pub(crate) async fn fail_program_mismatch(&self, low: u32, high: u32) -> Result<(), SvcError> {
        self.fail(AcceptStatus::ProgMismatch { low, high }).await
    }
}

impl std::fmt::Debug for RpcCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcCall")
            .field("xid", &format_args!("{:#x}", self.xid))
            .field("program", &self.program)
            .field("version", &self.version)
            .field("procedure", &self.procedure)
            .field("peer", &self.transport.peer_addr())
            .finish()
    }
}

/// Encode and send an accepted reply: header, verifier, status, then the
/// already-encoded body bytes.
pub(crate) async fn send_accepted(
    transport: &dyn ReplyTransport,
    xid: u32,
    verifier: AuthVerifier,
    status: AcceptStatus,
    body: &[u8],
) -> Result<(), SvcError> {
    let mut xdr = Xdr::new(96 + body.len());
    xdr.begin_encoding();
    ReplyHeader { xid, body: ReplyBody::Accepted { verifier, status } }.encode_xdr(&mut xdr)?;
    xdr.buffer_mut()
        .put_slice(body)
        .map_err(sunrpc_xdr::XdrError::from)?;
    xdr.end_encoding();
    transport.send_reply(xdr.into_bytes()).await.map_err(SvcError::Io)
}

/// Encode and send a denied reply.
pub(crate) async fn send_denied(
    transport: &dyn ReplyTransport,
    xid: u32,
    reject: RejectStatus,
) -> Result<(), SvcError> {
    let mut xdr = Xdr::new(64);
    xdr.begin_encoding();
    ReplyHeader { xid, body: ReplyBody::Denied(reject) }.encode_xdr(&mut xdr)?;
    xdr.end_encoding();
    transport.send_reply(xdr.into_bytes()).await.map_err(SvcError::Io)
}
