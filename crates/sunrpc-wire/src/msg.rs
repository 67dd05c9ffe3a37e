//! RPC message headers (RFC 5531 §9).
//!
//! A message is either a call or a reply; the decoder keeps enough context
//! (the xid) for the caller to answer recoverable problems with the right
//! protocol-level reply instead of dropping the record.

use std::fmt;

use sunrpc_xdr::{Xdr, XdrEncode, XdrError};

use crate::auth::{AuthCredential, AuthDecodeError, AuthVerifier};

/// RPC protocol version; the only one that exists.
pub const RPC_VERSION: u32 = 2;

/// Message type discriminators.
pub mod msg_type {
    pub const CALL: u32 = 0;
    pub const REPLY: u32 = 1;
}

/// Reply status codes of `MSG_DENIED` (RFC 5531 `auth_stat`), plus the
/// RPCSEC_GSS extensions from RFC 2203.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStatus {
    Ok,
    BadCred,
    RejectedCred,
    BadVerf,
    RejectedVerf,
    TooWeak,
    InvalidResp,
    Failed,
    GssCredProblem,
    GssCtxProblem,
}

impl AuthStatus {
    pub fn code(self) -> u32 {
        match self {
            AuthStatus::Ok => 0,
            AuthStatus::BadCred => 1,
            AuthStatus::RejectedCred => 2,
            AuthStatus::BadVerf => 3,
            AuthStatus::RejectedVerf => 4,
            AuthStatus::TooWeak => 5,
            AuthStatus::InvalidResp => 6,
            AuthStatus::Failed => 7,
            AuthStatus::GssCredProblem => 13,
            AuthStatus::GssCtxProblem => 14,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(AuthStatus::Ok),
            1 => Some(AuthStatus::BadCred),
            2 => Some(AuthStatus::RejectedCred),
            3 => Some(AuthStatus::BadVerf),
            4 => Some(AuthStatus::RejectedVerf),
            5 => Some(AuthStatus::TooWeak),
            6 => Some(AuthStatus::InvalidResp),
            7 => Some(AuthStatus::Failed),
            13 => Some(AuthStatus::GssCredProblem),
            14 => Some(AuthStatus::GssCtxProblem),
            _ => None,
        }
    }
}

/// `accept_stat` of an accepted reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptStatus {
    Success,
    ProgUnavail,
    ProgMismatch { low: u32, high: u32 },
    ProcUnavail,
    GarbageArgs,
    SystemErr,
}

impl AcceptStatus {
    pub fn code(self) -> u32 {
        match self {
            AcceptStatus::Success => 0,
            AcceptStatus::ProgUnavail => 1,
            AcceptStatus::ProgMismatch { .. } => 2,
            AcceptStatus::ProcUnavail => 3,
            AcceptStatus::GarbageArgs => 4,
            AcceptStatus::SystemErr => 5,
        }
    }
}

/// `reject_stat` of a denied reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectStatus {
    RpcMismatch { low: u32, high: u32 },
    AuthError(AuthStatus),
}

/// The body of a reply message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyBody {
    Accepted { verifier: AuthVerifier, status: AcceptStatus },
    Denied(RejectStatus),
}

/// A decoded call header. The procedure arguments follow in the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallHeader {
    pub xid: u32,
    pub program: u32,
    pub version: u32,
    pub procedure: u32,
    pub credential: AuthCredential,
    pub verifier: AuthVerifier,
}

/// A decoded reply header. For a successful accepted reply the procedure
/// results follow in the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyHeader {
    pub xid: u32,
    pub body: ReplyBody,
}

/// Either side of the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RpcMessage {
    Call(CallHeader),
    Reply(ReplyHeader),
}

/// Error decoding a message header.
#[derive(Debug)]
pub enum WireError {
    /// Truncated or structurally broken header. No reply can be built;
    /// the record is dropped (UDP) or the connection closed (TCP).
    Xdr(XdrError),
    /// `rpcvers` was not 2; answer with `MSG_DENIED RPC_MISMATCH`.
    VersionMismatch { xid: u32, version: u32 },
    /// Credential or verifier unacceptable; answer with
    /// `MSG_DENIED AUTH_ERROR`.
    BadAuth { xid: u32, status: AuthStatus },
    /// The message type discriminator was neither CALL nor REPLY.
    UnknownMessageType { xid: u32, code: u32 },
    /// A reply carried an unknown discriminator.
    MalformedReply { xid: u32, what: &'static str },
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireError::Xdr(e) => write!(f, "truncated message: {e}"),
            WireError::VersionMismatch { xid, version } => {
                write!(f, "xid {xid:#x}: rpc version {version} is not {RPC_VERSION}")
            }
            WireError::BadAuth { xid, status } => {
                write!(f, "xid {xid:#x}: bad auth material ({status:?})")
            }
            WireError::UnknownMessageType { xid, code } => {
                write!(f, "xid {xid:#x}: unknown message type {code}")
            }
            WireError::MalformedReply { xid, what } => {
                write!(f, "xid {xid:#x}: malformed reply ({what})")
            }
        }
    }
}

impl std::error::Error for WireError {}

impl From<XdrError> for WireError {
    fn from(e: XdrError) -> Self {
        WireError::Xdr(e)
    }
}

impl RpcMessage {
    /// Decode a message header, leaving the stream positioned at the call
    /// arguments or reply results.
    pub fn decode(xdr: &mut Xdr) -> Result<Self, WireError> {
        let xid = xdr.decode_u32()?;
        let mtype = xdr.decode_u32()?;
        match mtype {
            msg_type::CALL => Ok(RpcMessage::Call(decode_call(xid, xdr)?)),
            msg_type::REPLY => Ok(RpcMessage::Reply(decode_reply(xid, xdr)?)),
            code => Err(WireError::UnknownMessageType { xid, code }),
        }
    }
}

fn decode_call(xid: u32, xdr: &mut Xdr) -> Result<CallHeader, WireError> {
    let rpcvers = xdr.decode_u32()?;
    if rpcvers != RPC_VERSION {
        return Err(WireError::VersionMismatch { xid, version: rpcvers });
    }
    let program = xdr.decode_u32()?;
    let version = xdr.decode_u32()?;
    let procedure = xdr.decode_u32()?;
    let credential = AuthCredential::decode(xdr).map_err(|e| map_auth_err(xid, e))?;
    let verifier = AuthVerifier::decode(xdr).map_err(|e| map_auth_err(xid, e))?;
    Ok(CallHeader { xid, program, version, procedure, credential, verifier })
}

fn map_auth_err(xid: u32, e: AuthDecodeError) -> WireError {
    match e {
        AuthDecodeError::Xdr(e) => WireError::Xdr(e),
        AuthDecodeError::Bad(status) => WireError::BadAuth { xid, status },
    }
}

fn decode_reply(xid: u32, xdr: &mut Xdr) -> Result<ReplyHeader, WireError> {
    const MSG_ACCEPTED: u32 = 0;
    const MSG_DENIED: u32 = 1;
    let stat = xdr.decode_u32()?;
    let body = match stat {
        MSG_ACCEPTED => {
            let verifier =
                AuthVerifier::decode(xdr).map_err(|e| map_auth_err(xid, e))?;
            let status = match xdr.decode_u32()? {
                0 => AcceptStatus::Success,
                1 => AcceptStatus::ProgUnavail,
                2 => {
                    let low = xdr.decode_u32()?;
                    let high = xdr.decode_u32()?;
                    AcceptStatus::ProgMismatch { low, high }
                }
                3 => AcceptStatus::ProcUnavail,
                4 => AcceptStatus::GarbageArgs,
                5 => AcceptStatus::SystemErr,
                _ => return Err(WireError::MalformedReply { xid, what: "accept_stat" }),
            };
            ReplyBody::Accepted { verifier, status }
        }
        MSG_DENIED => match xdr.decode_u32()? {
            0 => {
                let low = xdr.decode_u32()?;
                let high = xdr.decode_u32()?;
                ReplyBody::Denied(RejectStatus::RpcMismatch { low, high })
            }
            1 => {
                let code = xdr.decode_u32()?;
                let status = AuthStatus::from_code(code)
                    .ok_or(WireError::MalformedReply { xid, what: "auth_stat" })?;
                ReplyBody::Denied(RejectStatus::AuthError(status))
            }
            _ => return Err(WireError::MalformedReply { xid, what: "reject_stat" }),
        },
        _ => return Err(WireError::MalformedReply { xid, what: "reply_stat" }),
    };
    Ok(ReplyHeader { xid, body })
}

impl XdrEncode for CallHeader {
    fn encode_xdr(&self, xdr: &mut Xdr) -> Result<(), XdrError> {
        xdr.encode_u32(self.xid)?;
        xdr.encode_u32(msg_type::CALL)?;
        xdr.encode_u32(RPC_VERSION)?;
        xdr.encode_u32(self.program)?;
        xdr.encode_u32(self.version)?;
        xdr.encode_u32(self.procedure)?;
        self.credential.encode_xdr(xdr)?;
        self.verifier.encode_xdr(xdr)
    }
}

impl XdrEncode for ReplyHeader {
    fn encode_xdr(&self, xdr: &mut Xdr) -> Result<(), XdrError> {
        xdr.encode_u32(self.xid)?;
        xdr.encode_u32(msg_type::REPLY)?;
        match &self.body {
            ReplyBody::Accepted { verifier, status } => {
                xdr.encode_u32(0)?;
                verifier.encode_xdr(xdr)?;
                xdr.encode_u32(status.code())?;
                if let AcceptStatus::ProgMismatch { low, high } = status {
                    xdr.encode_u32(*low)?;
                    xdr.encode_u32(*high)?;
                }
                Ok(())
            }
            ReplyBody::Denied(reject) => {
                xdr.encode_u32(1)?;
                match reject {
                    RejectStatus::RpcMismatch { low, high } => {
                        xdr.encode_u32(0)?;
                        xdr.encode_u32(*low)?;
                        xdr.encode_u32(*high)
                    }
                    RejectStatus::AuthError(status) => {
                        xdr.encode_u32(1)?;
                        xdr.encode_u32(status.code())
                    }
                }
            }
        }
    }
}
