//! Authentication credentials and verifiers.
//!
//! Every flavor decodes into its own typed body; unknown flavors keep the
//! raw bytes so the caller can reject them with the right status.

use sunrpc_xdr::{Xdr, XdrDecode, XdrEncode, XdrError};

use crate::AuthStatus;

/// IANA-assigned authentication flavor numbers.
pub mod flavor {
    pub const AUTH_NONE: u32 = 0;
    pub const AUTH_SYS: u32 = 1;
    pub const AUTH_SHORT: u32 = 2;
    pub const RPCSEC_GSS: u32 = 6;
}

/// Maximum opaque body size for credentials and verifiers (RFC 5531 §8.2).
pub const MAX_AUTH_BODY: usize = 400;

/// AUTH_SYS limits (RFC 5531 appendix A).
pub const MAX_MACHINE_NAME: usize = 255;
pub const MAX_GROUPS: usize = 16;

/// AUTH_SYS credential body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSysBody {
    pub stamp: u32,
    pub machine: String,
    pub uid: u32,
    pub gid: u32,
    pub gids: Vec<u32>,
}

impl XdrEncode for AuthSysBody {
    fn encode_xdr(&self, xdr: &mut Xdr) -> Result<(), XdrError> {
        xdr.encode_u32(self.stamp)?;
        xdr.encode_string(&self.machine)?;
        xdr.encode_u32(self.uid)?;
        xdr.encode_u32(self.gid)?;
        xdr.encode_u32(self.gids.len() as u32)?;
        for g in &self.gids {
            xdr.encode_u32(*g)?;
        }
        Ok(())
    }
}

impl XdrDecode for AuthSysBody {
    fn decode_xdr(xdr: &mut Xdr) -> Result<Self, XdrError> {
        let stamp = xdr.decode_u32()?;
        let machine = xdr.decode_string()?;
        let uid = xdr.decode_u32()?;
        let gid = xdr.decode_u32()?;
        let count = xdr.decode_u32()?;
        let mut gids = Vec::with_capacity(count.min(64) as usize);
        for _ in 0..count {
            gids.push(xdr.decode_u32()?);
        }
        Ok(AuthSysBody { stamp, machine, uid, gid, gids })
    }
}

/// RPCSEC_GSS control procedure carried in the credential (RFC 2203 §5.2.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GssProc {
    Data,
    Init,
    ContinueInit,
    Destroy,
}

impl GssProc {
    pub fn code(self) -> u32 {
        match self {
            GssProc::Data => 0,
            GssProc::Init => 1,
            GssProc::ContinueInit => 2,
            GssProc::Destroy => 3,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(GssProc::Data),
            1 => Some(GssProc::Init),
            2 => Some(GssProc::ContinueInit),
            3 => Some(GssProc::Destroy),
            _ => None,
        }
    }
}

/// RPCSEC_GSS protection service level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GssService {
    None,
    Integrity,
    Privacy,
}

impl GssService {
    pub fn code(self) -> u32 {
        match self {
            GssService::None => 1,
            GssService::Integrity => 2,
            GssService::Privacy => 3,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(GssService::None),
            2 => Some(GssService::Integrity),
            3 => Some(GssService::Privacy),
            _ => None,
        }
    }
}

/// RPCSEC_GSS protocol version.
pub const RPCSEC_GSS_VERSION: u32 = 1;

/// Sequence numbers above this are silently dropped (RFC 2203 §5.3.3.1).
pub const GSS_MAX_SEQ: u32 = 0x8000_0000;

/// RPCSEC_GSS credential body (RFC 2203 §5.2.2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GssCredBody {
    pub version: u32,
    pub proc: GssProc,
    pub seq_num: u32,
    pub service: GssService,
    pub handle: Vec<u8>,
}

impl XdrEncode for GssCredBody {
    fn encode_xdr(&self, xdr: &mut Xdr) -> Result<(), XdrError> {
        xdr.encode_u32(self.version)?;
        xdr.encode_u32(self.proc.code())?;
        xdr.encode_u32(self.seq_num)?;
        xdr.encode_u32(self.service.code())?;
        xdr.encode_opaque(&self.handle)
    }
}

/// Error decoding a credential or verifier.
#[derive(Debug)]
pub enum AuthDecodeError {
    /// Truncated or structurally broken bytes.
    Xdr(XdrError),
    /// Decoded, but unacceptable; the reply should carry this status.
    Bad(AuthStatus),
}

impl std::fmt::Display for AuthDecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthDecodeError::Xdr(e) => write!(f, "{e}"),
            AuthDecodeError::Bad(status) => write!(f, "bad auth material: {status:?}"),
        }
    }
}

impl std::error::Error for AuthDecodeError {}

impl From<XdrError> for AuthDecodeError {
    fn from(e: XdrError) -> Self {
        AuthDecodeError::Xdr(e)
    }
}

/// A decoded credential, typed per flavor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthCredential {
    None,
    Sys(AuthSysBody),
    Short(Vec<u8>),
    Gss(GssCredBody),
    /// A flavor this implementation does not know; kept for rejection.
    Unknown { flavor: u32, body: Vec<u8> },
}

impl AuthCredential {
    pub fn flavor(&self) -> u32 {
        match self {
            AuthCredential::None => flavor::AUTH_NONE,
            AuthCredential::Sys(_) => flavor::AUTH_SYS,
            AuthCredential::Short(_) => flavor::AUTH_SHORT,
            AuthCredential::Gss(_) => flavor::RPCSEC_GSS,
            AuthCredential::Unknown { flavor, .. } => *flavor,
        }
    }

    /// Decode flavor + opaque body, then parse the body for known flavors.
    ///
    /// Oversized or structurally bad bodies surface as
    /// [`AuthDecodeError::Bad`] with the status the reply should carry.
    pub fn decode(xdr: &mut Xdr) -> Result<Self, AuthDecodeError> {
        let flavor = xdr.decode_u32()?;
        let body = xdr.decode_opaque()?;
        if body.len() > MAX_AUTH_BODY {
            return Err(AuthDecodeError::Bad(AuthStatus::BadCred));
        }
        match flavor {
            flavor::AUTH_NONE => Ok(AuthCredential::None),
            flavor::AUTH_SYS => {
                let mut nested = Xdr::from_bytes(body);
                nested.begin_decoding();
                let sys = AuthSysBody::decode_xdr(&mut nested)
                    .map_err(|_| AuthDecodeError::Bad(AuthStatus::BadCred))?;
                if sys.machine.len() > MAX_MACHINE_NAME || sys.gids.len() > MAX_GROUPS {
                    return Err(AuthDecodeError::Bad(AuthStatus::BadCred));
                }
                Ok(AuthCredential::Sys(sys))
            }
            flavor::AUTH_SHORT => Ok(AuthCredential::Short(body)),
            flavor::RPCSEC_GSS => {
                let mut nested = Xdr::from_bytes(body);
                nested.begin_decoding();
                let cred = decode_gss_body(&mut nested)
                    .map_err(|_| AuthDecodeError::Bad(AuthStatus::BadCred))?;
                Ok(AuthCredential::Gss(cred))
            }
            other => Ok(AuthCredential::Unknown { flavor: other, body }),
        }
    }
}

fn decode_gss_body(xdr: &mut Xdr) -> Result<GssCredBody, XdrError> {
    let version = xdr.decode_u32()?;
    let proc_code = xdr.decode_u32()?;
    let seq_num = xdr.decode_u32()?;
    let service_code = xdr.decode_u32()?;
    let handle = xdr.decode_opaque()?;
    let proc = GssProc::from_code(proc_code).ok_or(XdrError::BadLength {
        declared: proc_code,
        available: 0,
    })?;
    let service = GssService::from_code(service_code).ok_or(XdrError::BadLength {
        declared: service_code,
        available: 0,
    })?;
    Ok(GssCredBody { version, proc, seq_num, service, handle })
}

impl XdrEncode for AuthCredential {
    fn encode_xdr(&self, xdr: &mut Xdr) -> Result<(), XdrError> {
        match self {
            AuthCredential::None => {
                xdr.encode_u32(flavor::AUTH_NONE)?;
                xdr.encode_opaque(&[])
            }
            AuthCredential::Sys(sys) => {
                let mut nested = Xdr::new(64);
                nested.begin_encoding();
                sys.encode_xdr(&mut nested)?;
                nested.end_encoding();
                xdr.encode_u32(flavor::AUTH_SYS)?;
                xdr.encode_opaque(&nested.into_bytes())
            }
            AuthCredential::Short(body) => {
                xdr.encode_u32(flavor::AUTH_SHORT)?;
                xdr.encode_opaque(body)
            }
            AuthCredential::Gss(cred) => {
                let mut nested = Xdr::new(64);
                nested.begin_encoding();
                cred.encode_xdr(&mut nested)?;
                nested.end_encoding();
                xdr.encode_u32(flavor::RPCSEC_GSS)?;
                xdr.encode_opaque(&nested.into_bytes())
            }
            AuthCredential::Unknown { flavor, body } => {
                xdr.encode_u32(*flavor)?;
                xdr.encode_opaque(body)
            }
        }
    }
}

/// An authentication verifier: flavor plus opaque body.
///
/// Verifier bodies are opaque at this layer; RPCSEC_GSS gives them meaning
/// (a MIC) in the auth subsystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthVerifier {
    pub flavor: u32,
    pub body: Vec<u8>,
}

impl AuthVerifier {
    /// The AUTH_NONE verifier used on most replies.
    pub fn none() -> Self {
        AuthVerifier { flavor: flavor::AUTH_NONE, body: Vec::new() }
    }

    /// An RPCSEC_GSS verifier carrying a MIC.
    pub fn gss(mic: Vec<u8>) -> Self {
        AuthVerifier { flavor: flavor::RPCSEC_GSS, body: mic }
    }

    pub fn decode(xdr: &mut Xdr) -> Result<Self, AuthDecodeError> {
        let flavor = xdr.decode_u32()?;
        let body = xdr.decode_opaque()?;
        if body.len() > MAX_AUTH_BODY {
            return Err(AuthDecodeError::Bad(AuthStatus::BadVerf));
        }
        Ok(AuthVerifier { flavor, body })
    }
}

impl XdrEncode for AuthVerifier {
    fn encode_xdr(&self, xdr: &mut Xdr) -> Result<(), XdrError> {
        xdr.encode_u32(self.flavor)?;
        xdr.encode_opaque(&self.body)
    }
}
