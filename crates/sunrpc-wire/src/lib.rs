#![deny(unsafe_code)]

//! ONC RPC wire model (RFC 5531).
//!
//! Typed call/reply headers, accept/reject status codes, and per-flavor
//! authentication bodies, all encoded with [`sunrpc_xdr`]. This crate knows
//! nothing about transports or dispatch; it is the shared vocabulary of the
//! server and client sides.

mod auth;
mod msg;

pub use auth::{
    flavor, AuthCredential, AuthDecodeError, AuthSysBody, AuthVerifier, GssCredBody, GssProc,
    GssService, GSS_MAX_SEQ, MAX_AUTH_BODY, MAX_GROUPS, MAX_MACHINE_NAME, RPCSEC_GSS_VERSION,
};
pub use msg::{
    msg_type, AcceptStatus, AuthStatus, CallHeader, RejectStatus, ReplyBody, ReplyHeader,
    RpcMessage, WireError, RPC_VERSION,
};

use std::fmt;

/// Key identifying a registered RPC program: number plus version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OncRpcProgram {
    pub number: u32,
    pub version: u32,
}

impl OncRpcProgram {
    pub const fn new(number: u32, version: u32) -> Self {
        Self { number, version }
    }
}

impl fmt::Display for OncRpcProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}:{}]", self.number, self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn program_key_display() {
        assert_eq!(OncRpcProgram::new(100003, 3).to_string(), "[100003:3]");
    }

    #[test]
    fn program_key_is_a_map_key() {
        use std::collections::HashMap;
        let mut map = HashMap::new();
        map.insert(OncRpcProgram::new(100003, 3), "nfs");
        map.insert(OncRpcProgram::new(100003, 4), "nfs4");
        assert_eq!(map.get(&OncRpcProgram::new(100003, 3)), Some(&"nfs"));
    }
}
