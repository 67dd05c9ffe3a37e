//! Server-side error type.

use std::fmt;
use std::io;

use sunrpc_portmap::PortmapError;
use sunrpc_stream::FrameError;
use sunrpc_wire::WireError;
use sunrpc_xdr::XdrError;

use crate::auth::AuthError;

/// Error from the service runtime.
#[derive(Debug)]
pub enum SvcError {
    Io(io::Error),
    Frame(FrameError),
    Xdr(XdrError),
    Wire(WireError),
    Auth(AuthError),
    Portmap(PortmapError),
    /// `start` was called while the service was already running.
    AlreadyRunning,
    /// No port in the configured range could be bound.
    NoUsablePort { low: u16, high: u16 },
}

impl fmt::Display for SvcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SvcError::Io(e) => write!(f, "i/o error: {e}"),
            SvcError::Frame(e) => write!(f, "framing error: {e}"),
            SvcError::Xdr(e) => write!(f, "xdr error: {e}"),
            SvcError::Wire(e) => write!(f, "wire error: {e}"),
            SvcError::Auth(e) => write!(f, "auth error: {e}"),
            SvcError::Portmap(e) => write!(f, "portmap error: {e}"),
            SvcError::AlreadyRunning => write!(f, "service is already running"),
            SvcError::NoUsablePort { low, high } => {
                write!(f, "no bindable port in range {low}..={high}")
            }
        }
    }
}

impl std::error::Error for SvcError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SvcError::Io(e) => Some(e),
            SvcError::Frame(e) => Some(e),
            SvcError::Xdr(e) => Some(e),
            SvcError::Wire(e) => Some(e),
            SvcError::Auth(e) => Some(e),
            SvcError::Portmap(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for SvcError {
    fn from(e: io::Error) -> Self {
        SvcError::Io(e)
    }
}

impl From<FrameError> for SvcError {
    fn from(e: FrameError) -> Self {
        SvcError::Frame(e)
    }
}

impl From<XdrError> for SvcError {
    fn from(e: XdrError) -> Self {
        SvcError::Xdr(e)
    }
}

impl From<WireError> for SvcError {
    fn from(e: WireError) -> Self {
        SvcError::Wire(e)
    }
}

impl From<AuthError> for SvcError {
    fn from(e: AuthError) -> Self {
        SvcError::Auth(e)
    }
}

impl From<PortmapError> for SvcError {
    fn from(e: PortmapError) -> Self {
        SvcError::Portmap(e)
    }
}
