//! Authentication filter pipeline.
//!
//! Runs after the header is decoded and before dispatch. Each flavor either
//! lets the call continue with a verified [`AuthContext`], answers it on the
//! spot (GSS control procedures), denies it, or drops it silently.

pub mod gss;

use std::fmt;
use std::sync::Arc;

use sunrpc_wire::{AuthCredential, AuthStatus, AuthSysBody, AuthVerifier, CallHeader};
use sunrpc_xdr::{Xdr, XdrError};

use crate::errors::SvcError;
use crate::transport::ReplyTransport;
use gss::{GssCallContext, GssError, GssSessionManager};

/// Error applying authentication to a call or its reply.
#[derive(Debug)]
pub enum AuthError {
    Gss(GssError),
    Xdr(XdrError),
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::Gss(e) => write!(f, "gss failure: {e}"),
            AuthError::Xdr(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<GssError> for AuthError {
    fn from(e: GssError) -> Self {
        AuthError::Gss(e)
    }
}

impl From<XdrError> for AuthError {
    fn from(e: XdrError) -> Self {
        AuthError::Xdr(e)
    }
}

/// The verified identity a handler sees.
#[derive(Debug)]
pub enum AuthContext {
    /// AUTH_NONE: anonymous.
    None,
    /// AUTH_SYS: unverified unix-style identity asserted by the client.
    Sys(AuthSysBody),
    /// RPCSEC_GSS: a mechanism-verified session.
    Gss(GssCallContext),
}

impl AuthContext {
    pub fn flavor(&self) -> u32 {
        match self {
            AuthContext::None => sunrpc_wire::flavor::AUTH_NONE,
            AuthContext::Sys(_) => sunrpc_wire::flavor::AUTH_SYS,
            AuthContext::Gss(_) => sunrpc_wire::flavor::RPCSEC_GSS,
        }
    }

    /// The authenticated principal, where the flavor provides one.
    pub fn principal(&self) -> Option<String> {
        match self {
            AuthContext::Gss(ctx) => ctx.principal(),
            _ => None,
        }
    }

    /// The verifier to put on replies to this call.
    pub(crate) fn reply_verifier(&self) -> Result<AuthVerifier, AuthError> {
        match self {
            AuthContext::None | AuthContext::Sys(_) => Ok(AuthVerifier::none()),
            AuthContext::Gss(ctx) => Ok(ctx.reply_verifier()?),
        }
    }

    /// Apply the flavor's reply-body protection (GSS integrity/privacy).
    pub(crate) fn seal_reply_body(&self, body: Vec<u8>) -> Result<Vec<u8>, AuthError> {
        match self {
            AuthContext::None | AuthContext::Sys(_) => Ok(body),
            AuthContext::Gss(ctx) => ctx.seal_reply_body(body),
        }
    }
}

/// What the filter decided about a call.
#[derive(Debug)]
pub(crate) enum AuthOutcome {
    /// Continue to dispatch with this context; `args` is positioned at the
    /// (possibly unwrapped) procedure arguments.
    Accepted { context: AuthContext, args: Xdr },
    /// Deny with `MSG_DENIED AUTH_ERROR`.
    Denied(AuthStatus),
    /// The filter already answered the call (GSS control procedures).
    ReplySent,
    /// Say nothing.
    Drop,
}

/// Per-flavor verification, run before dispatch.
pub(crate) struct AuthFilter {
    gss: Option<Arc<GssSessionManager>>,
}

impl AuthFilter {
    pub(crate) fn new(gss: Option<Arc<GssSessionManager>>) -> Self {
        Self { gss }
    }

    pub(crate) async fn verify(
        &self,
        header: &CallHeader,
        args: Xdr,
        transport: &Arc<dyn ReplyTransport>,
    ) -> Result<AuthOutcome, SvcError> {
        match &header.credential {
            AuthCredential::None => {
                Ok(AuthOutcome::Accepted { context: AuthContext::None, args })
            }
            AuthCredential::Sys(sys) => Ok(AuthOutcome::Accepted {
                context: AuthContext::Sys(sys.clone()),
                args,
            }),
            // No short-handle cache on this server; the client falls back to
            // its full credential.
            AuthCredential::Short(_) => Ok(AuthOutcome::Denied(AuthStatus::RejectedCred)),
            AuthCredential::Gss(cred) => match &self.gss {
                Some(manager) => manager.filter_call(header, cred, args, transport).await,
                None => Ok(AuthOutcome::Denied(AuthStatus::Failed)),
            },
            AuthCredential::Unknown { .. } => Ok(AuthOutcome::Denied(AuthStatus::BadCred)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::BoxFuture;
    use std::net::SocketAddr;

    struct NullTransport;

    impl ReplyTransport for NullTransport {
        fn send_reply(&self, _record: Vec<u8>) -> BoxFuture<'_, std::io::Result<()>> {
            Box::pin(async { Ok(()) })
        }

        fn peer_addr(&self) -> SocketAddr {
            "127.0.0.1:0".parse().unwrap()
        }
    }

    fn header_with(credential: AuthCredential) -> CallHeader {
        CallHeader {
            xid: 1,
            program: 100003,
            version: 3,
            procedure: 0,
            credential,
            verifier: AuthVerifier::none(),
        }
    }

    fn empty_args() -> Xdr {
        let mut xdr = Xdr::from_bytes(Vec::new());
        xdr.begin_decoding();
        xdr
    }

    #[tokio::test]
    async fn auth_none_passes() {
        let filter = AuthFilter::new(None);
        let transport: Arc<dyn ReplyTransport> = Arc::new(NullTransport);
        let outcome = filter
            .verify(&header_with(AuthCredential::None), empty_args(), &transport)
            .await
            .unwrap();
        match outcome {
            AuthOutcome::Accepted { context: AuthContext::None, .. } => {}
            _ => panic!("expected AUTH_NONE to pass"),
        }
    }

    #[tokio::test]
    async fn auth_sys_passes_with_identity() {
        let filter = AuthFilter::new(None);
        let transport: Arc<dyn ReplyTransport> = Arc::new(NullTransport);
        let sys = AuthSysBody {
            stamp: 7,
            machine: "box".into(),
            uid: 500,
            gid: 500,
            gids: vec![500],
        };
        let outcome = filter
            .verify(
                &header_with(AuthCredential::Sys(sys.clone())),
                empty_args(),
                &transport,
            )
            .await
            .unwrap();
        match outcome {
            AuthOutcome::Accepted { context: AuthContext::Sys(got), .. } => {
                assert_eq!(got, sys)
            }
            _ => panic!("expected AUTH_SYS to pass"),
        }
    }

    #[tokio::test]
    async fn unknown_flavor_is_denied_badcred() {
        let filter = AuthFilter::new(None);
        let transport: Arc<dyn ReplyTransport> = Arc::new(NullTransport);
        let outcome = filter
            .verify(
                &header_with(AuthCredential::Unknown { flavor: 77, body: vec![] }),
                empty_args(),
                &transport,
            )
            .await
            .unwrap();
        assert!(matches!(outcome, AuthOutcome::Denied(AuthStatus::BadCred)));
    }

    #[tokio::test]
    async fn gss_without_manager_is_denied() {
        use sunrpc_wire::{GssCredBody, GssProc, GssService, RPCSEC_GSS_VERSION};
        let filter = AuthFilter::new(None);
        let transport: Arc<dyn ReplyTransport> = Arc::new(NullTransport);
        let cred = GssCredBody {
            version: RPCSEC_GSS_VERSION,
            proc: GssProc::Data,
            seq_num: 1,
            service: GssService::None,
            handle: vec![1],
        };
        let outcome = filter
            .verify(&header_with(AuthCredential::Gss(cred)), empty_args(), &transport)
            .await
            .unwrap();
        assert!(matches!(outcome, AuthOutcome::Denied(AuthStatus::Failed)));
    }
}
