#![deny(unsafe_code)]

//! ONC RPC service runtime.
//!
//! This crate turns decoded records into handler invocations:
//!
//! - [`OncRpcSvc`] - the server: port binding, TCP/UDP receive loops,
//!   portmapper publication, lifecycle.
//! - [`Dispatcher`] / [`RpcDispatchable`] - (program, version) routing and
//!   the handler trait.
//! - [`RpcCall`] - what a handler sees: header fields, verified
//!   [`auth::AuthContext`], argument stream, reply operations.
//! - [`auth`] - the flavor filter pipeline, including RPCSEC_GSS session
//!   management behind an injected mechanism.

pub mod auth;
mod call;
mod dispatch;
mod errors;
mod server;
mod transport;

pub use auth::{AuthContext, AuthError};
pub use call::RpcCall;
pub use dispatch::{Dispatcher, HandlerError, RpcDispatchable};
pub use errors::SvcError;
pub use server::{
    OncRpcSvc, OncRpcSvcBuilder, Protocol, Protocols, DEFAULT_SERVICE_NAME,
};
pub use transport::{BoxFuture, ReplyTransport};

#[cfg(test)]
pub(crate) mod testutil {
    use std::net::SocketAddr;
    use std::sync::Arc;

    use parking_lot::Mutex;

    use crate::transport::{BoxFuture, ReplyTransport};

    /// Captures reply records instead of writing them anywhere.
    #[derive(Default)]
    pub(crate) struct MockTransport {
        pub(crate) sent: Mutex<Vec<Vec<u8>>>,
    }

    impl MockTransport {
        pub(crate) fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub(crate) fn take_one(&self) -> Vec<u8> {
            let mut sent = self.sent.lock();
            assert_eq!(sent.len(), 1, "expected exactly one reply");
            sent.pop().unwrap()
        }
    }

    impl ReplyTransport for MockTransport {
        fn send_reply(&self, record: Vec<u8>) -> BoxFuture<'_, std::io::Result<()>> {
            self.sent.lock().push(record);
            Box::pin(async { Ok(()) })
        }

        fn peer_addr(&self) -> SocketAddr {
            "127.0.0.1:1".parse().unwrap()
        }
    }
}
