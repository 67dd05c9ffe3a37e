#![deny(unsafe_code)]

//! sunrpc - ONC RPC server runtime for Rust.
//!
//! A unified surface over the component crates. Depend on this crate rather
//! than the individual pieces.
//!
//! ```no_run
//! use std::sync::Arc;
//! use sunrpc::{OncRpcProgram, OncRpcSvc};
//! # use std::future::Future;
//! # use std::pin::Pin;
//! # struct MyHandler;
//! # impl sunrpc::RpcDispatchable for MyHandler {
//! #     fn dispatch<'a>(
//! #         &'a self,
//! #         call: &'a mut sunrpc::RpcCall,
//! #     ) -> Pin<Box<dyn Future<Output = Result<(), sunrpc::HandlerError>> + Send + 'a>> {
//! #         Box::pin(async { Ok(()) })
//! #     }
//! # }
//!
//! # async fn run() -> Result<(), sunrpc::SvcError> {
//! let svc = OncRpcSvc::builder(2049).publish_to_portmap(true).build();
//! svc.register(OncRpcProgram::new(100003, 3), Arc::new(MyHandler));
//! svc.start().await?;
//! # Ok(())
//! # }
//! ```

// The server runtime.
pub use sunrpc_svc::{
    AuthContext, AuthError, Dispatcher, HandlerError, OncRpcSvc, OncRpcSvcBuilder, Protocol,
    Protocols, ReplyTransport, RpcCall, RpcDispatchable, SvcError, DEFAULT_SERVICE_NAME,
};

// RPCSEC_GSS integration points.
pub use sunrpc_svc::auth::gss::{
    AcceptStep, GssCallContext, GssContext, GssError, GssMechanism, GssSession,
    GssSessionManager, ReplayPolicy,
};

// Wire-level vocabulary used in handler and client signatures.
pub use sunrpc_wire::{
    flavor, AcceptStatus, AuthCredential, AuthStatus, AuthSysBody, AuthVerifier, CallHeader,
    GssCredBody, GssProc, GssService, OncRpcProgram, RejectStatus, ReplyBody, ReplyHeader,
    RpcMessage, WireError, RPC_VERSION,
};

// XDR for argument and result types.
pub use sunrpc_xdr::{BoolPolicy, Buffer, BufferError, Xdr, XdrDecode, XdrEncode, XdrError};

// Framing, for custom transports and clients.
pub use sunrpc_stream::{
    DatagramFramer, FrameError, RecordFramer, DEFAULT_MAX_RECORD_SIZE, LAST_FRAGMENT,
};

// Portmapper client.
pub use sunrpc_portmap::{
    universal_address, Mapping, PortmapClient, PortmapError, PORTMAP_PORT, PORTMAP_PROGRAM,
    PORTMAP_VERSION,
};
