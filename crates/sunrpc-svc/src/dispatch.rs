//! Routing of authenticated calls to registered program handlers.
//!
//! Programs register under (program number, version). Lookup follows the
//! RFC 5531 reply rules: an unknown program gets PROG_UNAVAIL, a known
//! program at the wrong version gets PROG_MISMATCH with the observed
//! version range, everything else reaches the handler.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use dashmap::DashMap;
use futures::FutureExt;
use sunrpc_wire::OncRpcProgram;
use sunrpc_xdr::XdrError;
use tracing::{debug, error, info};

use crate::call::RpcCall;
use crate::errors::SvcError;

/// Failure status a handler reports instead of a reply body.
///
/// The dispatcher turns each of these into the matching accepted-reply
/// status. Successful calls reply through [`RpcCall::reply`] and return
/// `Ok(())`.
#[derive(Debug)]
pub enum HandlerError {
    /// The procedure number is not part of this program.
    ProcUnavail,
    /// The argument bytes did not decode.
    GarbageArgs,
    /// Internal failure; logged and reported as SYSTEM_ERR.
    System(String),
}

impl std::fmt::Display for HandlerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandlerError::ProcUnavail => write!(f, "procedure unavailable"),
            HandlerError::GarbageArgs => write!(f, "garbage arguments"),
            HandlerError::System(msg) => write!(f, "system error: {msg}"),
        }
    }
}

impl std::error::Error for HandlerError {}

impl From<XdrError> for HandlerError {
    fn from(_: XdrError) -> Self {
        HandlerError::GarbageArgs
    }
}

/// An RPC program implementation.
///
/// Boxed-future form so implementations can be stored behind `dyn`. The
/// handler decodes its arguments from the call, does its work, and replies
/// through the call; `Err` asks the dispatcher to send the failure reply
/// instead.
pub trait RpcDispatchable: Send + Sync {
    fn dispatch<'a>(
        &'a self,
        call: &'a mut RpcCall,
    ) -> Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + 'a>>;
}

/// Concurrent (program, version) → handler map with the lookup rules.
pub struct Dispatcher {
    programs: DashMap<OncRpcProgram, Arc<dyn RpcDispatchable>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self { programs: DashMap::new() }
    }

    /// Register a program. An existing registration for the same key is
    /// replaced.
    pub fn register(&self, program: OncRpcProgram, handler: Arc<dyn RpcDispatchable>) {
        info!(%program, "registering program");
        self.programs.insert(program, handler);
    }

    pub fn unregister(&self, program: &OncRpcProgram) {
        info!(%program, "unregistering program");
        self.programs.remove(program);
    }

    pub fn registrations(&self) -> Vec<OncRpcProgram> {
        self.programs.iter().map(|e| *e.key()).collect()
    }

    fn lookup(&self, program: u32, version: u32) -> Lookup {
        if let Some(entry) = self.programs.get(&OncRpcProgram::new(program, version)) {
            return Lookup::Found(entry.value().clone());
        }
        let mut range: Option<(u32, u32)> = None;
        for entry in self.programs.iter() {
            let key = entry.key();
            if key.number == program {
                range = Some(match range {
                    None => (key.version, key.version),
                    Some((low, high)) => (low.min(key.version), high.max(key.version)),
                });
            }
        }
        match range {
            Some((low, high)) => Lookup::WrongVersion { low, high },
            None => Lookup::UnknownProgram,
        }
    }

    /// Route one authenticated call and make sure some reply goes out.
    pub async fn dispatch(&self, mut call: RpcCall) -> Result<(), SvcError> {
        let handler = match self.lookup(call.program(), call.version()) {
            Lookup::Found(handler) => handler,
            Lookup::UnknownProgram => {
                debug!(program = call.program(), "program unavailable");
                return call.fail_program_unavailable().await;
            }
            Lookup::WrongVersion { low, high } => {
                debug!(
                    program = call.program(),
                    version = call.version(),
                    low,
                    high,
                    "program version mismatch"
                );
                return call.fail_program_mismatch(low, high).await;
            }
        };

        // A panicking handler must not take the worker down; it becomes a
        // SYSTEM_ERR reply like any other internal failure.
        let outcome = std::panic::AssertUnwindSafe(handler.dispatch(&mut call))
            .catch_unwind()
            .await;
        match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(HandlerError::ProcUnavail)) => call.fail_procedure_unavailable().await,
            Ok(Err(HandlerError::GarbageArgs)) => call.fail_garbage_args().await,
            Ok(Err(HandlerError::System(msg))) => {
                error!(xid = call.xid(), msg, "handler failed");
                call.fail_system_error().await
            }
            Err(panic) => {
                let msg = panic_message(&panic);
                error!(xid = call.xid(), msg, "handler panicked");
                call.fail_system_error().await
            }
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

enum Lookup {
    Found(Arc<dyn RpcDispatchable>),
    UnknownProgram,
    WrongVersion { low: u32, high: u32 },
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}
