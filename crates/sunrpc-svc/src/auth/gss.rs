//! RPCSEC_GSS (RFC 2203) session management.
//!
//! The GSS-API mechanism itself is injected behind [`GssMechanism`]; this
//! module owns what the RPC layer adds on top: the session table keyed by
//! context handle, the per-session sliding sequence window, context
//! establishment control procedures, and body protection for the
//! integrity/privacy service levels.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use sunrpc_wire::{
    AcceptStatus, AuthStatus, AuthVerifier, CallHeader, GssCredBody, GssProc, GssService,
    GSS_MAX_SEQ, RPCSEC_GSS_VERSION,
};
use sunrpc_xdr::{Xdr, XdrError};
use tracing::{debug, info, warn};

use crate::auth::{AuthContext, AuthError, AuthOutcome};
use crate::call::send_accepted;
use crate::errors::SvcError;
use crate::transport::ReplyTransport;

/// GSS-API major status values the RPC layer cares about.
pub mod gss_major {
    pub const COMPLETE: u32 = 0;
    pub const CONTINUE_NEEDED: u32 = 1;
    /// `GSS_S_FAILURE` in the routine-error field.
    pub const FAILURE: u32 = 13 << 16;
}

/// Failure reported by the GSS mechanism.
#[derive(Debug, Clone)]
pub struct GssError {
    pub major: u32,
    pub minor: u32,
    pub message: String,
}

impl GssError {
    pub fn failure(message: impl Into<String>) -> Self {
        Self { major: gss_major::FAILURE, minor: 0, message: message.into() }
    }
}

impl fmt::Display for GssError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (major {:#x}, minor {})", self.message, self.major, self.minor)
    }
}

impl std::error::Error for GssError {}

/// One step of context acceptance.
pub enum AcceptStep {
    /// More legs needed; send this token to the client.
    Continue { token: Vec<u8> },
    /// Context established; `token` may still carry a final leg.
    Established { token: Vec<u8> },
}

/// Factory for per-session GSS contexts. The concrete binding (MIT krb5,
/// Heimdal, a test fake) lives outside this crate.
pub trait GssMechanism: Send + Sync {
    fn create_context(&self) -> Box<dyn GssContext>;
}

/// A single security context under establishment or in use.
pub trait GssContext: Send {
    fn accept_token(&mut self, token: &[u8]) -> Result<AcceptStep, GssError>;
    fn is_established(&self) -> bool;
    fn principal(&self) -> Option<String>;
    fn get_mic(&self, data: &[u8]) -> Result<Vec<u8>, GssError>;
    fn verify_mic(&self, data: &[u8], mic: &[u8]) -> Result<(), GssError>;
    fn wrap(&self, data: &[u8]) -> Result<Vec<u8>, GssError>;
    fn unwrap(&self, data: &[u8]) -> Result<Vec<u8>, GssError>;
}

/// What to do with a call whose sequence number falls outside the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplayPolicy {
    /// Deny with `AUTH_REJECTEDCRED`.
    #[default]
    Reject,
    /// Say nothing, as RFC 2203 permits.
    DropSilently,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SeqCheck {
    Accept,
    Replay,
    TooOld,
}

/// Sliding window over recently seen sequence numbers.
#[derive(Debug)]
struct SequenceWindow {
    width: u32,
    top: u32,
    seen: u128,
    started: bool,
}

impl SequenceWindow {
    fn new(width: u32) -> Self {
        assert!((1..=128).contains(&width), "window width must be 1..=128");
        Self { width, top: 0, seen: 0, started: false }
    }

    fn check_and_update(&mut self, seq: u32) -> SeqCheck {
        if !self.started {
            self.started = true;
            self.top = seq;
            self.seen = 1;
            return SeqCheck::Accept;
        }
        if seq > self.top {
            let shift = seq - self.top;
            self.seen = if shift >= 128 { 0 } else { self.seen << shift };
            self.seen |= 1;
            self.top = seq;
            return SeqCheck::Accept;
        }
        let offset = self.top - seq;
        if offset >= self.width {
            return SeqCheck::TooOld;
        }
        if self.seen >> offset & 1 == 1 {
            return SeqCheck::Replay;
        }
        self.seen |= 1 << offset;
        SeqCheck::Accept
    }
}

/// An established (or establishing) RPCSEC_GSS session.
pub struct GssSession {
    handle: Vec<u8>,
    created: Instant,
    established: AtomicBool,
    principal: Mutex<Option<String>>,
    window: Mutex<SequenceWindow>,
    context: Mutex<Box<dyn GssContext>>,
}

impl GssSession {
    fn new(handle: Vec<u8>, window_width: u32, context: Box<dyn GssContext>) -> Self {
        Self {
            handle,
            created: Instant::now(),
            established: AtomicBool::new(false),
            principal: Mutex::new(None),
            window: Mutex::new(SequenceWindow::new(window_width)),
            context: Mutex::new(context),
        }
    }

    pub fn handle(&self) -> &[u8] {
        &self.handle
    }

    pub fn is_established(&self) -> bool {
        self.established.load(Ordering::Acquire)
    }

    pub fn principal(&self) -> Option<String> {
        self.principal.lock().clone()
    }

    fn mark_established(&self) {
        let principal = self.context.lock().principal();
        *self.principal.lock() = principal;
        self.established.store(true, Ordering::Release);
    }

    fn check_sequence(&self, seq: u32) -> SeqCheck {
        self.window.lock().check_and_update(seq)
    }

    pub(crate) fn get_mic(&self, data: &[u8]) -> Result<Vec<u8>, GssError> {
        self.context.lock().get_mic(data)
    }

    fn verify_mic(&self, data: &[u8], mic: &[u8]) -> Result<(), GssError> {
        self.context.lock().verify_mic(data, mic)
    }

    pub(crate) fn wrap(&self, data: &[u8]) -> Result<Vec<u8>, GssError> {
        self.context.lock().wrap(data)
    }

    fn unwrap_body(&self, data: &[u8]) -> Result<Vec<u8>, GssError> {
        self.context.lock().unwrap(data)
    }
}

impl fmt::Debug for GssSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GssSession")
            .field("handle", &self.handle)
            .field("established", &self.is_established())
            .field("principal", &self.principal())
            .finish()
    }
}

/// The GSS half of a verified call: enough to build reply verifiers and
/// seal reply bodies.
#[derive(Debug)]
pub struct GssCallContext {
    session: Arc<GssSession>,
    pub seq_num: u32,
    pub service: GssService,
}

impl GssCallContext {
    pub fn principal(&self) -> Option<String> {
        self.session.principal()
    }

    pub fn session(&self) -> &Arc<GssSession> {
        &self.session
    }

    /// Reply verifier: MIC over the sequence number in network order.
    pub(crate) fn reply_verifier(&self) -> Result<AuthVerifier, GssError> {
        let mic = self.session.get_mic(&self.seq_num.to_be_bytes())?;
        Ok(AuthVerifier::gss(mic))
    }

    /// Protect the reply body according to the call's service level.
    pub(crate) fn seal_reply_body(&self, body: Vec<u8>) -> Result<Vec<u8>, AuthError> {
        match self.service {
            GssService::None => Ok(body),
            GssService::Integrity => {
                let mut databody = self.seq_num.to_be_bytes().to_vec();
                databody.extend_from_slice(&body);
                let mic = self.session.get_mic(&databody)?;
                let mut xdr = Xdr::new(databody.len() + mic.len() + 16);
                xdr.begin_encoding();
                xdr.encode_opaque(&databody).map_err(AuthError::Xdr)?;
                xdr.encode_opaque(&mic).map_err(AuthError::Xdr)?;
                xdr.end_encoding();
                Ok(xdr.into_bytes())
            }
            GssService::Privacy => {
                let mut databody = self.seq_num.to_be_bytes().to_vec();
                databody.extend_from_slice(&body);
                let wrapped = self.session.wrap(&databody)?;
                let mut xdr = Xdr::new(wrapped.len() + 8);
                xdr.begin_encoding();
                xdr.encode_opaque(&wrapped).map_err(AuthError::Xdr)?;
                xdr.end_encoding();
                Ok(xdr.into_bytes())
            }
        }
    }
}

/// Session table plus the knobs around it.
pub struct GssSessionManager {
    mechanism: Arc<dyn GssMechanism>,
    sessions: DashMap<Vec<u8>, Arc<GssSession>>,
    window_width: u32,
    lifetime: Duration,
    replay_policy: ReplayPolicy,
    next_handle: AtomicU64,
}

impl GssSessionManager {
    /// Default sequence window width (RFC 2203 leaves this to the server).
    pub const DEFAULT_WINDOW: u32 = 32;

    /// Default session lifetime before eviction.
    pub const DEFAULT_LIFETIME: Duration = Duration::from_secs(3600);

    pub fn new(mechanism: Arc<dyn GssMechanism>) -> Self {
        Self {
            mechanism,
            sessions: DashMap::new(),
            window_width: Self::DEFAULT_WINDOW,
            lifetime: Self::DEFAULT_LIFETIME,
            replay_policy: ReplayPolicy::default(),
            next_handle: AtomicU64::new(1),
        }
    }

    pub fn with_window(mut self, width: u32) -> Self {
        assert!((1..=128).contains(&width), "window width must be 1..=128");
        self.window_width = width;
        self
    }

    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = lifetime;
        self
    }

    pub fn with_replay_policy(mut self, policy: ReplayPolicy) -> Self {
        self.replay_policy = policy;
        self
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn lookup(&self, handle: &[u8]) -> Option<Arc<GssSession>> {
        self.sessions.get(handle).map(|e| e.value().clone())
    }

    /// Evict sessions past their lifetime. Returns how many were dropped.
    pub fn sweep_expired(&self) -> usize {
        let lifetime = self.lifetime;
        let before = self.sessions.len();
        self.sessions.retain(|_, s| s.created.elapsed() < lifetime);
        let evicted = before - self.sessions.len();
        if evicted > 0 {
            info!(evicted, "evicted expired gss sessions");
        }
        evicted
    }

    fn fresh_handle(&self) -> Vec<u8> {
        let id = self.next_handle.fetch_add(1, Ordering::Relaxed);
        id.to_be_bytes().to_vec()
    }

    pub(crate) async fn filter_call(
        &self,
        header: &CallHeader,
        cred: &GssCredBody,
        args: Xdr,
        transport: &Arc<dyn ReplyTransport>,
    ) -> Result<AuthOutcome, SvcError> {
        if cred.version != RPCSEC_GSS_VERSION {
            return Ok(AuthOutcome::Denied(AuthStatus::BadCred));
        }
        match cred.proc {
            GssProc::Init | GssProc::ContinueInit => {
                self.handle_init(header, cred, args, transport).await
            }
            GssProc::Data => self.handle_data(cred, args),
            GssProc::Destroy => self.handle_destroy(header, cred, transport).await,
        }
    }

    async fn handle_init(
        &self,
        header: &CallHeader,
        cred: &GssCredBody,
        mut args: Xdr,
        transport: &Arc<dyn ReplyTransport>,
    ) -> Result<AuthOutcome, SvcError> {
        let token = match args.decode_opaque() {
            Ok(t) => t,
            Err(e) => {
                debug!(error = %e, "unreadable gss init token");
                send_accepted(
                    transport.as_ref(),
                    header.xid,
                    AuthVerifier::none(),
                    AcceptStatus::GarbageArgs,
                    &[],
                )
                .await?;
                return Ok(AuthOutcome::ReplySent);
            }
        };

        // INIT starts a new context; CONTINUE_INIT resumes the one named by
        // the handle the client got back on the first leg.
        let (session, inserted) = match cred.proc {
            GssProc::Init => {
                let session = Arc::new(GssSession::new(
                    self.fresh_handle(),
                    self.window_width,
                    self.mechanism.create_context(),
                ));
                (session, false)
            }
            _ => match self.lookup(&cred.handle) {
                Some(s) => (s, true),
                None => return Ok(AuthOutcome::Denied(AuthStatus::GssCredProblem)),
            },
        };

        let step = {
            let mut context = session.context.lock();
            context.accept_token(&token)
        };

        match step {
            Err(e) => {
                warn!(error = %e, "gss context establishment failed");
                // Roll back: a half-built context must not stay resident.
                if inserted {
                    self.sessions.remove(&session.handle);
                }
                self.send_init_reply(header, transport, &[], e.major, e.minor, 0, &[], None)
                    .await?;
                Ok(AuthOutcome::ReplySent)
            }
            Ok(AcceptStep::Continue { token }) => {
                if !inserted {
                    self.sessions
                        .insert(session.handle.clone(), session.clone());
                }
                let handle = session.handle.clone();
                self.send_init_reply(
                    header,
                    transport,
                    &handle,
                    gss_major::CONTINUE_NEEDED,
                    0,
                    self.window_width,
                    &token,
                    None,
                )
                .await?;
                Ok(AuthOutcome::ReplySent)
            }
            Ok(AcceptStep::Established { token }) => {
                session.mark_established();
                if !inserted {
                    self.sessions
                        .insert(session.handle.clone(), session.clone());
                }
                info!(principal = ?session.principal(), "gss context established");
                let handle = session.handle.clone();
                self.send_init_reply(
                    header,
                    transport,
                    &handle,
                    gss_major::COMPLETE,
                    0,
                    self.window_width,
                    &token,
                    Some(&session),
                )
                .await?;
                Ok(AuthOutcome::ReplySent)
            }
        }
    }

    /// Encode and send `rpc_gss_init_res`. Once the context is established
    /// the reply verifier is the MIC over the window size, per RFC 2203.
    #[allow(clippy::too_many_arguments)]
    async fn send_init_reply(
        &self,
        header: &CallHeader,
        transport: &Arc<dyn ReplyTransport>,
        handle: &[u8],
        major: u32,
        minor: u32,
        window: u32,
        token: &[u8],
        established: Option<&Arc<GssSession>>,
    ) -> Result<(), SvcError> {
        let mut body = Xdr::new(handle.len() + token.len() + 32);
        body.begin_encoding();
        body.encode_opaque(handle)?;
        body.encode_u32(major)?;
        body.encode_u32(minor)?;
        body.encode_u32(window)?;
        body.encode_opaque(token)?;
        body.end_encoding();

        let verifier = match established {
            Some(session) => {
                let mic = session
                    .get_mic(&window.to_be_bytes())
                    .map_err(|e| SvcError::Auth(AuthError::Gss(e)))?;
                AuthVerifier::gss(mic)
            }
            None => AuthVerifier::none(),
        };
        send_accepted(
            transport.as_ref(),
            header.xid,
            verifier,
            AcceptStatus::Success,
            &body.into_bytes(),
        )
        .await
    }

    fn handle_data(&self, cred: &GssCredBody, mut args: Xdr) -> Result<AuthOutcome, SvcError> {
        if cred.seq_num >= GSS_MAX_SEQ {
            debug!(seq = cred.seq_num, "gss sequence number past maximum, dropping");
            return Ok(AuthOutcome::Drop);
        }
        let session = match self.lookup(&cred.handle) {
            Some(s) => s,
            None => return Ok(AuthOutcome::Denied(AuthStatus::GssCredProblem)),
        };
        if !session.is_established() {
            return Ok(AuthOutcome::Denied(AuthStatus::GssCtxProblem));
        }
        match session.check_sequence(cred.seq_num) {
            SeqCheck::Accept => {}
            SeqCheck::Replay | SeqCheck::TooOld => {
                debug!(seq = cred.seq_num, "gss sequence outside window");
                return Ok(match self.replay_policy {
                    ReplayPolicy::Reject => AuthOutcome::Denied(AuthStatus::RejectedCred),
                    ReplayPolicy::DropSilently => AuthOutcome::Drop,
                });
            }
        }

        let context = |args| AuthOutcome::Accepted {
            context: AuthContext::Gss(GssCallContext {
                session: session.clone(),
                seq_num: cred.seq_num,
                service: cred.service,
            }),
            args,
        };

        match cred.service {
            GssService::None => Ok(context(args)),
            GssService::Integrity => {
                let databody = match Self::integrity_databody(&session, cred, &mut args) {
                    Ok(b) => b,
                    Err(status) => return Ok(AuthOutcome::Denied(status)),
                };
                let mut inner = Xdr::from_bytes(databody);
                inner.begin_decoding();
                match inner.decode_u32() {
                    Ok(seq) if seq == cred.seq_num => Ok(context(inner)),
                    _ => Ok(AuthOutcome::Denied(AuthStatus::GssCtxProblem)),
                }
            }
            GssService::Privacy => {
                let wrapped = match args.decode_opaque() {
                    Ok(w) => w,
                    Err(_) => return Ok(AuthOutcome::Denied(AuthStatus::GssCtxProblem)),
                };
                let plain = match session.unwrap_body(&wrapped) {
                    Ok(p) => p,
                    Err(e) => {
                        debug!(error = %e, "gss unwrap failed");
                        return Ok(AuthOutcome::Denied(AuthStatus::GssCtxProblem));
                    }
                };
                let mut inner = Xdr::from_bytes(plain);
                inner.begin_decoding();
                match inner.decode_u32() {
                    Ok(seq) if seq == cred.seq_num => Ok(context(inner)),
                    _ => Ok(AuthOutcome::Denied(AuthStatus::GssCtxProblem)),
                }
            }
        }
    }

    fn integrity_databody(
        session: &GssSession,
        cred: &GssCredBody,
        args: &mut Xdr,
    ) -> Result<Vec<u8>, AuthStatus> {
        let read = |args: &mut Xdr| -> Result<(Vec<u8>, Vec<u8>), XdrError> {
            let databody = args.decode_opaque()?;
            let checksum = args.decode_opaque()?;
            Ok((databody, checksum))
        };
        let (databody, checksum) = read(args).map_err(|_| AuthStatus::GssCtxProblem)?;
        if let Err(e) = session.verify_mic(&databody, &checksum) {
            debug!(seq = cred.seq_num, error = %e, "gss integrity check failed");
            return Err(AuthStatus::GssCtxProblem);
        }
        Ok(databody)
    }

    async fn handle_destroy(
        &self,
        header: &CallHeader,
        cred: &GssCredBody,
        transport: &Arc<dyn ReplyTransport>,
    ) -> Result<AuthOutcome, SvcError> {
        if cred.seq_num >= GSS_MAX_SEQ {
            return Ok(AuthOutcome::Drop);
        }
        let session = match self.lookup(&cred.handle) {
            Some(s) => s,
            None => return Ok(AuthOutcome::Denied(AuthStatus::GssCredProblem)),
        };
        if !session.is_established() {
            return Ok(AuthOutcome::Denied(AuthStatus::GssCtxProblem));
        }
        match session.check_sequence(cred.seq_num) {
            SeqCheck::Accept => {}
            SeqCheck::Replay | SeqCheck::TooOld => {
                return Ok(match self.replay_policy {
                    ReplayPolicy::Reject => AuthOutcome::Denied(AuthStatus::RejectedCred),
                    ReplayPolicy::DropSilently => AuthOutcome::Drop,
                });
            }
        }
        self.sessions.remove(&cred.handle);
        info!(principal = ?session.principal(), "gss session destroyed");

        let verifier = session
            .get_mic(&cred.seq_num.to_be_bytes())
            .map(AuthVerifier::gss)
            .unwrap_or_else(|_| AuthVerifier::none());
        send_accepted(
            transport.as_ref(),
            header.xid,
            verifier,
            AcceptStatus::Success,
            &[],
        )
        .await?;
        Ok(AuthOutcome::ReplySent)
    }
}

impl fmt::Debug for GssSessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GssSessionManager")
            .field("sessions", &self.sessions.len())
            .field("window_width", &self.window_width)
            .field("lifetime", &self.lifetime)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_accepts_in_order() {
        let mut w = SequenceWindow::new(32);
        for seq in 1..100 {
            assert_eq!(w.check_and_update(seq), SeqCheck::Accept, "seq {seq}");
        }
    }

    #[test]
    fn window_rejects_replay() {
        let mut w = SequenceWindow::new(32);
        assert_eq!(w.check_and_update(5), SeqCheck::Accept);
        assert_eq!(w.check_and_update(5), SeqCheck::Replay);
    }

    #[test]
    fn window_accepts_out_of_order_within_width() {
        let mut w = SequenceWindow::new(32);
        assert_eq!(w.check_and_update(40), SeqCheck::Accept);
        assert_eq!(w.check_and_update(20), SeqCheck::Accept);
        assert_eq!(w.check_and_update(20), SeqCheck::Replay);
        assert_eq!(w.check_and_update(39), SeqCheck::Accept);
    }

    #[test]
    fn window_rejects_too_old() {
        let mut w = SequenceWindow::new(32);
        assert_eq!(w.check_and_update(100), SeqCheck::Accept);
        assert_eq!(w.check_and_update(68), SeqCheck::TooOld);
        assert_eq!(w.check_and_update(69), SeqCheck::Accept);
    }

    #[test]
    fn window_survives_large_jumps() {
        let mut w = SequenceWindow::new(32);
        assert_eq!(w.check_and_update(1), SeqCheck::Accept);
        assert_eq!(w.check_and_update(1_000_000), SeqCheck::Accept);
        assert_eq!(w.check_and_update(1_000_000), SeqCheck::Replay);
        assert_eq!(w.check_and_update(1), SeqCheck::TooOld);
    }

    // Protocol-level tests against a deterministic fake mechanism: the MIC
    // of `data` is `data` reversed, wrap/unwrap XOR every byte with 0x5A.

    use crate::testutil::MockTransport;
    use sunrpc_wire::{AuthCredential, ReplyBody, RpcMessage};

    const XOR_KEY: u8 = 0x5A;

    fn fake_mic(data: &[u8]) -> Vec<u8> {
        data.iter().rev().copied().collect()
    }

    fn fake_wrap(data: &[u8]) -> Vec<u8> {
        data.iter().map(|b| b ^ XOR_KEY).collect()
    }

    struct FakeMechanism {
        continue_legs: u32,
    }

    impl GssMechanism for FakeMechanism {
        fn create_context(&self) -> Box<dyn GssContext> {
            Box::new(FakeContext { legs_left: self.continue_legs, established: false })
        }
    }

    struct FakeContext {
        legs_left: u32,
        established: bool,
    }

    impl GssContext for FakeContext {
        fn accept_token(&mut self, token: &[u8]) -> Result<AcceptStep, GssError> {
            if token == b"poison" {
                return Err(GssError::failure("client token rejected"));
            }
            if self.legs_left > 0 {
                self.legs_left -= 1;
                return Ok(AcceptStep::Continue { token: b"server-leg".to_vec() });
            }
            self.established = true;
            Ok(AcceptStep::Established { token: b"server-final".to_vec() })
        }

        fn is_established(&self) -> bool {
            self.established
        }

        fn principal(&self) -> Option<String> {
            self.established.then(|| "client@EXAMPLE.ORG".to_string())
        }

        fn get_mic(&self, data: &[u8]) -> Result<Vec<u8>, GssError> {
            Ok(fake_mic(data))
        }

        fn verify_mic(&self, data: &[u8], mic: &[u8]) -> Result<(), GssError> {
            if fake_mic(data) == mic {
                Ok(())
            } else {
                Err(GssError::failure("bad mic"))
            }
        }

        fn wrap(&self, data: &[u8]) -> Result<Vec<u8>, GssError> {
            Ok(fake_wrap(data))
        }

        fn unwrap(&self, data: &[u8]) -> Result<Vec<u8>, GssError> {
            Ok(fake_wrap(data))
        }
    }

    fn manager(continue_legs: u32) -> GssSessionManager {
        GssSessionManager::new(Arc::new(FakeMechanism { continue_legs }))
    }

    fn gss_header(xid: u32, cred: &GssCredBody) -> CallHeader {
        CallHeader {
            xid,
            program: 100003,
            version: 3,
            procedure: 1,
            credential: AuthCredential::Gss(cred.clone()),
            verifier: AuthVerifier::none(),
        }
    }

    fn init_cred(proc: GssProc, handle: Vec<u8>) -> GssCredBody {
        GssCredBody {
            version: RPCSEC_GSS_VERSION,
            proc,
            seq_num: 0,
            service: GssService::None,
            handle,
        }
    }

    fn data_cred(handle: &[u8], seq_num: u32, service: GssService) -> GssCredBody {
        GssCredBody {
            version: RPCSEC_GSS_VERSION,
            proc: GssProc::Data,
            seq_num,
            service,
            handle: handle.to_vec(),
        }
    }

    fn args_from(fill: impl FnOnce(&mut Xdr)) -> Xdr {
        let mut xdr = Xdr::new(256);
        xdr.begin_encoding();
        fill(&mut xdr);
        xdr.end_encoding();
        let mut out = Xdr::from_bytes(xdr.into_bytes());
        out.begin_decoding();
        out
    }

    fn token_args(token: &[u8]) -> Xdr {
        let token = token.to_vec();
        args_from(move |x| x.encode_opaque(&token).unwrap())
    }

    struct InitReply {
        handle: Vec<u8>,
        major: u32,
        window: u32,
        token: Vec<u8>,
        verifier: AuthVerifier,
    }

    fn parse_init_reply(record: Vec<u8>) -> InitReply {
        let mut xdr = Xdr::from_bytes(record);
        xdr.begin_decoding();
        let reply = match RpcMessage::decode(&mut xdr).unwrap() {
            RpcMessage::Reply(reply) => reply,
            other => panic!("expected reply, got {other:?}"),
        };
        let verifier = match reply.body {
            ReplyBody::Accepted { verifier, status: AcceptStatus::Success } => verifier,
            other => panic!("expected success, got {other:?}"),
        };
        let handle = xdr.decode_opaque().unwrap();
        let major = xdr.decode_u32().unwrap();
        let _minor = xdr.decode_u32().unwrap();
        let window = xdr.decode_u32().unwrap();
        let token = xdr.decode_opaque().unwrap();
        InitReply { handle, major, window, token, verifier }
    }

    async fn run_filter(
        manager: &GssSessionManager,
        cred: &GssCredBody,
        args: Xdr,
        transport: &Arc<MockTransport>,
    ) -> AuthOutcome {
        let header = gss_header(0x1000 + cred.seq_num, cred);
        let dyn_transport: Arc<dyn ReplyTransport> = transport.clone();
        manager
            .filter_call(&header, cred, args, &dyn_transport)
            .await
            .unwrap()
    }

    async fn establish(manager: &GssSessionManager) -> Vec<u8> {
        let transport = MockTransport::new();
        let outcome = run_filter(
            manager,
            &init_cred(GssProc::Init, Vec::new()),
            token_args(b"client-hello"),
            &transport,
        )
        .await;
        assert!(matches!(outcome, AuthOutcome::ReplySent));
        let reply = parse_init_reply(transport.take_one());
        assert_eq!(reply.major, gss_major::COMPLETE);
        reply.handle
    }

    #[tokio::test]
    async fn init_establishes_and_mics_the_window() {
        let manager = manager(0);
        let transport = MockTransport::new();
        let outcome = run_filter(
            &manager,
            &init_cred(GssProc::Init, Vec::new()),
            token_args(b"client-hello"),
            &transport,
        )
        .await;
        assert!(matches!(outcome, AuthOutcome::ReplySent));

        let reply = parse_init_reply(transport.take_one());
        assert_eq!(reply.major, gss_major::COMPLETE);
        assert_eq!(reply.window, GssSessionManager::DEFAULT_WINDOW);
        assert_eq!(reply.token, b"server-final");
        assert_eq!(reply.verifier.flavor, sunrpc_wire::flavor::RPCSEC_GSS);
        assert_eq!(reply.verifier.body, fake_mic(&reply.window.to_be_bytes()));
        assert_eq!(manager.session_count(), 1);
        let session = manager.lookup(&reply.handle).unwrap();
        assert!(session.is_established());
        assert_eq!(session.principal().as_deref(), Some("client@EXAMPLE.ORG"));
    }

    #[tokio::test]
    async fn context_establishment_can_take_two_legs() {
        let manager = manager(1);
        let transport = MockTransport::new();
        let outcome = run_filter(
            &manager,
            &init_cred(GssProc::Init, Vec::new()),
            token_args(b"leg-one"),
            &transport,
        )
        .await;
        assert!(matches!(outcome, AuthOutcome::ReplySent));
        let first = parse_init_reply(transport.take_one());
        assert_eq!(first.major, gss_major::CONTINUE_NEEDED);
        assert!(!manager.lookup(&first.handle).unwrap().is_established());

        // DATA before establishment is a context problem.
        let outcome = run_filter(
            &manager,
            &data_cred(&first.handle, 1, GssService::None),
            args_from(|_| {}),
            &MockTransport::new(),
        )
        .await;
        assert!(matches!(
            outcome,
            AuthOutcome::Denied(AuthStatus::GssCtxProblem)
        ));

        let transport = MockTransport::new();
        let outcome = run_filter(
            &manager,
            &init_cred(GssProc::ContinueInit, first.handle.clone()),
            token_args(b"leg-two"),
            &transport,
        )
        .await;
        assert!(matches!(outcome, AuthOutcome::ReplySent));
        let second = parse_init_reply(transport.take_one());
        assert_eq!(second.major, gss_major::COMPLETE);
        assert_eq!(second.handle, first.handle);
        assert!(manager.lookup(&first.handle).unwrap().is_established());
    }

    #[tokio::test]
    async fn failed_establishment_rolls_back() {
        let manager = manager(0);
        let transport = MockTransport::new();
        let outcome = run_filter(
            &manager,
            &init_cred(GssProc::Init, Vec::new()),
            token_args(b"poison"),
            &transport,
        )
        .await;
        assert!(matches!(outcome, AuthOutcome::ReplySent));
        let reply = parse_init_reply(transport.take_one());
        assert_eq!(reply.major, gss_major::FAILURE);
        assert!(reply.handle.is_empty());
        assert_eq!(manager.session_count(), 0);
    }

    #[tokio::test]
    async fn data_with_service_none_is_accepted() {
        let manager = manager(0);
        let handle = establish(&manager).await;
        let outcome = run_filter(
            &manager,
            &data_cred(&handle, 1, GssService::None),
            args_from(|x| x.encode_u32(0xAA55).unwrap()),
            &MockTransport::new(),
        )
        .await;
        match outcome {
            AuthOutcome::Accepted { context: AuthContext::Gss(ctx), mut args } => {
                assert_eq!(ctx.seq_num, 1);
                assert_eq!(ctx.principal().as_deref(), Some("client@EXAMPLE.ORG"));
                assert_eq!(args.decode_u32().unwrap(), 0xAA55);
                let verifier = ctx.reply_verifier().unwrap();
                assert_eq!(verifier.body, fake_mic(&1u32.to_be_bytes()));
            }
            other => panic!("expected acceptance, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn replayed_sequence_is_denied() {
        let manager = manager(0);
        let handle = establish(&manager).await;
        let cred = data_cred(&handle, 7, GssService::None);
        let first = run_filter(&manager, &cred, args_from(|_| {}), &MockTransport::new()).await;
        assert!(matches!(first, AuthOutcome::Accepted { .. }));
        let second = run_filter(&manager, &cred, args_from(|_| {}), &MockTransport::new()).await;
        assert!(matches!(
            second,
            AuthOutcome::Denied(AuthStatus::RejectedCred)
        ));
    }

    #[tokio::test]
    async fn replay_can_be_dropped_silently() {
        let manager = manager(0).with_replay_policy(ReplayPolicy::DropSilently);
        let handle = establish(&manager).await;
        let cred = data_cred(&handle, 7, GssService::None);
        let _ = run_filter(&manager, &cred, args_from(|_| {}), &MockTransport::new()).await;
        let second = run_filter(&manager, &cred, args_from(|_| {}), &MockTransport::new()).await;
        assert!(matches!(second, AuthOutcome::Drop));
    }

    #[tokio::test]
    async fn unknown_handle_is_a_credential_problem() {
        let manager = manager(0);
        let outcome = run_filter(
            &manager,
            &data_cred(b"no-such-handle", 1, GssService::None),
            args_from(|_| {}),
            &MockTransport::new(),
        )
        .await;
        assert!(matches!(
            outcome,
            AuthOutcome::Denied(AuthStatus::GssCredProblem)
        ));
    }

    #[tokio::test]
    async fn oversized_sequence_is_dropped() {
        let manager = manager(0);
        let handle = establish(&manager).await;
        let outcome = run_filter(
            &manager,
            &data_cred(&handle, GSS_MAX_SEQ, GssService::None),
            args_from(|_| {}),
            &MockTransport::new(),
        )
        .await;
        assert!(matches!(outcome, AuthOutcome::Drop));
    }

    #[tokio::test]
    async fn integrity_service_verifies_and_unwraps_args() {
        let manager = manager(0);
        let handle = establish(&manager).await;
        let seq = 3u32;

        let mut databody = seq.to_be_bytes().to_vec();
        databody.extend_from_slice(&0xBEEFu32.to_be_bytes());
        let mic = fake_mic(&databody);
        let args = args_from(|x| {
            x.encode_opaque(&databody).unwrap();
            x.encode_opaque(&mic).unwrap();
        });

        let outcome = run_filter(
            &manager,
            &data_cred(&handle, seq, GssService::Integrity),
            args,
            &MockTransport::new(),
        )
        .await;
        match outcome {
            AuthOutcome::Accepted { mut args, .. } => {
                assert_eq!(args.decode_u32().unwrap(), 0xBEEF);
            }
            other => panic!("expected acceptance, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn integrity_rejects_a_bad_mic() {
        let manager = manager(0);
        let handle = establish(&manager).await;
        let seq = 3u32;
        let mut databody = seq.to_be_bytes().to_vec();
        databody.extend_from_slice(&0xBEEFu32.to_be_bytes());
        let args = args_from(|x| {
            x.encode_opaque(&databody).unwrap();
            x.encode_opaque(b"forged").unwrap();
        });
        let outcome = run_filter(
            &manager,
            &data_cred(&handle, seq, GssService::Integrity),
            args,
            &MockTransport::new(),
        )
        .await;
        assert!(matches!(
            outcome,
            AuthOutcome::Denied(AuthStatus::GssCtxProblem)
        ));
    }

    #[tokio::test]
    async fn privacy_service_unwraps_args() {
        let manager = manager(0);
        let handle = establish(&manager).await;
        let seq = 4u32;
        let mut plain = seq.to_be_bytes().to_vec();
        plain.extend_from_slice(&0x1234u32.to_be_bytes());
        let wrapped = fake_wrap(&plain);
        let args = args_from(|x| x.encode_opaque(&wrapped).unwrap());

        let outcome = run_filter(
            &manager,
            &data_cred(&handle, seq, GssService::Privacy),
            args,
            &MockTransport::new(),
        )
        .await;
        match outcome {
            AuthOutcome::Accepted { context: AuthContext::Gss(ctx), mut args } => {
                assert_eq!(args.decode_u32().unwrap(), 0x1234);
                // Reply sealing wraps (seq, body) the same way.
                let sealed = ctx.seal_reply_body(vec![0xFF]).unwrap();
                let mut outer = Xdr::from_bytes(sealed);
                outer.begin_decoding();
                let unwrapped = fake_wrap(&outer.decode_opaque().unwrap());
                assert_eq!(&unwrapped[..4], &seq.to_be_bytes());
                assert_eq!(&unwrapped[4..], &[0xFF]);
            }
            other => panic!("expected acceptance, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn integrity_reply_sealing_is_verifiable() {
        let manager = manager(0);
        let handle = establish(&manager).await;
        let seq = 9u32;
        let outcome = run_filter(
            &manager,
            &data_cred(&handle, seq, GssService::None),
            args_from(|_| {}),
            &MockTransport::new(),
        )
        .await;
        let ctx = match outcome {
            AuthOutcome::Accepted { context: AuthContext::Gss(ctx), .. } => ctx,
            other => panic!("expected acceptance, got {other:?}"),
        };
        let ctx = GssCallContext {
            session: ctx.session().clone(),
            seq_num: seq,
            service: GssService::Integrity,
        };
        let sealed = ctx.seal_reply_body(vec![1, 2, 3]).unwrap();
        let mut outer = Xdr::from_bytes(sealed);
        outer.begin_decoding();
        let databody = outer.decode_opaque().unwrap();
        let checksum = outer.decode_opaque().unwrap();
        assert_eq!(checksum, fake_mic(&databody));
        assert_eq!(&databody[..4], &seq.to_be_bytes());
        assert_eq!(&databody[4..], &[1, 2, 3]);
    }

    #[tokio::test]
    async fn destroy_evicts_the_session() {
        let manager = manager(0);
        let handle = establish(&manager).await;
        let transport = MockTransport::new();
        let cred = GssCredBody {
            version: RPCSEC_GSS_VERSION,
            proc: GssProc::Destroy,
            seq_num: 2,
            service: GssService::None,
            handle: handle.clone(),
        };
        let outcome = run_filter(&manager, &cred, args_from(|_| {}), &transport).await;
        assert!(matches!(outcome, AuthOutcome::ReplySent));
        assert_eq!(manager.session_count(), 0);

        // The goodbye reply is a SUCCESS with an empty body and a MIC
        // verifier over the sequence number.
        let mut xdr = Xdr::from_bytes(transport.take_one());
        xdr.begin_decoding();
        match RpcMessage::decode(&mut xdr).unwrap() {
            RpcMessage::Reply(reply) => match reply.body {
                ReplyBody::Accepted { verifier, status: AcceptStatus::Success } => {
                    assert_eq!(verifier.body, fake_mic(&2u32.to_be_bytes()));
                    assert_eq!(xdr.remaining(), 0);
                }
                other => panic!("expected success, got {other:?}"),
            },
            other => panic!("expected reply, got {other:?}"),
        }

        let after = run_filter(
            &manager,
            &data_cred(&handle, 3, GssService::None),
            args_from(|_| {}),
            &MockTransport::new(),
        )
        .await;
        assert!(matches!(
            after,
            AuthOutcome::Denied(AuthStatus::GssCredProblem)
        ));
    }

    #[tokio::test]
    async fn expired_sessions_are_swept() {
        let manager = manager(0).with_lifetime(Duration::from_millis(0));
        let _handle = establish(&manager).await;
        assert_eq!(manager.session_count(), 1);
        assert_eq!(manager.sweep_expired(), 1);
        assert_eq!(manager.session_count(), 0);
    }
}
