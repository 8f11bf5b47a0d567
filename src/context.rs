//! The security context: negotiated state of one acceptor-side session and
//! the per-message operations callers run over it.

use bitflags::bitflags;
use time::{Duration, OffsetDateTime};

use crate::principal::Principal;
use crate::protect::{AuthHandle, ProtectionSuite};
use crate::sequence::SequenceOutcome;
use crate::{Error, ErrorKind, Result};

bitflags! {
    /// Negotiated protection services, GSS request-flag bit values.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
    pub struct ContextFlags: u32 {
        const DELEG = 0x01;
        const MUTUAL = 0x02;
        const REPLAY = 0x04;
        const SEQUENCE = 0x08;
        const CONF = 0x10;
        const INTEG = 0x20;
        const ANON = 0x40;
        const PROT_READY = 0x80;
        const TRANS = 0x100;
    }
}

bitflags! {
    /// Internal context bookkeeping, separate from the negotiated services.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
    pub struct MoreFlags: u32 {
        /// We initiated the context. Never set on this acceptor.
        const LOCAL = 0x01;
        /// Establishment completed.
        const OPEN = 0x02;
        /// Peer gets MIC checksums in the divergent old 3DES layout.
        const COMPAT_OLD_DES3 = 0x04;
        /// The old-3DES policy lookup already ran for this context.
        const COMPAT_DES3_DECIDED = 0x08;
        /// Per-message keys come from an acceptor-chosen subkey.
        const ACCEPTOR_SUBKEY = 0x10;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcceptorState {
    Idle,
    AwaitingInitiatorToken,
    ProcessingTicket,
    AwaitingMutualAckSent,
    Open,
    Failed,
}

/// Per-family framing overheads, in the style of a `query sizes` call.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ContextSizes {
    pub max_signature: u32,
    pub block: u32,
    pub security_trailer: u32,
}

/// Acceptor-side security context.
///
/// Created empty, populated across `accept_security_context` calls, then
/// carries the per-message operations. Exclusive access (`&mut self`) guards
/// the counters and flags on every mutating path.
#[derive(Debug, Clone)]
pub struct SecurityContext {
    pub(crate) state: AcceptorState,
    pub(crate) flags: ContextFlags,
    pub(crate) more_flags: MoreFlags,
    pub(crate) source_name: Option<Principal>,
    pub(crate) target_name: Option<Principal>,
    pub(crate) auth: Option<AuthHandle>,
    pub(crate) expiry: Option<OffsetDateTime>,
}

impl SecurityContext {
    pub fn new() -> Self {
        Self {
            state: AcceptorState::Idle,
            flags: ContextFlags::empty(),
            more_flags: MoreFlags::empty(),
            source_name: None,
            target_name: None,
            auth: None,
            expiry: None,
        }
    }

    /// Builds an already-open context from its negotiated parts. For
    /// embedders that import a context established elsewhere.
    pub fn from_established_parts(
        source_name: Principal,
        target_name: Principal,
        flags: ContextFlags,
        auth: AuthHandle,
        expiry: Option<OffsetDateTime>,
    ) -> Self {
        let mut more_flags = MoreFlags::OPEN;
        if auth.acceptor_subkey {
            more_flags |= MoreFlags::ACCEPTOR_SUBKEY;
        }

        Self {
            state: AcceptorState::Open,
            flags,
            more_flags,
            source_name: Some(source_name),
            target_name: Some(target_name),
            auth: Some(auth),
            expiry,
        }
    }

    pub fn state(&self) -> &AcceptorState {
        &self.state
    }

    pub fn flags(&self) -> ContextFlags {
        self.flags
    }

    pub fn is_established(&self) -> bool {
        self.more_flags.contains(MoreFlags::OPEN)
    }

    /// Authenticated peer principal, once establishment has progressed far
    /// enough to know it.
    pub fn source_name(&self) -> Option<&Principal> {
        self.source_name.as_ref()
    }

    pub fn target_name(&self) -> Option<&Principal> {
        self.target_name.as_ref()
    }

    /// Remaining validity. `None` means no expiry was negotiated.
    pub fn lifetime(&self) -> Option<Duration> {
        self.expiry.map(|expiry| expiry - OffsetDateTime::now_utc())
    }

    /// Drops all partially built state after a fatal establishment error.
    /// The handle stays allocated but only a fresh establishment can revive
    /// it.
    pub(crate) fn reset_to_failed(&mut self) {
        self.state = AcceptorState::Failed;
        self.flags = ContextFlags::empty();
        self.more_flags = MoreFlags::empty();
        self.source_name = None;
        self.target_name = None;
        self.auth = None;
        self.expiry = None;
    }

    fn auth_mut(&mut self) -> Result<&mut AuthHandle> {
        if !self.more_flags.contains(MoreFlags::OPEN) {
            return Err(Error::new(
                ErrorKind::NoContext,
                "per-message call on a context that is not established",
            ));
        }

        if let Some(expiry) = self.expiry {
            if expiry <= OffsetDateTime::now_utc() {
                return Err(Error::new(ErrorKind::ContextExpired, "context lifetime has elapsed"));
            }
        }

        self.auth
            .as_mut()
            .ok_or_else(|| Error::new(ErrorKind::NoContext, "established context is missing its key material"))
    }

    fn auth_ref(&self) -> Result<&AuthHandle> {
        if !self.more_flags.contains(MoreFlags::OPEN) {
            return Err(Error::new(
                ErrorKind::NoContext,
                "per-message call on a context that is not established",
            ));
        }

        self.auth
            .as_ref()
            .ok_or_else(|| Error::new(ErrorKind::NoContext, "established context is missing its key material"))
    }

    /// Wraps `plaintext` into a per-message token, sealing it when `conf`
    /// asks for confidentiality. Advances the local sequence counter once per
    /// successful call.
    pub fn wrap(&mut self, conf: bool, plaintext: &[u8]) -> Result<Vec<u8>> {
        self.auth_mut()?.wrap(conf, plaintext)
    }

    /// Unwraps a peer token. The second return value reports whether the
    /// payload actually travelled sealed.
    pub fn unwrap(&mut self, token: &[u8]) -> Result<(Vec<u8>, bool)> {
        self.auth_mut()?.unwrap_token(token)
    }

    pub fn get_mic(&mut self, message: &[u8]) -> Result<Vec<u8>> {
        self.auth_mut()?.get_mic(message)
    }

    pub fn verify_mic(&mut self, message: &[u8], token: &[u8]) -> Result<SequenceOutcome> {
        self.auth_mut()?.verify_mic(message, token)
    }

    /// Largest message whose Wrap token fits in `desired` bytes.
    pub fn wrap_size_limit(&self, conf: bool, desired: usize) -> Result<usize> {
        Ok(self.auth_ref()?.wrap_size_limit(conf, desired))
    }

    /// Framing overheads of the negotiated family.
    pub fn sizes(&self) -> Result<ContextSizes> {
        let auth = self.auth_ref()?;
        let checksum_len = auth.keys.cipher.checksum_len() as u32;
        let seal_overhead = auth.keys.cipher.seal_overhead() as u32;

        Ok(match auth.suite() {
            ProtectionSuite::Cfx => ContextSizes {
                max_signature: 16 + checksum_len,
                block: 1,
                security_trailer: 16 + 16 + seal_overhead,
            },
            ProtectionSuite::Des | ProtectionSuite::TripleDes | ProtectionSuite::Rc4 => ContextSizes {
                // envelope and fixed maintenance block, worst-case DER length
                max_signature: 32 + checksum_len,
                block: 8,
                security_trailer: 32 + checksum_len + seal_overhead,
            },
        })
    }
}

impl Default for SecurityContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyClass;
    use crate::test_data;

    fn established(class: KeyClass) -> SecurityContext {
        SecurityContext::from_established_parts(
            Principal::parse("user@EXAMPLE").unwrap(),
            Principal::parse("host/test@EXAMPLE").unwrap(),
            ContextFlags::CONF | ContextFlags::INTEG | ContextFlags::REPLAY,
            test_data::fake_acceptor_auth(class),
            None,
        )
    }

    #[test]
    fn per_message_calls_require_an_open_context() {
        let mut context = SecurityContext::new();

        let err = context.wrap(true, b"data").unwrap_err();
        assert_eq!(err.error_type, ErrorKind::NoContext);

        let err = context.unwrap(&[0; 32]).unwrap_err();
        assert_eq!(err.error_type, ErrorKind::NoContext);
    }

    #[test]
    fn expired_context_refuses_per_message_calls() {
        let mut context = established(KeyClass::Cfx);
        context.expiry = Some(OffsetDateTime::now_utc() - Duration::minutes(1));

        let err = context.get_mic(b"data").unwrap_err();
        assert_eq!(err.error_type, ErrorKind::ContextExpired);
    }

    #[test]
    fn established_context_round_trips_between_peers() {
        let mut acceptor = established(KeyClass::Cfx);
        let mut initiator = test_data::fake_initiator_auth(KeyClass::Cfx);

        let token = acceptor.wrap(true, b"payload bytes").unwrap();
        let (message, sealed) = initiator.unwrap_token(&token).unwrap();
        assert_eq!(message, b"payload bytes");
        assert!(sealed);

        let token = initiator.wrap(false, b"reply").unwrap();
        let (message, sealed) = acceptor.unwrap(&token).unwrap();
        assert_eq!(message, b"reply");
        assert!(!sealed);
    }

    #[test]
    fn reset_drops_every_negotiated_part() {
        let mut context = established(KeyClass::Cfx);
        context.reset_to_failed();

        assert_eq!(context.state, AcceptorState::Failed);
        assert!(!context.is_established());
        assert!(context.source_name().is_none());
        assert!(context.auth.is_none());
    }

    #[test]
    fn sizes_cover_the_actual_wrap_overhead() {
        let context = established(KeyClass::Cfx);
        let sizes = context.sizes().unwrap();

        let mut probe = established(KeyClass::Cfx);
        let token = probe.wrap(true, b"0123456789").unwrap();
        assert!(token.len() - 10 <= sizes.security_trailer as usize);

        let mic = probe.get_mic(b"0123456789").unwrap();
        assert!(mic.len() <= sizes.max_signature as usize);
    }
}
