//! Acceptor-side GSS-API Kerberos security contexts.
//!
//! The crate accepts an initiator's establishment token (raw mechanism token
//! or SPNEGO-wrapped), validates the embedded AP-REQ against an acceptor
//! credential, and hands back an established [`SecurityContext`] that wraps,
//! unwraps, signs, and verifies application messages across the legacy DES,
//! legacy 3DES, RC4, and CFX (RFC 4121) token families.
//!
//! Establishment entry points are [`acceptor::accept_security_context`] for a
//! bare mechanism token and [`negotiate::accept_negotiation`] for SPNEGO.

#[macro_use]
extern crate tracing;

pub mod acceptor;
pub mod channel_bindings;
pub mod context;
pub mod credential;
pub mod crypto;
pub mod error;
pub mod keytab;
pub mod negotiate;
pub mod policy;
pub mod principal;
pub mod protect;
pub mod sequence;
pub mod wire;

mod secret;

#[cfg(test)]
pub(crate) mod test_data;

pub use crate::acceptor::{accept_security_context, AcceptOutcome, AcceptParams, AcceptStatus, DEFAULT_MAX_TIME_SKEW};
pub use crate::channel_bindings::ChannelBindings;
pub use crate::context::{AcceptorState, ContextFlags, ContextSizes, SecurityContext};
pub use crate::credential::{Credential, CredentialUse, DelegatedCredential};
pub use crate::error::{Error, ErrorKind, Result};
pub use crate::keytab::Keytab;
pub use crate::negotiate::{accept_negotiation, SpnegoOutcome};
pub use crate::policy::{CompatPolicy, PolicyResolver};
pub use crate::principal::Principal;
pub use crate::secret::Secret;
pub use crate::sequence::{SequenceGuard, SequenceOutcome, SequencePolicy};

pub const KERBEROS_VERSION: u8 = 5;
