//! AP-exchange acceptance: validates the initiator's AP-REQ against the
//! acceptor credential and opens the security context.

mod extractors;
mod generators;

use picky_krb::crypto::CipherSuite;
use picky_krb::messages::ApReq;
use rand::rngs::OsRng;
use rand::Rng;
use time::{Duration, OffsetDateTime};

use self::extractors::{
    authenticator_subkey, check_channel_bindings, check_times, cross_check_client, decode_ap_req,
    decrypt_ap_req_authenticator, decrypt_ap_req_ticket, initial_sequence_number, int_from_asn1_bytes,
    parse_authenticator_checksum, principal_from_parts, ticket_etype,
};
use self::generators::{generate_acceptor_subkey, generate_ap_rep, wrap_ap_rep};
use crate::channel_bindings::ChannelBindings;
use crate::context::{AcceptorState, ContextFlags, MoreFlags, SecurityContext};
use crate::credential::{Credential, DelegatedCredential};
use crate::crypto::{KeyClass, ProtectionKeys};
use crate::policy::{CompatPolicy, PolicyResolver};
use crate::protect::AuthHandle;
use crate::sequence::{SequenceGuard, SequencePolicy};
use crate::wire::{MechEnvelope, TOKEN_ID_AP_REQ};
use crate::{Error, ErrorKind, Principal, Result, Secret};

/// Largest tolerated difference between the initiator's clock and ours.
pub const DEFAULT_MAX_TIME_SKEW: Duration = Duration::minutes(3);

const AP_OPTION_MUTUAL_REQUIRED: u32 = 0x2000_0000;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AcceptStatus {
    Complete,
    ContinueNeeded,
}

/// Result of a successful acceptance step.
#[derive(Debug)]
pub struct AcceptOutcome {
    pub status: AcceptStatus,
    /// AP-REP framed for the initiator, empty without mutual authentication.
    pub output_token: Vec<u8>,
    pub source_name: Principal,
    pub flags: ContextFlags,
    pub expiry: Option<OffsetDateTime>,
    pub delegated: Option<DelegatedCredential>,
}

/// Inputs of one acceptance step.
#[derive(Debug)]
pub struct AcceptParams<'a> {
    pub credential: &'a Credential,
    pub input_token: &'a [u8],
    pub channel_bindings: Option<&'a ChannelBindings>,
    pub policy: Option<&'a PolicyResolver>,
    pub max_time_skew: Duration,
}

impl<'a> AcceptParams<'a> {
    pub fn new(credential: &'a Credential, input_token: &'a [u8]) -> Self {
        Self {
            credential,
            input_token,
            channel_bindings: None,
            policy: None,
            max_time_skew: DEFAULT_MAX_TIME_SKEW,
        }
    }

    pub fn with_channel_bindings(mut self, bindings: &'a ChannelBindings) -> Self {
        self.channel_bindings = Some(bindings);
        self
    }

    pub fn with_policy(mut self, policy: &'a PolicyResolver) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn with_max_time_skew(mut self, max_time_skew: Duration) -> Self {
        self.max_time_skew = max_time_skew;
        self
    }
}

/// Accepts the initiator's establishment token.
///
/// A fatal error past the envelope check tears down everything built so far;
/// the handle can only be revived by a fresh establishment. A token naming a
/// mechanism this acceptor does not speak fails without touching the context,
/// so the caller may retry with another offer.
pub fn accept_security_context(context: &mut SecurityContext, params: AcceptParams<'_>) -> Result<AcceptOutcome> {
    if !params.credential.can_accept() {
        return Err(Error::new(
            ErrorKind::NoCred,
            "credential is not usable for accepting contexts",
        ));
    }

    let envelope = MechEnvelope::decode(params.input_token)?;

    accept_inner(context, envelope, params).map_err(|err| {
        warn!(%err, "context establishment failed");
        context.reset_to_failed();
        err
    })
}

fn accept_inner(
    context: &mut SecurityContext,
    envelope: MechEnvelope<'_>,
    params: AcceptParams<'_>,
) -> Result<AcceptOutcome> {
    if context.state == AcceptorState::Idle {
        context.state = AcceptorState::AwaitingInitiatorToken;
    }

    if envelope.token_id != TOKEN_ID_AP_REQ {
        return Err(Error::new(
            ErrorKind::DefectiveToken,
            format!("expected an AP-REQ token, got token id {:02x?}", envelope.token_id),
        ));
    }

    context.state = AcceptorState::ProcessingTicket;

    let ap_req = decode_ap_req(envelope.body)?;

    let ticket_inner = &ap_req.0.ticket.0 .0;
    let target = principal_from_parts(&ticket_inner.sname.0, &ticket_inner.realm.0)?;

    let service_key = params.credential.ticket_key(&target, ticket_etype(&ap_req))?;
    let ticket_part = decrypt_ap_req_ticket(&service_key, &ap_req)?;

    let session_key = Secret::new(ticket_part.0.key.0.key_value.0 .0.clone());
    let session_etype = int_from_asn1_bytes(&ticket_part.0.key.0.key_type.0 .0);

    let authenticator = decrypt_ap_req_authenticator(&session_key, &ap_req)?;
    cross_check_client(&ticket_part, &authenticator)?;

    let now = OffsetDateTime::now_utc();
    let end_time = check_times(&ticket_part, &authenticator, now, params.max_time_skew)?;

    let source = principal_from_parts(&ticket_part.0.cname.0, &ticket_part.0.crealm.0)?;
    debug!(client = %source, service = %target, "AP-REQ ticket and authenticator are valid");

    let checksum = parse_authenticator_checksum(&authenticator)?;
    check_channel_bindings(&checksum, params.channel_bindings)?;

    let mut flags = ContextFlags::from_bits_truncate(checksum.flags)
        & (ContextFlags::DELEG
            | ContextFlags::MUTUAL
            | ContextFlags::REPLAY
            | ContextFlags::SEQUENCE
            | ContextFlags::CONF
            | ContextFlags::INTEG);
    // This subsystem never signals "not transferable".
    flags |= ContextFlags::TRANS;

    if ap_options_word(&ap_req)? & AP_OPTION_MUTUAL_REQUIRED != 0 {
        flags |= ContextFlags::MUTUAL;
    }

    let mut delegated = None;
    if flags.contains(ContextFlags::DELEG) {
        match accept_delegation(&source, checksum.delegation.as_deref()) {
            Ok(credential) => delegated = Some(credential),
            Err(err) => {
                warn!(%err, client = %source, "delegated credential rejected, downgrading");
                flags.remove(ContextFlags::DELEG);
            }
        }
    }

    let mutual = flags.contains(ContextFlags::MUTUAL);

    // Per-message key preference: acceptor subkey, then the initiator's
    // authenticator subkey, then the ticket session key. An acceptor subkey
    // needs an AP-REP to travel in, so it exists only with mutual auth.
    let acceptor_subkey = if mutual && !KeyClass::from_etype(session_etype).is_legacy() {
        let suite = CipherSuite::try_from(usize::try_from(session_etype).map_err(|_| {
            Error::new(
                ErrorKind::Failure,
                format!("negative session key encryption type: {}", session_etype),
            )
        })?)
        .map_err(|err| Error::with_minor(ErrorKind::Failure, "unsupported session key encryption type", err))?;

        Some(generate_acceptor_subkey(&suite))
    } else {
        None
    };

    let (key_etype, key) = if let Some(subkey) = &acceptor_subkey {
        (session_etype, Secret::new(subkey.clone()))
    } else if let Some((subkey_etype, subkey)) = authenticator_subkey(&authenticator) {
        (subkey_etype, Secret::new(subkey))
    } else {
        (session_etype, session_key.clone())
    };

    let keys = ProtectionKeys::acceptor(key, key_etype)?;

    let mut sequence_policy = SequencePolicy::empty();
    if flags.contains(ContextFlags::REPLAY) {
        sequence_policy |= SequencePolicy::REPLAY;
    }
    if flags.contains(ContextFlags::SEQUENCE) {
        sequence_policy |= SequencePolicy::SEQUENCE;
    }

    let guard = SequenceGuard::new(
        sequence_policy,
        !keys.key_class.is_legacy(),
        initial_sequence_number(&authenticator),
    );

    let mut more_flags = MoreFlags::OPEN;
    let mut old_des3_mic = false;
    if keys.key_class == KeyClass::TripleDes {
        old_des3_mic = params
            .policy
            .map(|policy| policy.resolve(&source, CompatPolicy::OldDes3Mic, false))
            .transpose()?
            .unwrap_or(false);

        more_flags |= MoreFlags::COMPAT_DES3_DECIDED;
        if old_des3_mic {
            more_flags |= MoreFlags::COMPAT_OLD_DES3;
        }
    }
    if acceptor_subkey.is_some() {
        more_flags |= MoreFlags::ACCEPTOR_SUBKEY;
    }

    let local_seq = u64::from(OsRng.gen::<u32>());

    let output_token = if mutual {
        context.state = AcceptorState::AwaitingMutualAckSent;

        // RFC 4120 §3.2.4: the AP-REP is encrypted in the ticket session key
        // and echoes the authenticator's ctime and cusec.
        let ap_rep = generate_ap_rep(
            &session_key,
            session_etype,
            authenticator.0.ctime.0.clone(),
            authenticator.0.cusec.0.clone(),
            local_seq as u32,
            acceptor_subkey.as_deref(),
        )?;

        wrap_ap_rep(&ap_rep)?
    } else {
        Vec::new()
    };

    context.flags = flags;
    context.more_flags = more_flags;
    context.source_name = Some(source.clone());
    context.target_name = Some(target);
    context.auth = Some(AuthHandle {
        keys,
        guard,
        local_seq,
        acceptor_role: true,
        acceptor_subkey: acceptor_subkey.is_some(),
        old_des3_mic,
    });
    context.expiry = Some(end_time);
    context.state = AcceptorState::Open;

    debug!(?flags, mutual, "security context established");

    Ok(AcceptOutcome {
        status: AcceptStatus::Complete,
        output_token,
        source_name: source,
        flags,
        expiry: Some(end_time),
        delegated,
    })
}

fn ap_options_word(ap_req: &ApReq) -> Result<u32> {
    // BitString keeps the DER unused-bits octet in front of the flag bytes;
    // payload_view skips it.
    let bytes: [u8; 4] = ap_req
        .0
        .ap_options
        .0
         .0
        .payload_view()
        .try_into()
        .map_err(|err| Error::new(ErrorKind::DefectiveToken, format!("invalid AP-REQ ap-options: {:?}", err)))?;

    Ok(u32::from_be_bytes(bytes))
}

/// Takes the forwarded KRB-CRED out of the checksum's delegation field. The
/// blob stays encrypted in the session key; it is validated structurally and
/// handed to the caller, never opened here.
fn accept_delegation(client: &Principal, blob: Option<&[u8]>) -> Result<DelegatedCredential> {
    let blob = blob.ok_or_else(|| {
        Error::new(
            ErrorKind::DefectiveToken,
            "delegation flag is set but the checksum carries no delegation blob",
        )
    })?;

    // KRB-CRED is APPLICATION 22.
    if blob.first() != Some(&0x76) {
        return Err(Error::new(
            ErrorKind::DefectiveCredential,
            "delegation blob is not a KRB-CRED message",
        ));
    }

    Ok(DelegatedCredential {
        client: client.clone(),
        krb_cred: blob.to_vec(),
    })
}
