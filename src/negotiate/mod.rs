//! SPNEGO (RFC 4178) wrapper around the Kerberos acceptor.
//!
//! Stateless at this layer: the only state is the wrapped mechanism's
//! [`SecurityContext`]. A malformed outer envelope is fatal; a well-formed
//! offer this acceptor cannot take yields a reject reply instead.

mod extractors;
mod generators;

use self::extractors::{decode_neg_init, select_mech_type};
use self::generators::{generate_accept_token, generate_reject_token};
use crate::acceptor::{accept_security_context, AcceptOutcome, AcceptParams, AcceptStatus};
use crate::context::SecurityContext;
use crate::crypto::KeyClass;
use crate::policy::CompatPolicy;
use crate::{Error, ErrorKind, Result};

/// Result of one negotiation step.
#[derive(Debug)]
pub enum SpnegoOutcome {
    Accepted {
        /// Encoded NegTokenTarg reply for the initiator.
        reply: Vec<u8>,
        accept: AcceptOutcome,
    },
    /// The offer was declined. `reply` still goes back to the initiator;
    /// `error` tells the caller why.
    Rejected { reply: Vec<u8>, error: Error },
}

/// Accepts the initiator's NegTokenInit, dispatching the embedded mechanism
/// token into the Kerberos acceptor.
///
/// The reply signs the offered mechanism list whenever the established
/// session uses a CFX key, or when [`CompatPolicy::RequireMechListMic`]
/// says the peer demands one anyway.
pub fn accept_negotiation(context: &mut SecurityContext, params: AcceptParams<'_>) -> Result<SpnegoOutcome> {
    let (mech_types, mech_token) = decode_neg_init(params.input_token)?;

    let mech_types = match mech_types {
        Some(mech_types) => mech_types,
        None => {
            return Ok(SpnegoOutcome::Rejected {
                reply: generate_reject_token()?,
                error: Error::new(ErrorKind::BadMech, "NegTokenInit offers no mechanism list"),
            });
        }
    };

    let mech_type = match select_mech_type(params.credential, &mech_types) {
        Some(mech_type) => mech_type,
        None => {
            return Ok(SpnegoOutcome::Rejected {
                reply: generate_reject_token()?,
                error: Error::new(ErrorKind::BadMech, "no supported mechanism in the offered list"),
            });
        }
    };

    let mech_token = match mech_token {
        Some(mech_token) => mech_token,
        None => {
            return Ok(SpnegoOutcome::Rejected {
                reply: generate_reject_token()?,
                error: Error::new(ErrorKind::BadMech, "NegTokenInit carries no mechanism token"),
            });
        }
    };

    debug!(?mech_type, "dispatching the mechanism token");

    let inner_params = AcceptParams {
        credential: params.credential,
        input_token: &mech_token,
        channel_bindings: params.channel_bindings,
        policy: params.policy,
        max_time_skew: params.max_time_skew,
    };
    let accept = match accept_security_context(context, inner_params) {
        Ok(accept) => accept,
        Err(error) => {
            warn!(%error, "mechanism rejected the token");

            return Ok(SpnegoOutcome::Rejected {
                reply: generate_reject_token()?,
                error,
            });
        }
    };

    let complete = accept.status == AcceptStatus::Complete;
    let mech_list_mic = if complete && mech_list_mic_required(context, &accept, &params)? {
        let offered = picky_asn1_der::to_vec(&mech_types)?;
        Some(context.get_mic(&offered)?)
    } else {
        None
    };

    let response_token = if accept.output_token.is_empty() {
        None
    } else {
        Some(accept.output_token.clone())
    };
    let reply = generate_accept_token(complete, mech_type, response_token, mech_list_mic)?;

    Ok(SpnegoOutcome::Accepted { reply, accept })
}

/// CFX sessions always sign the mechanism list; legacy key families only
/// when policy asks for it.
fn mech_list_mic_required(context: &SecurityContext, accept: &AcceptOutcome, params: &AcceptParams<'_>) -> Result<bool> {
    let cfx = context
        .auth
        .as_ref()
        .map(|auth| auth.keys.key_class == KeyClass::Cfx)
        .unwrap_or(false);
    if cfx {
        return Ok(true);
    }

    match params.policy {
        Some(policy) => policy.resolve(&accept.source_name, CompatPolicy::RequireMechListMic, false),
        None => Ok(false),
    }
}
