use oid::ObjectIdentifier;
use picky_asn1::wrapper::{
    ExplicitContextTag0, ExplicitContextTag1, ExplicitContextTag2, ExplicitContextTag3, OctetStringAsn1, Optional,
};
use picky_asn1_der::Asn1RawDer;
use picky_krb::constants::gss_api::{ACCEPT_COMPLETE, ACCEPT_INCOMPLETE};
use picky_krb::gss_api::{MechType, NegTokenTarg, NegTokenTarg1};

use crate::Result;

// DER-encoded ENUMERATED reject(2)
const REJECT: [u8; 3] = [0x0a, 0x01, 0x02];

/// Reply for an offer this acceptor cannot or will not take.
pub(super) fn generate_reject_token() -> Result<Vec<u8>> {
    let token = NegTokenTarg1::from(NegTokenTarg {
        neg_result: Optional::from(Some(ExplicitContextTag0::from(Asn1RawDer(REJECT.to_vec())))),
        supported_mech: Optional::from(None),
        response_token: Optional::from(None),
        mech_list_mic: Optional::from(None),
    });

    Ok(picky_asn1_der::to_vec(&token)?)
}

/// Reply naming the chosen mechanism and carrying its response token plus,
/// when the exchange completed under a policy that demands one, a MIC over
/// the offered mechanism list.
pub(super) fn generate_accept_token(
    complete: bool,
    mech_type: ObjectIdentifier,
    response_token: Option<Vec<u8>>,
    mech_list_mic: Option<Vec<u8>>,
) -> Result<Vec<u8>> {
    let neg_result = if complete {
        ACCEPT_COMPLETE.to_vec()
    } else {
        ACCEPT_INCOMPLETE.to_vec()
    };

    let token = NegTokenTarg1::from(NegTokenTarg {
        neg_result: Optional::from(Some(ExplicitContextTag0::from(Asn1RawDer(neg_result)))),
        supported_mech: Optional::from(Some(ExplicitContextTag1::from(MechType::from(mech_type)))),
        response_token: Optional::from(
            response_token.map(|token| ExplicitContextTag2::from(OctetStringAsn1::from(token))),
        ),
        mech_list_mic: Optional::from(mech_list_mic.map(|mic| ExplicitContextTag3::from(OctetStringAsn1::from(mic)))),
    });

    Ok(picky_asn1_der::to_vec(&token)?)
}
