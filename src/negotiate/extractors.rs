use oid::ObjectIdentifier;
use picky::oids;
use picky_krb::gss_api::{ApplicationTag0, GssApiNegInit, MechTypeList, NegTokenInit};

use crate::credential::Credential;
use crate::Result;

/// Splits the initial negotiation token into the offered mechanism list and
/// the embedded mechanism token, when present.
pub(super) fn decode_neg_init(data: &[u8]) -> Result<(Option<MechTypeList>, Option<Vec<u8>>)> {
    let token: ApplicationTag0<GssApiNegInit> = picky_asn1_der::from_bytes(data)?;
    let NegTokenInit {
        mech_types,
        req_flags: _,
        mech_token,
        mech_list_mic: _,
    } = token.0.neg_token_init.0;

    Ok((mech_types.0.map(|list| list.0), mech_token.0.map(|token| token.0 .0)))
}

/// First offered mechanism this acceptor speaks and the credential covers.
/// The Microsoft Kerberos oid (1.2.840.48018.1.2.2) is wire-compatible with
/// standard Kerberos 5 and is honored under its own name.
pub(super) fn select_mech_type(credential: &Credential, mech_list: &MechTypeList) -> Option<ObjectIdentifier> {
    let krb5 = oids::krb5();
    let ms_krb5 = oids::ms_krb5();

    mech_list
        .0
        .iter()
        .find(|mech_type| {
            (mech_type.0 == krb5 || mech_type.0 == ms_krb5) && credential.supports_mech(&mech_type.0)
        })
        .map(|mech_type| mech_type.0.clone())
}
