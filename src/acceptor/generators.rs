use picky_asn1::wrapper::{
    ExplicitContextTag0, ExplicitContextTag1, ExplicitContextTag2, ExplicitContextTag3, IntegerAsn1, OctetStringAsn1,
    Optional,
};
use picky_krb::constants::key_usages::AP_REP_ENC;
use picky_krb::constants::types::AP_REP_MSG_TYPE;
use picky_krb::crypto::CipherSuite;
use picky_krb::data_types::{EncApRepPart, EncApRepPartInner, EncryptedData, EncryptionKey, KerberosTime, Microseconds};
use picky_krb::messages::{ApRep, ApRepInner};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::wire::{MechEnvelope, TOKEN_ID_AP_REP};
use crate::{Error, ErrorKind, Result, Secret, KERBEROS_VERSION};

/// Fresh acceptor sub-session key sized for the negotiated suite.
pub(super) fn generate_acceptor_subkey(suite: &CipherSuite) -> Vec<u8> {
    let mut subkey = vec![0; suite.cipher().key_size()];
    OsRng.fill_bytes(&mut subkey);

    subkey
}

/// Builds the AP-REP. The encrypted part echoes the authenticator's ctime
/// and cusec, carries our starting sequence number and, when mutual
/// authentication negotiated one, the acceptor subkey (RFC 4120 §3.2.4).
pub(super) fn generate_ap_rep(
    session_key: &Secret<Vec<u8>>,
    etype: i32,
    ctime: KerberosTime,
    cusec: Microseconds,
    seq_number: u32,
    subkey: Option<&[u8]>,
) -> Result<ApRep> {
    let suite = CipherSuite::try_from(
        usize::try_from(etype).map_err(|_| Error::new(ErrorKind::Failure, "negative encryption type"))?,
    )
    .map_err(|err| Error::with_minor(ErrorKind::Failure, "unsupported AP-REP encryption type", err))?;

    let enc_part = EncApRepPart::from(EncApRepPartInner {
        ctime: ExplicitContextTag0::from(ctime),
        cusec: ExplicitContextTag1::from(cusec),
        subkey: Optional::from(subkey.map(|subkey| {
            ExplicitContextTag2::from(EncryptionKey {
                key_type: ExplicitContextTag0::from(IntegerAsn1::from(vec![(&suite).into()])),
                key_value: ExplicitContextTag1::from(OctetStringAsn1::from(subkey.to_vec())),
            })
        })),
        seq_number: Optional::from(Some(ExplicitContextTag3::from(IntegerAsn1::from_bytes_be_unsigned(
            seq_number.to_be_bytes().to_vec(),
        )))),
    });

    let enc_data = suite
        .cipher()
        .encrypt(session_key.as_ref(), AP_REP_ENC, &picky_asn1_der::to_vec(&enc_part)?)
        .map_err(|err| Error::with_minor(ErrorKind::Failure, "AP-REP encryption failed", err))?;

    Ok(ApRep::from(ApRepInner {
        pvno: ExplicitContextTag0::from(IntegerAsn1::from(vec![KERBEROS_VERSION])),
        msg_type: ExplicitContextTag1::from(IntegerAsn1::from(vec![AP_REP_MSG_TYPE])),
        enc_part: ExplicitContextTag2::from(EncryptedData {
            etype: ExplicitContextTag0::from(IntegerAsn1::from(vec![(&suite).into()])),
            kvno: Optional::from(None),
            cipher: ExplicitContextTag2::from(OctetStringAsn1::from(enc_data)),
        }),
    }))
}

/// Frames the AP-REP in the mechanism envelope the initiator expects.
pub(super) fn wrap_ap_rep(ap_rep: &ApRep) -> Result<Vec<u8>> {
    let body = picky_asn1_der::to_vec(ap_rep)?;

    Ok(MechEnvelope::encode(TOKEN_ID_AP_REP, &body))
}
