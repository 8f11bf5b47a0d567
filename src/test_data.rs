//! Fake established state and deterministic ciphers for tests.

use std::sync::Arc;

use hmac::{Hmac, Mac};
use picky_asn1::bit_string::BitString;
use picky_asn1::date::GeneralizedTime;
use picky_asn1::restricted_string::IA5String;
use picky_asn1::wrapper::{
    Asn1SequenceOf, ExplicitContextTag0, ExplicitContextTag1, ExplicitContextTag2, ExplicitContextTag3,
    ExplicitContextTag4, ExplicitContextTag5, ExplicitContextTag7, IntegerAsn1, OctetStringAsn1, Optional,
};
use picky_krb::constants::gss_api::AUTHENTICATOR_CHECKSUM_TYPE;
use picky_krb::constants::key_usages::{AP_REQ_AUTHENTICATOR, TICKET_REP};
use picky_krb::constants::types::{AP_REQ_MSG_TYPE, NT_PRINCIPAL, NT_SRV_INST};
use picky_krb::crypto::CipherSuite;
use picky_krb::data_types::{
    ApOptions, Authenticator, AuthenticatorInner, Checksum, EncTicketPart, EncTicketPartInner, EncryptedData,
    EncryptionKey, KerberosFlags, KerberosStringAsn1, KerberosTime, PrincipalName, Realm, Ticket, TicketInner,
    TransitedEncoding,
};
use picky_krb::messages::{ApReq, ApReqInner};
use sha1::Sha1;
use time::{Duration, OffsetDateTime};

use crate::context::SecurityContext;
use crate::crypto::{KeyClass, KrbCipher, MessageCipher, ProtectionKeys};
use crate::protect::AuthHandle;
use crate::sequence::{SequenceGuard, SequencePolicy};
use crate::wire::{MechEnvelope, TOKEN_ID_AP_REQ};
use crate::{Error, ErrorKind, Result, Secret, KERBEROS_VERSION};

type HmacSha1 = Hmac<Sha1>;

pub(crate) const AES_SESSION_KEY: &[u8] = &[
    21, 56, 207, 133, 152, 47, 177, 117, 223, 235, 169, 237, 173, 202, 11, 254, 142, 185, 237, 5, 97, 79, 112, 46, 73,
    182, 117, 0, 35, 91, 24, 66,
];
const DES3_SESSION_KEY: &[u8] = &[
    146, 61, 191, 46, 26, 68, 247, 94, 124, 95, 1, 190, 15, 185, 245, 64, 18, 203, 212, 49, 43, 222, 254, 217,
];
const LEGACY_SESSION_KEY: &[u8] = &[85, 222, 7, 92, 254, 153, 105, 144];

/// Stand-in cipher for the families without a built-in primitive. XOR
/// keystream plus an HMAC-SHA1 tag: deterministic framing with exact
/// overhead, no cryptographic value.
#[derive(Debug)]
pub(crate) struct XorCipher {
    pub mac_len: usize,
    /// Derive the seal key from the sequence number, RC4 style.
    pub derive: bool,
}

impl XorCipher {
    const CONFOUNDER_LEN: usize = 8;

    fn keystream_byte(key: &[u8], usage: i32, position: usize) -> u8 {
        key[position % key.len()] ^ (usage as u8) ^ (position as u8).wrapping_mul(31)
    }

    fn mac(&self, key: &[u8], usage: i32, data: &[u8]) -> Vec<u8> {
        let mut mac = HmacSha1::new_from_slice(key).expect("hmac accepts any key length");
        mac.update(&usage.to_le_bytes());
        mac.update(data);

        mac.finalize().into_bytes()[..self.mac_len].to_vec()
    }
}

impl MessageCipher for XorCipher {
    fn seal(&self, key: &[u8], usage: i32, payload: &[u8]) -> Result<Vec<u8>> {
        let mut inner = vec![0xc5; Self::CONFOUNDER_LEN];
        inner.extend_from_slice(payload);

        let tag = self.mac(key, usage, &inner);

        for (position, byte) in inner.iter_mut().enumerate() {
            *byte ^= Self::keystream_byte(key, usage, position);
        }
        inner.extend_from_slice(&tag);

        Ok(inner)
    }

    fn unseal(&self, key: &[u8], usage: i32, data: &[u8]) -> Result<Vec<u8>> {
        let inner_len = data
            .len()
            .checked_sub(Self::CONFOUNDER_LEN + self.mac_len)
            .ok_or_else(|| Error::new(ErrorKind::DefectiveToken, "sealed blob shorter than its framing"))?
            + Self::CONFOUNDER_LEN;

        let mut inner = data[..inner_len].to_vec();
        for (position, byte) in inner.iter_mut().enumerate() {
            *byte ^= Self::keystream_byte(key, usage, position);
        }

        if self.mac(key, usage, &inner) != data[inner_len..] {
            return Err(Error::new(ErrorKind::BadMic, "sealed blob failed its integrity tag"));
        }

        Ok(inner[Self::CONFOUNDER_LEN..].to_vec())
    }

    fn checksum(&self, key: &[u8], usage: i32, data: &[u8]) -> Result<Vec<u8>> {
        Ok(self.mac(key, usage, data))
    }

    fn checksum_len(&self) -> usize {
        self.mac_len
    }

    fn seal_overhead(&self) -> usize {
        Self::CONFOUNDER_LEN + self.mac_len
    }

    fn derive_message_key(&self, key: &[u8], seq: u32) -> Result<Vec<u8>> {
        if !self.derive {
            return Ok(key.to_vec());
        }

        let seq_bytes = seq.to_le_bytes();

        Ok(key
            .iter()
            .enumerate()
            .map(|(position, byte)| byte ^ seq_bytes[position % seq_bytes.len()])
            .collect())
    }
}

/// Cipher that refuses every operation. For counter-advance tests.
#[derive(Debug)]
pub(crate) struct FailingCipher;

impl MessageCipher for FailingCipher {
    fn seal(&self, _: &[u8], _: i32, _: &[u8]) -> Result<Vec<u8>> {
        Err(Error::new(ErrorKind::Failure, "cipher unavailable"))
    }

    fn unseal(&self, _: &[u8], _: i32, _: &[u8]) -> Result<Vec<u8>> {
        Err(Error::new(ErrorKind::Failure, "cipher unavailable"))
    }

    fn checksum(&self, _: &[u8], _: i32, _: &[u8]) -> Result<Vec<u8>> {
        Err(Error::new(ErrorKind::Failure, "cipher unavailable"))
    }

    fn checksum_len(&self) -> usize {
        12
    }

    fn seal_overhead(&self) -> usize {
        28
    }
}

pub(crate) fn session_key(class: KeyClass) -> Secret<Vec<u8>> {
    Secret::new(match class {
        KeyClass::Cfx => AES_SESSION_KEY.to_vec(),
        KeyClass::TripleDes => DES3_SESSION_KEY.to_vec(),
        KeyClass::Des | KeyClass::Rc4 => LEGACY_SESSION_KEY.to_vec(),
    })
}

fn etype(class: KeyClass) -> i32 {
    match class {
        KeyClass::Cfx => 18,
        KeyClass::TripleDes => 16,
        KeyClass::Des => 3,
        KeyClass::Rc4 => 23,
    }
}

fn cipher(class: KeyClass) -> Arc<dyn MessageCipher> {
    match class {
        KeyClass::Cfx | KeyClass::TripleDes => {
            Arc::new(KrbCipher::for_etype(etype(class)).expect("built-in suite for the etype"))
        }
        KeyClass::Des => Arc::new(XorCipher {
            mac_len: 8,
            derive: false,
        }),
        KeyClass::Rc4 => Arc::new(XorCipher {
            mac_len: 8,
            derive: true,
        }),
    }
}

fn fake_auth(class: KeyClass, acceptor_role: bool) -> AuthHandle {
    let keys = if acceptor_role {
        ProtectionKeys::acceptor_with_cipher(session_key(class), etype(class), cipher(class))
    } else {
        ProtectionKeys::initiator_with_cipher(session_key(class), etype(class), cipher(class))
    };

    AuthHandle {
        keys,
        guard: SequenceGuard::new(SequencePolicy::REPLAY, !class.is_legacy(), 0),
        local_seq: 0,
        acceptor_role,
        acceptor_subkey: false,
        old_des3_mic: false,
    }
}

pub(crate) fn fake_acceptor_auth(class: KeyClass) -> AuthHandle {
    fake_auth(class, true)
}

pub(crate) fn fake_initiator_auth(class: KeyClass) -> AuthHandle {
    fake_auth(class, false)
}

/// Initiator-side counterpart of an established acceptor context: same key
/// and cipher, mirrored usages, guard seeded with the acceptor's counter.
pub(crate) fn mirror_initiator(context: &SecurityContext) -> AuthHandle {
    let auth = context.auth.as_ref().expect("context must be established");

    let keys = ProtectionKeys::initiator_with_cipher(auth.keys.key.clone(), auth.keys.etype, auth.keys.cipher.clone());
    let wide = !keys.key_class.is_legacy();

    AuthHandle {
        keys,
        guard: SequenceGuard::new(SequencePolicy::REPLAY, wide, auth.local_seq),
        local_seq: 0,
        acceptor_role: false,
        acceptor_subkey: auth.acceptor_subkey,
        old_des3_mic: auth.old_des3_mic,
    }
}

/// Long-term key of `host/test@EXAMPLE` in the test realm.
pub(crate) const SERVICE_KEY: &[u8] = &[
    4, 153, 94, 38, 251, 10, 123, 77, 34, 200, 18, 97, 55, 8, 141, 220, 29, 31, 70, 119, 11, 202, 164, 7, 88, 60, 47,
    150, 113, 236, 0, 99,
];

/// Knobs of [`build_ap_req`]. The defaults produce a mutual-auth request
/// with confidentiality, integrity and replay detection, a zero Bnd field
/// and sequence number zero.
#[derive(Debug)]
pub(crate) struct ApReqOptions {
    pub mutual: bool,
    pub bindings_hash: Option<[u8; 16]>,
    pub ctime_offset: Duration,
    pub delegation: Option<Vec<u8>>,
}

impl Default for ApReqOptions {
    fn default() -> Self {
        Self {
            mutual: true,
            bindings_hash: None,
            ctime_offset: Duration::ZERO,
            delegation: None,
        }
    }
}

fn test_realm() -> Realm {
    Realm::from(IA5String::from_string("EXAMPLE".to_owned()).expect("realm is ASCII"))
}

fn client_name() -> PrincipalName {
    PrincipalName {
        name_type: ExplicitContextTag0::from(IntegerAsn1::from(vec![NT_PRINCIPAL])),
        name_string: ExplicitContextTag1::from(Asn1SequenceOf::from(vec![KerberosStringAsn1::from(
            IA5String::from_string("user".to_owned()).expect("name is ASCII"),
        )])),
    }
}

fn service_name() -> PrincipalName {
    PrincipalName {
        name_type: ExplicitContextTag0::from(IntegerAsn1::from(vec![NT_SRV_INST])),
        name_string: ExplicitContextTag1::from(Asn1SequenceOf::from(vec![
            KerberosStringAsn1::from(IA5String::from_string("host".to_owned()).expect("name is ASCII")),
            KerberosStringAsn1::from(IA5String::from_string("test".to_owned()).expect("name is ASCII")),
        ])),
    }
}

/// Builds a mech-framed AP-REQ for `host/test@EXAMPLE` the way an initiator
/// would, with an AES256 ticket sealed under [`SERVICE_KEY`].
pub(crate) fn build_ap_req(options: ApReqOptions) -> Vec<u8> {
    let cipher = CipherSuite::Aes256CtsHmacSha196.cipher();
    let now = OffsetDateTime::now_utc();

    let ticket_enc_part = EncTicketPart::from(EncTicketPartInner {
        flags: ExplicitContextTag0::from(KerberosFlags::from(BitString::with_bytes(vec![0; 4]))),
        key: ExplicitContextTag1::from(EncryptionKey {
            key_type: ExplicitContextTag0::from(IntegerAsn1::from(vec![18])),
            key_value: ExplicitContextTag1::from(OctetStringAsn1::from(AES_SESSION_KEY.to_vec())),
        }),
        crealm: ExplicitContextTag2::from(test_realm()),
        cname: ExplicitContextTag3::from(client_name()),
        transited: ExplicitContextTag4::from(TransitedEncoding {
            tr_type: ExplicitContextTag0::from(IntegerAsn1::from(vec![0])),
            contents: ExplicitContextTag1::from(OctetStringAsn1::from(vec![1])),
        }),
        auth_time: ExplicitContextTag5::from(KerberosTime::from(GeneralizedTime::from(now))),
        starttime: Optional::from(None),
        endtime: ExplicitContextTag7::from(KerberosTime::from(GeneralizedTime::from(now + Duration::hours(8)))),
        renew_till: Optional::from(None),
        caddr: Optional::from(None),
        authorization_data: Optional::from(None),
    });
    let ticket_enc_data = cipher
        .encrypt(
            SERVICE_KEY,
            TICKET_REP,
            &picky_asn1_der::to_vec(&ticket_enc_part).expect("ticket part serializes"),
        )
        .expect("ticket encryption succeeds");

    let ticket = Ticket::from(TicketInner {
        tkt_vno: ExplicitContextTag0::from(IntegerAsn1::from(vec![KERBEROS_VERSION])),
        realm: ExplicitContextTag1::from(test_realm()),
        sname: ExplicitContextTag2::from(service_name()),
        enc_part: ExplicitContextTag3::from(EncryptedData {
            etype: ExplicitContextTag0::from(IntegerAsn1::from(vec![18])),
            kvno: Optional::from(None),
            cipher: ExplicitContextTag2::from(OctetStringAsn1::from(ticket_enc_data)),
        }),
    });

    // GSS request flags: replay + conf + integ, plus mutual and delegation
    // when asked for.
    let mut flags: u32 = 4 | 16 | 32;
    if options.mutual {
        flags |= 2;
    }
    if options.delegation.is_some() {
        flags |= 1;
    }

    let mut checksum_value = Vec::with_capacity(28);
    checksum_value.extend_from_slice(&16u32.to_le_bytes());
    checksum_value.extend_from_slice(&options.bindings_hash.unwrap_or([0; 16]));
    checksum_value.extend_from_slice(&flags.to_le_bytes());
    if let Some(blob) = &options.delegation {
        checksum_value.extend_from_slice(&1u16.to_le_bytes());
        checksum_value.extend_from_slice(&(blob.len() as u16).to_le_bytes());
        checksum_value.extend_from_slice(blob);
    }

    let ctime = now + options.ctime_offset;
    let authenticator = Authenticator::from(AuthenticatorInner {
        authenticator_vno: ExplicitContextTag0::from(IntegerAsn1::from(vec![KERBEROS_VERSION])),
        crealm: ExplicitContextTag1::from(test_realm()),
        cname: ExplicitContextTag2::from(client_name()),
        cksum: Optional::from(Some(ExplicitContextTag3::from(Checksum {
            cksumtype: ExplicitContextTag0::from(IntegerAsn1::from(AUTHENTICATOR_CHECKSUM_TYPE.to_vec())),
            checksum: ExplicitContextTag1::from(OctetStringAsn1::from(checksum_value)),
        }))),
        cusec: ExplicitContextTag4::from(IntegerAsn1::from(ctime.microsecond().to_be_bytes().to_vec())),
        ctime: ExplicitContextTag5::from(KerberosTime::from(GeneralizedTime::from(ctime))),
        subkey: Optional::from(None),
        seq_number: Optional::from(Some(ExplicitContextTag7::from(IntegerAsn1::from_bytes_be_unsigned(
            0u32.to_be_bytes().to_vec(),
        )))),
        authorization_data: Optional::from(None),
    });
    let encrypted_authenticator = cipher
        .encrypt(
            AES_SESSION_KEY,
            AP_REQ_AUTHENTICATOR,
            &picky_asn1_der::to_vec(&authenticator).expect("authenticator serializes"),
        )
        .expect("authenticator encryption succeeds");

    let ap_options: u32 = if options.mutual { 0x2000_0000 } else { 0 };
    let ap_req = ApReq::from(ApReqInner {
        pvno: ExplicitContextTag0::from(IntegerAsn1::from(vec![KERBEROS_VERSION])),
        msg_type: ExplicitContextTag1::from(IntegerAsn1::from(vec![AP_REQ_MSG_TYPE])),
        ap_options: ExplicitContextTag2::from(ApOptions::from(BitString::with_bytes(
            ap_options.to_be_bytes().to_vec(),
        ))),
        ticket: ExplicitContextTag3::from(ticket),
        authenticator: ExplicitContextTag4::from(EncryptedData {
            etype: ExplicitContextTag0::from(IntegerAsn1::from(vec![18])),
            kvno: Optional::from(None),
            cipher: ExplicitContextTag2::from(OctetStringAsn1::from(encrypted_authenticator)),
        }),
    });

    let body = picky_asn1_der::to_vec(&ap_req).expect("AP-REQ serializes");

    MechEnvelope::encode(TOKEN_ID_AP_REQ, &body)
}
