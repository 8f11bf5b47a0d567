use picky_krb::constants::gss_api::AUTHENTICATOR_CHECKSUM_TYPE;
use picky_krb::constants::key_usages::{AP_REQ_AUTHENTICATOR, TICKET_REP};
use picky_krb::crypto::CipherSuite;
use picky_krb::data_types::{Authenticator, EncTicketPart, KerberosStringAsn1, PrincipalName};
use picky_krb::messages::ApReq;
use time::{Duration, OffsetDateTime};

use crate::channel_bindings::ChannelBindings;
use crate::principal::Principal;
use crate::{Error, ErrorKind, Result, Secret};

/// Flags word of the 0x8003 authenticator checksum, GSS request-flag bits.
pub(super) const CHECKSUM_FLAG_DELEG: u32 = 0x01;

pub(super) fn decode_ap_req(data: &[u8]) -> Result<ApReq> {
    Ok(picky_asn1_der::from_bytes(data)?)
}

/// Collapses a DER integer into an encryption-type number.
pub(super) fn int_from_asn1_bytes(bytes: &[u8]) -> i32 {
    bytes.iter().fold(0, |acc, byte| (acc << 8) | i32::from(*byte))
}

pub(super) fn ticket_etype(ap_req: &ApReq) -> i32 {
    int_from_asn1_bytes(&ap_req.0.ticket.0 .0.enc_part.0.etype.0 .0)
}

/// Decrypts the [ApReq] ticket with the service's long-term key and returns
/// the decoded encrypted part.
pub(super) fn decrypt_ap_req_ticket(key: &Secret<Vec<u8>>, ap_req: &ApReq) -> Result<EncTicketPart> {
    let ticket_enc_part = &ap_req.0.ticket.0 .0.enc_part.0;
    let cipher = CipherSuite::try_from(ticket_enc_part.etype.0 .0.as_slice())
        .map_err(|err| Error::with_minor(ErrorKind::Failure, "unsupported ticket encryption type", err))?
        .cipher();

    let encoded_enc_part = cipher
        .decrypt(key.as_ref(), TICKET_REP, &ticket_enc_part.cipher.0 .0)
        .map_err(|err| Error::with_minor(ErrorKind::Failure, "ticket decryption failed", err))?;

    Ok(picky_asn1_der::from_bytes(&encoded_enc_part)?)
}

/// Decrypts the [ApReq] authenticator with the ticket session key.
pub(super) fn decrypt_ap_req_authenticator(session_key: &Secret<Vec<u8>>, ap_req: &ApReq) -> Result<Authenticator> {
    let encrypted_authenticator = &ap_req.0.authenticator.0;
    let cipher = CipherSuite::try_from(encrypted_authenticator.etype.0 .0.as_slice())
        .map_err(|err| Error::with_minor(ErrorKind::Failure, "unsupported authenticator encryption type", err))?
        .cipher();

    let encoded_authenticator = cipher
        .decrypt(
            session_key.as_ref(),
            AP_REQ_AUTHENTICATOR,
            &encrypted_authenticator.cipher.0 .0,
        )
        .map_err(|err| Error::with_minor(ErrorKind::Failure, "authenticator decryption failed", err))?;

    Ok(picky_asn1_der::from_bytes(&encoded_authenticator)?)
}

pub(super) fn principal_from_parts(name: &PrincipalName, realm: &KerberosStringAsn1) -> Result<Principal> {
    let components = name
        .name_string
        .0
         .0
        .iter()
        .map(|component| component.to_string())
        .collect::<Vec<_>>();

    Principal::new(components, realm.0.to_string())
}

/// RFC 4120 §3.2.3: client name and realm in the authenticator must equal
/// the ones inside the ticket.
pub(super) fn cross_check_client(ticket_part: &EncTicketPart, authenticator: &Authenticator) -> Result<()> {
    if ticket_part.0.crealm.0 != authenticator.0.crealm.0 || ticket_part.0.cname.0 != authenticator.0.cname.0 {
        return Err(Error::new(
            ErrorKind::DefectiveToken,
            "client name and realm in the ticket and the authenticator do not match",
        ));
    }

    Ok(())
}

/// Clock-skew check of the authenticator ctime and the ticket validity
/// window against `now`.
pub(super) fn check_times(
    ticket_part: &EncTicketPart,
    authenticator: &Authenticator,
    now: OffsetDateTime,
    max_time_skew: Duration,
) -> Result<OffsetDateTime> {
    let client_time = OffsetDateTime::try_from(authenticator.0.ctime.0 .0.clone())
        .map_err(|err| Error::with_minor(ErrorKind::DefectiveToken, "authenticator ctime is not valid", err))?;

    if (now - client_time).abs() > max_time_skew {
        return Err(Error::new(
            ErrorKind::Failure,
            "invalid authenticator ctime: time skew is too big",
        ));
    }

    // RFC 4120 §5.3: absent starttime means authtime takes its place.
    let start_time = OffsetDateTime::try_from(
        ticket_part
            .0
            .starttime
            .0
            .as_ref()
            .map(|start_time| start_time.0.clone())
            .unwrap_or_else(|| ticket_part.0.auth_time.0.clone())
            .0,
    )
    .map_err(|err| Error::with_minor(ErrorKind::DefectiveToken, "ticket start time is not valid", err))?;

    if start_time > now + max_time_skew {
        return Err(Error::new(ErrorKind::Failure, "ticket not yet valid"));
    }

    let end_time = OffsetDateTime::try_from(ticket_part.0.endtime.0 .0.clone())
        .map_err(|err| Error::with_minor(ErrorKind::DefectiveToken, "ticket end time is not valid", err))?;

    if now > end_time + max_time_skew {
        return Err(Error::new(ErrorKind::ContextExpired, "ticket is expired"));
    }

    Ok(end_time)
}

/// Parsed 0x8003 authenticator checksum.
#[derive(Debug)]
pub(super) struct ChecksumInfo {
    pub bindings_hash: [u8; 16],
    pub flags: u32,
    pub delegation: Option<Vec<u8>>,
}

/// Parses the RFC 4121 §4.1.1 checksum field of the authenticator.
pub(super) fn parse_authenticator_checksum(authenticator: &Authenticator) -> Result<ChecksumInfo> {
    let cksum = authenticator
        .0
        .cksum
        .0
        .as_ref()
        .ok_or_else(|| Error::new(ErrorKind::DefectiveToken, "authenticator carries no checksum"))?;

    if cksum.0.cksumtype.0 .0 != AUTHENTICATOR_CHECKSUM_TYPE {
        return Err(Error::new(
            ErrorKind::DefectiveToken,
            format!("unsupported authenticator checksum type: {:?}", cksum.0.cksumtype.0 .0),
        ));
    }

    let value = &cksum.0.checksum.0 .0;
    if value.len() < 24 {
        return Err(Error::new(
            ErrorKind::DefectiveToken,
            format!("authenticator checksum is too short: {} bytes", value.len()),
        ));
    }

    let lgth = u32::from_le_bytes(value[0..4].try_into().expect("slice length is 4"));
    if lgth != 16 {
        return Err(Error::new(
            ErrorKind::DefectiveToken,
            format!("authenticator checksum Lgth field must be 16, got {}", lgth),
        ));
    }

    let mut bindings_hash = [0u8; 16];
    bindings_hash.copy_from_slice(&value[4..20]);

    let flags = u32::from_le_bytes(value[20..24].try_into().expect("slice length is 4"));

    let delegation = if flags & CHECKSUM_FLAG_DELEG != 0 && value.len() >= 28 {
        let dlg_opt = u16::from_le_bytes(value[24..26].try_into().expect("slice length is 2"));
        if dlg_opt != 1 {
            return Err(Error::new(
                ErrorKind::DefectiveToken,
                format!("unsupported delegation option: {}", dlg_opt),
            ));
        }

        let dlgth = usize::from(u16::from_le_bytes(value[26..28].try_into().expect("slice length is 2")));
        let blob = value
            .get(28..28 + dlgth)
            .ok_or_else(|| Error::new(ErrorKind::DefectiveToken, "delegation blob is shorter than its Dlgth"))?;

        Some(blob.to_vec())
    } else {
        None
    };

    Ok(ChecksumInfo {
        bindings_hash,
        flags,
        delegation,
    })
}

/// Verifies the checksum's channel-binding hash against the caller's
/// bindings. An all-zero Bnd field is accepted for interoperability with
/// initiators that did not see any bindings (RFC 4121 §4.1.1.2).
pub(super) fn check_channel_bindings(info: &ChecksumInfo, bindings: Option<&ChannelBindings>) -> Result<()> {
    let Some(bindings) = bindings else {
        return Ok(());
    };

    if info.bindings_hash != bindings.hash() && info.bindings_hash != [0u8; 16] {
        return Err(Error::new(
            ErrorKind::BadBindings,
            "authenticator channel-binding hash does not match the provided bindings",
        ));
    }

    Ok(())
}

/// Sub-session key the initiator put into its authenticator, if any.
pub(super) fn authenticator_subkey(authenticator: &Authenticator) -> Option<(i32, Vec<u8>)> {
    authenticator.0.subkey.0.as_ref().map(|subkey| {
        (
            int_from_asn1_bytes(&subkey.0.key_type.0 .0),
            subkey.0.key_value.0 .0.clone(),
        )
    })
}

/// Initiator's starting sequence number. Absent means zero.
pub(super) fn initial_sequence_number(authenticator: &Authenticator) -> u64 {
    authenticator
        .0
        .seq_number
        .0
        .as_ref()
        .map(|seq| seq.0 .0.iter().fold(0u64, |acc, byte| (acc << 8) | u64::from(*byte)))
        .unwrap_or(0)
}
