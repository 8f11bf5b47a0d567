//! CFX (RFC 4121) per-message tokens.

use crate::protect::AuthHandle;
use crate::sequence::SequenceOutcome;
use crate::wire::wrap::{rotate_left, CfxWrapToken};
use crate::wire::{CfxFlags, CfxMicToken};
use crate::{Error, ErrorKind, Result};

fn emission_flags(auth: &AuthHandle) -> CfxFlags {
    let mut flags = CfxFlags::empty();

    if auth.acceptor_role {
        flags |= CfxFlags::SENT_BY_ACCEPTOR;
    }
    if auth.acceptor_subkey {
        flags |= CfxFlags::ACCEPTOR_SUBKEY;
    }

    flags
}

fn check_direction(auth: &AuthHandle, flags: CfxFlags) -> Result<()> {
    if flags.contains(CfxFlags::SENT_BY_ACCEPTOR) == auth.acceptor_role {
        return Err(Error::new(
            ErrorKind::DefectiveToken,
            "token SentByAcceptor flag names our own role",
        ));
    }

    Ok(())
}

pub(crate) fn wrap(auth: &mut AuthHandle, conf: bool, plaintext: &[u8]) -> Result<Vec<u8>> {
    let key = auth.keys.key.as_ref();
    let cipher = &auth.keys.cipher;
    let seq = auth.local_seq;

    let mut token = if conf {
        let mut token = CfxWrapToken::new(emission_flags(auth) | CfxFlags::SEALED, 0, seq);

        // sealed payload carries a copy of the header with RRC zeroed
        let mut payload = plaintext.to_vec();
        payload.extend_from_slice(&token.header_for_integrity());

        token.body = cipher.seal(key, auth.keys.encrypt_usage, &payload)?;

        token
    } else {
        let mut token = CfxWrapToken::new(emission_flags(auth), 0, seq);

        let mut data_to_sign = plaintext.to_vec();
        data_to_sign.extend_from_slice(&token.header_for_checksum());
        let checksum = cipher.checksum(key, auth.keys.sign_usage, &data_to_sign)?;

        token.ec = checksum.len() as u16;
        token.body = plaintext.to_vec();
        token.body.extend_from_slice(&checksum);

        token
    };

    // emitted with RRC = 0; peers are free to rotate
    token.rrc = 0;
    auth.commit_seq();

    Ok(token.encode())
}

pub(crate) fn unwrap(auth: &mut AuthHandle, raw: &[u8]) -> Result<(Vec<u8>, bool)> {
    let token = CfxWrapToken::decode(raw)?;
    check_direction(auth, token.flags)?;

    let key = auth.keys.key.as_ref();
    let cipher = &auth.keys.cipher;
    let ec = usize::from(token.ec);

    let message = if token.flags.contains(CfxFlags::SEALED) {
        let body = rotate_left(&token.body, usize::from(token.rrc) + ec);
        let inner = cipher.unseal(key, auth.keys.decrypt_usage, &body)?;

        let header_len = CfxWrapToken::header_len();
        let message_len = inner
            .len()
            .checked_sub(header_len + ec)
            .ok_or_else(|| Error::new(ErrorKind::DefectiveToken, "sealed Wrap token shorter than its trailer"))?;

        if inner[message_len + ec..] != token.header_for_integrity() {
            return Err(Error::new(
                ErrorKind::BadMic,
                "header copy inside the sealed Wrap token does not match the outer header",
            ));
        }

        inner[..message_len].to_vec()
    } else {
        if ec != cipher.checksum_len() {
            return Err(Error::new(
                ErrorKind::DefectiveToken,
                format!("Wrap token EC {} does not match the checksum length", ec),
            ));
        }

        let body = rotate_left(&token.body, usize::from(token.rrc));
        let message_len = body
            .len()
            .checked_sub(ec)
            .ok_or_else(|| Error::new(ErrorKind::DefectiveToken, "Wrap token shorter than its checksum"))?;
        let (message, checksum) = body.split_at(message_len);

        let mut data_to_sign = message.to_vec();
        data_to_sign.extend_from_slice(&token.header_for_checksum());
        cipher.verify_checksum(key, auth.keys.verify_usage, &data_to_sign, checksum)?;

        message.to_vec()
    };

    auth.guard.enforce(token.seq_num)?;

    Ok((message, token.flags.contains(CfxFlags::SEALED)))
}

pub(crate) fn get_mic(auth: &mut AuthHandle, message: &[u8]) -> Result<Vec<u8>> {
    let mut token = CfxMicToken::new(emission_flags(auth), auth.local_seq);

    let mut data_to_sign = message.to_vec();
    data_to_sign.extend_from_slice(&token.header());

    token.checksum = auth
        .keys
        .cipher
        .checksum(auth.keys.key.as_ref(), auth.keys.sign_usage, &data_to_sign)?;

    auth.commit_seq();

    Ok(token.encode())
}

pub(crate) fn verify_mic(auth: &mut AuthHandle, message: &[u8], raw: &[u8]) -> Result<SequenceOutcome> {
    let token = CfxMicToken::decode(raw)?;
    check_direction(auth, token.flags)?;

    if token.flags.contains(CfxFlags::SEALED) {
        return Err(Error::new(ErrorKind::DefectiveToken, "the Sealed flag must not be set in MIC tokens"));
    }

    let mut data_to_sign = message.to_vec();
    data_to_sign.extend_from_slice(&token.header());

    auth.keys.cipher.verify_checksum(
        auth.keys.key.as_ref(),
        auth.keys.verify_usage,
        &data_to_sign,
        &token.checksum,
    )?;

    auth.guard.enforce(token.seq_num)
}

pub(crate) fn wrap_size_limit(auth: &AuthHandle, conf: bool, desired: usize) -> usize {
    let header_len = CfxWrapToken::header_len();

    let overhead = if conf {
        // outer header, embedded header copy, and the cipher expansion
        header_len * 2 + auth.keys.cipher.seal_overhead()
    } else {
        header_len + auth.keys.cipher.checksum_len()
    };

    desired.saturating_sub(overhead)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use crate::crypto::KeyClass;
    use crate::test_data;
    use crate::wire::wrap::rotate_right;
    use crate::wire::CfxWrapToken;
    use crate::ErrorKind;

    #[test]
    fn wrap_round_trip_both_modes() {
        let mut initiator = test_data::fake_initiator_auth(KeyClass::Cfx);
        let mut acceptor = test_data::fake_acceptor_auth(KeyClass::Cfx);

        for conf in [true, false] {
            let token = initiator.wrap(conf, b"cfx payload").unwrap();
            let (message, sealed) = acceptor.unwrap_token(&token).unwrap();

            assert_eq!(message, b"cfx payload");
            assert_eq!(sealed, conf);
        }
    }

    #[test]
    fn mic_round_trip() {
        let mut initiator = test_data::fake_initiator_auth(KeyClass::Cfx);
        let mut acceptor = test_data::fake_acceptor_auth(KeyClass::Cfx);

        let token = initiator.get_mic(b"signed message").unwrap();
        acceptor.verify_mic(b"signed message", &token).unwrap();

        let err = acceptor.verify_mic(b"other message", &token).unwrap_err();
        assert_eq!(err.error_type, ErrorKind::BadMic);
    }

    #[test]
    fn rotated_token_still_unwraps() {
        let mut initiator = test_data::fake_initiator_auth(KeyClass::Cfx);
        let mut acceptor = test_data::fake_acceptor_auth(KeyClass::Cfx);

        let raw = initiator.wrap(true, b"rotated payload").unwrap();
        let mut token = CfxWrapToken::decode(&raw).unwrap();
        token.rrc = 28;
        token.body = rotate_right(&token.body, 28);

        let (message, _) = acceptor.unwrap_token(&token.encode()).unwrap();
        assert_eq!(message, b"rotated payload");
    }

    #[test]
    fn tampered_sealed_token_is_bad_mic() {
        let mut initiator = test_data::fake_initiator_auth(KeyClass::Cfx);
        let mut acceptor = test_data::fake_acceptor_auth(KeyClass::Cfx);

        let mut token = initiator.wrap(true, b"payload").unwrap();
        let position = token.len() - 1;
        token[position] ^= 0x40;

        let err = acceptor.unwrap_token(&token).unwrap_err();
        assert_eq!(err.error_type, ErrorKind::BadMic);
    }

    #[test]
    fn replayed_token_is_duplicate() {
        let mut initiator = test_data::fake_initiator_auth(KeyClass::Cfx);
        let mut acceptor = test_data::fake_acceptor_auth(KeyClass::Cfx);

        let token = initiator.wrap(true, b"payload").unwrap();
        acceptor.unwrap_token(&token).unwrap();

        let err = acceptor.unwrap_token(&token).unwrap_err();
        assert_eq!(err.error_type, ErrorKind::DuplicateToken);
    }

    #[test]
    fn own_token_fed_back_is_defective() {
        let mut acceptor = test_data::fake_acceptor_auth(KeyClass::Cfx);

        let token = acceptor.wrap(true, b"payload").unwrap();
        let err = acceptor.unwrap_token(&token).unwrap_err();

        assert_eq!(err.error_type, ErrorKind::DefectiveToken);
    }

    #[test]
    fn failed_wrap_does_not_advance_the_counter() {
        let mut acceptor = test_data::fake_acceptor_auth(KeyClass::Cfx);
        acceptor.keys.cipher = std::sync::Arc::new(test_data::FailingCipher);

        let before = acceptor.local_seq;
        acceptor.wrap(true, b"payload").unwrap_err();
        assert_eq!(acceptor.local_seq, before);
    }

    #[test]
    fn wrap_size_limit_is_exact_at_the_boundary() {
        let auth = test_data::fake_acceptor_auth(KeyClass::Cfx);
        let mut produced = test_data::fake_acceptor_auth(KeyClass::Cfx);

        for conf in [true, false] {
            for desired in [100_usize, 256] {
                let limit = auth.wrap_size_limit(conf, desired);
                assert!(limit > 0, "conf {} desired {}", conf, desired);

                let token = produced.wrap(conf, &vec![0x11; limit]).unwrap();
                assert!(token.len() <= desired, "conf {} desired {}: token {}", conf, desired, token.len());

                let over = produced.wrap(conf, &vec![0x11; limit + 1]).unwrap();
                assert!(over.len() > desired, "conf {} desired {}: token {}", conf, desired, over.len());
            }
        }
    }

    proptest! {
        #[test]
        fn wrap_round_trips_arbitrary_messages(message in proptest::collection::vec(any::<u8>(), 0..512), conf in any::<bool>()) {
            let mut initiator = test_data::fake_initiator_auth(KeyClass::Cfx);
            let mut acceptor = test_data::fake_acceptor_auth(KeyClass::Cfx);

            let token = initiator.wrap(conf, &message).unwrap();
            let (opened, sealed) = acceptor.unwrap_token(&token).unwrap();

            prop_assert_eq!(opened, message);
            prop_assert_eq!(sealed, conf);
        }
    }
}
