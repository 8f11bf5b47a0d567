//! Pre-CFX (RFC 1964 style) per-message tokens for the DES, 3DES and RC4
//! families. The frames travel inside the mechanism envelope and carry
//! 4-byte sequence numbers.

use crate::crypto::KeyClass;
use crate::protect::{rc4, AuthHandle};
use crate::sequence::SequenceOutcome;
use crate::wire::legacy::{
    LegacyMicToken, LegacyWrapToken, SequenceBlock, SEAL_ALG_DES, SEAL_ALG_DES3, SEAL_ALG_NONE, SEAL_ALG_RC4,
    SGN_ALG_DES_MAC_MD5, SGN_ALG_HMAC_MD5_RC4, SGN_ALG_HMAC_SHA1_DES3,
};
use crate::wire::{MechEnvelope, TOKEN_ID_MIC_1964, TOKEN_ID_WRAP_1964};
use crate::{Error, ErrorKind, Result};

struct FamilyAlgs {
    sgn_alg: u16,
    seal_alg: u16,
}

fn family_algs(class: KeyClass) -> Result<FamilyAlgs> {
    match class {
        KeyClass::Des => Ok(FamilyAlgs {
            sgn_alg: SGN_ALG_DES_MAC_MD5,
            seal_alg: SEAL_ALG_DES,
        }),
        KeyClass::TripleDes => Ok(FamilyAlgs {
            sgn_alg: SGN_ALG_HMAC_SHA1_DES3,
            seal_alg: SEAL_ALG_DES3,
        }),
        KeyClass::Rc4 => Ok(FamilyAlgs {
            sgn_alg: SGN_ALG_HMAC_MD5_RC4,
            seal_alg: SEAL_ALG_RC4,
        }),
        KeyClass::Cfx => Err(Error::new(
            ErrorKind::Failure,
            "CFX keys cannot produce pre-CFX token frames",
        )),
    }
}

/// Checksum input: the signed region of the frame plus the message. The
/// divergent old 3DES layout reverses the concatenation order.
fn checksum_input(header: &[u8; 8], seq_block: &[u8; 8], message: &[u8], reversed: bool) -> Vec<u8> {
    let mut data = Vec::with_capacity(16 + message.len());

    if reversed {
        data.extend_from_slice(message);
        data.extend_from_slice(seq_block);
        data.extend_from_slice(header);
    } else {
        data.extend_from_slice(header);
        data.extend_from_slice(seq_block);
        data.extend_from_slice(message);
    }

    data
}

fn seal_body(auth: &AuthHandle, seq: u32, plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = auth.keys.cipher.as_ref();
    let key = auth.keys.key.as_ref();

    if auth.keys.key_class == KeyClass::Rc4 {
        rc4::seal(cipher, key, auth.keys.encrypt_usage, seq, plaintext)
    } else {
        cipher.seal(key, auth.keys.encrypt_usage, plaintext)
    }
}

fn unseal_body(auth: &AuthHandle, seq: u32, data: &[u8]) -> Result<Vec<u8>> {
    let cipher = auth.keys.cipher.as_ref();
    let key = auth.keys.key.as_ref();

    if auth.keys.key_class == KeyClass::Rc4 {
        rc4::unseal(cipher, key, auth.keys.decrypt_usage, seq, data)
    } else {
        cipher.unseal(key, auth.keys.decrypt_usage, data)
    }
}

pub(crate) fn wrap(auth: &mut AuthHandle, conf: bool, plaintext: &[u8]) -> Result<Vec<u8>> {
    let algs = family_algs(auth.keys.key_class)?;
    let seq = auth.local_seq as u32;

    let mut token = LegacyWrapToken {
        sgn_alg: algs.sgn_alg,
        seal_alg: if conf { algs.seal_alg } else { SEAL_ALG_NONE },
        seq: SequenceBlock {
            seq,
            from_acceptor: auth.acceptor_role,
        },
        checksum: Vec::new(),
        body: Vec::new(),
    };

    // the checksum binds the plaintext, not the sealed body
    let data_to_sign = checksum_input(&token.header(), &token.seq.encode(), plaintext, false);
    token.checksum = auth
        .keys
        .cipher
        .checksum(auth.keys.key.as_ref(), auth.keys.sign_usage, &data_to_sign)?;

    token.body = if conf {
        seal_body(auth, seq, plaintext)?
    } else {
        plaintext.to_vec()
    };

    auth.commit_seq();

    Ok(MechEnvelope::encode(TOKEN_ID_WRAP_1964, &token.encode()))
}

pub(crate) fn unwrap(auth: &mut AuthHandle, body: &[u8]) -> Result<(Vec<u8>, bool)> {
    let algs = family_algs(auth.keys.key_class)?;
    let token = LegacyWrapToken::decode(body, auth.keys.cipher.checksum_len())?;

    if token.sgn_alg != algs.sgn_alg {
        return Err(Error::new(
            ErrorKind::DefectiveToken,
            format!("Wrap token signing algorithm {:#06x} does not match the context family", token.sgn_alg),
        ));
    }

    let conf = match token.seal_alg {
        SEAL_ALG_NONE => false,
        alg if alg == algs.seal_alg => true,
        alg => {
            return Err(Error::new(
                ErrorKind::DefectiveToken,
                format!("Wrap token sealing algorithm {:#06x} does not match the context family", alg),
            ))
        }
    };

    if token.seq.from_acceptor == auth.acceptor_role {
        return Err(Error::new(
            ErrorKind::DefectiveToken,
            "Wrap token direction indicator names our own role",
        ));
    }

    let plaintext = if conf {
        unseal_body(auth, token.seq.seq, &token.body)?
    } else {
        token.body.clone()
    };

    let data_to_sign = checksum_input(&token.header(), &token.seq.encode(), &plaintext, false);
    auth.keys.cipher.verify_checksum(
        auth.keys.key.as_ref(),
        auth.keys.verify_usage,
        &data_to_sign,
        &token.checksum,
    )?;

    auth.guard.enforce(u64::from(token.seq.seq))?;

    Ok((plaintext, conf))
}

pub(crate) fn get_mic(auth: &mut AuthHandle, message: &[u8]) -> Result<Vec<u8>> {
    let algs = family_algs(auth.keys.key_class)?;
    let reversed = auth.old_des3_mic && auth.keys.key_class == KeyClass::TripleDes;

    let mut token = LegacyMicToken {
        sgn_alg: algs.sgn_alg,
        seq: SequenceBlock {
            seq: auth.local_seq as u32,
            from_acceptor: auth.acceptor_role,
        },
        checksum: Vec::new(),
    };

    let data_to_sign = checksum_input(&token.header(), &token.seq.encode(), message, reversed);
    token.checksum = auth
        .keys
        .cipher
        .checksum(auth.keys.key.as_ref(), auth.keys.sign_usage, &data_to_sign)?;

    auth.commit_seq();

    Ok(MechEnvelope::encode(TOKEN_ID_MIC_1964, &token.encode()))
}

pub(crate) fn verify_mic(auth: &mut AuthHandle, message: &[u8], body: &[u8]) -> Result<SequenceOutcome> {
    let algs = family_algs(auth.keys.key_class)?;
    let token = LegacyMicToken::decode(body)?;

    if token.sgn_alg != algs.sgn_alg {
        return Err(Error::new(
            ErrorKind::DefectiveToken,
            format!("MIC token signing algorithm {:#06x} does not match the context family", token.sgn_alg),
        ));
    }

    if token.seq.from_acceptor == auth.acceptor_role {
        return Err(Error::new(
            ErrorKind::DefectiveToken,
            "MIC token direction indicator names our own role",
        ));
    }

    let key = auth.keys.key.as_ref();
    let standard = checksum_input(&token.header(), &token.seq.encode(), message, false);
    let calculated = auth.keys.cipher.checksum(key, auth.keys.verify_usage, &standard)?;

    if calculated != token.checksum {
        // peers with the divergent 3DES layout are always accepted
        let verified_reversed = auth.keys.key_class == KeyClass::TripleDes && {
            let reversed = checksum_input(&token.header(), &token.seq.encode(), message, true);
            auth.keys.cipher.checksum(key, auth.keys.verify_usage, &reversed)? == token.checksum
        };

        if !verified_reversed {
            return Err(Error::new(ErrorKind::BadMic, "MIC token checksum does not match the calculated one"));
        }
    }

    auth.guard.enforce(u64::from(token.seq.seq))
}

pub(crate) fn wrap_size_limit(auth: &AuthHandle, conf: bool, desired: usize) -> usize {
    let checksum_len = auth.keys.cipher.checksum_len();
    let seal_overhead = if conf { auth.keys.cipher.seal_overhead() } else { 0 };

    // algorithm ids, filler and sequence block; the token id is counted by
    // the envelope
    let frame_fixed = 14 + checksum_len;
    let token_len = |message_len: usize| MechEnvelope::encoded_len(frame_fixed + message_len + seal_overhead);

    let mut limit = desired.saturating_sub(token_len(0));
    while limit > 0 && token_len(limit) > desired {
        limit -= 1;
    }

    limit
}
