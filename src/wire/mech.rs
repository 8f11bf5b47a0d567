//! RFC 2743 section 3.1 mechanism envelope: an `[APPLICATION 0]` wrapper
//! around the mechanism OID, a 2-byte token identifier, and the inner token.

use crate::{Error, ErrorKind, Result};

// DER-encoded OID TLVs, including tag and length
const KRB5_OID_DER: [u8; 11] = [0x06, 0x09, 0x2a, 0x86, 0x48, 0x86, 0xf7, 0x12, 0x01, 0x02, 0x02];
const MS_KRB5_OID_DER: [u8; 11] = [0x06, 0x09, 0x2a, 0x86, 0x48, 0x82, 0xf7, 0x12, 0x01, 0x02, 0x02];

/// Mechanism named by the envelope OID.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MechId {
    Krb5,
    /// 1.2.840.48018.1.2.2, the Microsoft alias. Wire-compatible with Krb5.
    MsKrb5,
}

#[derive(Debug, PartialEq, Eq)]
pub struct MechEnvelope<'a> {
    pub mech: MechId,
    pub token_id: [u8; 2],
    pub body: &'a [u8],
}

impl<'a> MechEnvelope<'a> {
    /// Total length of [`MechEnvelope::encode`] output for a body of
    /// `body_len` bytes.
    pub fn encoded_len(body_len: usize) -> usize {
        let inner_len = KRB5_OID_DER.len() + 2 + body_len;

        1 + der_len_size(inner_len) + inner_len
    }

    /// Wraps `body` into the envelope, naming the standard Kerberos OID.
    pub fn encode(token_id: [u8; 2], body: &[u8]) -> Vec<u8> {
        let inner_len = KRB5_OID_DER.len() + token_id.len() + body.len();

        let mut data = Vec::with_capacity(inner_len + 6);
        data.push(0x60);
        write_der_len(&mut data, inner_len);
        data.extend_from_slice(&KRB5_OID_DER);
        data.extend_from_slice(&token_id);
        data.extend_from_slice(body);

        data
    }

    pub fn decode(data: &'a [u8]) -> Result<Self> {
        let mut reader = data;

        if read_u8(&mut reader)? != 0x60 {
            return Err(Error::new(
                ErrorKind::DefectiveToken,
                "token does not start with the [APPLICATION 0] tag",
            ));
        }

        let inner_len = read_der_len(&mut reader)?;
        if inner_len != reader.len() {
            return Err(Error::new(
                ErrorKind::DefectiveToken,
                format!(
                    "envelope length {} does not match the remaining {} bytes",
                    inner_len,
                    reader.len()
                ),
            ));
        }

        let mech = if reader.starts_with(&KRB5_OID_DER) {
            MechId::Krb5
        } else if reader.starts_with(&MS_KRB5_OID_DER) {
            MechId::MsKrb5
        } else {
            return Err(Error::new(ErrorKind::BadMech, "token names an unsupported mechanism OID"));
        };
        reader = &reader[KRB5_OID_DER.len()..];

        if reader.len() < 2 {
            return Err(Error::new(ErrorKind::DefectiveToken, "token truncated before the token id"));
        }
        let token_id = [reader[0], reader[1]];

        Ok(Self {
            mech,
            token_id,
            body: &reader[2..],
        })
    }
}

fn read_u8(reader: &mut &[u8]) -> Result<u8> {
    let (&first, rest) = reader
        .split_first()
        .ok_or_else(|| Error::new(ErrorKind::DefectiveToken, "unexpected end of token"))?;
    *reader = rest;

    Ok(first)
}

fn der_len_size(len: usize) -> usize {
    if len < 0x80 {
        1
    } else {
        let bytes = len.to_be_bytes();
        1 + bytes.len() - bytes.iter().take_while(|&&b| b == 0).count()
    }
}

fn write_der_len(data: &mut Vec<u8>, len: usize) {
    if len < 0x80 {
        data.push(len as u8);
    } else {
        let bytes = len.to_be_bytes();
        let skip = bytes.iter().take_while(|&&b| b == 0).count();
        data.push(0x80 | (bytes.len() - skip) as u8);
        data.extend_from_slice(&bytes[skip..]);
    }
}

fn read_der_len(reader: &mut &[u8]) -> Result<usize> {
    let first = read_u8(reader)?;

    if first < 0x80 {
        return Ok(usize::from(first));
    }

    let count = usize::from(first & 0x7f);
    if count == 0 || count > 4 || count > reader.len() {
        return Err(Error::new(ErrorKind::DefectiveToken, "unsupported or truncated DER length"));
    }

    let mut len = 0_usize;
    for _ in 0..count {
        len = (len << 8) | usize::from(read_u8(reader)?);
    }

    Ok(len)
}
