//! RFC 1964 section 1.2 token frames, shared by the DES, 3DES and RC4
//! families. Algorithm identifiers are 2-byte little-endian values; the
//! sequence block is the 4-byte little-endian number followed by 4 direction
//! bytes (0x00 from the initiator, 0xff from the acceptor).

use std::io::Read;

use byteorder::{LittleEndian, ReadBytesExt};

use crate::wire::{TOKEN_ID_MIC_1964, TOKEN_ID_WRAP_1964};
use crate::{Error, ErrorKind, Result};

pub const SGN_ALG_DES_MAC_MD5: u16 = 0x0000;
pub const SGN_ALG_HMAC_SHA1_DES3: u16 = 0x0004;
pub const SGN_ALG_HMAC_MD5_RC4: u16 = 0x0011;

pub const SEAL_ALG_NONE: u16 = 0xffff;
pub const SEAL_ALG_DES: u16 = 0x0000;
pub const SEAL_ALG_DES3: u16 = 0x0002;
pub const SEAL_ALG_RC4: u16 = 0x0010;

const FILLER: u8 = 0xff;
const DIRECTION_INITIATOR: [u8; 4] = [0x00; 4];
const DIRECTION_ACCEPTOR: [u8; 4] = [0xff; 4];

/// Sequence block: number plus direction indicator.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SequenceBlock {
    pub seq: u32,
    pub from_acceptor: bool,
}

impl SequenceBlock {
    pub fn encode(&self) -> [u8; 8] {
        let mut block = [0; 8];

        block[0..4].copy_from_slice(&self.seq.to_le_bytes());
        block[4..8].copy_from_slice(if self.from_acceptor {
            &DIRECTION_ACCEPTOR
        } else {
            &DIRECTION_INITIATOR
        });

        block
    }

    fn decode(block: [u8; 8]) -> Result<Self> {
        let seq = u32::from_le_bytes(block[0..4].try_into().unwrap());

        let direction: [u8; 4] = block[4..8].try_into().unwrap();
        let from_acceptor = match direction {
            DIRECTION_ACCEPTOR => true,
            DIRECTION_INITIATOR => false,
            _ => {
                return Err(Error::new(
                    ErrorKind::DefectiveToken,
                    "invalid direction indicator in the token sequence block",
                ))
            }
        };

        Ok(Self { seq, from_acceptor })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyMicToken {
    pub sgn_alg: u16,
    pub seq: SequenceBlock,
    pub checksum: Vec<u8>,
}

impl LegacyMicToken {
    /// Token id, algorithm and filler bytes. Checksums cover these.
    pub fn header(&self) -> [u8; 8] {
        let mut header = [FILLER; 8];

        header[0..2].copy_from_slice(&TOKEN_ID_MIC_1964);
        header[2..4].copy_from_slice(&self.sgn_alg.to_le_bytes());

        header
    }

    /// Encodes the frame without the mechanism envelope.
    pub fn encode(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(16 + self.checksum.len());

        data.extend_from_slice(&self.header()[2..]);
        data.extend_from_slice(&self.seq.encode());
        data.extend_from_slice(&self.checksum);

        data
    }

    /// Decodes the frame body that follows the token id in the envelope.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut reader = data;

        if reader.len() < 14 {
            return Err(Error::new(
                ErrorKind::DefectiveToken,
                format!("MIC token frame is {} bytes, shorter than its fixed part", data.len()),
            ));
        }

        let sgn_alg = reader.read_u16::<LittleEndian>()?;

        let mut filler = [0; 4];
        reader.read_exact(&mut filler)?;
        if filler != [FILLER; 4] {
            return Err(Error::new(ErrorKind::DefectiveToken, "invalid MIC token filler"));
        }

        let mut block = [0; 8];
        reader.read_exact(&mut block)?;
        let seq = SequenceBlock::decode(block)?;

        Ok(Self {
            sgn_alg,
            seq,
            checksum: reader.to_vec(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyWrapToken {
    pub sgn_alg: u16,
    pub seal_alg: u16,
    pub seq: SequenceBlock,
    pub checksum: Vec<u8>,
    pub body: Vec<u8>,
}

impl LegacyWrapToken {
    pub fn header(&self) -> [u8; 8] {
        let mut header = [FILLER; 8];

        header[0..2].copy_from_slice(&TOKEN_ID_WRAP_1964);
        header[2..4].copy_from_slice(&self.sgn_alg.to_le_bytes());
        header[4..6].copy_from_slice(&self.seal_alg.to_le_bytes());

        header
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(16 + self.checksum.len() + self.body.len());

        data.extend_from_slice(&self.header()[2..]);
        data.extend_from_slice(&self.seq.encode());
        data.extend_from_slice(&self.checksum);
        data.extend_from_slice(&self.body);

        data
    }

    /// Decodes the frame body that follows the token id in the envelope.
    /// `checksum_len` is dictated by the negotiated signing algorithm.
    pub fn decode(data: &[u8], checksum_len: usize) -> Result<Self> {
        let mut reader = data;

        if reader.len() < 14 + checksum_len {
            return Err(Error::new(
                ErrorKind::DefectiveToken,
                format!("Wrap token frame is {} bytes, shorter than its fixed part", data.len()),
            ));
        }

        let sgn_alg = reader.read_u16::<LittleEndian>()?;
        let seal_alg = reader.read_u16::<LittleEndian>()?;

        let mut filler = [0; 2];
        reader.read_exact(&mut filler)?;
        if filler != [FILLER; 2] {
            return Err(Error::new(ErrorKind::DefectiveToken, "invalid Wrap token filler"));
        }

        let mut block = [0; 8];
        reader.read_exact(&mut block)?;
        let seq = SequenceBlock::decode(block)?;

        let (checksum, body) = reader.split_at(checksum_len);

        Ok(Self {
            sgn_alg,
            seal_alg,
            seq,
            checksum: checksum.to_vec(),
            body: body.to_vec(),
        })
    }
}
