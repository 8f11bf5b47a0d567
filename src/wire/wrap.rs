//! RFC 4121 section 4.2.6.2 Wrap token codec and trailer rotation.

use std::io::Read;

use byteorder::{BigEndian, ReadBytesExt};

use crate::wire::{CfxFlags, TOKEN_ID_WRAP_CFX};
use crate::{Error, ErrorKind, Result};

const WRAP_FILLER: u8 = 0xff;
const HEADER_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CfxWrapToken {
    pub flags: CfxFlags,
    /// Extra count: pad length when sealed, checksum length otherwise.
    pub ec: u16,
    /// Right rotation count applied to the body.
    pub rrc: u16,
    pub seq_num: u64,
    pub body: Vec<u8>,
}

impl CfxWrapToken {
    pub fn new(flags: CfxFlags, ec: u16, seq_num: u64) -> Self {
        Self {
            flags,
            ec,
            rrc: 0,
            seq_num,
            body: Vec::new(),
        }
    }

    pub fn header_len() -> usize {
        HEADER_LEN
    }

    /// The 16 header bytes with RRC zeroed, as used inside checksums and as
    /// the copy embedded into the sealed payload.
    pub fn header_for_integrity(&self) -> [u8; HEADER_LEN] {
        let mut header = self.header();
        header[6..8].copy_from_slice(&0_u16.to_be_bytes());

        header
    }

    /// Header with both EC and RRC zeroed: the form covered by checksums of
    /// integrity-only tokens, which are computed before EC is known.
    pub fn header_for_checksum(&self) -> [u8; HEADER_LEN] {
        let mut header = self.header_for_integrity();
        header[4..6].copy_from_slice(&0_u16.to_be_bytes());

        header
    }

    pub fn header(&self) -> [u8; HEADER_LEN] {
        let mut header = [0; HEADER_LEN];

        header[0..2].copy_from_slice(&TOKEN_ID_WRAP_CFX);
        header[2] = self.flags.bits();
        header[3] = WRAP_FILLER;
        header[4..6].copy_from_slice(&self.ec.to_be_bytes());
        header[6..8].copy_from_slice(&self.rrc.to_be_bytes());
        header[8..16].copy_from_slice(&self.seq_num.to_be_bytes());

        header
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(HEADER_LEN + self.body.len());

        data.extend_from_slice(&self.header());
        data.extend_from_slice(&self.body);

        data
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut reader = data;

        if reader.len() < HEADER_LEN {
            return Err(Error::new(
                ErrorKind::DefectiveToken,
                format!("Wrap token is {} bytes, shorter than its header", data.len()),
            ));
        }

        let mut token_id = [0; 2];
        reader.read_exact(&mut token_id)?;
        if token_id != TOKEN_ID_WRAP_CFX {
            return Err(Error::new(ErrorKind::DefectiveToken, "invalid Wrap token id"));
        }

        let flags = CfxFlags::from_bits(reader.read_u8()?)
            .ok_or_else(|| Error::new(ErrorKind::DefectiveToken, "reserved bits set in Wrap token flags"))?;

        if reader.read_u8()? != WRAP_FILLER {
            return Err(Error::new(ErrorKind::DefectiveToken, "invalid Wrap token filler"));
        }

        let ec = reader.read_u16::<BigEndian>()?;
        let rrc = reader.read_u16::<BigEndian>()?;
        let seq_num = reader.read_u64::<BigEndian>()?;

        Ok(Self {
            flags,
            ec,
            rrc,
            seq_num,
            body: reader.to_vec(),
        })
    }
}

/// Rotates `body` right by `count` positions, reduced modulo the body length.
/// Pure: the input is untouched, peers may send any RRC value.
pub fn rotate_right(body: &[u8], count: usize) -> Vec<u8> {
    let mut rotated = body.to_vec();

    let len = rotated.len();
    if len > 0 {
        rotated.rotate_right(count % len);
    }

    rotated
}

pub fn rotate_left(body: &[u8], count: usize) -> Vec<u8> {
    let mut rotated = body.to_vec();

    let len = rotated.len();
    if len > 0 {
        rotated.rotate_left(count % len);
    }

    rotated
}
