//! RFC 4121 section 4.2.6.1 MIC token codec.

use std::io::Read;

use byteorder::{BigEndian, ReadBytesExt};

use crate::wire::{CfxFlags, TOKEN_ID_MIC_CFX};
use crate::{Error, ErrorKind, Result};

const MIC_FILLER: [u8; 5] = [0xff, 0xff, 0xff, 0xff, 0xff];
const HEADER_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CfxMicToken {
    pub flags: CfxFlags,
    pub seq_num: u64,
    pub checksum: Vec<u8>,
}

impl CfxMicToken {
    pub fn new(flags: CfxFlags, seq_num: u64) -> Self {
        Self {
            flags,
            seq_num,
            checksum: Vec::new(),
        }
    }

    pub fn header_len() -> usize {
        HEADER_LEN
    }

    /// The 16 header bytes. Checksums cover the message followed by these.
    pub fn header(&self) -> [u8; HEADER_LEN] {
        let mut header = [0; HEADER_LEN];

        header[0..2].copy_from_slice(&TOKEN_ID_MIC_CFX);
        header[2] = self.flags.bits();
        header[3..8].copy_from_slice(&MIC_FILLER);
        header[8..16].copy_from_slice(&self.seq_num.to_be_bytes());

        header
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(HEADER_LEN + self.checksum.len());

        data.extend_from_slice(&self.header());
        data.extend_from_slice(&self.checksum);

        data
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut reader = data;

        if reader.len() < HEADER_LEN {
            return Err(Error::new(
                ErrorKind::DefectiveToken,
                format!("MIC token is {} bytes, shorter than its header", data.len()),
            ));
        }

        let mut token_id = [0; 2];
        reader.read_exact(&mut token_id)?;
        if token_id != TOKEN_ID_MIC_CFX {
            return Err(Error::new(ErrorKind::DefectiveToken, "invalid MIC token id"));
        }

        let flags = CfxFlags::from_bits(reader.read_u8()?)
            .ok_or_else(|| Error::new(ErrorKind::DefectiveToken, "reserved bits set in MIC token flags"))?;

        let mut filler = [0; 5];
        reader.read_exact(&mut filler)?;
        if filler != MIC_FILLER {
            return Err(Error::new(ErrorKind::DefectiveToken, "invalid MIC token filler"));
        }

        let seq_num = reader.read_u64::<BigEndian>()?;

        Ok(Self {
            flags,
            seq_num,
            checksum: reader.to_vec(),
        })
    }
}
