use md5::{Digest, Md5};

use crate::{Error, ErrorKind, Result};

// size of the fixed header of the caller-supplied bindings buffer
const CHANNEL_BINDINGS_HEADER_SIZE: usize = 32;

/// Caller-supplied channel bindings.
///
/// The byte form mirrors the classic bindings buffer: five `(type, length,
/// offset)` / `(length, offset)` little-endian descriptors followed by the
/// variable data they point at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelBindings {
    pub initiator_addr_type: u32,
    pub initiator: Vec<u8>,
    pub acceptor_addr_type: u32,
    pub acceptor: Vec<u8>,
    pub application_data: Vec<u8>,
}

impl ChannelBindings {
    pub fn from_bytes<T: AsRef<[u8]>>(data: T) -> Result<Self> {
        let data = data.as_ref();

        if data.len() < CHANNEL_BINDINGS_HEADER_SIZE {
            return Err(Error::new(
                ErrorKind::BadBindings,
                format!(
                    "invalid channel bindings buffer: buffer is too short: {}. minimum len: {}",
                    data.len(),
                    CHANNEL_BINDINGS_HEADER_SIZE,
                ),
            ));
        }

        let initiator_addr_type = u32::from_le_bytes(data[0..4].try_into().unwrap());
        let initiator = Self::read_field(data, 4, "initiator")?;

        let acceptor_addr_type = u32::from_le_bytes(data[12..16].try_into().unwrap());
        let acceptor = Self::read_field(data, 16, "acceptor")?;

        let application_data = Self::read_field(data, 24, "application data")?;

        Ok(Self {
            initiator_addr_type,
            initiator,
            acceptor_addr_type,
            acceptor,
            application_data,
        })
    }

    fn read_field(data: &[u8], descriptor_offset: usize, name: &str) -> Result<Vec<u8>> {
        let len = u32::from_le_bytes(data[descriptor_offset..descriptor_offset + 4].try_into().unwrap()) as usize;
        let offset = u32::from_le_bytes(data[descriptor_offset + 4..descriptor_offset + 8].try_into().unwrap()) as usize;

        if offset.checked_add(len).map_or(true, |end| end > data.len()) {
            return Err(Error::new(
                ErrorKind::BadBindings,
                format!(
                    "invalid channel bindings buffer: {} offset + len goes outside the buffer ({})",
                    name,
                    data.len()
                ),
            ));
        }

        Ok(if len > 0 { data[offset..offset + len].to_vec() } else { Vec::new() })
    }

    /// MD5 hash over the RFC 1964 section 4.1.1.2 serialization of the
    /// bindings. This is the value the initiator places in the Bnd field of
    /// the authenticator checksum.
    pub fn hash(&self) -> [u8; 16] {
        let mut context = Md5::new();

        context.update(self.initiator_addr_type.to_le_bytes());
        context.update((self.initiator.len() as u32).to_le_bytes());
        context.update(&self.initiator);
        context.update(self.acceptor_addr_type.to_le_bytes());
        context.update((self.acceptor.len() as u32).to_le_bytes());
        context.update(&self.acceptor);
        context.update((self.application_data.len() as u32).to_le_bytes());
        context.update(&self.application_data);

        context.finalize().into()
    }
}
