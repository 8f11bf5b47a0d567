//! Byte-level codecs for the tokens this mechanism puts on the wire.
//!
//! Everything here parses untrusted input: lengths are validated before any
//! slicing and malformed structure surfaces as `DefectiveToken`.

pub mod legacy;
pub mod mech;
pub mod mic;
pub mod wrap;

use bitflags::bitflags;

pub use self::mech::{MechEnvelope, MechId};
pub use self::mic::CfxMicToken;
pub use self::wrap::CfxWrapToken;

pub const TOKEN_ID_AP_REQ: [u8; 2] = [0x01, 0x00];
pub const TOKEN_ID_AP_REP: [u8; 2] = [0x02, 0x00];
pub const TOKEN_ID_KRB_ERROR: [u8; 2] = [0x03, 0x00];
pub const TOKEN_ID_MIC_1964: [u8; 2] = [0x01, 0x01];
pub const TOKEN_ID_WRAP_1964: [u8; 2] = [0x02, 0x01];
pub const TOKEN_ID_MIC_CFX: [u8; 2] = [0x04, 0x04];
pub const TOKEN_ID_WRAP_CFX: [u8; 2] = [0x05, 0x04];

bitflags! {
    /// Flags octet of CFX MIC and Wrap tokens.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct CfxFlags: u8 {
        const SENT_BY_ACCEPTOR = 0b001;
        const SEALED = 0b010;
        const ACCEPTOR_SUBKEY = 0b100;
    }
}
