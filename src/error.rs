use std::{error, fmt, io, result};

use num_derive::{FromPrimitive, ToPrimitive};
use picky_krb::crypto::KerberosCryptoError;

pub type Result<T> = result::Result<T, Error>;

/// Failure of a GSS-API operation.
///
/// `error_type` carries the mechanism-independent major status. The optional
/// `minor` code preserves what the underlying collaborator reported; it is
/// meant for logging and must never drive control flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    pub error_type: ErrorKind,
    pub description: String,
    pub minor: Option<String>,
}

/// GSS-API major status values.
///
/// Routine errors occupy bits 16..32, supplementary information bits 0..16,
/// matching the wire encoding of `OM_uint32` major status words.
#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u32)]
pub enum ErrorKind {
    DuplicateToken = 0x0000_0001,
    OldToken = 0x0000_0002,
    UnseqToken = 0x0000_0004,
    GapToken = 0x0000_0008,
    BadMech = 0x0001_0000,
    BadName = 0x0002_0000,
    BadBindings = 0x0004_0000,
    BadMic = 0x0006_0000,
    NoCred = 0x0007_0000,
    NoContext = 0x0008_0000,
    DefectiveToken = 0x0009_0000,
    DefectiveCredential = 0x000a_0000,
    ContextExpired = 0x000c_0000,
    Failure = 0x000d_0000,
}

impl Error {
    /// Allows to fill a new error easily, supplying it with a coherent description.
    pub fn new(error_type: ErrorKind, description: impl Into<String>) -> Self {
        Self {
            error_type,
            description: description.into(),
            minor: None,
        }
    }

    pub fn with_minor(error_type: ErrorKind, description: impl Into<String>, minor: impl fmt::Debug) -> Self {
        Self {
            error_type,
            description: description.into(),
            minor: Some(format!("{:?}", minor)),
        }
    }
}

impl error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.error_type, self.description)?;
        if let Some(minor) = &self.minor {
            write!(f, " (minor: {})", minor)?;
        }

        Ok(())
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::with_minor(ErrorKind::Failure, "IO error", err)
    }
}

impl From<rand::Error> for Error {
    fn from(err: rand::Error) -> Self {
        Self::with_minor(ErrorKind::Failure, "rand error", err)
    }
}

impl From<picky_asn1_der::Asn1DerError> for Error {
    fn from(err: picky_asn1_der::Asn1DerError) -> Self {
        Self::with_minor(ErrorKind::DefectiveToken, "ASN1 DER error", err)
    }
}

impl From<KerberosCryptoError> for Error {
    fn from(err: KerberosCryptoError) -> Self {
        match err {
            KerberosCryptoError::IntegrityCheck => {
                Self::with_minor(ErrorKind::BadMic, "Kerberos integrity check failed", err)
            }
            err => Self::with_minor(ErrorKind::Failure, "Kerberos crypto error", err),
        }
    }
}

impl From<std::str::Utf8Error> for Error {
    fn from(err: std::str::Utf8Error) -> Self {
        Self::with_minor(ErrorKind::Failure, "UTF-8 error", err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integrity_failure_maps_to_bad_mic() {
        let err = Error::from(KerberosCryptoError::IntegrityCheck);

        assert_eq!(err.error_type, ErrorKind::BadMic);
        assert!(err.minor.is_some());
    }

    #[test]
    fn display_includes_minor_code() {
        let err = Error::with_minor(ErrorKind::Failure, "decryption failed", "etype 18");

        let rendered = err.to_string();
        assert!(rendered.contains("decryption failed"));
        assert!(rendered.contains("etype 18"));
    }
}
