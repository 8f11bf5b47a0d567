use std::fmt;
use std::sync::Arc;

use picky_krb::constants::key_usages::{ACCEPTOR_SEAL, ACCEPTOR_SIGN, INITIATOR_SEAL, INITIATOR_SIGN};
use picky_krb::crypto::CipherSuite;

use crate::{Error, ErrorKind, Result, Secret};

/// Key usage for legacy (pre-CFX) MIC checksums.
pub const LEGACY_SIGN_USAGE: i32 = 15;
/// Key usage for legacy Wrap sealing and its checksum.
pub const LEGACY_SEAL_USAGE: i32 = 13;

/// Token-format family implied by the context key's encryption type.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum KeyClass {
    Des,
    TripleDes,
    Rc4,
    /// Everything newer speaks the CFX token format.
    Cfx,
}

impl KeyClass {
    pub fn from_etype(etype: i32) -> Self {
        match etype {
            1 | 2 | 3 => KeyClass::Des,
            16 => KeyClass::TripleDes,
            23 | 24 => KeyClass::Rc4,
            _ => KeyClass::Cfx,
        }
    }

    pub fn is_legacy(self) -> bool {
        !matches!(self, KeyClass::Cfx)
    }
}

/// Cryptographic collaborator for per-message protection.
///
/// Implementations own confounder generation and integrity tagging; token
/// engines only see opaque sealed blobs and checksums.
pub trait MessageCipher: fmt::Debug + Send + Sync {
    /// Seals `payload` with integrity folded in.
    fn seal(&self, key: &[u8], usage: i32, payload: &[u8]) -> Result<Vec<u8>>;

    /// Inverse of [`MessageCipher::seal`]. Integrity failure is `BadMic`.
    fn unseal(&self, key: &[u8], usage: i32, data: &[u8]) -> Result<Vec<u8>>;

    fn checksum(&self, key: &[u8], usage: i32, data: &[u8]) -> Result<Vec<u8>>;

    fn verify_checksum(&self, key: &[u8], usage: i32, data: &[u8], expected: &[u8]) -> Result<()> {
        let calculated = self.checksum(key, usage, data)?;

        if calculated != expected {
            return Err(Error::new(ErrorKind::BadMic, "token checksum does not match the calculated one"));
        }

        Ok(())
    }

    fn checksum_len(&self) -> usize;

    /// Upper bound on bytes [`MessageCipher::seal`] adds on top of the
    /// payload (confounder, padding, integrity tag). Exact for stream and
    /// CTS ciphers.
    fn seal_overhead(&self) -> usize;

    /// Derives the per-token key for families that key each message off the
    /// sequence number. The default is the identity derivation.
    fn derive_message_key(&self, key: &[u8], _seq: u32) -> Result<Vec<u8>> {
        Ok(key.to_vec())
    }
}

/// [`MessageCipher`] backed by the Kerberos cipher suites (AES and 3DES).
#[derive(Debug, Clone)]
pub struct KrbCipher {
    suite: CipherSuite,
}

impl KrbCipher {
    pub fn new(suite: CipherSuite) -> Self {
        Self { suite }
    }

    /// Built-in cipher for the given encryption type. Single-DES and RC4
    /// have no built-in primitive and need an embedder-supplied
    /// [`MessageCipher`].
    pub fn for_etype(etype: i32) -> Result<Self> {
        let suite = CipherSuite::try_from(usize::try_from(etype).map_err(|_| {
            Error::new(ErrorKind::Failure, format!("negative encryption type: {}", etype))
        })?)
        .map_err(|err| Error::with_minor(ErrorKind::Failure, format!("unsupported encryption type: {}", etype), err))?;

        Ok(Self::new(suite))
    }

    pub fn suite(&self) -> &CipherSuite {
        &self.suite
    }
}

impl MessageCipher for KrbCipher {
    fn seal(&self, key: &[u8], usage: i32, payload: &[u8]) -> Result<Vec<u8>> {
        Ok(self.suite.cipher().encrypt(key, usage, payload)?)
    }

    fn unseal(&self, key: &[u8], usage: i32, data: &[u8]) -> Result<Vec<u8>> {
        Ok(self.suite.cipher().decrypt(key, usage, data)?)
    }

    fn checksum(&self, key: &[u8], usage: i32, data: &[u8]) -> Result<Vec<u8>> {
        Ok(self.suite.cipher().encryption_checksum(key, usage, data)?)
    }

    fn checksum_len(&self) -> usize {
        match self.suite {
            CipherSuite::Aes128CtsHmacSha196 | CipherSuite::Aes256CtsHmacSha196 => 12,
            CipherSuite::Des3CbcSha1Kd => 20,
        }
    }

    fn seal_overhead(&self) -> usize {
        match self.suite {
            // 16-byte confounder + truncated HMAC; CTS needs no padding
            CipherSuite::Aes128CtsHmacSha196 | CipherSuite::Aes256CtsHmacSha196 => 16 + 12,
            // 8-byte confounder + HMAC-SHA1 + worst-case block padding
            CipherSuite::Des3CbcSha1Kd => 8 + 20 + 8,
        }
    }
}

/// Key material and usages of an established context, acceptor side.
#[derive(Debug, Clone)]
pub struct ProtectionKeys {
    pub key: Secret<Vec<u8>>,
    pub etype: i32,
    pub key_class: KeyClass,
    pub cipher: Arc<dyn MessageCipher>,
    /// Usage for tokens we emit.
    pub encrypt_usage: i32,
    pub decrypt_usage: i32,
    pub sign_usage: i32,
    pub verify_usage: i32,
}

impl ProtectionKeys {
    /// Keys for the acceptor role with the built-in cipher for `etype`.
    pub fn acceptor(key: Secret<Vec<u8>>, etype: i32) -> Result<Self> {
        let cipher = Arc::new(KrbCipher::for_etype(etype)?);

        Ok(Self::acceptor_with_cipher(key, etype, cipher))
    }

    pub fn acceptor_with_cipher(key: Secret<Vec<u8>>, etype: i32, cipher: Arc<dyn MessageCipher>) -> Self {
        let key_class = KeyClass::from_etype(etype);

        let (encrypt_usage, decrypt_usage, sign_usage, verify_usage) = if key_class.is_legacy() {
            (LEGACY_SEAL_USAGE, LEGACY_SEAL_USAGE, LEGACY_SIGN_USAGE, LEGACY_SIGN_USAGE)
        } else {
            (ACCEPTOR_SEAL, INITIATOR_SEAL, ACCEPTOR_SIGN, INITIATOR_SIGN)
        };

        Self {
            key,
            etype,
            key_class,
            cipher,
            encrypt_usage,
            decrypt_usage,
            sign_usage,
            verify_usage,
        }
    }

    /// Mirror of [`ProtectionKeys::acceptor_with_cipher`] for the initiator
    /// role: same key, swapped usages.
    pub fn initiator_with_cipher(key: Secret<Vec<u8>>, etype: i32, cipher: Arc<dyn MessageCipher>) -> Self {
        let acceptor = Self::acceptor_with_cipher(key, etype, cipher);

        Self {
            encrypt_usage: acceptor.decrypt_usage,
            decrypt_usage: acceptor.encrypt_usage,
            sign_usage: acceptor.verify_usage,
            verify_usage: acceptor.sign_usage,
            ..acceptor
        }
    }
}
