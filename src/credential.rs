use std::sync::Arc;

use oid::ObjectIdentifier;
use picky::oids;

use crate::keytab::{self, Keytab};
use crate::{Error, ErrorKind, Principal, Result, Secret};

/// Which side of an exchange a credential may serve.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CredentialUse {
    Accept,
    Initiate,
    Both,
}

/// Delegated credentials captured from the initiator's KRB-CRED blob.
///
/// The blob stays opaque: it is encrypted in the session key and meant to be
/// handed to a Kerberos client library, not consumed here.
#[derive(Debug, Clone)]
pub struct DelegatedCredential {
    pub client: Principal,
    pub krb_cred: Vec<u8>,
}

/// Acceptor credentials: who we are and which keys prove it.
///
/// `None` for the principal accepts tickets for any service present in the
/// keytab. An explicit key takes precedence over keytab lookup; with neither,
/// ticket decryption falls back to the process-wide default keytab.
#[derive(Debug, Clone)]
pub struct Credential {
    pub principal: Option<Principal>,
    pub explicit_key: Option<(i32, Secret<Vec<u8>>)>,
    pub keytab: Option<Arc<Keytab>>,
    pub mechs: Vec<ObjectIdentifier>,
    pub usage: CredentialUse,
}

impl Credential {
    pub fn for_acceptor(principal: Option<Principal>, keytab: Option<Arc<Keytab>>) -> Self {
        Self {
            principal,
            explicit_key: None,
            keytab,
            mechs: default_mechs(),
            usage: CredentialUse::Accept,
        }
    }

    pub fn with_explicit_key(principal: Principal, etype: i32, key: Secret<Vec<u8>>) -> Self {
        Self {
            principal: Some(principal),
            explicit_key: Some((etype, key)),
            keytab: None,
            mechs: default_mechs(),
            usage: CredentialUse::Accept,
        }
    }

    /// Finds the long-term key for the service the ticket is addressed to.
    /// Resolution order: explicit key, credential keytab, process default
    /// keytab.
    pub fn ticket_key(&self, server: &Principal, etype: i32) -> Result<Secret<Vec<u8>>> {
        if let Some(principal) = &self.principal {
            if principal != server {
                return Err(Error::new(
                    ErrorKind::NoCred,
                    format!("ticket is for {} but the credential holds keys for {}", server, principal),
                ));
            }
        }

        if let Some((key_etype, key)) = &self.explicit_key {
            if *key_etype == etype {
                return Ok(key.clone());
            }

            return Err(Error::new(
                ErrorKind::NoCred,
                format!("explicit key has etype {} but the ticket uses {}", key_etype, etype),
            ));
        }

        let keytab = self
            .keytab
            .clone()
            .or_else(keytab::default_keytab)
            .ok_or_else(|| Error::new(ErrorKind::NoCred, "no keytab available for the acceptor credential"))?;

        keytab
            .lookup(server, etype)
            .map(|entry| entry.key.clone())
            .ok_or_else(|| {
                Error::new(
                    ErrorKind::NoCred,
                    format!("no key for {} with etype {} in the keytab", server, etype),
                )
            })
    }

    pub fn supports_mech(&self, mech: &ObjectIdentifier) -> bool {
        self.mechs.iter().any(|supported| supported == mech)
    }

    pub fn can_accept(&self) -> bool {
        matches!(self.usage, CredentialUse::Accept | CredentialUse::Both)
    }
}

fn default_mechs() -> Vec<ObjectIdentifier> {
    vec![oids::ms_krb5(), oids::krb5(), oids::spnego()]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host_principal() -> Principal {
        Principal::parse("host/server.example.com@EXAMPLE.COM").unwrap()
    }

    #[test]
    fn explicit_key_takes_precedence() {
        let credential = Credential::with_explicit_key(host_principal(), 18, Secret::new(vec![9; 32]));

        let key = credential.ticket_key(&host_principal(), 18).unwrap();
        assert_eq!(key.as_ref(), &vec![9; 32]);

        let err = credential.ticket_key(&host_principal(), 17).unwrap_err();
        assert_eq!(err.error_type, ErrorKind::NoCred);
    }

    #[test]
    fn principal_mismatch_is_no_cred() {
        let credential = Credential::with_explicit_key(host_principal(), 18, Secret::new(vec![9; 32]));
        let other = Principal::parse("cifs/other.example.com@EXAMPLE.COM").unwrap();

        let err = credential.ticket_key(&other, 18).unwrap_err();
        assert_eq!(err.error_type, ErrorKind::NoCred);
    }

    #[test]
    fn usage_and_mech_set_gate_acceptance() {
        let mut credential = Credential::for_acceptor(Some(host_principal()), None);

        assert!(credential.can_accept());
        assert!(credential.supports_mech(&oids::krb5()));
        assert!(credential.supports_mech(&oids::ms_krb5()));
        assert!(!credential.supports_mech(&oids::ntlm_ssp()));

        credential.usage = CredentialUse::Initiate;
        assert!(!credential.can_accept());

        credential.mechs = vec![oids::spnego()];
        assert!(!credential.supports_mech(&oids::krb5()));
    }

    #[test]
    fn keytab_fallback() {
        let keytab = Keytab::new().with_entry(host_principal(), 18, 1, Secret::new(vec![4; 32]));
        let credential = Credential::for_acceptor(None, Some(Arc::new(keytab)));

        let key = credential.ticket_key(&host_principal(), 18).unwrap();
        assert_eq!(key.as_ref(), &vec![4; 32]);
    }
}
