use std::sync::{Arc, RwLock};

use crate::{Principal, Secret};

/// One long-term key of one service principal.
#[derive(Debug, Clone)]
pub struct KeytabEntry {
    pub principal: Principal,
    pub etype: i32,
    pub kvno: u32,
    pub key: Secret<Vec<u8>>,
}

/// In-memory set of service keys.
///
/// Lookup is by principal and encryption type; when several key versions are
/// present the highest kvno wins.
#[derive(Debug, Clone, Default)]
pub struct Keytab {
    entries: Vec<KeytabEntry>,
}

impl Keytab {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, principal: Principal, etype: i32, kvno: u32, key: Secret<Vec<u8>>) -> Self {
        self.entries.push(KeytabEntry {
            principal,
            etype,
            kvno,
            key,
        });
        self
    }

    pub fn add_entry(&mut self, entry: KeytabEntry) {
        self.entries.push(entry);
    }

    pub fn lookup(&self, principal: &Principal, etype: i32) -> Option<&KeytabEntry> {
        self.entries
            .iter()
            .filter(|entry| entry.etype == etype && entry.principal == *principal)
            .max_by_key(|entry| entry.kvno)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

static DEFAULT_KEYTAB: RwLock<Option<Arc<Keytab>>> = RwLock::new(None);

/// Returns the process-wide default keytab, if one has been installed.
pub fn default_keytab() -> Option<Arc<Keytab>> {
    DEFAULT_KEYTAB.read().expect("default keytab lock poisoned").clone()
}

/// Atomically replaces the process-wide default keytab. Acceptors that are
/// mid-establishment keep the snapshot they already took.
pub fn install_default_keytab(keytab: Option<Arc<Keytab>>) {
    *DEFAULT_KEYTAB.write().expect("default keytab lock poisoned") = keytab;
}
