use crate::{Principal, Result};

/// Compatibility behaviors that can be toggled per peer.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CompatPolicy {
    /// Generate 3DES MIC tokens in the divergent legacy layout.
    OldDes3Mic,
    /// Require a mechListMIC exchange even for mechanisms that do not
    /// mandate one.
    RequireMechListMic,
}

#[derive(Debug, Clone)]
pub struct PolicyEntry {
    pub policy: CompatPolicy,
    /// `comp1/comp2@REALM` pattern; `*` matches any single component or the
    /// realm.
    pub pattern: String,
    pub value: bool,
}

/// Resolves compatibility policies against the authenticated peer name.
///
/// Entries are consulted in insertion order; the first entry whose pattern
/// matches wins. A resolver with no matching entry yields the caller-supplied
/// default. Contexts cache the resolution at establishment so per-message
/// operations never consult the resolver again.
#[derive(Debug, Clone, Default)]
pub struct PolicyResolver {
    entries: Vec<PolicyEntry>,
}

impl PolicyResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, policy: CompatPolicy, pattern: impl Into<String>, value: bool) -> Self {
        self.entries.push(PolicyEntry {
            policy,
            pattern: pattern.into(),
            value,
        });
        self
    }

    pub fn resolve(&self, peer: &Principal, policy: CompatPolicy, default: bool) -> Result<bool> {
        for entry in self.entries.iter().filter(|entry| entry.policy == policy) {
            if peer.matches_pattern(&entry.pattern)? {
                debug!(?policy, peer = %peer, pattern = entry.pattern, value = entry.value, "compat policy matched");

                return Ok(entry.value);
            }
        }

        Ok(default)
    }
}
