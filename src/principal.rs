use std::fmt;

use crate::{Error, ErrorKind, Result};

/// Kerberos principal name: one or more name components plus a realm.
///
/// Rendered in the usual `comp1/comp2@REALM` form. Component comparison is
/// exact and case-sensitive; realms compare case-sensitively as well, which
/// matches how the KDC issued them in the ticket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    components: Vec<String>,
    realm: String,
}

impl Principal {
    pub fn new(components: Vec<String>, realm: impl Into<String>) -> Result<Self> {
        if components.is_empty() || components.iter().any(|c| c.is_empty()) {
            return Err(Error::new(
                ErrorKind::BadName,
                "principal must have at least one non-empty component",
            ));
        }

        Ok(Self {
            components,
            realm: realm.into(),
        })
    }

    /// Parses the textual `comp1/comp2@REALM` form. The realm part is
    /// required; unquoted '/' separates components.
    pub fn parse(name: &str) -> Result<Self> {
        let (name, realm) = name
            .rsplit_once('@')
            .ok_or_else(|| Error::new(ErrorKind::BadName, format!("principal {:?} has no realm", name)))?;

        if realm.is_empty() {
            return Err(Error::new(ErrorKind::BadName, format!("principal {:?} has empty realm", name)));
        }

        Self::new(name.split('/').map(ToOwned::to_owned).collect(), realm)
    }

    pub fn components(&self) -> &[String] {
        &self.components
    }

    pub fn realm(&self) -> &str {
        &self.realm
    }

    /// Matches this principal against a `comp1/comp2@REALM` pattern where any
    /// component (or the realm) may be the `*` wildcard. The wildcard covers
    /// exactly one component; component counts must agree.
    pub fn matches_pattern(&self, pattern: &str) -> Result<bool> {
        let (name, realm) = pattern
            .rsplit_once('@')
            .ok_or_else(|| Error::new(ErrorKind::Failure, format!("malformed principal pattern {:?}: no realm", pattern)))?;

        if realm.is_empty() || name.is_empty() {
            return Err(Error::new(
                ErrorKind::Failure,
                format!("malformed principal pattern {:?}: empty part", pattern),
            ));
        }

        let components: Vec<&str> = name.split('/').collect();
        if components.iter().any(|c| c.is_empty()) {
            return Err(Error::new(
                ErrorKind::Failure,
                format!("malformed principal pattern {:?}: empty component", pattern),
            ));
        }

        if realm != "*" && realm != self.realm {
            return Ok(false);
        }

        if components.len() != self.components.len() {
            return Ok(false);
        }

        Ok(components
            .iter()
            .zip(self.components.iter())
            .all(|(pattern, component)| *pattern == "*" || *pattern == component.as_str()))
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.components.join("/"), self.realm)
    }
}
