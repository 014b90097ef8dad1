//! Qualified XML names

use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Name validation failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QNameError {
    #[error("'{0}' is not a valid XML name")]
    Invalid(String),

    #[error("no namespace bound to prefix '{0}'")]
    UnboundPrefix(String),
}

fn qname_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[\p{L}_][\p{L}\p{N}._\-]*(:[\p{L}_][\p{L}\p{N}._\-]*)?$")
            .unwrap_or_else(|e| panic!("static QName pattern: {e}"))
    })
}

/// Returns true if `name` is a lexically valid `prefix:local` or `local` name
pub fn is_valid_qname(name: &str) -> bool {
    qname_pattern().is_match(name)
}

/// An element or attribute name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QName {
    pub prefix: Option<String>,
    pub local: String,
    pub namespace: Option<String>,
}

impl QName {
    /// A name with no prefix and no namespace
    pub fn local(local: impl Into<String>) -> Self {
        Self {
            prefix: None,
            local: local.into(),
            namespace: None,
        }
    }

    /// Parse `prefix:local` and resolve the prefix against `namespaces`.
    ///
    /// An unprefixed name gets no namespace.
    pub fn parse(name: &str, namespaces: &BTreeMap<String, String>) -> Result<Self, QNameError> {
        if !is_valid_qname(name) {
            return Err(QNameError::Invalid(name.to_string()));
        }
        match name.split_once(':') {
            None => Ok(Self::local(name)),
            Some((prefix, local)) => {
                let namespace = namespaces
                    .get(prefix)
                    .ok_or_else(|| QNameError::UnboundPrefix(prefix.to_string()))?;
                Ok(Self {
                    prefix: Some(prefix.to_string()),
                    local: local.to_string(),
                    namespace: Some(namespace.clone()),
                })
            }
        }
    }

    /// Lexical form, `prefix:local` or `local`
    pub fn lexical(&self) -> String {
        self.to_string()
    }

    /// Compares namespace and local part, ignoring the prefix
    pub fn matches(&self, other: &QName) -> bool {
        self.local == other.local && self.namespace == other.namespace
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.prefix {
            Some(prefix) => write!(f, "{}:{}", prefix, self.local),
            None => f.write_str(&self.local),
        }
    }
}

impl From<&str> for QName {
    fn from(local: &str) -> Self {
        Self::local(local)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bindings() -> BTreeMap<String, String> {
        let mut ns = BTreeMap::new();
        ns.insert("x".to_string(), "urn:x".to_string());
        ns
    }

    #[test]
    fn test_valid_names() {
        assert!(is_valid_qname("a"));
        assert!(is_valid_qname("_a-b.c1"));
        assert!(is_valid_qname("x:item"));
        assert!(is_valid_qname("título"));
    }

    #[test]
    fn test_invalid_names() {
        assert!(!is_valid_qname(""));
        assert!(!is_valid_qname("1a"));
        assert!(!is_valid_qname("a b"));
        assert!(!is_valid_qname("x:"));
        assert!(!is_valid_qname("a:b:c"));
    }

    #[test]
    fn test_parse_resolves_prefix() {
        let name = QName::parse("x:item", &bindings()).unwrap();
        assert_eq!(name.prefix.as_deref(), Some("x"));
        assert_eq!(name.local, "item");
        assert_eq!(name.namespace.as_deref(), Some("urn:x"));
        assert_eq!(name.to_string(), "x:item");
    }

    #[test]
    fn test_parse_unbound_prefix() {
        let err = QName::parse("y:item", &bindings()).unwrap_err();
        assert_eq!(err, QNameError::UnboundPrefix("y".to_string()));
    }

    #[test]
    fn test_matches_ignores_prefix() {
        let a = QName::parse("x:item", &bindings()).unwrap();
        let mut b = a.clone();
        b.prefix = Some("other".to_string());
        assert!(a.matches(&b));
        assert_ne!(a, b);
    }
}
