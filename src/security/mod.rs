//! Permission checks
//!
//! The engine asks one question per target node: does the invoking subject
//! hold WRITE on the owning document?

use std::collections::BTreeMap;
use std::fmt;

use crate::dom::DocumentId;

/// The invoking user
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Subject {
    name: String,
}

impl Subject {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Internal maintenance subject
    pub fn system() -> Self {
        Self::new("SYSTEM")
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Permission {
    Read,
    Write,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::Read => "READ",
            Permission::Write => "WRITE",
        }
    }
}

/// Permission collaborator
pub trait PermissionService: Send + Sync {
    fn validate(&self, subject: &Subject, permission: Permission, doc: DocumentId) -> bool;
}

/// Explicit per-(subject, document) rules over a default decision.
/// A denial wins over a grant for the same key.
#[derive(Debug, Clone)]
pub struct PermissionTable {
    allow_by_default: bool,
    grants: BTreeMap<(String, DocumentId), Vec<Permission>>,
    denials: BTreeMap<(String, DocumentId), Vec<Permission>>,
}

impl PermissionTable {
    /// Everything allowed unless denied
    pub fn allow_all() -> Self {
        Self {
            allow_by_default: true,
            grants: BTreeMap::new(),
            denials: BTreeMap::new(),
        }
    }

    /// Everything denied unless granted
    pub fn deny_all() -> Self {
        Self {
            allow_by_default: false,
            ..Self::allow_all()
        }
    }

    pub fn grant(mut self, subject: &Subject, permission: Permission, doc: DocumentId) -> Self {
        self.grants
            .entry((subject.name().to_string(), doc))
            .or_default()
            .push(permission);
        self
    }

    pub fn deny(mut self, subject: &Subject, permission: Permission, doc: DocumentId) -> Self {
        self.denials
            .entry((subject.name().to_string(), doc))
            .or_default()
            .push(permission);
        self
    }
}

impl Default for PermissionTable {
    fn default() -> Self {
        Self::allow_all()
    }
}

impl PermissionService for PermissionTable {
    fn validate(&self, subject: &Subject, permission: Permission, doc: DocumentId) -> bool {
        if *subject == Subject::system() {
            return true;
        }
        let key = (subject.name().to_string(), doc);
        if self
            .denials
            .get(&key)
            .is_some_and(|perms| perms.contains(&permission))
        {
            return false;
        }
        if self
            .grants
            .get(&key)
            .is_some_and(|perms| perms.contains(&permission))
        {
            return true;
        }
        self.allow_by_default
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_all_with_denial() {
        let alice = Subject::new("alice");
        let table = PermissionTable::allow_all().deny(&alice, Permission::Write, DocumentId(2));
        assert!(table.validate(&alice, Permission::Write, DocumentId(1)));
        assert!(!table.validate(&alice, Permission::Write, DocumentId(2)));
        assert!(table.validate(&alice, Permission::Read, DocumentId(2)));
        assert!(table.validate(&Subject::new("bob"), Permission::Write, DocumentId(2)));
    }

    #[test]
    fn test_deny_all_with_grant() {
        let alice = Subject::new("alice");
        let table = PermissionTable::deny_all().grant(&alice, Permission::Write, DocumentId(1));
        assert!(table.validate(&alice, Permission::Write, DocumentId(1)));
        assert!(!table.validate(&alice, Permission::Write, DocumentId(3)));
    }

    #[test]
    fn test_denial_beats_grant() {
        let alice = Subject::new("alice");
        let table = PermissionTable::deny_all()
            .grant(&alice, Permission::Write, DocumentId(1))
            .deny(&alice, Permission::Write, DocumentId(1));
        assert!(!table.validate(&alice, Permission::Write, DocumentId(1)));
    }

    #[test]
    fn test_system_bypasses_table() {
        let table = PermissionTable::deny_all();
        assert!(table.validate(&Subject::system(), Permission::Write, DocumentId(9)));
    }
}
