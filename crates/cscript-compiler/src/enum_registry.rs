//! Declared-enum symbol table.
//!
//! Populated by the enum-lowering pass during its single left-to-right
//! scan; read-only afterwards. The kind tag is an explicit variant so the
//! flags exemption from exhaustiveness stays a visible policy rather than
//! an easily-missed boolean.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Declaration kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnumKind {
    /// Finite closed domain; switch sites must cover every member.
    Standard,
    /// Bitmask domain; members combine, exhaustiveness does not apply.
    Flags,
}

impl EnumKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Flags => "flags",
        }
    }
}

impl fmt::Display for EnumKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One lowered enum declaration. Members keep declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumDecl {
    pub name: String,
    pub members: Vec<String>,
    pub kind: EnumKind,
}

impl EnumDecl {
    pub fn new(name: impl Into<String>, members: Vec<String>, kind: EnumKind) -> Self {
        Self {
            name: name.into(),
            members,
            kind,
        }
    }

    /// Membership lookup set.
    pub fn member_set(&self) -> BTreeSet<&str> {
        self.members.iter().map(String::as_str).collect()
    }
}

/// `name → EnumDecl`, deterministic iteration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumRegistry {
    decls: BTreeMap<String, EnumDecl>,
}

impl EnumRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a declaration. Returns `false` when the name is already
    /// taken (the caller decides whether that is fatal).
    pub fn insert(&mut self, decl: EnumDecl) -> bool {
        if self.decls.contains_key(&decl.name) {
            return false;
        }
        self.decls.insert(decl.name.clone(), decl);
        true
    }

    pub fn get(&self, name: &str) -> Option<&EnumDecl> {
        self.decls.get(name)
    }

    pub fn len(&self) -> usize {
        self.decls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EnumDecl> {
        self.decls.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn color() -> EnumDecl {
        EnumDecl::new(
            "Color",
            vec!["Red".into(), "Green".into(), "Blue".into()],
            EnumKind::Standard,
        )
    }

    #[test]
    fn insert_then_lookup() {
        let mut registry = EnumRegistry::new();
        assert!(registry.insert(color()));
        let decl = registry.get("Color").expect("registered");
        assert_eq!(decl.kind, EnumKind::Standard);
        assert_eq!(decl.members.len(), 3);
    }

    #[test]
    fn duplicate_name_rejected() {
        let mut registry = EnumRegistry::new();
        assert!(registry.insert(color()));
        assert!(!registry.insert(color()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn member_set_covers_all_members() {
        let decl = color();
        let set = decl.member_set();
        assert!(set.contains("Red"));
        assert!(set.contains("Blue"));
        assert!(!set.contains("Mauve"));
    }

    #[test]
    fn registry_serde_roundtrip() {
        let mut registry = EnumRegistry::new();
        registry.insert(color());
        let json = serde_json::to_string(&registry).unwrap();
        let restored: EnumRegistry = serde_json::from_str(&json).unwrap();
        assert_eq!(registry, restored);
    }
}
