//! Purpose: Domain model for syntax trees returned by a parsing backend.
//! Exports: `SyntaxNode`, `Position`.
//! Invariants: `children` is in source order; `roles` keeps backend order.
//! Invariants: `properties` is key-sorted so iteration is deterministic.
//! Invariants: Dropping a tree never recurses, whatever its depth.
use std::collections::BTreeMap;

use serde::Serialize;

use super::role::Role;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct Position {
    pub offset: u32,
    pub line: u32,
    pub col: u32,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SyntaxNode {
    pub kind: String,
    pub token: String,
    pub properties: BTreeMap<String, String>,
    pub start: Option<Position>,
    pub end: Option<Position>,
    pub roles: Vec<Role>,
    pub children: Vec<SyntaxNode>,
}

impl SyntaxNode {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            token: String::new(),
            properties: BTreeMap::new(),
            start: None,
            end: None,
            roles: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = token.into();
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_span(mut self, start: Position, end: Position) -> Self {
        self.start = Some(start);
        self.end = Some(end);
        self
    }

    pub fn with_roles(mut self, roles: impl IntoIterator<Item = Role>) -> Self {
        self.roles.extend(roles);
        self
    }

    pub fn with_child(mut self, child: SyntaxNode) -> Self {
        self.children.push(child);
        self
    }
}

impl Drop for SyntaxNode {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.children);
        while let Some(mut node) = pending.pop() {
            pending.append(&mut node.children);
        }
    }
}
