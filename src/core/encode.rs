//! Purpose: Turn a backend syntax tree into the JSON document served to web clients.
//! Exports: `NodeDocument`, `encode`.
//! Role: Pure transformation; no I/O, no shared state.
//! Invariants: Children keep count and order at every depth; roles keep node order.
//! Invariants: Field order is fixed by `write_json`, so output bytes are deterministic.
//! Notes: Encoding, JSON writing and dropping all use explicit stacks, so tree
//! depth never grows the call stack.
use std::collections::BTreeMap;
use std::io::{self, Write};

use serde::Serialize;

use super::node::{Position, SyntaxNode};

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NodeDocument {
    pub kind: String,
    pub token: String,
    pub properties: BTreeMap<String, String>,
    pub start_position: Option<Position>,
    pub end_position: Option<Position>,
    pub roles: Vec<&'static str>,
    pub children: Vec<NodeDocument>,
}

impl NodeDocument {
    /// Writes the document as a JSON object. `token` and `properties` are
    /// omitted when empty and positions when absent; `roles` and `children`
    /// are always present.
    pub fn write_json<W: Write>(&self, out: &mut W) -> io::Result<()> {
        self.write_open(out)?;
        let mut stack: Vec<(&NodeDocument, usize)> = vec![(self, 0)];
        while let Some(top) = stack.last_mut() {
            let (document, next) = *top;
            match document.children.get(next) {
                Some(child) => {
                    top.1 += 1;
                    if next > 0 {
                        out.write_all(b",")?;
                    }
                    child.write_open(out)?;
                    stack.push((child, 0));
                }
                None => {
                    out.write_all(b"]}")?;
                    stack.pop();
                }
            }
        }
        Ok(())
    }

    /// Everything up to and including `"children":[`.
    fn write_open<W: Write>(&self, out: &mut W) -> io::Result<()> {
        write_field(out, b"{\"kind\":", &self.kind)?;
        if !self.token.is_empty() {
            write_field(out, b",\"token\":", &self.token)?;
        }
        if !self.properties.is_empty() {
            write_field(out, b",\"properties\":", &self.properties)?;
        }
        if let Some(start) = &self.start_position {
            write_field(out, b",\"start_position\":", start)?;
        }
        if let Some(end) = &self.end_position {
            write_field(out, b",\"end_position\":", end)?;
        }
        write_field(out, b",\"roles\":", &self.roles)?;
        out.write_all(b",\"children\":[")
    }
}

impl Drop for NodeDocument {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.children);
        while let Some(mut document) = pending.pop() {
            pending.append(&mut document.children);
        }
    }
}

fn write_field<W: Write, T: Serialize + ?Sized>(
    out: &mut W,
    prefix: &[u8],
    value: &T,
) -> io::Result<()> {
    out.write_all(prefix)?;
    serde_json::to_writer(&mut *out, value)?;
    Ok(())
}

/// Writes `document` as JSON, or `null` when there is no tree.
pub fn write_document<W: Write>(document: Option<&NodeDocument>, out: &mut W) -> io::Result<()> {
    match document {
        Some(document) => document.write_json(out),
        None => out.write_all(b"null"),
    }
}

struct Frame<'a> {
    node: &'a SyntaxNode,
    next_child: usize,
    children: Vec<NodeDocument>,
}

impl<'a> Frame<'a> {
    fn new(node: &'a SyntaxNode) -> Self {
        Self {
            node,
            next_child: 0,
            children: Vec::with_capacity(node.children.len()),
        }
    }

    fn finish(self) -> NodeDocument {
        let node = self.node;
        NodeDocument {
            kind: node.kind.clone(),
            token: node.token.clone(),
            properties: node.properties.clone(),
            start_position: node.start,
            end_position: node.end,
            roles: node.roles.iter().map(|role| role.name()).collect(),
            children: self.children,
        }
    }
}

/// Encodes `node` bottom-up; `None` stays `None` and is written as `null`.
pub fn encode(node: Option<&SyntaxNode>) -> Option<NodeDocument> {
    let root = node?;
    let mut stack = vec![Frame::new(root)];
    loop {
        let top = stack.last_mut()?;
        let node = top.node;
        if let Some(child) = node.children.get(top.next_child) {
            top.next_child += 1;
            stack.push(Frame::new(child));
            continue;
        }
        let document = stack.pop()?.finish();
        match stack.last_mut() {
            Some(parent) => parent.children.push(document),
            None => return Some(document),
        }
    }
}
