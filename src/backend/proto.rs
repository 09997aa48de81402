//! Purpose: Protobuf message shapes of the backend parse protocol.
//! Exports: `ParseRequest`, `ParseResponse`, `Node`, `Position`, `Duration`, `Status`, `Encoding`.
//! Role: Wire types only; conversion into the domain model lives here too.
//! Invariants: Field tags match the backend's `ProtocolService` schema.
//! Invariants: Role codes are converted through `Role::from_code`, never passed on raw.
//! Invariants: `Node.children` stays encoded until conversion, so decoding a
//! response never recurses more than a few messages deep.
use std::collections::BTreeMap;

use bytes::Bytes;
use prost::Message;

use crate::core::error::{Error, ErrorKind};
use crate::core::node::{Position as DomainPosition, SyntaxNode};
use crate::core::role::Role;

/// Deepest tree accepted from a backend, counting the root as level one.
pub const MAX_TREE_DEPTH: usize = 4_096;

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ParseRequest {
    #[prost(string, tag = "1")]
    pub filename: String,
    #[prost(string, tag = "2")]
    pub language: String,
    #[prost(string, tag = "3")]
    pub content: String,
    #[prost(enumeration = "Encoding", tag = "4")]
    pub encoding: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ParseResponse {
    #[prost(enumeration = "Status", tag = "1")]
    pub status: i32,
    #[prost(string, repeated, tag = "2")]
    pub errors: Vec<String>,
    #[prost(message, optional, tag = "3")]
    pub elapsed: Option<Duration>,
    #[prost(message, optional, tag = "4")]
    pub uast: Option<Node>,
    #[prost(string, tag = "5")]
    pub language: String,
    #[prost(string, tag = "6")]
    pub filename: String,
}

/// `google.protobuf.Duration`.
#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct Duration {
    #[prost(int64, tag = "1")]
    pub seconds: i64,
    #[prost(int32, tag = "2")]
    pub nanos: i32,
}

/// A syntax node whose children are still in wire form. Length-delimited
/// message fields and `bytes` fields share an encoding, so this reads and
/// writes the same bytes as a `repeated Node` field.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Node {
    #[prost(string, tag = "1")]
    pub internal_type: String,
    #[prost(btree_map = "string, string", tag = "2")]
    pub properties: BTreeMap<String, String>,
    #[prost(bytes = "bytes", repeated, tag = "3")]
    pub children: Vec<Bytes>,
    #[prost(string, tag = "4")]
    pub token: String,
    #[prost(message, optional, tag = "5")]
    pub start_position: Option<Position>,
    #[prost(message, optional, tag = "6")]
    pub end_position: Option<Position>,
    #[prost(int32, repeated, tag = "7")]
    pub roles: Vec<i32>,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct Position {
    #[prost(uint32, tag = "1")]
    pub offset: u32,
    #[prost(uint32, tag = "2")]
    pub line: u32,
    #[prost(uint32, tag = "3")]
    pub col: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum Status {
    Ok = 0,
    Error = 1,
    Fatal = 2,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum Encoding {
    Utf8 = 0,
    Base64 = 1,
}

impl From<Position> for DomainPosition {
    fn from(value: Position) -> Self {
        Self {
            offset: value.offset,
            line: value.line,
            col: value.col,
        }
    }
}

impl Duration {
    /// `None` for negative or out-of-range values.
    pub fn to_std(self) -> Option<std::time::Duration> {
        let seconds = u64::try_from(self.seconds).ok()?;
        let nanos = u32::try_from(self.nanos).ok().filter(|nanos| *nanos < 1_000_000_000)?;
        Some(std::time::Duration::new(seconds, nanos))
    }
}

struct Frame {
    node: SyntaxNode,
    pending: std::vec::IntoIter<Bytes>,
}

impl Frame {
    fn open(wire: Node) -> Self {
        let mut node = SyntaxNode::new(wire.internal_type);
        node.token = wire.token;
        node.properties = wire.properties;
        node.start = wire.start_position.map(Into::into);
        node.end = wire.end_position.map(Into::into);
        node.roles = wire.roles.into_iter().map(Role::from_code).collect();
        node.children = Vec::with_capacity(wire.children.len());
        Self {
            node,
            pending: wire.children.into_iter(),
        }
    }
}

fn lost_root() -> Error {
    Error::new(ErrorKind::Internal).with_message("tree conversion lost its root")
}

impl TryFrom<Node> for SyntaxNode {
    type Error = Error;

    /// Decodes children one level at a time with an explicit stack and
    /// rejects trees deeper than `MAX_TREE_DEPTH`.
    fn try_from(root: Node) -> Result<Self, Error> {
        let mut stack = vec![Frame::open(root)];
        loop {
            let Some(top) = stack.last_mut() else {
                return Err(lost_root());
            };
            if let Some(encoded) = top.pending.next() {
                if stack.len() >= MAX_TREE_DEPTH {
                    return Err(Error::new(ErrorKind::Invocation).with_message(format!(
                        "backend returned a tree deeper than {MAX_TREE_DEPTH} levels"
                    )));
                }
                let child = Node::decode(encoded).map_err(|err| {
                    Error::new(ErrorKind::Invocation)
                        .with_message("backend returned a malformed tree node")
                        .with_source(err)
                })?;
                stack.push(Frame::open(child));
                continue;
            }
            let Some(done) = stack.pop() else {
                return Err(lost_root());
            };
            match stack.last_mut() {
                Some(parent) => parent.node.children.push(done.node),
                None => return Ok(done.node),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Duration, MAX_TREE_DEPTH, Node, ParseResponse, Status};
    use crate::core::error::ErrorKind;
    use crate::core::node::SyntaxNode;
    use crate::core::role::Role;
    use bytes::Bytes;
    use prost::Message;

    fn wire(kind: &str, children: Vec<Node>) -> Node {
        Node {
            internal_type: kind.to_string(),
            children: children
                .iter()
                .map(|child| Bytes::from(child.encode_to_vec()))
                .collect(),
            ..Node::default()
        }
    }

    fn chain(depth: usize) -> Node {
        let mut node = wire("Leaf", Vec::new());
        for _ in 1..depth {
            node = wire("Level", vec![node]);
        }
        node
    }

    #[test]
    fn decodes_response_into_domain_tree() {
        let mut assign = wire("Assign", Vec::new());
        assign.roles = vec![Role::Expression.code(), Role::Assignment.code()];
        let wire_response = ParseResponse {
            status: Status::Ok as i32,
            errors: Vec::new(),
            elapsed: Some(Duration {
                seconds: 1,
                nanos: 500_000_000,
            }),
            uast: Some(wire("Module", vec![assign, wire("Expr", Vec::new())])),
            language: "python".to_string(),
            filename: String::new(),
        };
        let bytes = wire_response.encode_to_vec();

        let decoded = ParseResponse::decode(bytes.as_slice()).expect("decode");
        assert_eq!(decoded.language, "python");
        assert_eq!(
            decoded.elapsed.and_then(Duration::to_std),
            Some(std::time::Duration::from_millis(1_500))
        );
        let tree = SyntaxNode::try_from(decoded.uast.expect("uast")).expect("tree");
        assert_eq!(tree.kind, "Module");
        assert_eq!(tree.children.len(), 2);
        assert_eq!(tree.children[0].kind, "Assign");
        assert_eq!(tree.children[1].kind, "Expr");
        assert_eq!(
            tree.children[0].roles,
            vec![Role::Expression, Role::Assignment]
        );
    }

    #[test]
    fn unknown_role_codes_become_invalid() {
        let mut node = wire("X", Vec::new());
        node.roles = vec![Role::Call.code(), 9_999];
        let tree = SyntaxNode::try_from(node).expect("tree");
        assert_eq!(tree.roles, vec![Role::Call, Role::Invalid]);
    }

    #[test]
    fn trees_at_the_depth_limit_are_accepted() {
        let mut tree = SyntaxNode::try_from(chain(MAX_TREE_DEPTH)).expect("tree");
        let mut levels = 1;
        while let Some(child) = tree.children.pop() {
            levels += 1;
            tree = child;
        }
        assert_eq!(levels, MAX_TREE_DEPTH);
        assert_eq!(tree.kind, "Leaf");
    }

    #[test]
    fn trees_past_the_depth_limit_are_an_invocation_error() {
        let err = SyntaxNode::try_from(chain(MAX_TREE_DEPTH + 1)).expect_err("too deep");
        assert_eq!(err.kind(), ErrorKind::Invocation);
        assert!(err.detail().contains("deeper than"));
    }

    #[test]
    fn corrupt_child_bytes_are_an_invocation_error() {
        let mut node = wire("Module", Vec::new());
        node.children.push(Bytes::from_static(&[0x0a, 0xff]));
        let err = SyntaxNode::try_from(node).expect_err("corrupt child");
        assert_eq!(err.kind(), ErrorKind::Invocation);
    }

    #[test]
    fn negative_elapsed_is_dropped() {
        let elapsed = Duration {
            seconds: -1,
            nanos: 0,
        };
        assert_eq!(elapsed.to_std(), None);
    }
}
