//! Purpose: Define the seam between the HTTP layer and a parsing backend.
//! Exports: `ParseBackend`, `Connector`, `BackendRequest`, `ParseOutcome`, `BackendStatus`.
//! Role: Traits are implemented by the gRPC transport and by in-process test doubles.
//! Invariants: A `ParseOutcome` never carries a tree when its status is `Fatal`.
//! Invariants: Backend statuses outside OK/Error are treated as `Fatal`.
use std::future::Future;
use std::time::Duration;

use crate::core::error::Error;
use crate::core::node::SyntaxNode;

pub mod grpc;
pub mod proto;
pub mod router;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BackendStatus {
    Ok,
    ParseError,
    Fatal,
}

impl BackendStatus {
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => BackendStatus::Ok,
            1 => BackendStatus::ParseError,
            _ => BackendStatus::Fatal,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BackendStatus::Ok => "ok",
            BackendStatus::ParseError => "error",
            BackendStatus::Fatal => "fatal",
        }
    }

    pub fn http_status(self) -> u16 {
        match self {
            BackendStatus::Ok => 200,
            BackendStatus::ParseError => 400,
            BackendStatus::Fatal => 500,
        }
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BackendRequest {
    pub language: String,
    pub content: String,
    pub timeout: Option<Duration>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ParseOutcome {
    status: BackendStatus,
    tree: Option<SyntaxNode>,
    diagnostics: Vec<String>,
    language: String,
    elapsed: Option<Duration>,
}

impl ParseOutcome {
    pub fn new(status: BackendStatus, tree: Option<SyntaxNode>, diagnostics: Vec<String>) -> Self {
        let tree = match status {
            BackendStatus::Fatal => None,
            BackendStatus::Ok | BackendStatus::ParseError => tree,
        };
        Self {
            status,
            tree,
            diagnostics,
            language: String::new(),
            elapsed: None,
        }
    }

    /// Language the backend parsed with; useful when the request left it empty.
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_elapsed(mut self, elapsed: Option<Duration>) -> Self {
        self.elapsed = elapsed;
        self
    }

    pub fn status(&self) -> BackendStatus {
        self.status
    }

    pub fn tree(&self) -> Option<&SyntaxNode> {
        self.tree.as_ref()
    }

    pub fn diagnostics(&self) -> &[String] {
        &self.diagnostics
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn elapsed(&self) -> Option<Duration> {
        self.elapsed
    }
}

/// A handle that can run one parse call against a backend.
pub trait ParseBackend: Send + Sync {
    fn parse(
        &self,
        request: BackendRequest,
    ) -> impl Future<Output = Result<ParseOutcome, Error>> + Send;
}

/// Opens per-request backend clients. Dropping a client releases its connection.
pub trait Connector: Send + Sync + 'static {
    type Client: ParseBackend + 'static;

    fn connect(&self, address: &str) -> impl Future<Output = Result<Self::Client, Error>> + Send;
}
