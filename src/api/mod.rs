//! Purpose: Define the public Rust API boundary for the gateway.
//! Exports: Tree model, encoder, backend seam, and server entry points.
//! Role: Additive-only surface used by the binary and integration tests.
//! Invariants: Callers never need to reach into submodules for common types.

#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::backend::grpc::{CONNECT_TIMEOUT, GrpcBackend, GrpcConnector};
pub use crate::backend::router::{OwnedClient, Resolved, resolve};
pub use crate::backend::{BackendRequest, BackendStatus, Connector, ParseBackend, ParseOutcome};
pub use crate::core::encode::{NodeDocument, encode, write_document};
pub use crate::core::error::{Error, ErrorKind, to_http_status};
pub use crate::core::node::{Position, SyntaxNode};
pub use crate::core::role::Role;
pub use crate::gist::{GistResponse, GistSource};
pub use crate::serve::{AppState, ServeConfig, router, serve, validate_config};
