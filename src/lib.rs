//! Purpose: Library crate behind the `uast-gateway` binary and its tests.
//! Exports: `api` (stable surface), `core` (tree model, encoding, errors), `backend`, `gist`, `serve`.
//! Role: HTTP/JSON gateway that turns backend parse results into UAST documents.
//! Invariants: Tree encoding in `core` stays free of I/O and network types.
//! Invariants: Backend access goes through the `backend::Connector` seam.
pub mod api;
pub mod backend;
pub mod core;
pub mod gist;
pub mod serve;
