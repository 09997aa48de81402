// Core modules: error modeling, the syntax tree model, and its JSON encoding.
pub mod encode;
pub mod error;
pub mod node;
pub mod role;
