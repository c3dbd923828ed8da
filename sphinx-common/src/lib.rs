// sphinx-common - Shared types and protocol definitions for the searchd client
//
// This crate defines the wire constants and the query/result data model

pub mod protocol;
pub mod types;

// Re-export for convenience
pub use protocol::*;
pub use types::*;
