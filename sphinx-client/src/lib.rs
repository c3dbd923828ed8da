//! # Sphinx Search Client
//!
//! Purpose: Provide a synchronous client for the searchd binary API with
//! connection pooling, so callers get typed results without the server's
//! own client library.
//!
//! ## Design Principles
//! 1. **Object Pool Pattern**: Reuse handshaken TCP connections across queries.
//! 2. **Bit-Exact Framing**: Requests and responses follow the searchd wire
//!    layout byte for byte.
//! 3. **No Partial Results**: A response either decodes completely or the
//!    query returns an error.
//! 4. **Protocol Clarity**: Encoding and decoding are explicit field by field.

pub mod codec;
pub mod request;
pub mod response;

mod client;
mod pool;

pub use client::{ClientConfig, ClientError, ClientResult, SphinxClient};
pub use codec::{DecodeError, Decoder, EncodeError, Encoder};
pub use request::{build_request, SearchRequest};
pub use response::parse_response;
pub use sphinx_common as common;
