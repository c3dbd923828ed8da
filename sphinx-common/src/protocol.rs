//! # Protocol Constants
//!
//! Purpose: Define the wire-level numbers of the searchd binary API
//! (protocol 1, search command 0x119, as spoken by Sphinx 2.0.x).
//!
//! ## Design Principles
//!
//! 1. **Single Source of Truth**: Every magic number on the wire lives here.
//! 2. **Typed Enums**: Modes and statuses are enums with explicit discriminants
//!    so the encoder can never emit a value the server does not know.
//! 3. **Forward Compatibility**: Unknown attribute types decode as integers
//!    instead of failing the whole response.
//!
//! ## Frame Layout
//!
//! ```text
//! Handshake (both directions):
//! +-----------------+
//! | major version:4B|
//! +-----------------+
//!
//! Request header (16 bytes, search command):
//! +-----------+-----------+----------+-----------+------------+
//! | command:2B| version:2B| length:4B| filler:4B | nreqs:4B   |
//! +-----------+-----------+----------+-----------+------------+
//!
//! Persist frame (12 bytes):
//! +-----------+-----------+----------+----------+
//! | command:2B| version:2B| length:4B| body:4B  |
//! +-----------+-----------+----------+----------+
//!
//! Response header (8 bytes):
//! +-----------+-----------+----------+
//! | status:2B | version:2B| length:4B|
//! +-----------+-----------+----------+
//! ```
//!
//! All integers are big-endian.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Major protocol version exchanged during the handshake.
pub const MAJOR_PROTOCOL_VERSION: u32 = 1;

/// Search command version understood by Sphinx 2.0.8.
pub const VER_COMMAND_SEARCH: u16 = 0x119;

/// Intended upper bound on concurrent in-flight queries per client.
pub const MAX_CONCURRENT_QUERIES: usize = 32;

/// Index name that searches every index on the server.
pub const DEFAULT_INDEX: &str = "*";

/// Group-by key sent with every query (grouping is not configurable).
pub const GROUPBY_DEFAULT: &str = "";

/// Group sort clause sent with every query.
pub const GROUPBY_SORT_DEFAULT: &str = "@groupby desc";

/// Size of the response header in bytes.
pub const RESPONSE_HEADER_LEN: usize = 8;

/// Size of the search request header in bytes.
pub const REQUEST_HEADER_LEN: usize = 16;

/// Extra bytes counted by the server in the declared request length
/// (filler + request count that follow the length field).
pub const REQUEST_LENGTH_OVERHEAD: u32 = 8;

/// searchd command identifiers.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchdCommand {
    Search = 0,
    Excerpt = 1,
    Update = 2,
    Keywords = 3,
    Persist = 4,
    Status = 5,
}

impl SearchdCommand {
    /// Convert command to its wire value.
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Get human-readable command name
    pub const fn name(self) -> &'static str {
        match self {
            Self::Search => "SEARCH",
            Self::Excerpt => "EXCERPT",
            Self::Update => "UPDATE",
            Self::Keywords => "KEYWORDS",
            Self::Persist => "PERSIST",
            Self::Status => "STATUS",
        }
    }
}

impl fmt::Display for SearchdCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Status codes used both in the response header (u16) and in the
/// per-query result body (u32).
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchdStatus {
    Ok = 0,
    Error = 1,
    Retry = 2,
    Warning = 3,
}

impl SearchdStatus {
    pub const fn as_u32(self) -> u32 {
        self as u32
    }

    /// Try to create a status from its wire value.
    pub const fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Ok),
            1 => Some(Self::Error),
            2 => Some(Self::Retry),
            3 => Some(Self::Warning),
            _ => None,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Error => "ERROR",
            Self::Retry => "RETRY",
            Self::Warning => "WARNING",
        }
    }
}

impl fmt::Display for SearchdStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Keyword matching strategy.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MatchMode {
    #[default]
    All = 0,
    Any = 1,
    Phrase = 2,
    Boolean = 3,
    Extended = 4,
    FullScan = 5,
    Extended2 = 6,
}

impl MatchMode {
    pub const fn as_u32(self) -> u32 {
        self as u32
    }
}

/// Relevance ranking function.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RankMode {
    /// Phrase proximity major factor, BM25 minor one.
    #[default]
    ProximityBm25 = 0,
    Bm25 = 1,
    None = 2,
    WordCount = 3,
    Proximity = 4,
    MatchAny = 5,
    FieldMask = 6,
    Sph04 = 7,
    Expr = 8,
}

impl RankMode {
    pub const fn as_u32(self) -> u32 {
        self as u32
    }
}

/// Result ordering.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortMode {
    #[default]
    Relevance = 0,
    AttrDesc = 1,
    AttrAsc = 2,
    TimeSegments = 3,
    Extended = 4,
    /// Deprecated by the server; kept for wire completeness.
    Expr = 5,
}

impl SortMode {
    pub const fn as_u32(self) -> u32 {
        self as u32
    }
}

/// Group-by functions. Only `Attr` is ever sent by this client.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupFunc {
    Day = 0,
    Week = 1,
    Month = 2,
    Year = 3,
    Attr = 4,
    AttrPair = 5,
}

impl GroupFunc {
    pub const fn as_u32(self) -> u32 {
        self as u32
    }
}

/// Group function sent with every query.
pub const GROUPBY_FUNC_DEFAULT: GroupFunc = GroupFunc::Attr;

/// Wire codes for filter kinds.
pub const FILTER_VALUES: u32 = 0;
pub const FILTER_RANGE: u32 = 1;
pub const FILTER_FLOATRANGE: u32 = 2;

/// Wire codes for attribute types.
pub const ATTR_INTEGER: u32 = 1;
pub const ATTR_TIMESTAMP: u32 = 2;
pub const ATTR_ORDINAL: u32 = 3;
pub const ATTR_BOOL: u32 = 4;
pub const ATTR_FLOAT: u32 = 5;
pub const ATTR_BIGINT: u32 = 6;
pub const ATTR_STRING: u32 = 7;
pub const ATTR_MULTI: u32 = 0x4000_0001;
pub const ATTR_MULTI64: u32 = 0x4000_0002;

/// Attribute type declared by the response schema.
///
/// The schema is read once per response and drives how every match's
/// attribute values are decoded; values themselves carry no type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttrType {
    Integer,
    Timestamp,
    Ordinal,
    Bool,
    Float,
    BigInt,
    String,
    /// Multi-valued attribute with 32-bit elements.
    Multi,
    /// Multi-valued attribute with 64-bit elements.
    Multi64,
    /// Type code this client does not know; decoded as a 32-bit integer.
    Unknown(u32),
}

impl AttrType {
    pub const fn from_u32(value: u32) -> Self {
        match value {
            ATTR_INTEGER => Self::Integer,
            ATTR_TIMESTAMP => Self::Timestamp,
            ATTR_ORDINAL => Self::Ordinal,
            ATTR_BOOL => Self::Bool,
            ATTR_FLOAT => Self::Float,
            ATTR_BIGINT => Self::BigInt,
            ATTR_STRING => Self::String,
            ATTR_MULTI => Self::Multi,
            ATTR_MULTI64 => Self::Multi64,
            other => Self::Unknown(other),
        }
    }
}

/// Response header read directly off the socket.
///
/// `len` is authoritative: exactly that many body bytes follow, whether or
/// not the body later decodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseHeader {
    /// Outer status code (see [`SearchdStatus`]).
    pub status: u16,
    /// Command version the server answered with.
    pub version: u16,
    /// Body length in bytes.
    pub len: u32,
}

impl ResponseHeader {
    /// Parses the fixed 8-byte header.
    pub fn from_bytes(raw: &[u8; RESPONSE_HEADER_LEN]) -> Self {
        ResponseHeader {
            status: u16::from_be_bytes([raw[0], raw[1]]),
            version: u16::from_be_bytes([raw[2], raw[3]]),
            len: u32::from_be_bytes([raw[4], raw[5], raw[6], raw[7]]),
        }
    }

    /// Serializes the header back into wire form.
    pub fn to_bytes(&self) -> [u8; RESPONSE_HEADER_LEN] {
        let mut raw = [0u8; RESPONSE_HEADER_LEN];
        raw[0..2].copy_from_slice(&self.status.to_be_bytes());
        raw[2..4].copy_from_slice(&self.version.to_be_bytes());
        raw[4..8].copy_from_slice(&self.len.to_be_bytes());
        raw
    }
}

/// Builds the 12-byte persist frame sent right after the handshake.
pub fn persist_frame() -> [u8; 12] {
    let mut frame = [0u8; 12];
    frame[0..2].copy_from_slice(&SearchdCommand::Persist.as_u16().to_be_bytes());
    // version 0
    frame[4..8].copy_from_slice(&4u32.to_be_bytes());
    frame[8..12].copy_from_slice(&1u32.to_be_bytes());
    frame
}
