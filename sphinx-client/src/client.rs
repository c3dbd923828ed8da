//! # Synchronous Client API
//!
//! Purpose: Expose a compact, blocking API for running searches against a
//! searchd instance over its binary protocol.
//!
//! ## Design Principles
//! 1. **Facade Pattern**: `SphinxClient` hides pooling and protocol details.
//! 2. **Build Before Borrow**: Requests are encoded before a connection is
//!    taken from the pool, so encode failures never touch the network.
//! 3. **Fail Fast**: Protocol violations surface immediately as errors and
//!    the connection that saw them is retired.
//! 4. **Explicit Lifetime**: The pool lives as long as the client and is shut
//!    down by `close`.

use std::borrow::Cow;
use std::io;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use sphinx_common::{SphinxQuery, SphinxResult, MAX_CONCURRENT_QUERIES};

use crate::codec::{DecodeError, EncodeError};
use crate::pool::{ConnectionPool, PoolConfig};
use crate::request::build_request;
use crate::response::parse_response;

/// Result type for the sync client.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors surfaced by the sync client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Network or IO failure while connecting, reading or writing.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    /// Host/port could not be resolved to a socket address.
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    /// Configuration values are inconsistent.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    /// Server speaks an older major protocol version.
    #[error("expected server protocol version >= {client}, got {server}")]
    VersionMismatch { client: u32, server: u32 },
    /// The query could not be encoded.
    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),
    /// The response body was malformed or truncated.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
    /// searchd reported an error for the query.
    #[error("searchd error: {message}")]
    Server { message: String },
    /// searchd asked for the query to be re-issued later.
    #[error("searchd retry: {message}")]
    Retry { message: String },
    /// Declared response length exceeds the configured limit.
    #[error("response of {len} bytes exceeds limit of {max} bytes")]
    ResponseTooLarge { len: u32, max: u32 },
    /// The client was closed.
    #[error("connection pool closed")]
    PoolClosed,
}

/// Configuration for the client and its pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// searchd host name or IP.
    pub host: String,
    /// searchd API port.
    pub port: u16,
    /// Deadline for dialing and the version handshake.
    #[serde(rename = "connect_timeout_ms", with = "millis")]
    pub connect_timeout: Duration,
    /// Connections opened when the client is created.
    pub starting_pool_size: usize,
    /// Maximum connections, and so maximum concurrent queries.
    pub max_pool_size: usize,
    /// Server-side time budget stamped on every query; zero means none.
    #[serde(rename = "max_query_time_ms", with = "millis")]
    pub max_query_time: Duration,
    /// Largest response body accepted, in bytes.
    pub max_response_len: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            host: "127.0.0.1".to_string(),
            port: 9312,
            connect_timeout: Duration::from_secs(1),
            starting_pool_size: 1,
            max_pool_size: 30,
            max_query_time: Duration::ZERO,
            max_response_len: 8 * 1024 * 1024,
        }
    }
}

impl ClientConfig {
    /// Parses a JSON config; missing keys take their defaults.
    pub fn from_json_str(json: &str) -> ClientResult<Self> {
        let config: ClientConfig =
            serde_json::from_str(json).map_err(|err| ClientError::InvalidConfig(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the values the pool depends on.
    pub fn validate(&self) -> ClientResult<()> {
        if self.max_pool_size == 0 {
            return Err(ClientError::InvalidConfig(
                "max_pool_size must be at least 1".to_string(),
            ));
        }
        if self.starting_pool_size > self.max_pool_size {
            return Err(ClientError::InvalidConfig(format!(
                "starting_pool_size {} exceeds max_pool_size {}",
                self.starting_pool_size, self.max_pool_size
            )));
        }
        if self.connect_timeout.is_zero() {
            return Err(ClientError::InvalidConfig(
                "connect_timeout must be non-zero".to_string(),
            ));
        }
        if self.max_pool_size > MAX_CONCURRENT_QUERIES {
            warn!(
                max_pool_size = self.max_pool_size,
                limit = MAX_CONCURRENT_QUERIES,
                "pool size exceeds the supported number of concurrent queries"
            );
        }
        Ok(())
    }

    fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            host: self.host.clone(),
            port: self.port,
            connect_timeout: self.connect_timeout,
            starting_size: self.starting_pool_size,
            max_size: self.max_pool_size,
            max_response_len: self.max_response_len,
        }
    }
}

/// Synchronous searchd client with connection pooling.
///
/// Each call builds the request, borrows one connection for a single
/// request/response exchange and gives it back. The client is `Send + Sync`;
/// share it between threads to run queries concurrently.
pub struct SphinxClient {
    config: ClientConfig,
    pool: ConnectionPool,
}

impl SphinxClient {
    /// Creates a client for `host:port` with otherwise default configuration.
    pub fn connect(host: impl Into<String>, port: u16) -> ClientResult<Self> {
        let config = ClientConfig {
            host: host.into(),
            port,
            ..ClientConfig::default()
        };
        Self::with_config(config)
    }

    /// Creates a client with a custom configuration.
    pub fn with_config(config: ClientConfig) -> ClientResult<Self> {
        config.validate()?;
        let pool = ConnectionPool::new(config.pool_config())?;
        Ok(SphinxClient { config, pool })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Runs one search and returns its decoded result.
    ///
    /// The query's `max_query_time` is replaced by the configured one.
    pub fn query(&self, query: &SphinxQuery) -> ClientResult<SphinxResult> {
        let query = self.stamp_query_time(query);
        let request = build_request(&query)?;

        let mut conn = self.pool.acquire()?;
        let (header, body) = conn.execute(&request)?;
        drop(conn);
        debug!(
            status = header.status,
            len = header.len,
            "search response received"
        );

        parse_response(&header, &body)
    }

    /// Closes all pooled connections, including ones serving a query right
    /// now; that query and every later one fail with `PoolClosed`.
    pub fn close(&self) {
        self.pool.close();
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    fn stamp_query_time<'a>(&self, query: &'a SphinxQuery) -> Cow<'a, SphinxQuery> {
        if query.max_query_time != self.config.max_query_time {
            let mut stamped = query.clone();
            stamped.max_query_time = self.config.max_query_time;
            Cow::Owned(stamped)
        } else {
            Cow::Borrowed(query)
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
