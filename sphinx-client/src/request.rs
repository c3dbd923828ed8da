//! # Search Request Builder
//!
//! Lays out a [`SphinxQuery`] as a single-query SEARCH request. Needs no
//! connection, so requests are built before a pooled connection is taken.

use bytes::Bytes;
use tracing::debug;

use sphinx_common::{
    SearchdCommand, SphinxQuery, GROUPBY_DEFAULT, GROUPBY_FUNC_DEFAULT, GROUPBY_SORT_DEFAULT,
    REQUEST_HEADER_LEN, REQUEST_LENGTH_OVERHEAD, VER_COMMAND_SEARCH,
};

use crate::codec::{EncodeError, Encoder};

/// Encoded request ready to be written to a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub header: Bytes,
    pub body: Bytes,
}

/// Builds the header and body for one search query.
pub fn build_request(query: &SphinxQuery) -> Result<SearchRequest, EncodeError> {
    let body = build_query_body(query)?;
    let declared = u32::try_from(body.len())
        .ok()
        .and_then(|len| len.checked_add(REQUEST_LENGTH_OVERHEAD))
        .ok_or(EncodeError::LengthOverflow { len: body.len() })?;

    let mut header = Encoder::with_capacity(REQUEST_HEADER_LEN);
    header.put_u16(SearchdCommand::Search.as_u16());
    header.put_u16(VER_COMMAND_SEARCH);
    header.put_u32(declared);
    header.put_u32(0);
    // One query per request.
    header.put_u32(1);
    let header = header.finish()?.freeze();

    debug!(
        command = %SearchdCommand::Search,
        body_len = body.len(),
        index = %query.index,
        "request built"
    );
    Ok(SearchRequest { header, body })
}

/// Encodes the query record that follows the request header.
pub fn build_query_body(query: &SphinxQuery) -> Result<Bytes, EncodeError> {
    let mut enc = Encoder::with_capacity(256);
    enc.put_u32(query.limits.offset);
    enc.put_u32(query.limits.limit);
    enc.put_u32(query.match_mode.as_u32());
    enc.put_u32(query.rank_mode.as_u32());
    enc.put_u32(query.sort_mode.as_u32());
    enc.put_str(&query.sort_by);
    enc.put_str(&query.keywords);
    // Legacy per-field weights list, always empty.
    enc.put_u32(0);
    enc.put_str(&query.index);
    // Legacy id range flag.
    enc.put_u32(1);
    enc.put_u64(query.min_id);
    enc.put_u64(query.max_id);

    enc.put_count(query.filters.len());
    for filter in &query.filters {
        enc.put_filter(filter);
    }

    enc.put_u32(GROUPBY_FUNC_DEFAULT.as_u32());
    enc.put_str(GROUPBY_DEFAULT);
    enc.put_u32(query.limits.max_matches);
    enc.put_str(GROUPBY_SORT_DEFAULT);
    enc.put_u32(query.limits.cutoff);
    // Retry count and delay.
    enc.put_u32(0);
    enc.put_u32(0);
    // Group distinct attribute and geo anchor flag.
    enc.put_str("");
    enc.put_u32(0);

    enc.put_weights(&query.index_weights);
    enc.put_u32(duration_millis(query.max_query_time));
    enc.put_weights(&query.field_weights);
    enc.put_str(&query.comment);

    // Attribute overrides count and select list.
    enc.put_u32(0);
    enc.put_str("");

    Ok(enc.finish()?.freeze())
}

fn duration_millis(duration: std::time::Duration) -> u32 {
    u32::try_from(duration.as_millis()).unwrap_or(u32::MAX)
}
