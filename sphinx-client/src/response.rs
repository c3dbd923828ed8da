//! # Search Response Parser
//!
//! Purpose: Turn the body of a SEARCH response into a [`SphinxResult`].
//!
//! ## Design Principles
//! 1. **Strictly Sequential**: Status, fields, schema, matches, totals and
//!    words are read in wire order from one in-memory buffer.
//! 2. **All or Nothing**: Any short read or bad length aborts with an error;
//!    a partially filled result is never returned.
//! 3. **Schema Once**: The attribute schema is read once and applied to every
//!    match.
//! 4. **Warnings Are Not Failures**: A WARNING status is logged and kept on
//!    the result while parsing continues.

use std::time::Duration;

use tracing::{debug, warn};

use sphinx_common::{
    AttrDef, AttrType, ResponseHeader, SearchdStatus, SphinxResult, VER_COMMAND_SEARCH,
};

use crate::client::{ClientError, ClientResult};
use crate::codec::{DecodeError, Decoder};

/// Parses a full response body for a single-query search.
///
/// The outer header status frames the body (an ERROR/RETRY body is just the
/// message, a WARNING body starts with the warning), so it is handled before
/// the per-query status inside the body.
pub fn parse_response(header: &ResponseHeader, body: &[u8]) -> ClientResult<SphinxResult> {
    if header.version < VER_COMMAND_SEARCH {
        warn!(
            server = header.version,
            client = VER_COMMAND_SEARCH,
            "searchd command version is older than the client"
        );
    }

    let mut dec = Decoder::new(body);
    let mut warning = check_status(u32::from(header.status), &mut dec)?;
    if let Some(inner) = check_status(dec.get_u32()?, &mut dec)? {
        warning = Some(inner);
    }

    let field_count = dec.get_count(4)?;
    let mut fields = Vec::with_capacity(field_count);
    for _ in 0..field_count {
        fields.push(dec.get_string()?);
    }

    let attr_count = dec.get_count(8)?;
    let mut attributes = Vec::with_capacity(attr_count);
    for _ in 0..attr_count {
        let name = dec.get_string()?;
        let attr_type = AttrType::from_u32(dec.get_u32()?);
        attributes.push(AttrDef { name, attr_type });
    }

    let match_count = dec.get_count(1)?;
    let id64 = dec.get_bool()?;
    let mut matches = Vec::with_capacity(match_count);
    for _ in 0..match_count {
        matches.push(dec.get_match(&attributes, id64)?);
    }

    let total = dec.get_u32()?;
    let total_found = dec.get_u32()?;
    let time = Duration::from_millis(u64::from(dec.get_u32()?));

    let word_count = dec.get_count(12)?;
    let mut words = Vec::with_capacity(word_count);
    for _ in 0..word_count {
        words.push(dec.get_word()?);
    }

    Ok(SphinxResult {
        fields,
        attributes,
        matches,
        total,
        total_found,
        time,
        words,
        id64,
        warning,
    })
}

/// Applies one status code. Returns the warning text for WARNING, `None`
/// for OK, and the server message as an error for ERROR and RETRY.
fn check_status(code: u32, dec: &mut Decoder<'_>) -> ClientResult<Option<String>> {
    let status = SearchdStatus::from_u32(code).ok_or(DecodeError::UnknownStatus(code))?;
    if status == SearchdStatus::Ok {
        return Ok(None);
    }

    let message = dec.get_string()?;
    match status {
        SearchdStatus::Warning => {
            warn!(%status, warning = %message, "searchd returned a warning");
            Ok(Some(message))
        }
        SearchdStatus::Retry => {
            debug!(%status, %message, "searchd asked to retry");
            Err(ClientError::Retry { message })
        }
        _ => {
            debug!(%status, %message, "searchd rejected the query");
            Err(ClientError::Server { message })
        }
    }
}

#[cfg(test)]
mod tests {
    use sphinx_common::{AttrValue, ATTR_BIGINT, ATTR_FLOAT, ATTR_INTEGER, ATTR_MULTI, ATTR_MULTI64, ATTR_STRING};

    use super::*;
    use crate::codec::Encoder;

    fn header(status: SearchdStatus, body: &[u8]) -> ResponseHeader {
        ResponseHeader {
            status: status.as_u32() as u16,
            version: VER_COMMAND_SEARCH,
            len: body.len() as u32,
        }
    }

    /// Body with two attributes and one match, after the status word.
    fn put_simple_result(enc: &mut Encoder, id64: bool) {
        enc.put_u32(2);
        enc.put_str("title");
        enc.put_str("content");

        enc.put_u32(2);
        enc.put_str("group_id");
        enc.put_u32(ATTR_INTEGER);
        enc.put_str("tags");
        enc.put_u32(ATTR_MULTI);

        enc.put_u32(1);
        enc.put_bool(id64);
        if id64 {
            enc.put_u64(0x0000_0002_0000_0003);
        } else {
            enc.put_u32(3);
        }
        enc.put_u32(1643);
        enc.put_u32(12);
        enc.put_u32(2);
        enc.put_u32(100);
        enc.put_u32(200);

        enc.put_u32(1);
        enc.put_u32(1);
        enc.put_u32(25);

        enc.put_u32(1);
        enc.put_str("test");
        enc.put_u32(4);
        enc.put_u32(9);
    }

    fn ok_body(id64: bool) -> Vec<u8> {
        let mut enc = Encoder::new();
        enc.put_u32(SearchdStatus::Ok.as_u32());
        put_simple_result(&mut enc, id64);
        enc.finish().unwrap().to_vec()
    }

    #[test]
    fn parses_full_result() {
        let body = ok_body(false);
        let result = parse_response(&header(SearchdStatus::Ok, &body), &body).unwrap();

        assert_eq!(result.fields, vec!["title", "content"]);
        assert_eq!(result.attributes.len(), 2);
        assert_eq!(result.attributes[1].attr_type, AttrType::Multi);
        assert!(!result.id64);
        assert_eq!(result.matches.len(), 1);
        let m = &result.matches[0];
        assert_eq!(m.doc_id, 3);
        assert_eq!(m.weight, 1643);
        assert_eq!(
            m.attrs,
            vec![AttrValue::Int(12), AttrValue::Multi(vec![100, 200])]
        );
        assert_eq!(result.total, 1);
        assert_eq!(result.total_found, 1);
        assert_eq!(result.time, Duration::from_millis(25));
        assert_eq!(result.words.len(), 1);
        assert_eq!(result.words[0].word, "test");
        assert_eq!(result.words[0].docs, 4);
        assert_eq!(result.words[0].hits, 9);
        assert_eq!(result.warning, None);
    }

    #[test]
    fn id64_flag_keeps_full_ids() {
        let body = ok_body(true);
        let result = parse_response(&header(SearchdStatus::Ok, &body), &body).unwrap();
        assert!(result.id64);
        assert_eq!(result.matches[0].doc_id, 0x0000_0002_0000_0003);
    }

    #[test]
    fn inner_error_returns_message() {
        let mut enc = Encoder::new();
        enc.put_u32(SearchdStatus::Error.as_u32());
        enc.put_str("index not found");
        let body = enc.finish().unwrap();

        match parse_response(&header(SearchdStatus::Ok, &body), &body) {
            Err(ClientError::Server { message }) => assert_eq!(message, "index not found"),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn inner_retry_is_an_error() {
        let mut enc = Encoder::new();
        enc.put_u32(SearchdStatus::Retry.as_u32());
        enc.put_str("temporarily unavailable");
        let body = enc.finish().unwrap();

        assert!(matches!(
            parse_response(&header(SearchdStatus::Ok, &body), &body),
            Err(ClientError::Retry { .. })
        ));
    }

    #[test]
    fn inner_warning_still_returns_result() {
        let mut enc = Encoder::new();
        enc.put_u32(SearchdStatus::Warning.as_u32());
        enc.put_str("query time exceeded max_query_time");
        put_simple_result(&mut enc, false);
        let body = enc.finish().unwrap();

        let result = parse_response(&header(SearchdStatus::Ok, &body), &body).unwrap();
        assert_eq!(
            result.warning.as_deref(),
            Some("query time exceeded max_query_time")
        );
        assert_eq!(result.matches.len(), 1);
    }

    #[test]
    fn outer_error_body_is_the_message() {
        let mut enc = Encoder::new();
        enc.put_str("client version is higher than daemon version");
        let body = enc.finish().unwrap();

        match parse_response(&header(SearchdStatus::Error, &body), &body) {
            Err(ClientError::Server { message }) => {
                assert_eq!(message, "client version is higher than daemon version")
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn outer_warning_precedes_inner_status() {
        let mut enc = Encoder::new();
        enc.put_str("outer warning");
        enc.put_u32(SearchdStatus::Ok.as_u32());
        put_simple_result(&mut enc, false);
        let body = enc.finish().unwrap();

        let result = parse_response(&header(SearchdStatus::Warning, &body), &body).unwrap();
        assert_eq!(result.warning.as_deref(), Some("outer warning"));
        assert_eq!(result.matches[0].doc_id, 3);
    }

    #[test]
    fn unknown_status_is_a_decode_error() {
        let mut enc = Encoder::new();
        enc.put_u32(17);
        let body = enc.finish().unwrap();
        assert!(matches!(
            parse_response(&header(SearchdStatus::Ok, &body), &body),
            Err(ClientError::Decode(DecodeError::UnknownStatus(17)))
        ));
    }

    #[test]
    fn every_truncation_fails_cleanly() {
        let body = ok_body(true);
        for cut in 0..body.len() {
            let truncated = &body[..cut];
            let result = parse_response(&header(SearchdStatus::Ok, truncated), truncated);
            assert!(
                matches!(result, Err(ClientError::Decode(_))),
                "cut at {} gave {:?}",
                cut,
                result
            );
        }
    }

    #[test]
    fn decodes_each_schema_type() {
        let mut enc = Encoder::new();
        enc.put_u32(SearchdStatus::Ok.as_u32());
        enc.put_u32(0);

        let types = [ATTR_FLOAT, ATTR_BIGINT, ATTR_STRING, ATTR_MULTI64, 0x77];
        enc.put_u32(types.len() as u32);
        for (idx, code) in types.iter().enumerate() {
            enc.put_str(&format!("a{}", idx));
            enc.put_u32(*code);
        }

        enc.put_u32(1);
        enc.put_u32(0);
        enc.put_u32(42);
        enc.put_u32(1);
        enc.put_f32(0.5);
        enc.put_u64((-3i64) as u64);
        enc.put_str("");
        enc.put_u32(2);
        for word in [5, 0, 7, 0] {
            enc.put_u32(word);
        }
        enc.put_u32(11);

        enc.put_u32(1);
        enc.put_u32(1);
        enc.put_u32(0);
        enc.put_u32(0);
        let body = enc.finish().unwrap();

        let result = parse_response(&header(SearchdStatus::Ok, &body), &body).unwrap();
        assert_eq!(result.attributes[4].attr_type, AttrType::Unknown(0x77));
        assert_eq!(
            result.matches[0].attrs,
            vec![
                AttrValue::Float(0.5),
                AttrValue::BigInt(-3),
                AttrValue::String(String::new()),
                AttrValue::Multi(vec![5, 7]),
                AttrValue::Int(11),
            ]
        );
        assert!(result.words.is_empty());
    }
}
