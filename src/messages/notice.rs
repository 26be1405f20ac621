//! Construction of `NoticeResponse` messages the proxy sends to the client
//! to report a rewrite (NOTICE) or a rewrite failure (WARNING).

use bytes::{BufMut, BytesMut};

use super::constants::TAG_NOTICE_RESPONSE;

/// One `code || value` field of a `NoticeResponse`, e.g. `S` (severity) or
/// `M` (primary message).
fn put_field(buf: &mut BytesMut, code: u8, value: &str) {
    buf.put_u8(code);
    buf.extend_from_slice(value.as_bytes());
    buf.put_u8(0);
}

fn encode_notice(severity: &str, code: &str, message: &str, detail: Option<&str>) -> BytesMut {
    let mut body = BytesMut::new();
    put_field(&mut body, b'S', severity);
    put_field(&mut body, b'V', severity);
    put_field(&mut body, b'C', code);
    put_field(&mut body, b'M', message);
    if let Some(detail) = detail {
        put_field(&mut body, b'D', detail);
    }
    body.put_u8(0); // terminator

    let mut buf = BytesMut::with_capacity(5 + body.len());
    buf.put_u8(TAG_NOTICE_RESPONSE);
    buf.put_i32((body.len() + 4) as i32);
    buf.extend_from_slice(&body);
    buf
}

/// Build the NOTICE sent after a query or statement is rewritten. `detail`
/// is a unified diff between the original and rewritten text.
pub fn rewritten_notice(detail: &str) -> BytesMut {
    encode_notice("NOTICE", "00000", "Query was rewritten", Some(detail))
}

/// Build the WARNING sent when a rewriter returns an error; the original
/// SQL is forwarded unchanged alongside this notice.
pub fn rewrite_failed_notice(detail: &str) -> BytesMut {
    encode_notice(
        "WARNING",
        "01000",
        "Failed to rewrite query",
        Some(detail),
    )
}

/// Minimal line-oriented `+`/`-` diff between two strings, good enough for
/// a human reading the notice in `psql`.
pub fn line_diff(original: &str, rewritten: &str) -> String {
    if original == rewritten {
        return String::new();
    }

    let mut out = String::new();
    for line in original.lines() {
        out.push_str("- ");
        out.push_str(line);
        out.push('\n');
    }
    for line in rewritten.lines() {
        out.push_str("+ ");
        out.push_str(line);
        out.push('\n');
    }
    out.pop();
    out
}
