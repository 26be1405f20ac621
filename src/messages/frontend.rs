//! Parsing and re-serialization of the two frontend message types the proxy
//! looks inside: `Query` and `Parse`. Everything else is forwarded as an
//! opaque [`RawMessage`].
//!
//! SQL text is kept as raw bytes throughout: `client_encoding`s such as
//! WIN1251/LATIN1/KOI8R are not valid UTF-8, and this proxy must forward
//! every byte it did not itself rewrite unchanged.

use bytes::{Buf, BufMut, BytesMut};

use crate::errors::{Error, FramingError};

use super::constants::{TAG_PARSE, TAG_QUERY};
use super::socket::{read_exact, read_message_header};

/// A message the proxy does not need to look inside, kept as raw bytes so
/// it can be forwarded byte-for-byte.
pub struct RawMessage {
    pub tag: u8,
    /// Payload only: excludes the tag byte and the length prefix.
    pub body: BytesMut,
}

impl RawMessage {
    /// Re-assemble the wire-format frame (`tag || length || body`).
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(5 + self.body.len());
        buf.put_u8(self.tag);
        buf.put_i32((self.body.len() + 4) as i32);
        buf.extend_from_slice(&self.body);
        buf
    }
}

/// A `Parse` message: a prepared-statement name, its SQL text, and a list of
/// parameter type OIDs that is untouched by rewriting. `statement` and
/// `query` are the raw bytes the client sent, NUL-terminator excluded.
pub struct ParseMessage {
    pub statement: BytesMut,
    pub query: BytesMut,
    pub param_type_oids: Vec<i32>,
}

impl ParseMessage {
    pub fn encode(&self) -> BytesMut {
        let mut body = BytesMut::new();
        put_cstr(&mut body, &self.statement);
        put_cstr(&mut body, &self.query);
        body.put_i16(self.param_type_oids.len() as i16);
        for oid in &self.param_type_oids {
            body.put_i32(*oid);
        }

        let mut buf = BytesMut::with_capacity(5 + body.len());
        buf.put_u8(TAG_PARSE);
        buf.put_i32((body.len() + 4) as i32);
        buf.extend_from_slice(&body);
        buf
    }
}

/// The frontend message classes the proxy cares about; everything else
/// passes through as [`FrontendMessage::Other`]. `Query` carries the raw
/// SQL bytes, NUL-terminator excluded.
pub enum FrontendMessage {
    Query(BytesMut),
    Parse(ParseMessage),
    Other(RawMessage),
}

/// Read one post-startup frontend message and classify it.
pub async fn read_frontend_message<S>(stream: &mut S) -> Result<FrontendMessage, Error>
where
    S: tokio::io::AsyncRead + Unpin,
{
    let (tag, len) = read_message_header(stream).await?;
    let mut body = read_exact(stream, (len - 4) as usize).await?;

    match tag {
        TAG_QUERY => {
            let query = take_cstr(&mut body)?;
            Ok(FrontendMessage::Query(query))
        }
        TAG_PARSE => Ok(FrontendMessage::Parse(parse_parse_body(body)?)),
        _ => Ok(FrontendMessage::Other(RawMessage { tag, body })),
    }
}

fn parse_parse_body(mut body: BytesMut) -> Result<ParseMessage, Error> {
    let statement = take_cstr(&mut body)?;
    let query = take_cstr(&mut body)?;

    if body.remaining() < 2 {
        return Err(FramingError::LengthTooSmall(body.remaining() as i32).into());
    }
    let count = body.get_u16() as usize;

    if body.remaining() < count * 4 {
        return Err(FramingError::LengthTooSmall(body.remaining() as i32).into());
    }
    let mut param_type_oids = Vec::with_capacity(count);
    for _ in 0..count {
        param_type_oids.push(body.get_i32());
    }

    Ok(ParseMessage {
        statement,
        query,
        param_type_oids,
    })
}

/// Re-encode a `Query` message carrying (possibly rewritten) raw SQL bytes.
pub fn encode_query(sql: &[u8]) -> BytesMut {
    let mut body = BytesMut::new();
    put_cstr(&mut body, sql);

    let mut buf = BytesMut::with_capacity(5 + body.len());
    buf.put_u8(TAG_QUERY);
    buf.put_i32((body.len() + 4) as i32);
    buf.extend_from_slice(&body);
    buf
}

fn put_cstr(buf: &mut BytesMut, bytes: &[u8]) {
    buf.extend_from_slice(bytes);
    buf.put_u8(0);
}

/// Split a NUL-terminated byte string off the front of `buf`, consuming the
/// NUL, without interpreting the bytes as text.
fn take_cstr(buf: &mut BytesMut) -> Result<BytesMut, Error> {
    let pos = buf
        .iter()
        .position(|&b| b == 0)
        .ok_or(FramingError::UnexpectedEof)?;
    let bytes = buf.split_to(pos);
    buf.advance(1);
    Ok(bytes)
}
