//! Parsing of the special, type-byte-less startup message and the three
//! sentinels a client may send in its place (SSL, GSSAPI, cancel).

use std::collections::HashMap;

use bytes::{Buf, BytesMut};
use tokio::io::AsyncReadExt;

use crate::errors::{Error, FramingError};

use super::constants::{
    CANCEL_REQUEST_CODE, GSSENC_REQUEST_CODE, MAX_STARTUP_LEN, PROTOCOL_VERSION_NUMBER,
    SSL_REQUEST_CODE,
};

/// What the client sent as its very first message.
pub enum StartupRequest {
    /// A plain StartupMessage. `raw` is the full wire-format message
    /// (length prefix + payload) so the mediator can forward it to
    /// upstream verbatim, and `params` are parsed out for logging.
    Startup {
        params: HashMap<String, String>,
        raw: BytesMut,
    },
    Ssl,
    Gss,
    Cancel {
        process_id: i32,
        secret_key: i32,
        /// The full wire-format message, forwarded to upstream verbatim.
        raw: BytesMut,
    },
}

/// Read and classify the client's first message.
pub async fn read_startup<S>(stream: &mut S) -> Result<StartupRequest, Error>
where
    S: tokio::io::AsyncRead + Unpin,
{
    let len = stream
        .read_i32()
        .await
        .map_err(|_| FramingError::UnexpectedEof)?;

    if !(8..=MAX_STARTUP_LEN).contains(&len) {
        return Err(FramingError::BadStartupLength(len).into());
    }

    let mut payload = BytesMut::zeroed((len - 4) as usize);
    stream
        .read_exact(&mut payload)
        .await
        .map_err(|_| FramingError::UnexpectedEof)?;

    let code = i32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);

    match code {
        SSL_REQUEST_CODE => Ok(StartupRequest::Ssl),
        GSSENC_REQUEST_CODE => Ok(StartupRequest::Gss),
        CANCEL_REQUEST_CODE => {
            let mut rest = payload.clone().split_off(4);
            let process_id = rest.get_i32();
            let secret_key = rest.get_i32();

            let mut raw = BytesMut::with_capacity(4 + payload.len());
            raw.extend_from_slice(&len.to_be_bytes());
            raw.extend_from_slice(&payload);

            Ok(StartupRequest::Cancel {
                process_id,
                secret_key,
                raw,
            })
        }
        PROTOCOL_VERSION_NUMBER => {
            let params = parse_startup_params(payload.clone().split_off(4))?;

            let mut raw = BytesMut::with_capacity(4 + payload.len());
            raw.extend_from_slice(&len.to_be_bytes());
            raw.extend_from_slice(&payload);
            Ok(StartupRequest::Startup { params, raw })
        }
        other => Err(FramingError::UnknownStartupCode(other).into()),
    }
}

/// Parse the NUL-terminated `key\0value\0...\0` sequence that follows the
/// protocol version in a startup message.
fn parse_startup_params(mut bytes: BytesMut) -> Result<HashMap<String, String>, Error> {
    let mut entries = Vec::new();
    let mut current = Vec::new();

    while bytes.has_remaining() {
        let byte = bytes.get_u8();
        if byte == 0 {
            if current.is_empty() {
                // Trailing NUL terminating the whole parameter list.
                continue;
            }
            entries.push(String::from_utf8_lossy(&current).into_owned());
            current.clear();
        } else {
            current.push(byte);
        }
    }

    if entries.len() % 2 != 0 {
        return Err(FramingError::UnevenStartupParams(entries.len()).into());
    }

    let mut params = HashMap::with_capacity(entries.len() / 2);
    let mut iter = entries.into_iter();
    while let (Some(key), Some(value)) = (iter.next(), iter.next()) {
        params.insert(key, value);
    }

    if !params.contains_key("user") {
        return Err(FramingError::MissingUser.into());
    }

    Ok(params)
}
