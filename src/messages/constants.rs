//! Protocol constants for PostgreSQL wire protocol v3.

/// Protocol version 3.0, sent as the first four bytes of a plain startup
/// message's payload.
pub const PROTOCOL_VERSION_NUMBER: i32 = 196_608;

/// Sentinel sent in place of a protocol version when the client wants to
/// negotiate TLS before startup.
pub const SSL_REQUEST_CODE: i32 = 80_877_103;

/// Sentinel sent in place of a protocol version when the client wants to
/// negotiate GSSAPI encryption before startup.
pub const GSSENC_REQUEST_CODE: i32 = 80_877_104;

/// Sentinel sent in place of a protocol version when the client wants to
/// cancel a running query on a separate connection.
pub const CANCEL_REQUEST_CODE: i32 = 80_877_102;

/// Upper bound on the length of a startup message, so a client cannot force
/// an unbounded allocation before we've even parsed its protocol version.
pub const MAX_STARTUP_LEN: i32 = 8 * 1024;

/// Upper bound on any post-startup message's declared length.
pub const MAX_MESSAGE_SIZE: i32 = 256 * 1024 * 1024;

pub const TAG_QUERY: u8 = b'Q';
pub const TAG_PARSE: u8 = b'P';
pub const TAG_NOTICE_RESPONSE: u8 = b'N';
