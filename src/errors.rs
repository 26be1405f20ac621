//! Errors.

use std::io;
use std::net::SocketAddr;

/// Errors raised anywhere in the proxy.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("failed to bind listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("failed to dial upstream {addr}: {source}")]
    UpstreamDial {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("rewriter factory failed to create a rewriter: {0}")]
    RewriterFactory(String),
    #[error(transparent)]
    Framing(#[from] FramingError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("failed to send notice to client: {0}")]
    NoticeSend(io::Error),
}

/// Wire-framing violations: truncated reads, bad length prefixes, unknown
/// startup sentinels. Always fatal to the session that raised them.
#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    #[error("message length {0} is smaller than the 4-byte length prefix itself")]
    LengthTooSmall(i32),
    #[error("startup message length {0} is out of the accepted range")]
    BadStartupLength(i32),
    #[error("unexpected startup code {0}")]
    UnknownStartupCode(i32),
    #[error("connection closed before a complete message was read")]
    UnexpectedEof,
    #[error("invalid client startup message: expected key/value pairs, got {0} entries")]
    UnevenStartupParams(usize),
    #[error("client startup message is missing the mandatory 'user' parameter")]
    MissingUser,
}

/// Error produced by a rewriter's `rewrite_query`/`rewrite_parse` call.
///
/// Recovered locally by the pump: the original SQL is forwarded and a
/// warning notice is sent, so this never needs to escape into [`Error`].
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct RewriteError(pub String);

impl RewriteError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}
