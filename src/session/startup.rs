//! The startup mediator (component C4): consumes SSLRequest/GSSEncRequest
//! sentinels by refusing them with a single `N` byte, forwards a
//! CancelRequest or a plain StartupMessage to upstream verbatim, then hands
//! off to the pump without waiting for `ReadyForQuery`.

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::debug;

use crate::errors::Error;
use crate::messages::{read_startup, StartupRequest};

/// Negotiate the startup handshake. Returns `true` if a full session
/// (requiring the pump) follows, `false` if the connection was just a
/// one-shot `CancelRequest` that has already been forwarded and can be
/// closed.
pub async fn mediate(client: &mut TcpStream, upstream: &mut TcpStream) -> Result<bool, Error> {
    loop {
        match read_startup(client).await? {
            StartupRequest::Ssl => {
                debug!("refusing SSLRequest so SQL stays observable in cleartext");
                client.write_all(b"N").await?;
            }
            StartupRequest::Gss => {
                debug!("refusing GSSEncRequest so SQL stays observable in cleartext");
                client.write_all(b"N").await?;
            }
            StartupRequest::Cancel { raw, .. } => {
                debug!("forwarding CancelRequest to upstream verbatim");
                upstream.write_all(&raw).await?;
                upstream.shutdown().await.ok();
                return Ok(false);
            }
            StartupRequest::Startup { params, raw } => {
                debug!(user = ?params.get("user"), database = ?params.get("database"), "forwarding StartupMessage to upstream");
                upstream.write_all(&raw).await?;
                return Ok(true);
            }
        }
    }
}
