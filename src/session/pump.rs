//! The bidirectional pump (component C5): client-to-upstream traffic is
//! parsed just enough to find `Query`/`Parse` messages and rewrite their SQL;
//! upstream-to-client traffic is forwarded as opaque bytes. Both directions
//! run as separate tasks raced against each other so that either side
//! closing unblocks the other.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::errors::Error;
use crate::messages::{
    encode_query, line_diff, read_frontend_message, rewrite_failed_notice, rewritten_notice,
    FrontendMessage, ParseMessage,
};
use crate::rewrite::Rewriter;

const COPY_BUFFER_SIZE: usize = 16 * 1024;

/// Run the pump until either direction ends, then tear down the other.
pub async fn run(
    client: TcpStream,
    upstream: TcpStream,
    client_addr: SocketAddr,
    rewriter: Box<dyn Rewriter>,
) -> Result<(), Error> {
    let (client_read, client_write) = client.into_split();
    let (upstream_read, upstream_write) = upstream.into_split();
    let client_write = Arc::new(Mutex::new(client_write));

    let mut to_upstream = tokio::spawn(pump_client_to_upstream(
        client_read,
        upstream_write,
        client_write.clone(),
        rewriter,
    ));
    let mut to_client = tokio::spawn(pump_upstream_to_client(upstream_read, client_write));

    tokio::select! {
        result = &mut to_upstream => {
            to_client.abort();
            debug!(%client_addr, "client-to-upstream direction closed first");
            result.map_err(|err| Error::Io(std::io::Error::other(err)))?
        }
        result = &mut to_client => {
            to_upstream.abort();
            debug!(%client_addr, "upstream-to-client direction closed first");
            result.map_err(|err| Error::Io(std::io::Error::other(err)))?
        }
    }
}

async fn pump_client_to_upstream(
    mut client_read: tokio::net::tcp::OwnedReadHalf,
    mut upstream_write: OwnedWriteHalf,
    client_write: Arc<Mutex<OwnedWriteHalf>>,
    mut rewriter: Box<dyn Rewriter>,
) -> Result<(), Error> {
    loop {
        let message = match read_frontend_message(&mut client_read).await {
            Ok(message) => message,
            Err(_) => return Ok(()), // client closed the connection
        };

        match message {
            FrontendMessage::Query(sql) => {
                let forwarded = rewrite_and_notice(
                    sql,
                    &client_write,
                    |sql| rewriter.rewrite_query(sql),
                )
                .await?;
                upstream_write.write_all(&encode_query(&forwarded)).await?;
            }
            FrontendMessage::Parse(parse) => {
                let forwarded = rewrite_and_notice(
                    parse.query,
                    &client_write,
                    |sql| rewriter.rewrite_parse(sql),
                )
                .await?;
                let message = ParseMessage {
                    statement: parse.statement,
                    query: forwarded,
                    param_type_oids: parse.param_type_oids,
                };
                upstream_write.write_all(&message.encode()).await?;
            }
            FrontendMessage::Other(raw) => {
                upstream_write.write_all(&raw.encode()).await?;
            }
        }
    }
}

/// Apply `rewrite` to `sql`, send the appropriate notice to the client on a
/// change or a failure, and return the bytes that should be forwarded.
///
/// `sql` is forwarded verbatim, byte-for-byte, whenever the rewriter leaves
/// it unchanged or cannot be consulted at all: the rewriter contract works
/// on `&str`, but SQL under a non-UTF-8 `client_encoding` (WIN1251, LATIN1,
/// KOI8R, ...) is not valid UTF-8, and re-serializing a lossily-decoded
/// copy would corrupt those bytes and their length prefix on the wire.
async fn rewrite_and_notice(
    sql: BytesMut,
    client_write: &Arc<Mutex<OwnedWriteHalf>>,
    rewrite: impl FnOnce(&str) -> Result<String, crate::errors::RewriteError>,
) -> Result<BytesMut, Error> {
    let Ok(text) = std::str::from_utf8(&sql) else {
        return Ok(sql);
    };

    match rewrite(text) {
        Ok(rewritten) if rewritten.as_bytes() == &sql[..] => Ok(sql),
        Ok(rewritten) => {
            let detail = line_diff(text, &rewritten);
            send_notice(client_write, rewritten_notice(&detail)).await?;
            Ok(BytesMut::from(rewritten.as_bytes()))
        }
        Err(err) => {
            warn!(error = %err, "rewriter returned an error, forwarding original query");
            send_notice(client_write, rewrite_failed_notice(&err.0)).await?;
            Ok(sql)
        }
    }
}

async fn send_notice(
    client_write: &Arc<Mutex<OwnedWriteHalf>>,
    notice: BytesMut,
) -> Result<(), Error> {
    let mut guard = client_write.lock().await;
    guard
        .write_all(&notice)
        .await
        .map_err(Error::NoticeSend)
}

async fn pump_upstream_to_client(
    mut upstream_read: tokio::net::tcp::OwnedReadHalf,
    client_write: Arc<Mutex<OwnedWriteHalf>>,
) -> Result<(), Error> {
    let mut buf = BytesMut::zeroed(COPY_BUFFER_SIZE);
    loop {
        let n = upstream_read.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        let mut guard = client_write.lock().await;
        guard.write_all(&buf[..n]).await?;
    }
}
