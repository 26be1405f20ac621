//! A single client session: the startup mediator that handles SSL/GSS
//! refusal and hands off verbatim to the upstream connection, followed by
//! the bidirectional pump that rewrites SQL in the client-to-upstream
//! direction.

pub mod pump;
pub mod startup;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpStream;
use tracing::{info, warn};

use crate::errors::Error;
use crate::rewrite::RewriterFactory;

/// Drive one accepted client connection end to end: run the startup
/// mediator, then the pump, until either side disconnects.
pub async fn run(
    client: TcpStream,
    client_addr: SocketAddr,
    upstream_addr: SocketAddr,
    rewriter_factory: Arc<dyn RewriterFactory>,
) {
    if let Err(err) = client.set_nodelay(true) {
        warn!(%client_addr, error = %err, "failed to set TCP_NODELAY on client socket");
    }

    match connect_upstream(upstream_addr).await {
        Ok(upstream) => {
            if let Err(err) = run_session(client, upstream, client_addr, rewriter_factory).await {
                warn!(%client_addr, error = %err, "session ended with an error");
            } else {
                info!(%client_addr, "session closed");
            }
        }
        Err(err) => {
            warn!(%client_addr, %upstream_addr, error = %err, "failed to dial upstream");
        }
    }
}

async fn connect_upstream(upstream_addr: SocketAddr) -> Result<TcpStream, Error> {
    let stream =
        TcpStream::connect(upstream_addr)
            .await
            .map_err(|source| Error::UpstreamDial {
                addr: upstream_addr,
                source,
            })?;
    stream.set_nodelay(true).ok();
    Ok(stream)
}

async fn run_session(
    client: TcpStream,
    upstream: TcpStream,
    client_addr: SocketAddr,
    rewriter_factory: Arc<dyn RewriterFactory>,
) -> Result<(), Error> {
    let mut client = client;
    let mut upstream = upstream;

    let handoff = startup::mediate(&mut client, &mut upstream).await?;
    if !handoff {
        // Client sent a CancelRequest or was refused during startup; there
        // is no session to pump.
        return Ok(());
    }

    let rewriter = rewriter_factory
        .new_rewriter()
        .map_err(|err| Error::RewriterFactory(err.0))?;

    pump::run(client, upstream, client_addr, rewriter).await
}
