//! The accept loop (component C3): bind the listen address, dial upstream
//! and spawn a session per accepted connection, and shut down cleanly on
//! SIGINT/SIGTERM.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal::unix::{signal as unix_signal, SignalKind};
use tracing::{debug, info, warn};

use crate::errors::Error;
use crate::rewrite::RewriterFactory;
use crate::session;

use super::config::Config;

/// Run the accept loop until SIGINT or SIGTERM is received. Each accepted
/// connection is handled in its own task; this function returns once no
/// new connections are accepted and, currently, does not wait for
/// in-flight sessions to drain before returning (see DESIGN.md).
pub async fn run(config: Config, rewriter_factory: Arc<dyn RewriterFactory>) -> Result<(), Error> {
    let listener = TcpListener::bind(config.listen)
        .await
        .map_err(|source| Error::Bind {
            addr: config.listen,
            source,
        })?;
    info!(listen = %config.listen, upstream = %config.upstream, "listening for connections");

    let mut term_signal = unix_signal(SignalKind::terminate())
        .map_err(|err| Error::Config(format!("failed to install SIGTERM handler: {err}")))?;
    let mut interrupt_signal = unix_signal(SignalKind::interrupt())
        .map_err(|err| Error::Config(format!("failed to install SIGINT handler: {err}")))?;

    let sessions_accepted = Arc::new(AtomicU64::new(0));

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (client, client_addr) = match accepted {
                    Ok(pair) => pair,
                    Err(err) => {
                        warn!(error = %err, "failed to accept connection");
                        continue;
                    }
                };

                let count = sessions_accepted.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(%client_addr, total = count, "accepted connection");

                let upstream_addr = config.upstream;
                let rewriter_factory = rewriter_factory.clone();
                tokio::spawn(async move {
                    session::run(client, client_addr, upstream_addr, rewriter_factory).await;
                });
            }
            _ = interrupt_signal.recv() => {
                info!("got SIGINT, shutting down");
                return Ok(());
            }
            _ = term_signal.recv() => {
                info!("got SIGTERM, shutting down");
                return Ok(());
            }
        }
    }
}
