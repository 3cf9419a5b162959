//! Administrative Channel.
//!
//! # Responsibilities
//! - Listen on a separate (loopback) port
//! - List known databases and switch the current one live
//!
//! # Design Decisions
//! - Only touches the Database Router, never user or article data
//! - No error protocol: unrecognized input closes the connection
//! - Idle connections are closed so they cannot hold every admin slot
//! - No authentication; bind it where only operators can reach it

pub mod handlers;

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio_util::codec::{FramedRead, LinesCodec};
use tracing::Instrument;

use crate::net::{Accepted, Listener, ListenerError, SessionId};
use crate::routing::DatabaseRouter;

pub use handlers::{execute, AdminCommand};

/// Longest admin command accepted.
const MAX_COMMAND_LENGTH: usize = 1024;

/// Serve one operator connection, closing it after `idle` without a command.
pub async fn serve_admin_connection(
    mut stream: TcpStream,
    router: Arc<DatabaseRouter>,
    idle: Duration,
) {
    let (reader, mut writer) = stream.split();
    let mut lines = FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_COMMAND_LENGTH));

    loop {
        let line = match tokio::time::timeout(idle, lines.next()).await {
            Ok(Some(Ok(line))) => line,
            Ok(_) => break,
            Err(_) => {
                tracing::debug!(idle_secs = idle.as_secs(), "Admin connection idle, closing");
                break;
            }
        };
        let Some(command) = AdminCommand::parse(&line) else {
            tracing::debug!(input = %line, "Unrecognized admin input, closing");
            break;
        };
        let reply = execute(&router, command).await;
        if writer.write_all(reply.as_bytes()).await.is_err() {
            break;
        }
    }
    let _ = writer.shutdown().await;
}

/// Accept operator connections until shutdown.
pub async fn run_admin_listener(
    listener: Listener,
    router: Arc<DatabaseRouter>,
    idle: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), ListenerError> {
    loop {
        let accepted = tokio::select! {
            accepted = listener.accept() => accepted,
            _ = shutdown.recv() => {
                tracing::info!("Admin listener stopping");
                return Ok(());
            }
        };
        let Accepted { stream, peer, slot } = match accepted {
            Ok(accepted) => accepted,
            Err(ListenerError::Accept(e)) => {
                tracing::warn!(error = %e, "Admin accept failed");
                continue;
            }
            Err(e) => return Err(e),
        };

        tracing::info!(peer = %peer, "Admin connection");
        let span = tracing::info_span!("admin", session_id = %SessionId::next(), peer = %peer);
        let router = Arc::clone(&router);
        tokio::spawn(
            async move {
                serve_admin_connection(stream, router, idle).await;
                drop(slot);
            }
            .instrument(span),
        );
    }
}
