//! Request Session: one client connection, one request, one response.
//!
//! # Data Flow
//! ```text
//! accepted TcpStream
//!     → FramedRead<LinesCodec> (line length guard)
//!     → state.rs (ACCUMULATING, per-request timeout)
//!     → handlers.rs (ANSWERING)
//!     → write response, close (FINISHED)
//!     → RequestLog::record (failures swallowed)
//! ```
//!
//! # Design Decisions
//! - Shared services live in one `SessionContext` handed to every session
//! - A timeout or disconnect before the request is complete is a transport
//!   abort: no response, no request log entry
//! - Runtime switches and the router are each read once per request

pub mod handlers;
pub mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use arc_swap::ArcSwap;
use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio_util::codec::{FramedRead, LinesCodecError};
use tracing::Instrument;

use crate::config::{ProtocolConfig, RuntimeSwitches};
use crate::identity::IdentityResolver;
use crate::net::{Accepted, Listener, ListenerError, OpenSessions};
use crate::observability::metrics;
use crate::protocol::ServerError;
use crate::routing::DatabaseRouter;
use crate::security::{LookupLimiter, RequestLimits};
use crate::storage::{RequestLog, Stores};

pub use handlers::{answer, Answer};
pub use state::{RequestSession, SessionState};

/// Services shared by all sessions.
pub struct SessionContext {
    pub protocol: ProtocolConfig,
    pub limits: RequestLimits,
    pub switches: Arc<ArcSwap<RuntimeSwitches>>,
    pub router: Arc<DatabaseRouter>,
    pub identity: IdentityResolver,
    pub limiter: LookupLimiter,
    pub request_log: Arc<dyn RequestLog>,
}

impl SessionContext {
    pub fn new(
        protocol: ProtocolConfig,
        switches: Arc<ArcSwap<RuntimeSwitches>>,
        router: Arc<DatabaseRouter>,
        stores: &Stores,
    ) -> Self {
        Self {
            limits: RequestLimits::new(&protocol),
            protocol,
            switches,
            router,
            identity: IdentityResolver::new(Arc::clone(&stores.users)),
            limiter: LookupLimiter::new(Arc::clone(&stores.request_log)),
            request_log: Arc::clone(&stores.request_log),
        }
    }
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("protocol", &self.protocol)
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

/// Why a connection ended without a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Abort {
    Disconnected,
    TimedOut,
}

/// Serve one client connection to completion.
pub async fn serve_connection(mut stream: TcpStream, peer: SocketAddr, ctx: Arc<SessionContext>) {
    let mut session = RequestSession::new(ctx.limits);

    let (reader, mut writer) = stream.split();
    let mut lines = FramedRead::new(reader, ctx.limits.line_codec());

    let accumulate = async {
        while let Some(line) = lines.next().await {
            match line {
                Ok(line) => {
                    if session.feed_line(&line) != SessionState::Accumulating {
                        return Ok(());
                    }
                }
                Err(LinesCodecError::MaxLineLengthExceeded) => {
                    session.fail(ServerError::MalformedRequest);
                    return Ok(());
                }
                Err(LinesCodecError::Io(e)) if e.kind() == std::io::ErrorKind::InvalidData => {
                    // Not UTF-8.
                    session.fail(ServerError::MalformedRequest);
                    return Ok(());
                }
                Err(LinesCodecError::Io(e)) => {
                    tracing::debug!(error = %e, "Read failed");
                    return Err(Abort::Disconnected);
                }
            }
        }
        Err(Abort::Disconnected)
    };

    let accumulated = match tokio::time::timeout(ctx.protocol.request_timeout(), accumulate).await {
        Ok(result) => result,
        Err(_) => Err(Abort::TimedOut),
    };
    if let Err(abort) = accumulated {
        tracing::debug!(?abort, "Connection closed before request was complete");
        return;
    }

    let SessionState::Answering(error) = session.state() else {
        return;
    };

    // EOF or a read error while answering means the client is gone. Anything
    // else it sends after the request is ignored.
    let disconnected = async {
        loop {
            match lines.next().await {
                None => return,
                Some(Err(LinesCodecError::Io(e))) if e.kind() != std::io::ErrorKind::InvalidData => {
                    return
                }
                Some(_) => {}
            }
        }
    };
    let answer = tokio::select! {
        biased;
        answer = handlers::answer(&ctx, session.request(), error, Some(peer.ip())) => answer,
        () = disconnected => {
            tracing::debug!(abort = ?Abort::Disconnected, "Client left while the request was processed");
            return;
        }
    };

    let written = async {
        writer.write_all(&answer.response).await?;
        writer.flush().await?;
        writer.shutdown().await
    }
    .await;
    if let Err(e) = written {
        tracing::debug!(error = %e, "Failed to write response");
    }
    session.finish();

    metrics::record_request(answer.error);
    tracing::info!(
        transaction_id = answer.log_entry.transaction_id.as_deref().unwrap_or("-"),
        user_id = answer.log_entry.user_id.map(|u| u.0),
        error = answer.error.map(ServerError::code),
        "Request served"
    );
    if let Err(e) = ctx.request_log.record(answer.log_entry).await {
        tracing::error!(error = %e, "Failed to record request");
    }
}

/// Accept client connections until shutdown.
pub async fn run_client_listener(
    listener: Listener,
    ctx: Arc<SessionContext>,
    sessions: OpenSessions,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), ListenerError> {
    loop {
        let accepted = tokio::select! {
            accepted = listener.accept() => accepted,
            _ = shutdown.recv() => {
                tracing::info!("Client listener stopping");
                return Ok(());
            }
        };

        let Accepted { stream, peer, slot } = match accepted {
            Ok(accepted) => accepted,
            Err(ListenerError::Accept(e)) => {
                tracing::warn!(error = %e, "Accept failed");
                continue;
            }
            Err(e) => return Err(e),
        };

        let guard = sessions.open();
        let span = tracing::info_span!("session", session_id = %guard.id(), peer = %peer);
        let ctx = Arc::clone(&ctx);
        tokio::spawn(
            async move {
                serve_connection(stream, peer, ctx).await;
                drop(guard);
                drop(slot);
            }
            .instrument(span),
        );
    }
}
