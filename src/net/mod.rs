//! Network layer.
//!
//! ```text
//! TcpListener ──accept (slot held)──▶ session::serve_connection   client port
//!                                 └─▶ admin::serve_admin_connection admin port
//! ```
//!
//! Client connections are also counted in [`OpenSessions`] so shutdown can
//! wait for in-flight requests.

pub mod connection;
pub mod listener;

pub use connection::{OpenSessions, SessionGuard, SessionId};
pub use listener::{Accepted, ConnectionSlot, Listener, ListenerError, Port};
