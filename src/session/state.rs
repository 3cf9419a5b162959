//! Request accumulation state machine.
//!
//! ```text
//!   ACCUMULATING ──empty line──────────▶ ANSWERING(None)
//!        │      ──bad line / guard────▶ ANSWERING(Some(err))
//!        │
//!   ANSWERING ──response written──────▶ FINISHED
//! ```
//!
//! Transport problems (EOF before the empty line, timeout, read errors) never
//! reach ANSWERING; the connection is dropped without a response.

use crate::protocol::{decode_field, ParsedRequest, ServerError};
use crate::security::RequestLimits;

/// Where a session is in its single request/response exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Accumulating,
    /// Ready to answer, carrying the first accumulation error if any.
    Answering(Option<ServerError>),
    Finished,
}

/// One request being read off a connection.
#[derive(Debug)]
pub struct RequestSession {
    state: SessionState,
    request: ParsedRequest,
    lines: usize,
    limits: RequestLimits,
}

impl RequestSession {
    pub fn new(limits: RequestLimits) -> Self {
        Self {
            state: SessionState::Accumulating,
            request: ParsedRequest::new(),
            lines: 0,
            limits,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn request(&self) -> &ParsedRequest {
        &self.request
    }

    /// Feed one line (without its terminator). Returns the state afterwards.
    /// Lines arriving after accumulation ended are ignored.
    pub fn feed_line(&mut self, line: &str) -> SessionState {
        if self.state != SessionState::Accumulating {
            return self.state;
        }
        if line.is_empty() {
            self.state = SessionState::Answering(None);
            return self.state;
        }

        self.lines += 1;
        let accepted = self
            .limits
            .admit_line(self.lines)
            .and_then(|()| decode_field(line))
            .and_then(|field| self.request.insert(field));
        if let Err(err) = accepted {
            tracing::debug!(line = %line, error = %err, "Rejected request line");
            self.state = SessionState::Answering(Some(err));
        }
        self.state
    }

    /// End accumulation early with `err` (e.g. an oversized line).
    pub fn fail(&mut self, err: ServerError) {
        if self.state == SessionState::Accumulating {
            self.state = SessionState::Answering(Some(err));
        }
    }

    /// Mark the response as sent.
    pub fn finish(&mut self) {
        self.state = SessionState::Finished;
    }
}
