//! Request size limits.
//!
//! # Responsibilities
//! - Enforce maximum request line length
//! - Enforce maximum number of lines per request
//!
//! # Design Decisions
//! - Limits checked while reading (early rejection), before a field is parsed
//! - A violation is a `malformedRequest`, like any other framing error

use tokio_util::codec::LinesCodec;

use crate::config::ProtocolConfig;
use crate::protocol::{ProtocolResult, ServerError};

/// Per-request guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestLimits {
    pub max_request_lines: Option<usize>,
    pub max_line_length: usize,
}

impl RequestLimits {
    pub fn new(config: &ProtocolConfig) -> Self {
        Self {
            max_request_lines: config.max_request_lines,
            max_line_length: config.max_line_length,
        }
    }

    /// Line codec enforcing the length limit.
    pub fn line_codec(&self) -> LinesCodec {
        LinesCodec::new_with_max_length(self.max_line_length)
    }

    /// Admit the `n`th (1-based) non-terminating line of a request.
    pub fn admit_line(&self, n: usize) -> ProtocolResult<()> {
        match self.max_request_lines {
            Some(max) if n > max => {
                tracing::debug!(lines = n, max, "Too many request lines");
                Err(ServerError::MalformedRequest)
            }
            _ => Ok(()),
        }
    }
}

impl Default for RequestLimits {
    fn default() -> Self {
        Self::new(&ProtocolConfig::default())
    }
}
