//! Lookup allowance for unregistered users.
//!
//! Unregistered users get a lifetime allowance of `Get-Article` lookups plus
//! a small daily allowance once that is used up. A lookup is refused only
//! when both are exhausted. Counts come from the request history; they last
//! as long as the history backend keeps them. The in-memory backend keeps
//! them across restarts only through its state file in the data directory.

use std::sync::Arc;
use std::time::SystemTime;

use crate::config::LimitsConfig;
use crate::observability::metrics;
use crate::protocol::{ProtocolResult, ServerError};
use crate::storage::{RequestLog, UserId, LOOKUP_WINDOW as DAILY_WINDOW};

/// Checks lookup counts against [`LimitsConfig`].
#[derive(Clone)]
pub struct LookupLimiter {
    request_log: Arc<dyn RequestLog>,
}

impl LookupLimiter {
    pub fn new(request_log: Arc<dyn RequestLog>) -> Self {
        Self { request_log }
    }

    /// Decide whether `user_id` may look up another article at `now`.
    pub async fn check(
        &self,
        user_id: UserId,
        registered: bool,
        limits: &LimitsConfig,
        now: SystemTime,
    ) -> ProtocolResult<()> {
        if registered || !limits.lookup_limit_enabled {
            return Ok(());
        }

        let lifetime = self.request_log.count_lookups(user_id, None).await?;
        if lifetime < limits.unregistered_lookups_limit {
            return Ok(());
        }

        let since = now.checked_sub(DAILY_WINDOW).unwrap_or(SystemTime::UNIX_EPOCH);
        let daily = self.request_log.count_lookups(user_id, Some(since)).await?;
        if daily < limits.unregistered_lookups_daily_limit {
            return Ok(());
        }

        tracing::info!(
            user_id = %user_id,
            lifetime,
            daily,
            "Lookup limit reached"
        );
        metrics::record_lookup_limited();
        Err(ServerError::LookupLimitReached)
    }
}

impl std::fmt::Debug for LookupLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LookupLimiter").finish_non_exhaustive()
    }
}
