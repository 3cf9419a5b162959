//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the server.
//! All types derive Serde traits for deserialization from config files.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::routing::router::{ARTICLE_COUNT_DELTA, MIN_ARTICLE_COUNT};

/// Root configuration for the iPedia server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Client protocol listener.
    pub listener: ListenerConfig,

    /// Administrative channel listener.
    pub admin: AdminConfig,

    /// Wire protocol constants and guards.
    pub protocol: ProtocolConfig,

    /// Unregistered lookup limits.
    pub limits: LimitsConfig,

    /// Article and user data.
    pub storage: StorageConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl ServerConfig {
    /// The part of the config that may change while the server runs.
    pub fn runtime_switches(&self) -> RuntimeSwitches {
        RuntimeSwitches {
            force_upgrade: self.protocol.force_upgrade,
            limits: self.limits.clone(),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:9000").
    pub bind_address: String,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:9000".to_string(),
            max_connections: 1_000,
        }
    }
}

/// Administrative channel configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin listener.
    pub enabled: bool,

    /// Admin bind address. Keep it on loopback.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "127.0.0.1:9001".to_string(),
        }
    }
}

/// Wire protocol settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// The only `Protocol-Version` accepted.
    pub protocol_version: String,

    /// Value sent as `Format-Version` with every article.
    pub format_version: String,

    /// Maximum request lines before the request is malformed. `None` disables
    /// the guard.
    pub max_request_lines: Option<usize>,

    /// Maximum bytes in one request line.
    pub max_line_length: usize,

    /// Time allowed to deliver a complete request.
    pub request_timeout_secs: u64,

    /// Answer every request with `forceUpgrade`.
    pub force_upgrade: bool,
}

impl ProtocolConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            protocol_version: "1".to_string(),
            format_version: "1".to_string(),
            max_request_lines: Some(20),
            max_line_length: 4096,
            request_timeout_secs: 120,
            force_upgrade: false,
        }
    }
}

/// Lookup limits for unregistered users.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Disable for trusted deployments.
    pub lookup_limit_enabled: bool,

    /// Lifetime `Get-Article` lookups.
    pub unregistered_lookups_limit: u64,

    /// `Get-Article` lookups in the trailing 24 hours.
    pub unregistered_lookups_daily_limit: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            lookup_limit_enabled: true,
            unregistered_lookups_limit: 10,
            unregistered_lookups_daily_limit: 2,
        }
    }
}

/// Article database and user data settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory of `<db name>.json` article databases and
    /// `registration_codes.json`.
    pub data_dir: Option<PathBuf>,

    /// Language code -> database to use at startup instead of the newest.
    pub default_database: HashMap<String, String>,

    /// Databases with fewer articles (after the delta) are never made current.
    pub min_article_count: u64,

    /// Subtracted from raw article counts before they are reported.
    pub article_count_delta: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            default_database: HashMap::new(),
            min_article_count: MIN_ARTICLE_COUNT,
            article_count_delta: ARTICLE_COUNT_DELTA,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable the Prometheus exporter.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// Settings applied live on config reload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeSwitches {
    pub force_upgrade: bool,
    pub limits: LimitsConfig,
}
