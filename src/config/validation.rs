//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse)
//! - Detect conflicting listeners
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::ServerConfig;
use crate::routing::dbname::{DbName, Lang};

/// A single semantic problem with a config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let client_addr = check_addr(&mut errors, "listener.bind_address", &config.listener.bind_address);
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::new("listener.max_connections", "must be greater than 0"));
    }

    if config.admin.enabled {
        let admin_addr = check_addr(&mut errors, "admin.bind_address", &config.admin.bind_address);
        if let (Some(client), Some(admin)) = (client_addr, admin_addr) {
            if client == admin && client.port() != 0 {
                errors.push(ValidationError::new(
                    "admin.bind_address",
                    "must differ from listener.bind_address",
                ));
            }
        }
    }

    let protocol = &config.protocol;
    if protocol.protocol_version.trim().is_empty() {
        errors.push(ValidationError::new("protocol.protocol_version", "must not be empty"));
    }
    if protocol.format_version.trim().is_empty() {
        errors.push(ValidationError::new("protocol.format_version", "must not be empty"));
    }
    if protocol.max_request_lines == Some(0) {
        errors.push(ValidationError::new(
            "protocol.max_request_lines",
            "must be greater than 0 (omit it to disable the guard)",
        ));
    }
    if protocol.max_line_length == 0 {
        errors.push(ValidationError::new("protocol.max_line_length", "must be greater than 0"));
    }
    if protocol.request_timeout_secs == 0 {
        errors.push(ValidationError::new("protocol.request_timeout_secs", "must be greater than 0"));
    }

    let limits = &config.limits;
    if limits.unregistered_lookups_daily_limit > limits.unregistered_lookups_limit {
        errors.push(ValidationError::new(
            "limits.unregistered_lookups_daily_limit",
            "must not exceed limits.unregistered_lookups_limit",
        ));
    }

    for (lang, db_name) in &config.storage.default_database {
        let Some(lang) = Lang::from_code(lang) else {
            errors.push(ValidationError::new(
                format!("storage.default_database.{lang}"),
                "unsupported language",
            ));
            continue;
        };
        match DbName::parse(db_name) {
            Some(name) if name.lang() == lang => {}
            Some(_) => errors.push(ValidationError::new(
                format!("storage.default_database.{lang}"),
                format!("'{db_name}' belongs to another language"),
            )),
            None => errors.push(ValidationError::new(
                format!("storage.default_database.{lang}"),
                format!("'{db_name}' is not an article database name"),
            )),
        }
    }

    if config.observability.metrics_enabled {
        check_addr(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_addr(errors: &mut Vec<ValidationError>, field: &str, value: &str) -> Option<SocketAddr> {
    match value.parse::<SocketAddr>() {
        Ok(addr) => Some(addr),
        Err(_) => {
            errors.push(ValidationError::new(field, format!("'{value}' is not a socket address")));
            None
        }
    }
}
