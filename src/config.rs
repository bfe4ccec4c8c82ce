//! Facade Configuration
//!
//! The only runtime input is the backend connection string. Resource names
//! are fixed by [`ResourceLayout`] and not configurable per call.

use std::env;

use crate::constants::{CONNECTION_STRING_ENV_VAR, MEMORY_SCHEME};
use crate::provision::ResourceLayout;
use crate::storage::{StorageError, StorageResult};

/// Configuration resolved once at startup.
#[derive(Debug, Clone)]
pub struct FacadeConfig {
    /// Backend connection string, e.g. `memory://` or `postgres://…`
    pub connection_string: String,
    /// Physical resource names
    pub layout: ResourceLayout,
}

impl FacadeConfig {
    /// Config for `connection_string` with the default layout.
    ///
    /// # Errors
    /// Returns `Configuration` if the connection string is blank.
    pub fn new(connection_string: impl Into<String>) -> StorageResult<Self> {
        let connection_string = connection_string.into();
        if connection_string.trim().is_empty() {
            return Err(missing_connection_string());
        }
        Ok(Self {
            connection_string,
            layout: ResourceLayout::default(),
        })
    }

    /// Load from `DEPOT_CONNECTION_STRING`.
    ///
    /// Call `dotenvy::dotenv()` first to pick up a `.env` file.
    ///
    /// # Errors
    /// Returns `Configuration` if the variable is unset or blank.
    pub fn from_env() -> StorageResult<Self> {
        Self::resolve(None)
    }

    /// Prefer an explicit connection string, fall back to the environment.
    ///
    /// # Errors
    /// Returns `Configuration` if neither yields a non-blank value.
    pub fn resolve(explicit: Option<String>) -> StorageResult<Self> {
        let connection_string = explicit
            .or_else(|| env::var(CONNECTION_STRING_ENV_VAR).ok())
            .ok_or_else(missing_connection_string)?;
        Self::new(connection_string)
    }

    /// Replace the resource layout.
    #[must_use]
    pub fn with_layout(mut self, layout: ResourceLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Whether the backend lives in this process only, so its state is
    /// gone when the process exits.
    #[must_use]
    pub fn is_ephemeral(&self) -> bool {
        self.connection_string.starts_with(MEMORY_SCHEME)
    }

    /// Connection string with any password masked, for logging.
    #[must_use]
    pub fn redacted_connection_string(&self) -> String {
        let s = &self.connection_string;
        let Some(scheme_end) = s.find("://").map(|i| i + 3) else {
            return s.clone();
        };
        let rest = &s[scheme_end..];
        let Some(at) = rest.find('@') else {
            return s.clone();
        };
        let credentials = &rest[..at];
        match credentials.find(':') {
            Some(colon) => format!(
                "{}{}:****{}",
                &s[..scheme_end],
                &credentials[..colon],
                &rest[at..]
            ),
            None => s.clone(),
        }
    }
}

fn missing_connection_string() -> StorageError {
    StorageError::configuration(format!(
        "no storage connection string; set {CONNECTION_STRING_ENV_VAR} or pass --connection-string"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_connection_string_is_fatal() {
        assert!(matches!(
            FacadeConfig::new("   "),
            Err(StorageError::Configuration(_))
        ));
    }

    #[test]
    fn test_explicit_wins() {
        let config = FacadeConfig::resolve(Some("memory://".to_string())).unwrap();
        assert_eq!(config.connection_string, "memory://");
        assert_eq!(config.layout, ResourceLayout::default());
    }

    #[test]
    fn test_memory_backend_is_ephemeral() {
        assert!(FacadeConfig::new("memory://").unwrap().is_ephemeral());
        assert!(!FacadeConfig::new("postgres://db/depot").unwrap().is_ephemeral());
    }

    #[test]
    fn test_redaction() {
        let config = FacadeConfig::new("postgres://depot:hunter2@db:5432/depot").unwrap();
        assert_eq!(
            config.redacted_connection_string(),
            "postgres://depot:****@db:5432/depot"
        );

        let config = FacadeConfig::new("memory://").unwrap();
        assert_eq!(config.redacted_connection_string(), "memory://");
    }
}
