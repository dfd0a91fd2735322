//! Common configuration types for Temp Voice components.

use crate::secret::SecretString;
use serde::Deserialize;

/// Default maximum number of pooled database connections.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Database configuration.
///
/// The connection URL carries credentials, so it is held as a
/// [`SecretString`] and never appears in `Debug` output.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection string
    pub url: SecretString,
    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    DEFAULT_MAX_CONNECTIONS
}

impl DatabaseConfig {
    /// Build a config from a URL with the default pool size.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: SecretString::from(url.into()),
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::secret::ExposeSecret;

    #[test]
    fn test_deserialize_applies_pool_default() {
        let json = r#"{"url": "postgres://tv:pw@localhost/tempvoice"}"#;
        let config: DatabaseConfig = serde_json::from_str(json).expect("deserialize");

        assert_eq!(config.max_connections, DEFAULT_MAX_CONNECTIONS);
        assert_eq!(
            config.url.expose_secret(),
            "postgres://tv:pw@localhost/tempvoice"
        );
    }

    #[test]
    fn test_debug_hides_url() {
        let config = DatabaseConfig::new("postgres://tv:pw@localhost/tempvoice");
        let debug = format!("{config:?}");
        assert!(!debug.contains("pw@localhost"));
    }
}
