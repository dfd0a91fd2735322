//! Temp Voice configuration.
//!
//! Configuration is loaded from environment variables. The database URL is
//! redacted in Debug output.

use crate::models::SessionDefaults;
use common::config::{DatabaseConfig, DEFAULT_MAX_CONNECTIONS};
use common::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Default deadline for a single-choice dialog step.
pub const DEFAULT_DIALOG_TIMEOUT_SECONDS: u64 = 60;

/// Default deadline for the member-selection step of access-list editing.
pub const DEFAULT_MEMBER_SELECT_TIMEOUT_SECONDS: u64 = 120;

/// Default lifetime of the control panel collector (12 hours).
pub const DEFAULT_PANEL_TIMEOUT_SECONDS: u64 = 43_200;

/// Upper bound on member ids accepted in one selection.
pub const DEFAULT_MAX_MEMBER_SELECTION: usize = 25;

/// Room name template; `{owner}` is replaced by the owner's display name.
pub const DEFAULT_ROOM_NAME_TEMPLATE: &str = "{owner}'s Room";

/// How long shutdown waits for live-room tasks to wind down.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECONDS: u64 = 10;

/// Temp Voice configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Session and access-list database, see [`crate::repositories::connect`].
    pub database: DatabaseConfig,

    /// Deadline for ordinary dialog steps (default: 60s).
    pub dialog_timeout: Duration,

    /// Deadline for the member-selection step (default: 120s).
    pub member_select_timeout: Duration,

    /// Lifetime of the control panel collector (default: 12h).
    pub panel_timeout: Duration,

    /// Maximum members accepted in one selection (default: 25).
    pub max_member_selection: usize,

    /// Room name template for new sessions.
    pub room_name_template: String,

    /// Deny the owner re-entry to the trigger room while their room exists.
    pub lock_trigger_while_open: bool,

    /// Bounded wait for live-room tasks during shutdown.
    pub shutdown_timeout: Duration,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let url = SecretString::from(
            vars.get("DATABASE_URL")
                .ok_or_else(|| ConfigError::MissingEnvVar("DATABASE_URL".to_string()))?
                .clone(),
        );

        let max_connections =
            parse_var(vars, "TEMPVOICE_DB_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?;

        let dialog_timeout = Duration::from_secs(parse_var(
            vars,
            "TEMPVOICE_DIALOG_TIMEOUT_SECONDS",
            DEFAULT_DIALOG_TIMEOUT_SECONDS,
        )?);

        let member_select_timeout = Duration::from_secs(parse_var(
            vars,
            "TEMPVOICE_MEMBER_SELECT_TIMEOUT_SECONDS",
            DEFAULT_MEMBER_SELECT_TIMEOUT_SECONDS,
        )?);

        let panel_timeout = Duration::from_secs(parse_var(
            vars,
            "TEMPVOICE_PANEL_TIMEOUT_SECONDS",
            DEFAULT_PANEL_TIMEOUT_SECONDS,
        )?);

        let max_member_selection = parse_var(
            vars,
            "TEMPVOICE_MAX_MEMBER_SELECTION",
            DEFAULT_MAX_MEMBER_SELECTION,
        )?;
        if max_member_selection == 0 {
            return Err(ConfigError::InvalidValue(
                "TEMPVOICE_MAX_MEMBER_SELECTION must be at least 1".to_string(),
            ));
        }

        let room_name_template = vars
            .get("TEMPVOICE_DEFAULT_ROOM_NAME")
            .cloned()
            .unwrap_or_else(|| DEFAULT_ROOM_NAME_TEMPLATE.to_string());

        let lock_trigger_while_open =
            parse_var(vars, "TEMPVOICE_LOCK_TRIGGER_WHILE_OPEN", true)?;

        let shutdown_timeout = Duration::from_secs(parse_var(
            vars,
            "TEMPVOICE_SHUTDOWN_TIMEOUT_SECONDS",
            DEFAULT_SHUTDOWN_TIMEOUT_SECONDS,
        )?);

        Ok(Config {
            database: DatabaseConfig {
                url,
                max_connections,
            },
            dialog_timeout,
            member_select_timeout,
            panel_timeout,
            max_member_selection,
            room_name_template,
            lock_trigger_while_open,
            shutdown_timeout,
        })
    }

    /// Settings for a brand-new session owned by `owner_name`.
    #[must_use]
    pub fn session_defaults(&self, owner_name: &str) -> SessionDefaults {
        SessionDefaults {
            room_name: self.room_name_template.replace("{owner}", owner_name),
            ..SessionDefaults::default()
        }
    }
}

fn parse_var<T: std::str::FromStr>(
    vars: &HashMap<String, String>,
    name: &str,
    default: T,
) -> Result<T, ConfigError> {
    match vars.get(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("{name}={raw}"))),
        None => Ok(default),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use common::secret::ExposeSecret;

    fn base_vars() -> HashMap<String, String> {
        HashMap::from([(
            "DATABASE_URL".to_string(),
            "postgres://tempvoice:pw@localhost/tempvoice".to_string(),
        )])
    }

    #[test]
    fn test_from_vars_success_with_defaults() {
        let config = Config::from_vars(&base_vars()).expect("Config should load successfully");

        assert_eq!(
            config.database.url.expose_secret(),
            "postgres://tempvoice:pw@localhost/tempvoice"
        );
        assert_eq!(config.database.max_connections, DEFAULT_MAX_CONNECTIONS);
        assert_eq!(config.dialog_timeout, Duration::from_secs(60));
        assert_eq!(config.member_select_timeout, Duration::from_secs(120));
        assert_eq!(config.panel_timeout, Duration::from_secs(43_200));
        assert_eq!(config.max_member_selection, 25);
        assert_eq!(config.room_name_template, DEFAULT_ROOM_NAME_TEMPLATE);
        assert!(config.lock_trigger_while_open);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_from_vars_success_with_custom_values() {
        let mut vars = base_vars();
        vars.insert("TEMPVOICE_DB_MAX_CONNECTIONS".to_string(), "4".to_string());
        vars.insert("TEMPVOICE_DIALOG_TIMEOUT_SECONDS".to_string(), "30".to_string());
        vars.insert(
            "TEMPVOICE_MEMBER_SELECT_TIMEOUT_SECONDS".to_string(),
            "90".to_string(),
        );
        vars.insert("TEMPVOICE_MAX_MEMBER_SELECTION".to_string(), "10".to_string());
        vars.insert(
            "TEMPVOICE_DEFAULT_ROOM_NAME".to_string(),
            "Lounge of {owner}".to_string(),
        );
        vars.insert(
            "TEMPVOICE_LOCK_TRIGGER_WHILE_OPEN".to_string(),
            "false".to_string(),
        );

        let config = Config::from_vars(&vars).expect("Config should load successfully");

        assert_eq!(config.database.max_connections, 4);
        assert_eq!(config.dialog_timeout, Duration::from_secs(30));
        assert_eq!(config.member_select_timeout, Duration::from_secs(90));
        assert_eq!(config.max_member_selection, 10);
        assert!(!config.lock_trigger_while_open);
        assert_eq!(config.session_defaults("ada").room_name, "Lounge of ada");
    }

    #[test]
    fn test_from_vars_missing_database_url() {
        let result = Config::from_vars(&HashMap::new());
        assert!(matches!(result, Err(ConfigError::MissingEnvVar(v)) if v == "DATABASE_URL"));
    }

    #[test]
    fn test_from_vars_rejects_non_numeric_timeout() {
        let mut vars = base_vars();
        vars.insert(
            "TEMPVOICE_DIALOG_TIMEOUT_SECONDS".to_string(),
            "soon".to_string(),
        );

        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn test_from_vars_rejects_zero_selection() {
        let mut vars = base_vars();
        vars.insert("TEMPVOICE_MAX_MEMBER_SELECTION".to_string(), "0".to_string());

        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_session_defaults_use_template() {
        let config = Config::from_vars(&base_vars()).unwrap();
        let defaults = config.session_defaults("U1");

        assert_eq!(defaults.room_name, "U1's Room");
        assert!(defaults.soundboard_enabled);
        assert!(defaults.streams_enabled);
        assert!(defaults.activities_enabled);
        assert!(!defaults.is_private);
        assert_eq!(defaults.retained_message_count, 0);
    }

    #[test]
    fn test_debug_redacts_database_url() {
        let config = Config::from_vars(&base_vars()).unwrap();
        let debug_output = format!("{config:?}");

        assert!(!debug_output.contains("pw@localhost"));
    }
}
