//! Store configuration.
//!
//! Built in code or loaded from TOML:
//!
//! ```toml
//! driver = "postgres"
//! host = "localhost"
//! port = 5432
//! username = "app"
//! password = "${DB_PASSWORD}"
//! database = "app"
//! max_open_conns = 20
//!
//! [ssl]
//! enabled = true
//! mode = "require"
//! ```
//!
//! `${VAR}` references in string fields are expanded from the environment.

use crate::error::{ErrorKind, OrmError, OrmResult};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Driver names accepted by [`Config::validate`].
pub const SUPPORTED_DRIVERS: &[&str] = &["postgres", "postgresql"];

const DEFAULT_MAX_OPEN_CONNS: usize = 16;

/// Connection settings for a store.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub driver: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
    /// Full connection string; wins over the discrete fields when set.
    pub connection_url: Option<String>,
    /// Pool size.
    pub max_open_conns: usize,
    pub max_idle_conns: Option<usize>,
    pub conn_max_lifetime_secs: Option<u64>,
    pub conn_max_idle_time_secs: Option<u64>,
    pub connect_timeout_secs: Option<u64>,
    pub ssl: SslConfig,
    /// Backend-specific options.
    pub options: serde_json::Map<String, serde_json::Value>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            driver: "postgres".into(),
            host: "localhost".into(),
            port: 5432,
            username: String::new(),
            password: String::new(),
            database: String::new(),
            connection_url: None,
            max_open_conns: DEFAULT_MAX_OPEN_CONNS,
            max_idle_conns: None,
            conn_max_lifetime_secs: None,
            conn_max_idle_time_secs: None,
            connect_timeout_secs: None,
            ssl: SslConfig::default(),
            options: serde_json::Map::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SslConfig {
    pub enabled: bool,
    /// `disable`, `prefer` or `require`.
    pub mode: String,
    /// Client certificate; read by the caller's TLS connector.
    pub cert_file: Option<String>,
    pub key_file: Option<String>,
    pub ca_file: Option<String>,
}

impl Config {
    /// Parse, expand env references and validate.
    pub fn from_toml_str(raw: &str) -> OrmResult<Self> {
        let mut config: Config = toml::from_str(raw)
            .map_err(|e| OrmError::with_cause(ErrorKind::Validation, format!("invalid config: {e}"), e))?;
        config.expand_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> OrmResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            OrmError::with_cause(
                ErrorKind::Validation,
                format!("failed to read config file {}: {e}", path.display()),
                e,
            )
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> OrmResult<()> {
        let driver = self.driver.to_ascii_lowercase();
        if !SUPPORTED_DRIVERS.contains(&driver.as_str()) {
            return Err(OrmError::validation(format!("unsupported driver: {}", self.driver)));
        }
        if self.max_open_conns == 0 {
            return Err(OrmError::validation("max_open_conns must be at least 1"));
        }
        if self.connection_url.as_deref().is_some_and(|u| u.trim().is_empty()) {
            return Err(OrmError::validation("connection_url must not be empty"));
        }
        if self.ssl.enabled {
            ssl_mode_name(&self.ssl.mode)?;
        }
        Ok(())
    }

    /// libpq-style connection string: `connection_url` if set, otherwise
    /// `host=... port=... user=... password=... dbname=... sslmode=...`.
    pub fn dsn(&self) -> String {
        if let Some(url) = &self.connection_url {
            return url.clone();
        }
        let mut dsn = format!(
            "host={} port={} user={} password={} dbname={}",
            self.host, self.port, self.username, self.password, self.database
        );
        if self.ssl.enabled {
            dsn.push_str(" sslmode=");
            dsn.push_str(&self.ssl.mode);
        } else {
            dsn.push_str(" sslmode=disable");
        }
        if let Some(secs) = self.connect_timeout_secs {
            dsn.push_str(&format!(" connect_timeout={secs}"));
        }
        dsn
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_secs.map(Duration::from_secs)
    }

    pub fn conn_max_lifetime(&self) -> Option<Duration> {
        self.conn_max_lifetime_secs.map(Duration::from_secs)
    }

    pub fn conn_max_idle_time(&self) -> Option<Duration> {
        self.conn_max_idle_time_secs.map(Duration::from_secs)
    }

    fn expand_env(&mut self) -> OrmResult<()> {
        for field in [
            &mut self.host,
            &mut self.username,
            &mut self.password,
            &mut self.database,
            &mut self.ssl.mode,
        ] {
            *field = expand_env_vars(field)?;
        }
        for field in [
            &mut self.connection_url,
            &mut self.ssl.cert_file,
            &mut self.ssl.key_file,
            &mut self.ssl.ca_file,
        ]
        .into_iter()
        .flatten()
        {
            *field = expand_env_vars(field)?;
        }
        Ok(())
    }
}

/// Canonical libpq `sslmode` for the accepted spellings.
pub(crate) fn ssl_mode_name(mode: &str) -> OrmResult<&'static str> {
    match mode.trim().to_ascii_lowercase().as_str() {
        "disable" => Ok("disable"),
        "" | "prefer" | "allow" => Ok("prefer"),
        "require" | "verify-ca" | "verify-full" => Ok("require"),
        other => Err(OrmError::validation(format!("unsupported ssl mode: {other}"))),
    }
}

fn expand_env_vars(input: &str) -> OrmResult<String> {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next();

            let mut key = String::new();
            let mut closed = false;
            for ch in chars.by_ref() {
                if ch == '}' {
                    closed = true;
                    break;
                }
                key.push(ch);
            }

            if !closed {
                return Err(OrmError::validation(format!("unterminated env var reference: ${{{key}")));
            }
            if key.is_empty() {
                return Err(OrmError::validation("invalid env var reference: ${}"));
            }
            let value = std::env::var(&key)
                .map_err(|_| OrmError::validation(format!("missing env var for config expansion: {key}")))?;
            out.push_str(&value);
            continue;
        }
        out.push(c);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_toml_with_defaults() {
        let config = Config::from_toml_str(
            r#"
            driver = "PostgreSQL"
            database = "app"
            username = "svc"
            "#,
        )
        .unwrap();
        assert_eq!(config.port, 5432);
        assert_eq!(config.max_open_conns, 16);
        assert_eq!(
            config.dsn(),
            "host=localhost port=5432 user=svc password= dbname=app sslmode=disable"
        );
    }

    #[test]
    fn rejects_unknown_driver() {
        let err = Config::from_toml_str(r#"driver = "oracle""#).unwrap_err();
        assert!(err.is_validation());
        assert_eq!(err.message(), "unsupported driver: oracle");
    }

    #[test]
    fn connection_url_takes_precedence() {
        let config = Config {
            connection_url: Some("postgres://u:p@db/app".into()),
            ..Config::default()
        };
        assert_eq!(config.dsn(), "postgres://u:p@db/app");
    }

    #[test]
    fn ssl_mode_is_rendered_and_checked() {
        let mut config = Config {
            database: "app".into(),
            ..Config::default()
        };
        config.ssl.enabled = true;
        config.ssl.mode = "require".into();
        assert!(config.dsn().ends_with("sslmode=require"));
        config.ssl.mode = "sometimes".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn env_references_expand() {
        // PATH is set in any test environment.
        let path = std::env::var("PATH").unwrap();
        assert_eq!(expand_env_vars("x${PATH}y").unwrap(), format!("x{path}y"));
        assert!(expand_env_vars("${UNCLOSED").is_err());
        assert!(expand_env_vars("${}").is_err());
    }
}
