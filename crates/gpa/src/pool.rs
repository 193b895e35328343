//! Connection pool construction from [`Config`].

use crate::config::{Config, ssl_mode_name};
use crate::error::{ErrorKind, OrmError, OrmResult};
use deadpool_postgres::{Manager, ManagerConfig, Pool, PoolBuilder, RecyclingMethod, Timeouts};
use tokio_postgres::Socket;
use tokio_postgres::config::SslMode;
use tokio_postgres::tls::{MakeTlsConnect, TlsConnect};
use tokio_postgres::NoTls;

/// Create a pool without TLS.
///
/// ```ignore
/// let config = gpa::Config::load("gpa.toml")?;
/// let store = gpa::PgStore::new(gpa::create_pool(&config)?);
/// ```
pub fn create_pool(config: &Config) -> OrmResult<Pool> {
    create_pool_with_tls(config, NoTls)
}

/// Create a pool using a custom TLS connector.
///
/// The connector is responsible for `ssl.cert_file`, `ssl.key_file` and
/// `ssl.ca_file`; this function only sets `sslmode`.
pub fn create_pool_with_tls<T>(config: &Config, tls: T) -> OrmResult<Pool>
where
    T: MakeTlsConnect<Socket> + Clone + Sync + Send + 'static,
    T::Stream: Sync + Send,
    T::TlsConnect: Sync + Send,
    <T::TlsConnect as TlsConnect<Socket>>::Future: Send,
{
    config.validate()?;
    let pg_config = pg_config(config)?;
    let manager_config = ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    };
    let manager = Manager::from_config(pg_config, tls, manager_config);
    configure(Pool::builder(manager), config)
        .build()
        .map_err(|e| OrmError::with_cause(ErrorKind::Database, format!("failed to build pool: {e}"), e))
}

fn configure(builder: PoolBuilder, config: &Config) -> PoolBuilder {
    let timeouts = Timeouts {
        create: config.connect_timeout(),
        wait: config.connect_timeout(),
        recycle: None,
    };
    builder
        .max_size(config.max_open_conns)
        .timeouts(timeouts)
        .runtime(deadpool_postgres::Runtime::Tokio1)
}

/// Translate [`Config`] into a driver config.
pub(crate) fn pg_config(config: &Config) -> OrmResult<tokio_postgres::Config> {
    if let Some(url) = &config.connection_url {
        return url.parse().map_err(|e: tokio_postgres::Error| {
            OrmError::with_cause(ErrorKind::Validation, format!("invalid connection_url: {e}"), e)
        });
    }

    let mut pg = tokio_postgres::Config::new();
    pg.host(&config.host)
        .port(config.port)
        .user(&config.username)
        .dbname(&config.database);
    if !config.password.is_empty() {
        pg.password(&config.password);
    }
    if let Some(timeout) = config.connect_timeout() {
        pg.connect_timeout(timeout);
    }
    let mode = if config.ssl.enabled {
        ssl_mode_name(&config.ssl.mode)?
    } else {
        "disable"
    };
    pg.ssl_mode(match mode {
        "disable" => SslMode::Disable,
        "require" => SslMode::Require,
        _ => SslMode::Prefer,
    });
    if let Some(Some(name)) = config.options.get("application_name").map(|v| v.as_str()) {
        pg.application_name(name);
    }
    Ok(pg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discrete_fields_build_a_driver_config() {
        let config = Config {
            host: "db.internal".into(),
            port: 6543,
            username: "svc".into(),
            database: "app".into(),
            ..Config::default()
        };
        let pg = pg_config(&config).unwrap();
        assert_eq!(pg.get_user(), Some("svc"));
        assert_eq!(pg.get_dbname(), Some("app"));
        assert_eq!(pg.get_ports(), &[6543]);
        assert_eq!(pg.get_ssl_mode(), SslMode::Disable);
    }

    #[test]
    fn connection_url_is_parsed() {
        let config = Config {
            connection_url: Some("postgres://u:p@localhost:5433/other".into()),
            ..Config::default()
        };
        let pg = pg_config(&config).unwrap();
        assert_eq!(pg.get_dbname(), Some("other"));
        assert_eq!(pg.get_ports(), &[5433]);
    }

    #[test]
    fn unsupported_driver_fails_before_connecting() {
        let config = Config {
            driver: "mysql".into(),
            ..Config::default()
        };
        let err = create_pool(&config).unwrap_err();
        assert!(err.is_validation());
        assert_eq!(err.message(), "unsupported driver: mysql");
    }

    #[tokio::test]
    async fn pool_builds_without_connecting() {
        let config = Config {
            database: "app".into(),
            max_open_conns: 4,
            ..Config::default()
        };
        let pool = create_pool(&config).unwrap();
        assert_eq!(pool.status().max_size, 4);
    }
}
