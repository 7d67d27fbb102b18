//! `key=value` connection string parsing.
//!
//! Accepts the libpq keyword form used throughout the services that call this
//! crate:
//!
//! ```text
//! dbname=test user=postgres password=postgres host=localhost port=5432 sslmode=disable TimeZone=Asia/Kolkata
//! ```

use crate::error::DsnError;
use std::collections::HashMap;
use std::net::{IpAddr, ToSocketAddrs};
use std::str::FromStr;
use tokio_postgres::config::SslMode;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 5432;
pub const DEFAULT_SSL_MODE: &str = "disabled";

/// Connection settings read from a DSN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PgConfig {
    /// `dbname`
    pub database: String,
    /// `user`
    pub user: String,
    /// `password`, empty when absent
    pub password: String,
    /// `host`, defaults to `localhost`
    pub host: String,
    /// `port`, defaults to 5432
    pub port: u16,
    /// `sslmode`, defaults to `disabled`
    pub ssl_mode: String,
    /// `TimeZone`, applied as the session time zone
    pub timezone: Option<String>,
}

impl Default for PgConfig {
    fn default() -> Self {
        Self {
            database: String::new(),
            user: String::new(),
            password: String::new(),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            ssl_mode: DEFAULT_SSL_MODE.to_string(),
            timezone: None,
        }
    }
}

impl PgConfig {
    /// Parse a space-separated `key=value` DSN.
    ///
    /// Tokens that are not exactly one `key=value` pair are ignored; the DSN is
    /// rejected only when no pair at all could be read. A host that is not an
    /// IP literal must resolve.
    pub fn parse_dsn(dsn: &str) -> Result<Self, DsnError> {
        if dsn.is_empty() {
            return Err(DsnError::Empty);
        }

        let pairs: HashMap<&str, &str> = dsn
            .split(' ')
            .filter_map(|token| {
                let mut parts = token.split('=');
                match (parts.next(), parts.next(), parts.next()) {
                    (Some(key), Some(value), None) => Some((key, value)),
                    _ => None,
                }
            })
            .collect();

        if pairs.is_empty() {
            return Err(DsnError::Invalid);
        }

        let get = |key: &str| pairs.get(key).copied().unwrap_or_default();

        let host = match get("host") {
            "" => DEFAULT_HOST.to_string(),
            host => {
                check_host(host)?;
                host.to_string()
            }
        };

        let port = match get("port") {
            "" => DEFAULT_PORT,
            port => parse_port(port)?,
        };

        let ssl_mode = match get("sslmode") {
            "" => DEFAULT_SSL_MODE,
            mode => mode,
        };

        let timezone = Some(get("TimeZone"))
            .filter(|tz| !tz.is_empty())
            .map(str::to_string);

        Ok(Self {
            database: get("dbname").to_string(),
            user: get("user").to_string(),
            password: get("password").to_string(),
            host,
            port,
            ssl_mode: ssl_mode.to_string(),
            timezone,
        })
    }

    /// Driver configuration for these settings.
    pub fn to_pg_config(&self) -> Result<tokio_postgres::Config, DsnError> {
        let mut config = tokio_postgres::Config::new();
        config
            .host(&self.host)
            .port(self.port)
            .ssl_mode(ssl_mode(&self.ssl_mode)?);

        if !self.database.is_empty() {
            config.dbname(&self.database);
        }
        if !self.user.is_empty() {
            config.user(&self.user);
        }
        if !self.password.is_empty() {
            config.password(&self.password);
        }
        if let Some(tz) = &self.timezone {
            config.options(format!("-c TimeZone={tz}"));
        }
        Ok(config)
    }

    /// `host:port/dbname`, safe to log.
    pub fn target(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.database)
    }
}

impl FromStr for PgConfig {
    type Err = DsnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_dsn(s)
    }
}

fn check_host(host: &str) -> Result<(), DsnError> {
    if host.parse::<IpAddr>().is_ok() {
        return Ok(());
    }

    let invalid = |reason: String| DsnError::InvalidHost {
        host: host.to_string(),
        reason,
    };
    let mut addrs = (host, 0).to_socket_addrs().map_err(|e| invalid(e.to_string()))?;
    match addrs.next() {
        Some(_) => Ok(()),
        None => Err(invalid("no addresses found".to_string())),
    }
}

fn parse_port(port: &str) -> Result<u16, DsnError> {
    match port.parse::<u32>() {
        Ok(n @ 1..=65535) => Ok(n as u16),
        _ => Err(DsnError::InvalidPort(port.to_string())),
    }
}

fn ssl_mode(mode: &str) -> Result<SslMode, DsnError> {
    match mode {
        "disable" | "disabled" | "allow" => Ok(SslMode::Disable),
        "prefer" => Ok(SslMode::Prefer),
        "require" | "verify-ca" | "verify-full" => Ok(SslMode::Require),
        other => Err(DsnError::InvalidSslMode(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_dsn_is_rejected() {
        assert_eq!(PgConfig::parse_dsn(""), Err(DsnError::Empty));
    }

    #[test]
    fn dsn_without_pairs_is_invalid() {
        assert_eq!(PgConfig::parse_dsn("invalid_dsn"), Err(DsnError::Invalid));
        assert_eq!(PgConfig::parse_dsn("a=b=c"), Err(DsnError::Invalid));
    }

    #[test]
    fn parses_full_dsn() {
        let config: PgConfig = "dbname=test user=postgres password=postgres host=localhost port=5432 sslmode=disable TimeZone=Asia/Kolkata"
            .parse()
            .unwrap();
        assert_eq!(
            config,
            PgConfig {
                database: "test".to_string(),
                user: "postgres".to_string(),
                password: "postgres".to_string(),
                host: "localhost".to_string(),
                port: 5432,
                ssl_mode: "disable".to_string(),
                timezone: Some("Asia/Kolkata".to_string()),
            }
        );
    }

    #[test]
    fn defaults_port_and_sslmode() {
        let config = PgConfig::parse_dsn(
            "dbname=test user=postgres password=postgres host=localhost TimeZone=Asia/Kolkata",
        )
        .unwrap();
        assert_eq!(config.port, 5432);
        assert_eq!(config.ssl_mode, "disabled");
        assert_eq!(config.timezone.as_deref(), Some("Asia/Kolkata"));
    }

    #[test]
    fn missing_values_fall_back_to_defaults() {
        let config = PgConfig::parse_dsn("dbname=test user=postgres").unwrap();
        assert_eq!(
            config,
            PgConfig {
                database: "test".to_string(),
                user: "postgres".to_string(),
                ..PgConfig::default()
            }
        );
    }

    #[test]
    fn ip_hosts_skip_resolution() {
        let config = PgConfig::parse_dsn("dbname=test host=10.0.0.7 port=6543").unwrap();
        assert_eq!(config.host, "10.0.0.7");
        assert_eq!(config.port, 6543);
    }

    #[test]
    fn rejects_bad_ports() {
        for port in ["abc", "0", "65536", "-1"] {
            let dsn = format!("dbname=test host=127.0.0.1 port={port}");
            assert_eq!(
                PgConfig::parse_dsn(&dsn),
                Err(DsnError::InvalidPort(port.to_string())),
                "port {port}"
            );
        }
    }

    #[test]
    fn unknown_tokens_are_ignored() {
        let config = PgConfig::parse_dsn("dbname=test  connect_timeout stray=a=b").unwrap();
        assert_eq!(config.database, "test");
    }

    #[test]
    fn builds_driver_config() {
        let config = PgConfig::parse_dsn(
            "dbname=app user=svc password=secret host=127.0.0.1 port=5433 sslmode=require TimeZone=UTC",
        )
        .unwrap();
        let pg = config.to_pg_config().unwrap();
        assert_eq!(pg.get_dbname(), Some("app"));
        assert_eq!(pg.get_user(), Some("svc"));
        assert_eq!(pg.get_password(), Some(&b"secret"[..]));
        assert_eq!(pg.get_ports(), &[5433]);
        assert_eq!(pg.get_ssl_mode(), SslMode::Require);
        assert_eq!(pg.get_options(), Some("-c TimeZone=UTC"));
    }

    #[test]
    fn unknown_sslmode_fails_driver_config() {
        let config = PgConfig::parse_dsn("dbname=app host=127.0.0.1 sslmode=sometimes").unwrap();
        assert_eq!(
            config.to_pg_config().unwrap_err(),
            DsnError::InvalidSslMode("sometimes".to_string())
        );
    }

    #[test]
    fn target_omits_credentials() {
        let config = PgConfig::parse_dsn("dbname=app user=svc password=secret host=127.0.0.1").unwrap();
        assert_eq!(config.target(), "127.0.0.1:5432/app");
    }
}
