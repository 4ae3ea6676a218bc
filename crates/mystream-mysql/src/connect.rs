//! Shared MySQL connection utilities with TLS support.

use mysql_async::{Conn, Opts, OptsBuilder, SslOpts};
use mystream_core::{split_addr, SessionConfig};

use crate::error::{MySqlError, MySqlResult};

/// Open a plain client connection to the source.
pub async fn connect_mysql(config: &SessionConfig) -> MySqlResult<Conn> {
    let opts = build_opts(config)?;
    Ok(Conn::new(opts).await?)
}

/// Build driver options from a session config.
pub fn build_opts(config: &SessionConfig) -> MySqlResult<Opts> {
    let (host, port) =
        split_addr(&config.addr).ok_or_else(|| MySqlError::InvalidAddr(config.addr.clone()))?;

    let mut builder = OptsBuilder::default()
        .ip_or_hostname(host)
        .tcp_port(port)
        .user(Some(config.user.clone()))
        .pass(Some(config.password.clone()))
        .db_name(Some(config.database.clone()));

    if config.tls.enabled {
        let ssl = SslOpts::default().with_danger_accept_invalid_certs(config.tls.skip_verify);
        builder = builder.ssl_opts(Some(ssl));
    }

    Ok(builder.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mystream_core::{Flavor, TlsOptions};

    fn config(addr: &str, tls: TlsOptions) -> SessionConfig {
        SessionConfig {
            server_id: 1001,
            addr: addr.into(),
            user: "repl".into(),
            password: "secret".into(),
            database: "shop".into(),
            tables: vec![],
            flavor: Flavor::MySql,
            tls,
        }
    }

    #[test]
    fn test_build_opts() {
        let opts = build_opts(&config("db.internal:3307", TlsOptions::default())).unwrap();

        assert_eq!(opts.ip_or_hostname(), "db.internal");
        assert_eq!(opts.tcp_port(), 3307);
        assert_eq!(opts.user(), Some("repl"));
        assert_eq!(opts.db_name(), Some("shop"));
        assert!(opts.ssl_opts().is_none());
    }

    #[test]
    fn test_build_opts_with_tls() {
        let tls = TlsOptions {
            enabled: true,
            skip_verify: true,
        };
        let opts = build_opts(&config("db:3306", tls)).unwrap();

        let ssl = opts.ssl_opts().expect("TLS options should be set");
        assert!(ssl.accept_invalid_certs());
    }

    #[test]
    fn test_build_opts_invalid_addr() {
        assert!(matches!(
            build_opts(&config("db:port", TlsOptions::default())),
            Err(MySqlError::InvalidAddr(_))
        ));
    }
}
