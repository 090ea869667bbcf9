//! Connect-string parsing for the MySQL driver.

use crate::error::SettingsError;

/// Parsed MySQL connect string.
///
/// The string is space-separated `key=value` pairs. `host` and `hostaddr`
/// repeat, adding one ring member each in declaration order; every other key
/// is last-one-wins.
///
/// ```ignore
/// let settings = MySqlSettings::parse(
///     "host=sql1.example.com host=sql2.example.com user=auth dbname=mail",
/// )?;
/// assert_eq!(settings.hosts.len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MySqlSettings {
    pub hosts: Vec<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub dbname: Option<String>,
    pub port: u16,
    pub client_flags: u32,
    pub ssl_cert: Option<String>,
    pub ssl_key: Option<String>,
    pub ssl_ca: Option<String>,
    pub ssl_ca_path: Option<String>,
    pub ssl_cipher: String,
}

impl Default for MySqlSettings {
    fn default() -> Self {
        Self {
            hosts: Vec::new(),
            user: None,
            password: None,
            dbname: None,
            port: 0,
            client_flags: 0,
            ssl_cert: None,
            ssl_key: None,
            ssl_ca: None,
            ssl_ca_path: None,
            ssl_cipher: "HIGH".to_string(),
        }
    }
}

impl MySqlSettings {
    /// Parse a connect string. Unknown keys, keys without a value, bad
    /// numbers and a host-less string are all fatal.
    pub fn parse(connect_string: &str) -> Result<Self, SettingsError> {
        let mut settings = MySqlSettings::default();

        for chunk in connect_string.split_whitespace() {
            let Some((key, value)) = chunk.split_once('=') else {
                return Err(SettingsError::MissingValue(chunk.to_string()));
            };
            match key {
                "host" | "hostaddr" => settings.hosts.push(value.to_string()),
                "user" => settings.user = Some(value.to_string()),
                "password" => settings.password = Some(value.to_string()),
                "dbname" => settings.dbname = Some(value.to_string()),
                "port" => settings.port = parse_number(key, value)?,
                "client_flags" => settings.client_flags = parse_number(key, value)?,
                "ssl_cert" => settings.ssl_cert = Some(value.to_string()),
                "ssl_key" => settings.ssl_key = Some(value.to_string()),
                "ssl_ca" => settings.ssl_ca = Some(value.to_string()),
                "ssl_ca_path" => settings.ssl_ca_path = Some(value.to_string()),
                "ssl_cipher" => settings.ssl_cipher = value.to_string(),
                _ => return Err(SettingsError::UnknownKey(key.to_string())),
            }
        }

        if settings.hosts.is_empty() {
            return Err(SettingsError::NoHosts);
        }
        Ok(settings)
    }

    /// TLS runs only when there is a CA to verify the server against.
    pub fn ssl_enabled(&self) -> bool {
        self.ssl_ca.is_some() || self.ssl_ca_path.is_some()
    }

    /// Whether to negotiate TLS with `host`. Unix socket members are
    /// local transports and always connect in the clear.
    pub fn uses_tls(&self, host: &str) -> bool {
        self.ssl_enabled() && !host.starts_with('/')
    }

    /// Port to dial, protocol default when unset.
    pub fn effective_port(&self) -> u16 {
        if self.port == 0 { 3306 } else { self.port }
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, SettingsError> {
    value.parse().map_err(|_| SettingsError::InvalidNumber {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hosts_in_declaration_order() {
        let settings =
            MySqlSettings::parse("host=a.example.com hostaddr=10.0.0.2 host=c.example.com")
                .unwrap();
        assert_eq!(settings.hosts, vec![
            "a.example.com",
            "10.0.0.2",
            "c.example.com"
        ]);
    }

    #[test]
    fn test_parse_full_connect_string() {
        let settings = MySqlSettings::parse(
            "host=sql.example.com port=3307 user=auth password=secret dbname=mail \
             client_flags=2048 ssl_ca=/etc/ssl/ca.pem ssl_cipher=DEFAULT",
        )
        .unwrap();

        assert_eq!(settings.hosts, vec!["sql.example.com"]);
        assert_eq!(settings.port, 3307);
        assert_eq!(settings.effective_port(), 3307);
        assert_eq!(settings.user.as_deref(), Some("auth"));
        assert_eq!(settings.password.as_deref(), Some("secret"));
        assert_eq!(settings.dbname.as_deref(), Some("mail"));
        assert_eq!(settings.client_flags, 2048);
        assert_eq!(settings.ssl_ca.as_deref(), Some("/etc/ssl/ca.pem"));
        assert_eq!(settings.ssl_cipher, "DEFAULT");
        assert!(settings.ssl_enabled());
    }

    #[test]
    fn test_parse_defaults() {
        let settings = MySqlSettings::parse("host=db").unwrap();
        assert_eq!(settings.port, 0);
        assert_eq!(settings.effective_port(), 3306);
        assert_eq!(settings.ssl_cipher, "HIGH");
        assert!(!settings.ssl_enabled());
        assert_eq!(settings.user, None);
    }

    #[test]
    fn test_parse_last_value_wins() {
        let settings = MySqlSettings::parse("host=db user=one user=two").unwrap();
        assert_eq!(settings.user.as_deref(), Some("two"));
    }

    #[test]
    fn test_parse_rejects_unknown_key() {
        let err = MySqlSettings::parse("host=db nope=1").unwrap_err();
        assert_eq!(err, SettingsError::UnknownKey("nope".into()));
    }

    #[test]
    fn test_parse_rejects_missing_value() {
        let err = MySqlSettings::parse("host=db standalone").unwrap_err();
        assert_eq!(err, SettingsError::MissingValue("standalone".into()));
    }

    #[test]
    fn test_parse_rejects_bad_number() {
        let err = MySqlSettings::parse("host=db port=many").unwrap_err();
        assert_eq!(err, SettingsError::InvalidNumber {
            key: "port".into(),
            value: "many".into(),
        });
    }

    #[test]
    fn test_parse_requires_hosts() {
        let err = MySqlSettings::parse("user=auth dbname=mail").unwrap_err();
        assert_eq!(err, SettingsError::NoHosts);
    }

    #[test]
    fn test_ssl_enabled_by_ca_path_too() {
        let settings = MySqlSettings::parse("host=db ssl_ca_path=/etc/ssl/certs").unwrap();
        assert!(settings.ssl_enabled());
    }

    #[test]
    fn test_unix_socket_member_never_uses_tls() {
        let settings =
            MySqlSettings::parse("host=/run/mysqld/mysqld.sock host=db ssl_ca=/etc/ssl/ca.pem")
                .unwrap();
        assert!(settings.ssl_enabled());
        assert!(!settings.uses_tls("/run/mysqld/mysqld.sock"));
        assert!(settings.uses_tls("db"));
    }
}
