#![forbid(unsafe_code)]

//! Configuration handling.
//!
//! Two files are involved: the tool's own optional TOML file ([`MeshConfig`])
//! and the daemon's configuration, from which only the admin bind address
//! and password are read ([`AdminCredentials`]).

use serde::Deserialize;
use std::{fs, net::SocketAddr, path::Path, path::PathBuf};

use crate::admin::LogFilter;
use crate::ping::PingConfig;
use crate::MeshError;

/// Tool configuration. Every field has a default, so an empty file is valid.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct MeshConfig {
    /// Daemon configuration file holding the admin credentials.
    pub admin_file: PathBuf,

    /// Logging verbosity (`error`, `warn`, `info`, `debug`, `trace`).
    pub log_level: String,

    pub ping: PingConfig,

    pub log: LogSection,
}

/// `[log]` table: which daemon log lines to subscribe to.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LogSection {
    pub level: String,
    pub file: String,
    pub line: u32,
}

impl Default for LogSection {
    fn default() -> Self {
        let f = LogFilter::default();
        Self {
            level: f.level,
            file: f.file,
            line: f.line,
        }
    }
}

impl From<LogSection> for LogFilter {
    fn from(s: LogSection) -> Self {
        LogFilter {
            level: s.level,
            file: s.file,
            line: s.line,
        }
    }
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            admin_file: default_admin_file(),
            log_level: "info".to_string(),
            ping: PingConfig::default(),
            log: LogSection::default(),
        }
    }
}

fn default_admin_file() -> PathBuf {
    PathBuf::from("/etc/cjdroute.conf")
}

impl MeshConfig {
    /// Load a configuration file from the given path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> crate::MeshResult<Self> {
        let data = fs::read_to_string(&path).map_err(MeshError::from)?;
        let cfg = toml::from_str::<MeshConfig>(&data).map_err(MeshError::ConfigParse)?;
        Ok(cfg)
    }

    /// Load config alias version
    pub fn load<P: AsRef<Path>>(path: P) -> crate::MeshResult<Self> {
        Self::from_file(path)
    }
}

/// Credentials for the daemon's admin interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminCredentials {
    pub bind: SocketAddr,
    pub password: String,
}

#[derive(Deserialize)]
struct DaemonConfig {
    admin: Option<AdminSection>,
}

#[derive(Deserialize)]
struct AdminSection {
    bind: Option<String>,
    password: Option<String>,
}

impl AdminCredentials {
    /// Read `admin.bind` and `admin.password` from the daemon's JSON config.
    pub fn from_file<P: AsRef<Path>>(path: P) -> crate::MeshResult<Self> {
        let data = fs::read_to_string(&path).map_err(MeshError::from)?;
        Self::from_json(&data)
    }

    /// Parse credentials from config text that may contain comments.
    pub fn from_json(text: &str) -> crate::MeshResult<Self> {
        let cleaned = strip_comments(text);
        let cfg: DaemonConfig =
            serde_json::from_str(&cleaned).map_err(|e| MeshError::AdminConfig(e.to_string()))?;
        let admin = cfg
            .admin
            .ok_or_else(|| MeshError::AdminConfig("missing `admin` section".into()))?;
        let password = admin.password.unwrap_or_default();
        if password.is_empty() {
            return Err(MeshError::AdminConfig("admin password is empty".into()));
        }
        let bind = admin
            .bind
            .ok_or_else(|| MeshError::AdminConfig("missing `admin.bind`".into()))?;
        let bind = bind
            .parse::<SocketAddr>()
            .map_err(|e| MeshError::AdminConfig(format!("admin.bind `{bind}`: {e}")))?;
        Ok(Self { bind, password })
    }
}

/// Remove `//` line comments and `/* */` block comments outside of strings.
fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut in_string = false;
    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            match c {
                '\\' => {
                    if let Some(n) = chars.next() {
                        out.push(n);
                    }
                }
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        let next = chars.peek().copied();
        match (c, next) {
            ('"', _) => {
                in_string = true;
                out.push(c);
            }
            ('/', Some('/')) => {
                for n in chars.by_ref() {
                    if n == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            ('/', Some('*')) => {
                chars.next();
                let mut prev = '\0';
                for n in chars.by_ref() {
                    if prev == '*' && n == '/' {
                        break;
                    }
                    prev = n;
                }
                out.push(' ');
            }
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const DAEMON_CONF: &str = r#"
    {
        // private key stays out of reach
        "privateKey": "abc//not-a-comment",
        /* the admin interface
           listens locally */
        "admin": {
            "bind": "127.0.0.1:11234",
            "password": "s3cr\"et"
        }
    }
    "#;

    #[test]
    fn reads_admin_credentials_through_comments() {
        let creds = AdminCredentials::from_json(DAEMON_CONF).unwrap();
        assert_eq!(creds.bind, "127.0.0.1:11234".parse().unwrap());
        assert_eq!(creds.password, "s3cr\"et");
    }

    #[test]
    fn empty_password_rejected() {
        let err = AdminCredentials::from_json(r#"{"admin": {"bind": "127.0.0.1:1", "password": ""}}"#).unwrap_err();
        assert!(matches!(err, MeshError::AdminConfig(_)));
        let err = AdminCredentials::from_json(r#"{"other": 1}"#).unwrap_err();
        assert!(matches!(err, MeshError::AdminConfig(_)));
    }

    #[test]
    fn defaults_when_empty() {
        let cfg: MeshConfig = toml::from_str("").unwrap();
        assert_eq!(cfg, MeshConfig::default());
        assert_eq!(cfg.ping.timeout_ms, 10_000);
        assert_eq!(cfg.ping.count, None);
        assert_eq!(cfg.log.level, "DEBUG");
    }

    #[test]
    fn loads_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "admin_file = \"/tmp/daemon.conf\"\nlog_level = \"debug\"\n[ping]\ncount = 3\ninterval_ms = 0\n[log]\nfile = \"Ducttape.c\""
        )
        .unwrap();
        let cfg = MeshConfig::load(file.path()).unwrap();
        assert_eq!(cfg.admin_file, PathBuf::from("/tmp/daemon.conf"));
        assert_eq!(cfg.ping.count, Some(3));
        assert_eq!(cfg.ping.interval_ms, 0);
        assert_eq!(cfg.ping.timeout_ms, 10_000);
        assert_eq!(cfg.log.file, "Ducttape.c");
        assert_eq!(cfg.log.level, "DEBUG");
    }

    #[test]
    fn bad_toml_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "log_level = [").unwrap();
        assert!(matches!(MeshConfig::from_file(file.path()), Err(MeshError::ConfigParse(_))));
    }
}
