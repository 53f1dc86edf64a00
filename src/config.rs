//! Configuration handling for dbcnx.
//!
//! Library callers describe a database with a [`Setup`] map. The `dbcnx`
//! binary builds that map from CLI arguments and environment variables.

use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, warn};

/// Keys every setup is expected to carry.
pub const REQUIRED_ATTRIBUTES: [&str; 6] = ["host", "port", "sdi", "user", "password", "driver"];

/// Pool size used when neither the caller nor the setup names one.
pub const DEFAULT_POOL_SIZE: u32 = 5;

pub const DEFAULT_DRIVER: &str = "postgresql";

/// Key/value connection description: `host`, `port`, `sdi` (database
/// identifier), `user`, `password`, `driver`, and optionally `pool_size`.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Setup(BTreeMap<String, String>);

impl Setup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Pool size from the optional `pool_size` key, else [`DEFAULT_POOL_SIZE`].
    pub fn pool_size(&self) -> u32 {
        match self.get("pool_size") {
            None => DEFAULT_POOL_SIZE,
            Some(raw) => match raw.trim().parse::<u32>() {
                Ok(size) if size > 0 => size,
                _ => {
                    warn!(
                        pool_size = %raw,
                        default = DEFAULT_POOL_SIZE,
                        "Invalid pool_size in setup, using default"
                    );
                    DEFAULT_POOL_SIZE
                }
            },
        }
    }
}

impl fmt::Debug for Setup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.0.iter().map(|(k, v)| {
                let shown = if k == "password" { "****" } else { v.as_str() };
                (k.as_str(), shown)
            }))
            .finish()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Setup {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl From<BTreeMap<String, String>> for Setup {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}

/// Check that a setup carries every key in [`REQUIRED_ATTRIBUTES`].
///
/// Advisory only: missing keys are logged and returned, never enforced.
/// Connection attempts with an incomplete setup fail later, at the driver.
pub fn validate_setup(setup: &Setup) -> Vec<&'static str> {
    debug!(setup = ?setup, "Validating setup");

    let missing: Vec<&'static str> = REQUIRED_ATTRIBUTES
        .iter()
        .copied()
        .filter(|key| !setup.contains_key(key))
        .collect();

    if !missing.is_empty() {
        warn!(missing = ?missing, "Setup is missing required attributes");
    }

    missing
}

/// Output encoding for query results printed by the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Single-line JSON
    #[default]
    Json,
    /// Indented JSON
    Pretty,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run a query and print the rows
    Read {
        /// SQL to run
        sql: String,
        /// Positional parameter (JSON scalar or plain string), repeatable
        #[arg(short, long = "param", value_name = "VALUE")]
        params: Vec<String>,
        /// Result shape: dict or list
        #[arg(long, default_value = "dict")]
        datatype: String,
    },
    /// Run a statement and commit it
    Execute {
        sql: String,
        #[arg(short, long = "param", value_name = "VALUE")]
        params: Vec<String>,
    },
    /// Prepare a statement once and run it for each parameter tuple
    ExecuteMany {
        sql: String,
        /// JSON array of parameter arrays, e.g. '[[1,"a"],[2,"b"]]'
        #[arg(long, value_name = "JSON")]
        values: String,
    },
}

/// Configuration for the `dbcnx` command-line tool.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "dbcnx",
    about = "Run SQL through a pooled database connection",
    version,
    author
)]
pub struct Config {
    /// Database server host
    #[arg(long, env = "DBCNX_HOST")]
    pub host: Option<String>,

    /// Database server port
    #[arg(long, env = "DBCNX_PORT")]
    pub port: Option<u16>,

    /// Database identifier (database name, or file path for SQLite)
    #[arg(long, env = "DBCNX_SDI")]
    pub sdi: Option<String>,

    #[arg(short, long, env = "DBCNX_USER")]
    pub user: Option<String>,

    /// Prefer the environment variable so the password stays out of shell history
    #[arg(long, env = "DBCNX_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Driver tag: postgresql, mysql or sqlite
    #[arg(long, default_value = DEFAULT_DRIVER, env = "DBCNX_DRIVER")]
    pub driver: String,

    /// Number of pooled connections
    #[arg(
        long,
        default_value_t = DEFAULT_POOL_SIZE,
        env = "DBCNX_POOL_SIZE",
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub pool_size: u32,

    #[arg(long, value_enum, default_value = "json", env = "DBCNX_OUTPUT")]
    pub output: OutputFormat,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn", env = "DBCNX_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "DBCNX_JSON_LOGS")]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Config {
    /// Build the setup map handed to the clients.
    ///
    /// Unset options are left out so setup validation can report them.
    pub fn setup(&self) -> Setup {
        let mut setup = Setup::new();
        if let Some(host) = &self.host {
            setup.insert("host", host.as_str());
        }
        if let Some(port) = self.port {
            setup.insert("port", port.to_string());
        }
        if let Some(sdi) = &self.sdi {
            setup.insert("sdi", sdi.as_str());
        }
        if let Some(user) = &self.user {
            setup.insert("user", user.as_str());
        }
        if let Some(password) = &self.password {
            setup.insert("password", password.as_str());
        }
        setup.insert("driver", self.driver.as_str());
        setup.insert("pool_size", self.pool_size.to_string());
        setup
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_setup() -> Setup {
        Setup::new()
            .with("host", "db")
            .with("port", "5432")
            .with("sdi", "app")
            .with("user", "u")
            .with("password", "p")
            .with("driver", "pg")
    }

    #[test]
    fn test_validate_complete_setup() {
        assert!(validate_setup(&full_setup()).is_empty());
    }

    #[test]
    fn test_validate_reports_exact_missing_keys() {
        let setup: Setup = [("host", "db"), ("user", "u")].into_iter().collect();
        assert_eq!(
            validate_setup(&setup),
            vec!["port", "sdi", "password", "driver"]
        );
    }

    #[test]
    fn test_validate_empty_setup() {
        assert_eq!(validate_setup(&Setup::new()), REQUIRED_ATTRIBUTES.to_vec());
    }

    #[test]
    fn test_validate_is_case_sensitive() {
        let setup = full_setup().with("HOST", "db2");
        assert!(validate_setup(&setup).is_empty());

        let upper: Setup = [("HOST", "db")].into_iter().collect();
        assert!(validate_setup(&upper).contains(&"host"));
    }

    #[test]
    fn test_pool_size_default_and_override() {
        assert_eq!(full_setup().pool_size(), DEFAULT_POOL_SIZE);
        assert_eq!(full_setup().with("pool_size", "2").pool_size(), 2);
    }

    #[test]
    fn test_pool_size_invalid_falls_back() {
        assert_eq!(full_setup().with("pool_size", "0").pool_size(), DEFAULT_POOL_SIZE);
        assert_eq!(
            full_setup().with("pool_size", "many").pool_size(),
            DEFAULT_POOL_SIZE
        );
    }

    #[test]
    fn test_debug_masks_password() {
        let rendered = format!("{:?}", full_setup());
        assert!(rendered.contains("****"));
        assert!(!rendered.contains("\"p\""));
        assert!(rendered.contains("\"db\""));
    }

    #[test]
    fn test_setup_deserializes_from_json_object() {
        let setup: Setup =
            serde_json::from_str(r#"{"host":"db","port":"5432","pool_size":"2"}"#).unwrap();
        assert_eq!(setup.get("host"), Some("db"));
        assert_eq!(setup.pool_size(), 2);
    }

    #[test]
    fn test_cli_config_builds_setup() {
        let config = Config::parse_from([
            "dbcnx",
            "--host",
            "db",
            "--port",
            "5432",
            "--sdi",
            "app",
            "--user",
            "u",
            "--password",
            "p",
            "--pool-size",
            "2",
            "read",
            "SELECT 1",
        ]);
        let setup = config.setup();
        assert!(validate_setup(&setup).is_empty());
        assert_eq!(setup.get("driver"), Some(DEFAULT_DRIVER));
        assert_eq!(setup.pool_size(), 2);
        assert!(matches!(config.command, Command::Read { .. }));
    }

    #[test]
    fn test_cli_rejects_zero_pool_size() {
        let parsed = Config::try_parse_from(["dbcnx", "--pool-size", "0", "read", "SELECT 1"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_cli_config_omits_unset_keys() {
        let config = Config::parse_from(["dbcnx", "--sdi", "app", "execute", "DELETE FROM t"]);
        let missing = validate_setup(&config.setup());
        assert_eq!(missing, vec!["host", "port", "user", "password"]);
    }
}
