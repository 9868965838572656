//! Ingestion configuration
//!
//! Everything is read from the environment (a `.env` file is loaded first by
//! the binary) and can be overridden by CLI flags.

use oaetl_common::retry::RetryPolicy;
use oaetl_common::{EtlError, Result};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgConnectOptions;
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Public OpenAlex snapshot bucket
pub const DEFAULT_BUCKET: &str = "openalex";
pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_DATA_PREFIX: &str = "data";
pub const DEFAULT_PARTITION_MARKER: &str = "updated_date=";

pub const DEFAULT_BATCH_SIZE: usize = 1000;
pub const DEFAULT_MAX_RECORD_ERRORS: usize = 100;
pub const DEFAULT_MAX_BACKUPS: usize = 10;
pub const DEFAULT_DB_SCHEMA: &str = "openalex";

/// Top-level configuration for an ingestion run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EtlConfig {
    pub source: SourceConfig,
    pub database: DatabaseConfig,
    pub loader: LoaderConfig,
    pub fetch: FetchConfig,
    pub state: StateConfig,
}

/// Where the snapshot is read from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub bucket: String,
    pub region: String,
    /// Key prefix holding one directory per entity kind
    pub data_prefix: String,
    /// Only partitions whose name contains this marker are considered
    pub partition_marker: String,
    /// Custom S3 endpoint (MinIO, localstack)
    pub endpoint: Option<String>,
    pub path_style: bool,
    /// Both must be set to sign requests; otherwise access is anonymous
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    /// Read from a local mirror instead of S3
    pub local_dir: Option<PathBuf>,
}

/// Destination database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Full connection URL; takes precedence over the individual parts
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub max_connections: u32,
    pub schema: String,
}

/// Batch loader tuning
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoaderConfig {
    /// Primary-table rows buffered before a flush
    pub batch_size: usize,
    /// Bad records tolerated per file; reaching it fails the file
    pub max_record_errors: usize,
}

/// Download retry behaviour
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct FetchConfig {
    pub max_attempts: u32,
    pub retry_base_secs: u64,
}

/// Local directories for checkpoint state and scratch downloads
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    pub base_dir: PathBuf,
    pub max_backups: usize,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            bucket: DEFAULT_BUCKET.to_string(),
            region: DEFAULT_REGION.to_string(),
            data_prefix: DEFAULT_DATA_PREFIX.to_string(),
            partition_marker: DEFAULT_PARTITION_MARKER.to_string(),
            endpoint: None,
            path_style: false,
            access_key: None,
            secret_key: None,
            local_dir: None,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: "localhost".to_string(),
            port: 5432,
            name: "postgres".to_string(),
            user: "postgres".to_string(),
            password: None,
            max_connections: 5,
            schema: DEFAULT_DB_SCHEMA.to_string(),
        }
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_record_errors: DEFAULT_MAX_RECORD_ERRORS,
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_attempts: oaetl_common::retry::DEFAULT_MAX_ATTEMPTS,
            retry_base_secs: oaetl_common::retry::DEFAULT_BASE_DELAY.as_secs(),
        }
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
            max_backups: DEFAULT_MAX_BACKUPS,
        }
    }
}

impl EtlConfig {
    /// Load the full configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let config = Self {
            source: SourceConfig::from_env()?,
            database: DatabaseConfig::from_env()?,
            loader: LoaderConfig {
                batch_size: env_parse("BATCH_SIZE", DEFAULT_BATCH_SIZE)?,
                max_record_errors: env_parse("MAX_RECORD_ERRORS", DEFAULT_MAX_RECORD_ERRORS)?,
            },
            fetch: FetchConfig {
                max_attempts: env_parse(
                    "FETCH_MAX_ATTEMPTS",
                    oaetl_common::retry::DEFAULT_MAX_ATTEMPTS,
                )?,
                retry_base_secs: env_parse(
                    "FETCH_RETRY_BASE_SECS",
                    oaetl_common::retry::DEFAULT_BASE_DELAY.as_secs(),
                )?,
            },
            state: StateConfig {
                base_dir: env::var("ETL_BASE_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from(".")),
                max_backups: env_parse("MAX_BACKUPS", DEFAULT_MAX_BACKUPS)?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.loader.batch_size == 0 {
            return Err(EtlError::Config("BATCH_SIZE must be greater than 0".into()));
        }
        if self.fetch.max_attempts == 0 {
            return Err(EtlError::Config("FETCH_MAX_ATTEMPTS must be greater than 0".into()));
        }
        if self.state.max_backups == 0 {
            return Err(EtlError::Config("MAX_BACKUPS must be greater than 0".into()));
        }
        if self.source.local_dir.is_none() && self.source.bucket.trim().is_empty() {
            return Err(EtlError::Config("S3_BUCKET must not be empty".into()));
        }
        if self.source.access_key.is_some() != self.source.secret_key.is_some() {
            return Err(EtlError::Config(
                "S3_ACCESS_KEY and S3_SECRET_KEY must be set together".into(),
            ));
        }
        Ok(())
    }
}

impl SourceConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            bucket: env::var("S3_BUCKET").unwrap_or(defaults.bucket),
            region: env::var("S3_REGION").unwrap_or(defaults.region),
            data_prefix: env::var("S3_DATA_PREFIX").unwrap_or(defaults.data_prefix),
            partition_marker: env::var("PARTITION_MARKER").unwrap_or(defaults.partition_marker),
            endpoint: env::var("S3_ENDPOINT").ok(),
            path_style: env_parse("S3_PATH_STYLE", false)?,
            access_key: env::var("S3_ACCESS_KEY")
                .or_else(|_| env::var("AWS_ACCESS_KEY_ID"))
                .ok(),
            secret_key: env::var("S3_SECRET_KEY")
                .or_else(|_| env::var("AWS_SECRET_ACCESS_KEY"))
                .ok(),
            local_dir: env::var("LOCAL_SOURCE_DIR").ok().map(PathBuf::from),
        })
    }

    /// Configuration reading a directory mirror of the snapshot
    pub fn local(dir: impl Into<PathBuf>) -> Self {
        Self {
            local_dir: Some(dir.into()),
            ..Self::default()
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.access_key.is_none() || self.secret_key.is_none()
    }
}

impl DatabaseConfig {
    /// `DATABASE_URL` wins; otherwise the `DB_*` parts are used
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            url: env::var("DATABASE_URL").ok(),
            host: env::var("DB_HOST").unwrap_or(defaults.host),
            port: env_parse("DB_PORT", defaults.port)?,
            name: env::var("DB_NAME").unwrap_or(defaults.name),
            user: env::var("DB_USER").unwrap_or(defaults.user),
            password: env::var("DB_PASSWORD").ok(),
            max_connections: env_parse("DB_MAX_CONNECTIONS", defaults.max_connections)?,
            schema: env::var("DB_SCHEMA").unwrap_or(defaults.schema),
        })
    }

    /// Connection options; parts are passed through unescaped so passwords
    /// may contain URL delimiters
    pub fn connect_options(&self) -> Result<PgConnectOptions> {
        if let Some(url) = &self.url {
            return url
                .parse()
                .map_err(|e| EtlError::Config(format!("DATABASE_URL: {}", e)));
        }

        let options = PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .database(&self.name);
        Ok(match &self.password {
            Some(password) => options.password(password),
            None => options,
        })
    }
}

impl FetchConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_secs(self.retry_base_secs))
    }
}

impl StateConfig {
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            ..Self::default()
        }
    }

    pub fn state_dir(&self) -> PathBuf {
        self.base_dir.join("data").join("state")
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.state_dir().join("ingestion_state.json")
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.state_dir().join("backups")
    }

    pub fn scratch_dir(&self) -> PathBuf {
        self.base_dir.join("data").join("temp")
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}

fn env_parse<T: FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| EtlError::Config(format!("{}={:?}: {}", name, raw, e))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn config() -> EtlConfig {
        EtlConfig {
            source: SourceConfig::default(),
            database: DatabaseConfig::default(),
            loader: LoaderConfig::default(),
            fetch: FetchConfig::default(),
            state: StateConfig::default(),
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let mut config = config();
        config.loader.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_half_credentials_rejected() {
        let mut config = config();
        config.source.access_key = Some("key".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_state_layout() {
        let state = StateConfig::with_base_dir("/srv/etl");
        assert_eq!(
            state.checkpoint_path(),
            PathBuf::from("/srv/etl/data/state/ingestion_state.json")
        );
        assert_eq!(state.backup_dir(), PathBuf::from("/srv/etl/data/state/backups"));
        assert_eq!(state.scratch_dir(), PathBuf::from("/srv/etl/data/temp"));
    }

    #[test]
    #[serial]
    fn test_connect_options_from_parts() {
        env::remove_var("DATABASE_URL");
        env::set_var("DB_HOST", "db.internal");
        env::set_var("DB_PORT", "5435");
        env::set_var("DB_PASSWORD", "p@ss/w:rd");

        let db = DatabaseConfig::from_env().unwrap();

        env::remove_var("DB_HOST");
        env::remove_var("DB_PORT");
        env::remove_var("DB_PASSWORD");

        assert_eq!(db.password.as_deref(), Some("p@ss/w:rd"));
        let options = db.connect_options().unwrap();
        assert_eq!(options.get_host(), "db.internal");
        assert_eq!(options.get_port(), 5435);
        assert_eq!(options.get_username(), "postgres");
        assert_eq!(options.get_database(), Some("postgres"));
    }

    #[test]
    fn test_connect_options_prefer_url() {
        let db = DatabaseConfig {
            url: Some("postgresql://etl@warehouse:6543/openalex".into()),
            ..DatabaseConfig::default()
        };

        let options = db.connect_options().unwrap();

        assert_eq!(options.get_host(), "warehouse");
        assert_eq!(options.get_port(), 6543);
        assert_eq!(options.get_database(), Some("openalex"));
    }

    #[test]
    fn test_bad_url_is_a_config_error() {
        let db = DatabaseConfig {
            url: Some("postgresql://warehouse:notaport/openalex".into()),
            ..DatabaseConfig::default()
        };
        assert!(matches!(db.connect_options(), Err(EtlError::Config(_))));
    }

    #[test]
    #[serial]
    fn test_bad_number_is_a_config_error() {
        env::set_var("BATCH_SIZE", "lots");
        let result = EtlConfig::from_env();
        env::remove_var("BATCH_SIZE");

        assert!(matches!(result, Err(EtlError::Config(_))));
    }
}
