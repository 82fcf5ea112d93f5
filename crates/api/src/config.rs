use std::path::PathBuf;
use std::str::FromStr;

use sdgate_cloud::{StorageConfig, StorageMode};
use sdgate_db::RegistryBackend;
use sdgate_pipeline::models::DEFAULT_COLD_START_CONCURRENCY;
use sdgate_pipeline::{FlexMode, LoadPolicy};

/// Errors raised while reading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var}={value:?} is invalid: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for a single local instance.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// `debug`, `dev` or `product`; selects the default log level.
    pub mode: String,
    pub db_type: RegistryBackend,
    pub database_url: String,
    pub storage: StorageConfig,
    /// Require a `username` header on every API request.
    pub login_switch: bool,
    pub flex_mode: FlexMode,
    /// Registry key of this instance's own function record.
    pub function_name: String,
    /// Backend endpoint served by this instance.
    pub downstream: String,
    /// Backend installation root. Models live under `{sd_path}/models`.
    pub sd_path: PathBuf,
    pub load_policy: LoadPolicy,
    /// How long terminal tasks stay queryable.
    pub task_retention_secs: u64,
    pub cors_origins: Vec<String>,
    pub request_timeout_secs: u64,
    /// Upper bound on draining background work after shutdown begins.
    pub shutdown_timeout_secs: u64,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default                        |
    /// |---------------------------|--------------------------------|
    /// | `HOST`                    | `0.0.0.0`                      |
    /// | `PORT`                    | `9000`                         |
    /// | `MODE`                    | `dev`                          |
    /// | `DB_TYPE`                 | `sqlite`                       |
    /// | `DATABASE_URL`            | `sqlite://sdgate.db?mode=rwc`  |
    /// | `OSS_MODE`                | `remote`                       |
    /// | `OSS_PATH`                | `/mnt/oss`                     |
    /// | `OSS_BUCKET`              | (none)                         |
    /// | `SD_REGION`               | (none)                         |
    /// | `OSS_ENDPOINT`            | (none)                         |
    /// | `LOGIN_SWITCH`            | `off`                          |
    /// | `FLEX_MODE`               | `multiFunc`                    |
    /// | `FC_FUNCTION_NAME`        | `sd`                           |
    /// | `DOWNSTREAM`              | `http://127.0.0.1:7861`        |
    /// | `SD_PATH`                 | `/mnt/auto/sd`                 |
    /// | `COLD_START_CONCURRENCY`  | `10`                           |
    /// | `MODEL_COLD_START_SERIAL` | `false`                        |
    /// | `TASK_RETENTION_SECS`     | `3600`                         |
    /// | `CORS_ORIGINS`            | `http://localhost:5173`        |
    /// | `REQUEST_TIMEOUT_SECS`    | `660`                          |
    /// | `SHUTDOWN_TIMEOUT_SECS`   | `30`                           |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());

        let db_type = var("DB_TYPE", "sqlite");
        let db_type = RegistryBackend::from_name(&db_type).map_err(|e| ConfigError::Invalid {
            var: "DB_TYPE",
            value: db_type.clone(),
            reason: e.to_string(),
        })?;

        let oss_mode = var("OSS_MODE", "remote");
        let storage_mode = StorageMode::from_name(&oss_mode).ok_or_else(|| ConfigError::Invalid {
            var: "OSS_MODE",
            value: oss_mode.clone(),
            reason: "must be one of: local, remote".into(),
        })?;

        let flex = var("FLEX_MODE", "multiFunc");
        let flex_mode = FlexMode::from_name(&flex).ok_or_else(|| ConfigError::Invalid {
            var: "FLEX_MODE",
            value: flex.clone(),
            reason: "must be one of: singleFunc, multiFunc".into(),
        })?;

        let login = var("LOGIN_SWITCH", "off");
        let login_switch = match login.as_str() {
            "on" => true,
            "off" => false,
            _ => {
                return Err(ConfigError::Invalid {
                    var: "LOGIN_SWITCH",
                    value: login,
                    reason: "must be one of: on, off".into(),
                })
            }
        };

        let serial = var("MODEL_COLD_START_SERIAL", "false");
        let serial = parse_bool(&serial).ok_or_else(|| ConfigError::Invalid {
            var: "MODEL_COLD_START_SERIAL",
            value: serial.clone(),
            reason: "must be true or false".into(),
        })?;

        let cors_origins = var("CORS_ORIGINS", "http://localhost:5173")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let optional = |name: &str| lookup(name).filter(|v| !v.is_empty());

        Ok(Self {
            host: var("HOST", "0.0.0.0"),
            port: parse(&lookup, "PORT", 9000)?,
            mode: var("MODE", "dev"),
            db_type,
            database_url: var("DATABASE_URL", "sqlite://sdgate.db?mode=rwc"),
            storage: StorageConfig {
                mode: storage_mode,
                local_root: PathBuf::from(var("OSS_PATH", "/mnt/oss")),
                bucket: optional("OSS_BUCKET"),
                region: optional("SD_REGION"),
                endpoint: optional("OSS_ENDPOINT"),
            },
            login_switch,
            flex_mode,
            function_name: var("FC_FUNCTION_NAME", "sd"),
            downstream: var("DOWNSTREAM", "http://127.0.0.1:7861"),
            sd_path: PathBuf::from(var("SD_PATH", "/mnt/auto/sd")),
            load_policy: LoadPolicy {
                cold_start_concurrency: parse(
                    &lookup,
                    "COLD_START_CONCURRENCY",
                    DEFAULT_COLD_START_CONCURRENCY,
                )?,
                serial,
            },
            task_retention_secs: parse(&lookup, "TASK_RETENTION_SECS", 3600)?,
            cors_origins,
            request_timeout_secs: parse(&lookup, "REQUEST_TIMEOUT_SECS", 660)?,
            shutdown_timeout_secs: parse(&lookup, "SHUTDOWN_TIMEOUT_SECS", 30)?,
        })
    }

    /// Directory holding the backend's typed model subdirectories.
    pub fn models_dir(&self) -> PathBuf {
        self.sd_path.join("models")
    }

    /// Log filter used when `RUST_LOG` is unset.
    pub fn default_log_filter(&self) -> &'static str {
        match self.mode.as_str() {
            "debug" => "debug",
            "product" => "warn",
            _ => "info",
        }
    }
}

fn parse<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            reason: e.to_string(),
            value,
        }),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}
