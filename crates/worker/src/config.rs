use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use museo_core::backoff::BackoffConfig;

use crate::dispatcher::DispatcherSettings;
use crate::error::ConfigError;

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("expected 'text' or 'json', got '{other}'")),
        }
    }
}

/// Worker configuration loaded from environment variables.
///
/// Everything except `DATABASE_URL` has a default suitable for local
/// development.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    /// How long startup waits for the database to answer.
    pub db_wait_timeout: Duration,
    /// Maximum number of jobs executing at once in this process.
    pub concurrency: usize,
    pub poll_interval: Duration,
    /// Upper bound on the delay between poll attempts while the queue store
    /// is failing.
    pub max_poll_backoff: Duration,
    /// A claimed job whose heartbeat is older than this is recovered by
    /// another consumer.
    pub visibility_timeout: Duration,
    pub heartbeat_interval: Duration,
    /// How long shutdown waits for in-flight handlers before cancelling them.
    pub shutdown_grace: Duration,
    pub model_path: PathBuf,
    pub log_format: LogFormat,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default             |
    /// |---------------------------|---------------------|
    /// | `DATABASE_URL`            | (required)          |
    /// | `DB_MAX_CONNECTIONS`      | `20`                |
    /// | `DB_WAIT_TIMEOUT_SECS`    | `5`                 |
    /// | `WORKER_CONCURRENCY`      | `4`                 |
    /// | `POLL_INTERVAL_MS`        | `1000`              |
    /// | `MAX_POLL_BACKOFF_MS`     | `30000`             |
    /// | `VISIBILITY_TIMEOUT_SECS` | `300`               |
    /// | `HEARTBEAT_INTERVAL_SECS` | `30`                |
    /// | `SHUTDOWN_GRACE_SECS`     | `30`                |
    /// | `MODEL_PATH`              | `cache/model.onnx`  |
    /// | `LOG_FORMAT`              | `text`              |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .filter(|url| !url.trim().is_empty())
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let config = Self {
            database_url,
            db_max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", 20)?,
            db_wait_timeout: Duration::from_secs(parse_or(&lookup, "DB_WAIT_TIMEOUT_SECS", 5)?),
            concurrency: parse_or(&lookup, "WORKER_CONCURRENCY", 4)?,
            poll_interval: Duration::from_millis(parse_or(&lookup, "POLL_INTERVAL_MS", 1000)?),
            max_poll_backoff: Duration::from_millis(parse_or(
                &lookup,
                "MAX_POLL_BACKOFF_MS",
                30_000,
            )?),
            visibility_timeout: Duration::from_secs(parse_or(
                &lookup,
                "VISIBILITY_TIMEOUT_SECS",
                300,
            )?),
            heartbeat_interval: Duration::from_secs(parse_or(
                &lookup,
                "HEARTBEAT_INTERVAL_SECS",
                30,
            )?),
            shutdown_grace: Duration::from_secs(parse_or(&lookup, "SHUTDOWN_GRACE_SECS", 30)?),
            model_path: lookup("MODEL_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("cache/model.onnx")),
            log_format: parse_or(&lookup, "LOG_FORMAT", LogFormat::Text)?,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid {
                var: "WORKER_CONCURRENCY",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.db_max_connections == 0 {
            return Err(ConfigError::Invalid {
                var: "DB_MAX_CONNECTIONS",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::Invalid {
                var: "POLL_INTERVAL_MS",
                value: "0".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if self.heartbeat_interval.is_zero()
            || self.heartbeat_interval >= self.visibility_timeout
        {
            return Err(ConfigError::Invalid {
                var: "HEARTBEAT_INTERVAL_SECS",
                value: self.heartbeat_interval.as_secs().to_string(),
                reason: format!(
                    "must be positive and shorter than VISIBILITY_TIMEOUT_SECS ({})",
                    self.visibility_timeout.as_secs()
                ),
            });
        }
        Ok(())
    }

    /// The subset of the configuration the dispatcher loop needs.
    pub fn dispatcher_settings(&self) -> DispatcherSettings {
        DispatcherSettings {
            concurrency: self.concurrency,
            poll_interval: self.poll_interval,
            backoff: BackoffConfig {
                initial_delay: self.poll_interval,
                max_delay: self.max_poll_backoff.max(self.poll_interval),
                ..BackoffConfig::default()
            },
            visibility_timeout: self.visibility_timeout,
            heartbeat_interval: self.heartbeat_interval,
            shutdown_grace: self.shutdown_grace,
            listen: true,
        }
    }
}

fn parse_or<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            value: value.clone(),
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<WorkerConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        WorkerConfig::from_lookup(|var| vars.get(var).cloned())
    }

    #[test]
    fn defaults_apply() {
        let config = load(&[("DATABASE_URL", "postgres://localhost/museo")]).unwrap();
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.db_max_connections, 20);
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.visibility_timeout, Duration::from_secs(300));
        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(config.shutdown_grace, Duration::from_secs(30));
        assert_eq!(config.model_path, PathBuf::from("cache/model.onnx"));
        assert_eq!(config.log_format, LogFormat::Text);
    }

    #[test]
    fn database_url_is_required() {
        assert_matches!(load(&[]), Err(ConfigError::Missing("DATABASE_URL")));
        assert_matches!(
            load(&[("DATABASE_URL", "  ")]),
            Err(ConfigError::Missing("DATABASE_URL"))
        );
    }

    #[test]
    fn overrides_are_parsed() {
        let config = load(&[
            ("DATABASE_URL", "postgres://db/museo"),
            ("WORKER_CONCURRENCY", "16"),
            ("POLL_INTERVAL_MS", "250"),
            ("LOG_FORMAT", "JSON"),
            ("MODEL_PATH", "/srv/model.onnx"),
        ])
        .unwrap();
        assert_eq!(config.concurrency, 16);
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.model_path, PathBuf::from("/srv/model.onnx"));
    }

    #[test]
    fn garbage_values_are_rejected() {
        let err = load(&[("DATABASE_URL", "postgres://db"), ("WORKER_CONCURRENCY", "many")])
            .unwrap_err();
        assert_matches!(err, ConfigError::Invalid { var: "WORKER_CONCURRENCY", .. });

        let err = load(&[("DATABASE_URL", "postgres://db"), ("LOG_FORMAT", "xml")]).unwrap_err();
        assert_matches!(err, ConfigError::Invalid { var: "LOG_FORMAT", .. });
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let err = load(&[("DATABASE_URL", "postgres://db"), ("WORKER_CONCURRENCY", "0")])
            .unwrap_err();
        assert_matches!(err, ConfigError::Invalid { var: "WORKER_CONCURRENCY", .. });
    }

    #[test]
    fn heartbeat_must_beat_visibility_timeout() {
        let err = load(&[
            ("DATABASE_URL", "postgres://db"),
            ("VISIBILITY_TIMEOUT_SECS", "10"),
            ("HEARTBEAT_INTERVAL_SECS", "10"),
        ])
        .unwrap_err();
        assert_matches!(err, ConfigError::Invalid { var: "HEARTBEAT_INTERVAL_SECS", .. });
    }

    #[test]
    fn dispatcher_backoff_starts_at_poll_interval() {
        let config = load(&[
            ("DATABASE_URL", "postgres://db"),
            ("POLL_INTERVAL_MS", "200"),
            ("MAX_POLL_BACKOFF_MS", "5000"),
        ])
        .unwrap();
        let settings = config.dispatcher_settings();
        assert_eq!(settings.backoff.initial_delay, Duration::from_millis(200));
        assert_eq!(settings.backoff.max_delay, Duration::from_secs(5));
        assert!(settings.listen);
    }
}
