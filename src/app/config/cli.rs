use super::groups::MetricsConfig;
use super::serde_helpers::{
    load_env_bool, load_env_list, load_env_path_opt, load_env_string, load_env_string_opt,
    load_env_var, load_env_var_opt,
};
use super::{ConfigError, LogFormat, LogLevel};
use crate::delivery::CoordinatorConfig;
use crate::sender::{ClientConfig, DEFAULT_BEACON_MAX_PAYLOAD_BYTES, UnloadConfig};
use clap::parser::ValueSource;
use clap::{ArgAction, ArgMatches, CommandFactory, FromArgMatches, Parser};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_ENDPOINT: &str = "http://localhost:8080/api/events";
const BATCH_PATH_SUFFIX: &str = "/batch";

#[derive(Parser, Debug, Clone, Serialize, Deserialize)]
#[command(author, version, about, long_about = None)]
#[serde(default)]
pub struct Config {
    /// Collector base endpoint URL
    #[arg(long, env = "EDGEKITE_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    pub endpoint: String,

    /// Batch delivery URL (defaults to <endpoint>/batch)
    #[arg(long, env = "EDGEKITE_BATCH_ENDPOINT")]
    pub batch_endpoint: Option<String>,

    /// Number of records per batch; reaching it triggers an immediate send
    #[arg(long, env = "EDGEKITE_BATCH_SIZE", default_value = "10")]
    pub batch_size: usize,

    /// Periodic send interval in milliseconds
    #[arg(long, env = "EDGEKITE_BATCH_INTERVAL_MS", default_value = "2000")]
    pub batch_interval_ms: u64,

    /// Timeout of one asynchronous batch request in milliseconds
    #[arg(long, env = "EDGEKITE_REQUEST_TIMEOUT_MS", default_value = "30000")]
    pub request_timeout_ms: u64,

    /// Upper bound on pending records (unbounded if not set)
    #[arg(long, env = "EDGEKITE_MAX_QUEUE_LEN")]
    pub max_queue_len: Option<usize>,

    /// Use the beacon worker for teardown sends when it can be started
    #[arg(
        long,
        env = "EDGEKITE_BEACON_ENABLED",
        default_value_t = true,
        action = ArgAction::Set
    )]
    pub beacon_enabled: bool,

    /// Largest payload the beacon accepts, in bytes
    #[arg(long, env = "EDGEKITE_BEACON_MAX_PAYLOAD_BYTES", default_value = "65536")]
    pub beacon_max_payload_bytes: usize,

    /// How long to wait for pending teardown sends before exit, in milliseconds
    #[arg(long, env = "EDGEKITE_TEARDOWN_GRACE_MS", default_value = "4000")]
    pub teardown_grace_ms: u64,

    /// Enable the diagnostic log for the agent itself
    #[arg(long, env = "EDGEKITE_DEBUG")]
    pub debug: bool,

    /// Log level
    #[arg(long, env = "LOG_LEVEL", default_value = "warn")]
    pub log_level: LogLevel,

    /// Log output format
    #[arg(long, env = "EDGEKITE_LOG_FORMAT", default_value = "compact")]
    pub log_format: LogFormat,

    /// Extra `target=level` log directives (repeatable or comma separated)
    #[arg(
        long = "log-directive",
        env = "EDGEKITE_LOG_DIRECTIVES",
        value_delimiter = ','
    )]
    pub log_directives: Vec<String>,

    /// Enable metrics export
    #[arg(long, env = "EDGEKITE_ENABLE_METRICS")]
    pub enable_metrics: bool,

    /// Metrics export port
    #[arg(long, env = "EDGEKITE_METRICS_PORT", default_value = "9090")]
    pub metrics_port: u16,

    /// Configuration file path (optional, TOML)
    #[arg(long, env = "CONFIG_FILE")]
    pub config_file: Option<PathBuf>,

    /// Derived fields (not CLI arguments)
    #[serde(skip)]
    #[arg(skip)]
    pub batch_interval: Duration,

    #[serde(skip)]
    #[arg(skip)]
    pub request_timeout: Duration,

    #[serde(skip)]
    #[arg(skip)]
    pub teardown_grace: Duration,

    #[serde(skip)]
    #[arg(skip)]
    pub resolved_batch_endpoint: String,

    #[serde(skip)]
    #[arg(skip)]
    pub metrics_config: MetricsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            batch_endpoint: None,
            batch_size: 10,
            batch_interval_ms: 2000,
            request_timeout_ms: 30_000,
            max_queue_len: None,
            beacon_enabled: true,
            beacon_max_payload_bytes: DEFAULT_BEACON_MAX_PAYLOAD_BYTES,
            teardown_grace_ms: 4000,
            debug: false,
            log_level: LogLevel::Warn,
            log_format: LogFormat::Compact,
            log_directives: Vec::new(),
            enable_metrics: false,
            metrics_port: 9090,
            config_file: None,
            batch_interval: Duration::from_millis(2000),
            request_timeout: Duration::from_millis(30_000),
            teardown_grace: Duration::from_millis(4000),
            resolved_batch_endpoint: format!("{DEFAULT_ENDPOINT}{BATCH_PATH_SUFFIX}"),
            metrics_config: MetricsConfig::default(),
        }
    }
}

// Copy every field whose value came from the command line or the
// environment onto `base`. Defaults leave `base` untouched.
macro_rules! overlay_explicit {
    ($matches:expr, $base:expr, $cli:expr, $($field:ident),+ $(,)?) => {
        $(
            if matches!(
                $matches.value_source(stringify!($field)),
                Some(ValueSource::CommandLine | ValueSource::EnvVariable)
            ) {
                $base.$field = $cli.$field.clone();
            }
        )+
    };
}

impl Config {
    pub fn from_args<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let mut config = Config::parse_from(args);
        config.post_process()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();

        load_env_string("EDGEKITE_ENDPOINT", &mut config.endpoint);
        load_env_string_opt("EDGEKITE_BATCH_ENDPOINT", &mut config.batch_endpoint);
        load_env_var("EDGEKITE_BATCH_SIZE", &mut config.batch_size)?;
        load_env_var("EDGEKITE_BATCH_INTERVAL_MS", &mut config.batch_interval_ms)?;
        load_env_var("EDGEKITE_REQUEST_TIMEOUT_MS", &mut config.request_timeout_ms)?;
        load_env_var_opt("EDGEKITE_MAX_QUEUE_LEN", &mut config.max_queue_len)?;
        load_env_bool("EDGEKITE_BEACON_ENABLED", &mut config.beacon_enabled)?;
        load_env_var(
            "EDGEKITE_BEACON_MAX_PAYLOAD_BYTES",
            &mut config.beacon_max_payload_bytes,
        )?;
        load_env_var("EDGEKITE_TEARDOWN_GRACE_MS", &mut config.teardown_grace_ms)?;
        load_env_bool("EDGEKITE_DEBUG", &mut config.debug)?;
        load_env_var("LOG_LEVEL", &mut config.log_level)?;
        load_env_var("EDGEKITE_LOG_FORMAT", &mut config.log_format)?;
        load_env_list("EDGEKITE_LOG_DIRECTIVES", &mut config.log_directives);
        load_env_bool("EDGEKITE_ENABLE_METRICS", &mut config.enable_metrics)?;
        load_env_var("EDGEKITE_METRICS_PORT", &mut config.metrics_port)?;
        load_env_path_opt("CONFIG_FILE", &mut config.config_file);

        config.post_process()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)?;
        config.post_process()?;
        config.validate()?;
        Ok(config)
    }

    /// Command line and environment, layered over the TOML file named by
    /// `--config-file` when one is given.
    pub fn load<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let matches = Config::command().get_matches_from(args);
        let cli = Config::from_arg_matches(&matches)
            .map_err(|e| ConfigError::InvalidConfig(e.to_string()))?;

        let mut config = match &cli.config_file {
            Some(path) => {
                let content = std::fs::read_to_string(path)?;
                let mut base: Config = toml::from_str(&content)?;
                base.overlay(&matches, &cli);
                base.config_file = cli.config_file.clone();
                base
            }
            None => cli,
        };

        config.post_process()?;
        config.validate()?;
        Ok(config)
    }

    fn overlay(&mut self, matches: &ArgMatches, cli: &Config) {
        overlay_explicit!(
            matches,
            self,
            cli,
            endpoint,
            batch_endpoint,
            batch_size,
            batch_interval_ms,
            request_timeout_ms,
            max_queue_len,
            beacon_enabled,
            beacon_max_payload_bytes,
            teardown_grace_ms,
            debug,
            log_level,
            log_format,
            log_directives,
            enable_metrics,
            metrics_port,
        );
    }

    pub fn post_process(&mut self) -> Result<(), ConfigError> {
        self.batch_interval = Duration::from_millis(self.batch_interval_ms);
        self.request_timeout = Duration::from_millis(self.request_timeout_ms);
        self.teardown_grace = Duration::from_millis(self.teardown_grace_ms);

        self.resolved_batch_endpoint = match &self.batch_endpoint {
            Some(batch_endpoint) => batch_endpoint.clone(),
            None => format!("{}{BATCH_PATH_SUFFIX}", self.endpoint.trim_end_matches('/')),
        };

        self.metrics_config.enabled = self.enable_metrics;
        self.metrics_config.port = self.metrics_port;

        Ok(())
    }

    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            batch_size: self.batch_size,
            batch_interval: self.batch_interval,
            max_queue_len: self.max_queue_len,
        }
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::with_endpoint(self.resolved_batch_endpoint.clone())
            .with_timeout(self.request_timeout)
    }

    pub fn unload_config(&self) -> UnloadConfig {
        UnloadConfig {
            client: self.client_config(),
            beacon_enabled: self.beacon_enabled,
            beacon_max_payload_bytes: self.beacon_max_payload_bytes,
        }
    }
}
