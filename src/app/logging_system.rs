use super::config::{Config, LogFormat, LogLevel};
use super::initialization::{FallbackStrategy, InitializationError, LogDirective};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Target of the agent's own diagnostics, raised by `--debug`.
pub const AGENT_LOG_TARGET: &str = "edgekite_agent";

const NOISY_TARGETS: [&str; 4] = ["hyper", "reqwest", "h2", "rustls"];

pub struct LoggingSystem {
    directives: Arc<RwLock<Vec<LogDirective>>>,
    fallback_level: LogLevel,
}

impl LoggingSystem {
    pub fn new() -> Self {
        Self {
            directives: Arc::new(RwLock::new(Vec::new())),
            fallback_level: LogLevel::Warn,
        }
    }

    /// Parse and add a `target=level` directive. Malformed input is skipped
    /// or downgraded to the fallback level instead of failing startup.
    pub fn add_directive(&self, directive_str: &str) -> Result<(), InitializationError> {
        match LogDirective::parse(directive_str) {
            Ok(directive) => {
                self.directives.write().push(directive);
                Ok(())
            }
            Err(e) => match e.fallback_strategy() {
                FallbackStrategy::UseDefaultLevel => {
                    eprintln!("Warning: {e}, using default level");
                    let target = directive_str.split('=').next().unwrap_or_default().trim();
                    self.directives
                        .write()
                        .push(LogDirective::new(target, self.fallback_level));
                    Ok(())
                }
                FallbackStrategy::SkipDirective => {
                    eprintln!("Warning: {e}, skipping directive");
                    Ok(())
                }
                FallbackStrategy::RunWithoutLogging => Err(e),
            },
        }
    }

    /// Pin the HTTP stack to `warn` so request-level chatter stays out of
    /// the agent's log.
    pub fn add_default_directives(&self) {
        let mut directives = self.directives.write();
        for target in NOISY_TARGETS {
            directives.push(LogDirective::new(target, LogLevel::Warn));
        }
    }

    pub fn build_filter_string(&self, default_level: LogLevel) -> String {
        let directives = self.directives.read();

        let mut filter_parts = Vec::with_capacity(directives.len() + 1);
        filter_parts.push(default_level.as_str().to_string());
        filter_parts.extend(directives.iter().map(LogDirective::to_filter_string));

        filter_parts.join(",")
    }

    /// Install the global subscriber, writing to stderr. stdout is left to
    /// the host.
    pub fn initialize_tracing(
        &self,
        default_level: LogLevel,
        format: LogFormat,
    ) -> Result<(), InitializationError> {
        let filter_string = self.build_filter_string(default_level);

        let env_filter = EnvFilter::try_new(&filter_string).map_err(|e| {
            InitializationError::LoggingInitFailed {
                details: format!("Failed to create EnvFilter with '{filter_string}'"),
                source: Box::new(e),
            }
        })?;

        let (compact_layer, json_layer) = match format {
            LogFormat::Compact => (
                Some(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_target(true)
                        .with_level(true)
                        .compact(),
                ),
                None,
            ),
            LogFormat::Json => (
                None,
                Some(
                    fmt::layer()
                        .json()
                        .with_writer(std::io::stderr)
                        .with_current_span(false),
                ),
            ),
        };

        let subscriber = tracing_subscriber::registry()
            .with(env_filter)
            .with(compact_layer)
            .with(json_layer);

        tracing::subscriber::set_global_default(subscriber).map_err(|e| {
            InitializationError::LoggingInitFailed {
                details: "Failed to set global tracing subscriber".to_string(),
                source: Box::new(e),
            }
        })
    }

    pub fn directive_count(&self) -> usize {
        self.directives.read().len()
    }
}

impl Default for LoggingSystem {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the logging system for `config`: noisy crates pinned to `warn`,
/// the agent's own target raised to `debug` when `--debug` is set, then any
/// `--log-directive` entries, which override both.
pub fn logging_system_for(config: &Config) -> Result<LoggingSystem, InitializationError> {
    let logging_system = LoggingSystem::new();
    logging_system.add_default_directives();
    if config.debug {
        logging_system.add_directive(&format!("{AGENT_LOG_TARGET}=debug"))?;
    }
    for directive in &config.log_directives {
        logging_system.add_directive(directive)?;
    }
    Ok(logging_system)
}

pub fn setup_logging(config: &Config) -> Result<(), InitializationError> {
    logging_system_for(config)?.initialize_tracing(config.log_level, config.log_format)
}
