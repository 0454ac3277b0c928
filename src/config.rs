use crate::error::{Error, Result};
use crate::executor::PanicStrategy;

/// Environment variable holding the log filter directive.
pub const LOG_ENV: &str = "COURIER_LOG";

/// Environment variable overriding the queue depth warning threshold.
pub const QUEUE_WARN_ENV: &str = "COURIER_QUEUE_WARN";

#[derive(Debug, Clone)]
pub struct Config {
    /// How the decoupled executors treat a panicking callback.
    pub panic_strategy: PanicStrategy,

    /// Handoff depth at which the cooperative executor warns that the
    /// consumer is falling behind. The channel itself never pushes back.
    pub queue_warn_threshold: Option<usize>,

    /// Name attached to the pump's log records.
    pub pump_name: String,

    /// Fallback filter used by [`crate::logging::init`] when
    /// `COURIER_LOG` is not set.
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            panic_strategy: PanicStrategy::default(),
            queue_warn_threshold: Some(10_000),
            pump_name: "courier-pump".to_string(),
            log_filter: "warn".to_string(),
        }
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    /// Default config with `COURIER_QUEUE_WARN` and `COURIER_LOG` applied.
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();

        if let Ok(raw) = std::env::var(QUEUE_WARN_ENV) {
            let raw = raw.trim();
            config.queue_warn_threshold = if raw.eq_ignore_ascii_case("off") {
                None
            } else {
                let n = raw.parse::<usize>().map_err(|e| {
                    Error::config(format!("{QUEUE_WARN_ENV}={raw:?} is not a count: {e}"))
                })?;
                Some(n)
            };
        }

        if let Ok(filter) = std::env::var(LOG_ENV) {
            config.log_filter = filter;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.queue_warn_threshold == Some(0) {
            return Err(Error::config("queue_warn_threshold must be > 0"));
        }

        if self.pump_name.trim().is_empty() {
            return Err(Error::config("pump_name must not be empty"));
        }

        if self.log_filter.trim().is_empty() {
            return Err(Error::config("log_filter must not be empty"));
        }

        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn panic_strategy(mut self, strategy: PanicStrategy) -> Self {
        self.config.panic_strategy = strategy;
        self
    }

    pub fn queue_warn_threshold(mut self, depth: usize) -> Self {
        self.config.queue_warn_threshold = Some(depth);
        self
    }

    pub fn no_queue_warning(mut self) -> Self {
        self.config.queue_warn_threshold = None;
        self
    }

    pub fn pump_name<S: Into<String>>(mut self, name: S) -> Self {
        self.config.pump_name = name.into();
        self
    }

    pub fn log_filter<S: Into<String>>(mut self, filter: S) -> Self {
        self.config.log_filter = filter.into();
        self
    }

    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_builder_rejects_zero_threshold() {
        let result = Config::builder().queue_warn_threshold(0).build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_builder_rejects_empty_pump_name() {
        assert!(Config::builder().pump_name("  ").build().is_err());
    }

    #[test]
    fn test_builder_overrides() {
        let config = Config::builder()
            .panic_strategy(PanicStrategy::Isolate)
            .no_queue_warning()
            .pump_name("io-pump")
            .build()
            .unwrap();

        assert_eq!(config.panic_strategy, PanicStrategy::Isolate);
        assert_eq!(config.queue_warn_threshold, None);
        assert_eq!(config.pump_name, "io-pump");
    }

    // Every case touching COURIER_QUEUE_WARN lives in this one test: the
    // environment is process-wide and tests run in parallel.
    #[test]
    fn test_from_env_queue_warn() {
        std::env::set_var(QUEUE_WARN_ENV, "256");
        assert_eq!(Config::from_env().unwrap().queue_warn_threshold, Some(256));

        std::env::set_var(QUEUE_WARN_ENV, " OFF ");
        assert_eq!(Config::from_env().unwrap().queue_warn_threshold, None);

        std::env::set_var(QUEUE_WARN_ENV, "lots");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, Error::Config(ref msg) if msg.contains("lots")));

        std::env::set_var(QUEUE_WARN_ENV, "0");
        assert!(matches!(Config::from_env(), Err(Error::Config(_))));

        std::env::remove_var(QUEUE_WARN_ENV);
        assert_eq!(Config::from_env().unwrap().queue_warn_threshold, Some(10_000));
    }
}
