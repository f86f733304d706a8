use crate::config::LoggingSection;
use crate::errors::types::{Error, Result};
use std::str::FromStr;
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, EnvFilter};

/// Subscriber settings for the daemon and test harnesses
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Baseline level; `RUST_LOG` directives are layered on top
    pub level: Level,
    /// One JSON object per line on stdout
    pub json: bool,
    /// Source file and line on every event
    pub file_info: bool,
    /// Emit span open/close events
    pub log_spans: bool,
    /// Reported when the subscriber cannot be installed
    pub app_name: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::new(Level::INFO, "switchboard")
    }
}

impl LoggingConfig {
    pub fn new(level: Level, app_name: impl Into<String>) -> Self {
        Self {
            level,
            json: false,
            file_info: false,
            log_spans: false,
            app_name: app_name.into(),
        }
    }

    /// Build from the `[logging]` section of the configuration file
    pub fn from_section(section: &LoggingSection, app_name: impl Into<String>) -> Result<Self> {
        Ok(Self {
            json: section.json,
            file_info: section.file_info,
            ..Self::new(parse_log_level(&section.level)?, app_name)
        })
    }

    pub fn with_json(self) -> Self {
        Self { json: true, ..self }
    }

    pub fn with_file_info(self) -> Self {
        Self { file_info: true, ..self }
    }

    pub fn with_spans(self) -> Self {
        Self { log_spans: true, ..self }
    }
}

/// Set up the logging system with the provided configuration.
///
/// `RUST_LOG` directives are honored on top of the configured level. Calling
/// this twice returns [`Error::Logging`] instead of panicking.
pub fn setup_logging(config: LoggingConfig) -> Result<()> {
    let filter = EnvFilter::from_default_env().add_directive(config.level.into());

    let span_events = if config.log_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_span_events(span_events)
        .with_file(config.file_info)
        .with_line_number(config.file_info);

    let installed = if config.json {
        subscriber.with_writer(std::io::stdout).json().try_init()
    } else {
        subscriber.try_init()
    };

    installed.map_err(|e| Error::Logging(format!("{} ({})", e, config.app_name)))
}

/// Parse a log level from a string
pub fn parse_log_level(level: &str) -> Result<Level> {
    Level::from_str(level).map_err(|_| Error::Config(format!("Invalid log level: {}", level)))
}

/// Log a welcome message with version info
pub fn log_welcome(app_name: &str, version: &str) {
    tracing::info!("Starting {} v{}", app_name, version);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_levels_case_insensitively() {
        assert_eq!(parse_log_level("debug").unwrap(), Level::DEBUG);
        assert_eq!(parse_log_level("WARN").unwrap(), Level::WARN);
        assert!(matches!(parse_log_level("loud"), Err(Error::Config(_))));
    }

    #[test]
    fn section_maps_onto_config() {
        let section = LoggingSection {
            level: "trace".into(),
            json: true,
            file_info: true,
        };
        let config = LoggingConfig::from_section(&section, "sb").unwrap();
        assert_eq!(config.level, Level::TRACE);
        assert!(config.json);
        assert!(config.file_info);
        assert!(!config.log_spans);
        assert_eq!(config.app_name, "sb");
    }

    #[test]
    fn builders_toggle_one_flag_each() {
        let config = LoggingConfig::default().with_spans().with_file_info();
        assert!(config.log_spans && config.file_info);
        assert!(!config.json);
        assert_eq!(config.app_name, "switchboard");
    }

    #[test]
    fn second_install_is_an_error_not_a_panic() {
        let _ = setup_logging(LoggingConfig::default());
        assert!(matches!(
            setup_logging(LoggingConfig::default()),
            Err(Error::Logging(_))
        ));
    }
}
