//! Thin front for the `slog` ecosystem. All crates in the workspace log through
//! this module so the backing implementation stays swappable in one place.

pub use slog::{crit, debug, error, info, o, trace, warn, Discard, Logger};

use sloggers::terminal::{Destination, TerminalLoggerBuilder};
use sloggers::types::Severity;
use sloggers::{Build, Config, LoggerConfig};

/// Builds a terminal logger writing to stderr at the supplied severity.
pub fn terminal(level: Severity) -> Logger {
    let mut builder = TerminalLoggerBuilder::new();
    builder.level(level);
    builder.destination(Destination::Stderr);

    builder.build().expect("Failed to build terminal logger")
}

/// Builds a logger from a `sloggers` configuration snippet in TOML form.
pub fn from_toml_str(config: &str) -> Result<Logger, String> {
    let config: LoggerConfig = serdeconv::from_toml_str(config).map_err(|err| err.to_string())?;

    config.build_logger().map_err(|err| err.to_string())
}

/// Maps a config-file level string onto a severity. Unknown strings fall back
/// to `Info`.
pub fn severity(level: &str) -> Severity {
    match level {
        "trace" => Severity::Trace,
        "debug" => Severity::Debug,
        "warning" | "warn" => Severity::Warning,
        "error" => Severity::Error,
        "critical" => Severity::Critical,
        _ => Severity::Info,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_toml_str() {
        let log = from_toml_str(
            r#"
type = "terminal"
level = "debug"
destination = "stderr"
"#,
        );

        assert!(log.is_ok());
    }

    #[test]
    fn test_from_toml_str_invalid() {
        assert!(from_toml_str("type = \"carrier-pigeon\"").is_err());
    }

    #[test]
    fn test_severity_fallback() {
        assert_eq!(severity("debug"), Severity::Debug);
        assert_eq!(severity("verbose"), Severity::Info);
    }
}
