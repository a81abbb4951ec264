//! Console logger

use super::traits::{LogLevel, Logger};

/// Environment variable holding the minimum console level
pub const LOG_LEVEL_ENV: &str = "TOOLWEAVE_LOG";

/// Writes entries at or above `min_level`; info goes to stdout, the rest to stderr
#[derive(Debug, Clone)]
pub struct ConsoleLogger {
    prefix: String,
    min_level: LogLevel,
}

impl Default for ConsoleLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleLogger {
    pub fn new() -> Self {
        Self {
            prefix: "[Toolweave]".to_string(),
            min_level: LogLevel::Info,
        }
    }

    /// Minimum level from `TOOLWEAVE_LOG`, falling back to info
    pub fn from_env() -> Self {
        let level = std::env::var(LOG_LEVEL_ENV)
            .ok()
            .and_then(|v| LogLevel::parse(&v))
            .unwrap_or(LogLevel::Info);
        Self::new().with_min_level(level)
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_min_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    pub fn enabled(&self, level: LogLevel) -> bool {
        level >= self.min_level
    }

    fn write(&self, level: LogLevel, message: &str) {
        if !self.enabled(level) {
            return;
        }
        if level == LogLevel::Info {
            println!("{} {}: {}", self.prefix, level, message);
        } else {
            eprintln!("{} {}: {}", self.prefix, level, message);
        }
    }
}

impl Logger for ConsoleLogger {
    fn debug(&self, message: &str) {
        self.write(LogLevel::Debug, message);
    }

    fn info(&self, message: &str) {
        self.write(LogLevel::Info, message);
    }

    fn warn(&self, message: &str) {
        self.write(LogLevel::Warn, message);
    }

    fn error(&self, message: &str) {
        self.write(LogLevel::Error, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_filter() {
        let logger = ConsoleLogger::new();
        assert_eq!(logger.prefix, "[Toolweave]");
        assert!(!logger.enabled(LogLevel::Debug));
        assert!(logger.enabled(LogLevel::Warn));

        let quiet = ConsoleLogger::new()
            .with_prefix("[App]")
            .with_min_level(LogLevel::Error);
        assert_eq!(quiet.prefix, "[App]");
        assert!(!quiet.enabled(LogLevel::Warn));
    }
}
