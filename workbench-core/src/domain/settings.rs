//! Application-level settings passed through to model runs

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// How much the model executable should log
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LoggingLevel {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
}

impl LoggingLevel {
    /// The model CLI's global verbosity flag for this level
    pub fn verbosity_flag(&self) -> &'static str {
        match self {
            LoggingLevel::Debug => "--debug",
            LoggingLevel::Info => "-vvv",
            LoggingLevel::Warning => "-vv",
            LoggingLevel::Error => "-v",
        }
    }
}

impl FromStr for LoggingLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "DEBUG" => Ok(LoggingLevel::Debug),
            "INFO" => Ok(LoggingLevel::Info),
            "WARNING" | "WARN" => Ok(LoggingLevel::Warning),
            "ERROR" => Ok(LoggingLevel::Error),
            other => Err(format!(
                "unknown logging level '{}' (expected DEBUG, INFO, WARNING or ERROR)",
                other
            )),
        }
    }
}

impl std::fmt::Display for LoggingLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoggingLevel::Debug => write!(f, "DEBUG"),
            LoggingLevel::Info => write!(f, "INFO"),
            LoggingLevel::Warning => write!(f, "WARNING"),
            LoggingLevel::Error => write!(f, "ERROR"),
        }
    }
}

/// Settings applied to every model run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvestSettings {
    /// Worker processes the model may use; `-1` means synchronous
    pub n_workers: String,
    pub logging_level: LoggingLevel,
}

impl Default for InvestSettings {
    fn default() -> Self {
        Self {
            n_workers: "-1".to_string(),
            logging_level: LoggingLevel::Info,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_flags() {
        assert_eq!(LoggingLevel::Debug.verbosity_flag(), "--debug");
        assert_eq!(LoggingLevel::Info.verbosity_flag(), "-vvv");
        assert_eq!(LoggingLevel::Warning.verbosity_flag(), "-vv");
        assert_eq!(LoggingLevel::Error.verbosity_flag(), "-v");
    }

    #[test]
    fn test_parse_logging_level() {
        assert_eq!("debug".parse::<LoggingLevel>(), Ok(LoggingLevel::Debug));
        assert_eq!("WARNING".parse::<LoggingLevel>(), Ok(LoggingLevel::Warning));
        assert!("loud".parse::<LoggingLevel>().is_err());
        assert_eq!(LoggingLevel::Warning.to_string(), "WARNING");
    }

    #[test]
    fn test_default_settings() {
        let settings = InvestSettings::default();
        assert_eq!(settings.n_workers, "-1");
        assert_eq!(settings.logging_level, LoggingLevel::Info);
    }
}
