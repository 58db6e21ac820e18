//! Alert severity levels and their numeric encoding.
use std::fmt;

use serde::Deserialize;
use serde::Serialize;

/// Severity attached to every alert flowing through the sink fan-out.
///
/// The numeric encoding runs from 1 (most severe) to 5 (least severe) and is
/// what the webhook minimum-severity gate compares against.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Severity {
    #[serde(rename = "CRITICAL")]
    Critical,

    #[serde(rename = "ERROR")]
    Error,

    #[serde(rename = "WARNING")]
    Warning,

    #[serde(rename = "INFO")]
    Info,

    #[serde(rename = "DEBUG")]
    Debug,
}

impl Severity {
    /// Numeric encoding of the severity, 1 = CRITICAL through 5 = DEBUG.
    pub fn number(&self) -> u8 {
        match self {
            Severity::Critical => 1,
            Severity::Error => 2,
            Severity::Warning => 3,
            Severity::Info => 4,
            Severity::Debug => 5,
        }
    }

    /// Decode a severity name, case-insensitively.
    ///
    /// Unrecognised names decode to [`Severity::Info`] so a typo in an
    /// operator-provided minimum never silences alerts entirely.
    pub fn parse(value: &str) -> Severity {
        match value.to_lowercase().as_str() {
            "critical" => Severity::Critical,
            "error" => Severity::Error,
            "warning" => Severity::Warning,
            "debug" => Severity::Debug,
            _ => Severity::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "CRITICAL",
            Severity::Error => "ERROR",
            Severity::Warning => "WARNING",
            Severity::Info => "INFO",
            Severity::Debug => "DEBUG",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::Severity;

    #[test]
    fn numbers_order_most_severe_first() {
        assert_eq!(Severity::Critical.number(), 1);
        assert_eq!(Severity::Error.number(), 2);
        assert_eq!(Severity::Warning.number(), 3);
        assert_eq!(Severity::Info.number(), 4);
        assert_eq!(Severity::Debug.number(), 5);
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(Severity::parse("critical"), Severity::Critical);
        assert_eq!(Severity::parse("WARNING"), Severity::Warning);
        assert_eq!(Severity::parse("Debug"), Severity::Debug);
    }

    #[test]
    fn parse_defaults_to_info() {
        assert_eq!(Severity::parse("notice"), Severity::Info);
        assert_eq!(Severity::parse(""), Severity::Info);
    }

    #[test]
    fn display_is_uppercase() {
        assert_eq!(Severity::Error.to_string(), "ERROR");
    }
}
