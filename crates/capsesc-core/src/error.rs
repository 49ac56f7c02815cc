// Capsesc Error Classification
// Every error the daemon can observe falls into one of three scopes

use std::fmt;

/// How far an error is allowed to propagate.
///
/// Only `Fatal` errors stop the daemon loop. `DeviceLevel` errors drop the
/// offending device from tracking and `Transient` errors are logged and
/// otherwise ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    /// The daemon cannot continue (virtual device setup, hotplug subscription)
    Fatal,
    /// Scoped to one device (open failure, registry full, mid-read removal)
    DeviceLevel,
    /// A single failed emission
    Transient,
}

impl Severity {
    /// Returns true if this error must terminate the daemon
    pub fn is_fatal(self) -> bool {
        matches!(self, Severity::Fatal)
    }

    /// Level at which an error of this severity is logged
    pub fn log_level(self) -> log::Level {
        match self {
            Severity::Fatal => log::Level::Error,
            Severity::DeviceLevel | Severity::Transient => log::Level::Warn,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Fatal => write!(f, "fatal"),
            Severity::DeviceLevel => write!(f, "device"),
            Severity::Transient => write!(f, "transient"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_fatal_is_fatal() {
        assert!(Severity::Fatal.is_fatal());
        assert!(!Severity::DeviceLevel.is_fatal());
        assert!(!Severity::Transient.is_fatal());
    }

    #[test]
    fn test_log_levels() {
        assert_eq!(Severity::Fatal.log_level(), log::Level::Error);
        assert_eq!(Severity::DeviceLevel.log_level(), log::Level::Warn);
        assert_eq!(Severity::Transient.log_level(), log::Level::Warn);
    }

    #[test]
    fn test_severity_display() {
        assert_eq!(Severity::DeviceLevel.to_string(), "device");
    }
}
