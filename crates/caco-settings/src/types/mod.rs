//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]` so partial
//! JSON deserializes with defaults for missing fields.

mod dispatch;

pub use dispatch::*;

use serde::{Deserialize, Serialize};

/// Root settings type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacoSettings {
    /// Settings schema version.
    pub version: String,
    /// Application name.
    pub name: String,
    /// Logging configuration.
    pub logging: LoggingSettings,
    /// Dispatch safety limits.
    pub dispatch: DispatchSettings,
}

impl Default for CacoSettings {
    fn default() -> Self {
        Self {
            version: "0.1.0".to_string(),
            name: "caco".to_string(),
            logging: LoggingSettings::default(),
            dispatch: DispatchSettings::default(),
        }
    }
}

impl CacoSettings {
    /// Correct values that would make a limit meaningless.
    ///
    /// Each limit is clamped into the range the matching `CACO_*`
    /// environment override accepts, with a warning rather than an error.
    pub fn validate(&mut self) {
        fn clamp<T>(val: &mut T, key: &str, min: T, max: T)
        where
            T: PartialOrd + Copy + std::fmt::Display,
        {
            let clamped = if *val < min {
                min
            } else if *val > max {
                max
            } else {
                return;
            };
            tracing::warn!(
                key,
                value = %val,
                corrected = %clamped,
                "setting out of range, correcting"
            );
            *val = clamped;
        }

        let r = &mut self.dispatch.runaway;
        clamp(&mut r.max_depth, "runaway.maxDepth", 1, MAX_DEPTH);
        clamp(&mut r.max_duration_seconds, "runaway.maxDurationSeconds", 1, MAX_WINDOW_SECONDS);
        clamp(&mut r.max_calls_per_window, "runaway.maxCallsPerWindow", 1, MAX_CALLS);
        clamp(&mut r.rate_window_seconds, "runaway.rateWindowSeconds", 1, MAX_WINDOW_SECONDS);

        let c = &mut self.dispatch.correlation;
        clamp(&mut c.max_depth, "correlation.maxDepth", 1, MAX_DEPTH);
        clamp(&mut c.max_age_seconds, "correlation.maxAgeSeconds", 1, MAX_AGE_SECONDS);
        clamp(&mut c.rate_limit.max_calls, "correlation.rateLimit.maxCalls", 1, MAX_CALLS);
        clamp(
            &mut c.rate_limit.window_seconds,
            "correlation.rateLimit.windowSeconds",
            1,
            MAX_WINDOW_SECONDS,
        );
    }
}

/// Upper bound for chain depth limits.
pub const MAX_DEPTH: usize = 1_000;
/// Upper bound for calls-per-window limits.
pub const MAX_CALLS: usize = 100_000;
/// Upper bound for durations and rate windows (one day).
pub const MAX_WINDOW_SECONDS: u64 = 86_400;
/// Upper bound for correlation context age (one week).
pub const MAX_AGE_SECONDS: u64 = 604_800;

/// Logging configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter level when `RUST_LOG` is unset.
    pub level: String,
    /// Emit newline-delimited JSON instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use caco_core::logging::capture_logs;

    #[test]
    fn default_settings_version() {
        let s = CacoSettings::default();
        assert_eq!(s.version, "0.1.0");
        assert_eq!(s.name, "caco");
        assert_eq!(s.logging.level, "info");
    }

    #[test]
    fn json_field_names_are_camel_case() {
        let json = serde_json::to_value(CacoSettings::default()).unwrap();
        assert!(json["dispatch"]["runaway"].get("maxDepth").is_some());
        assert!(json["dispatch"]["runaway"].get("rateWindowSeconds").is_some());
        assert!(json["dispatch"]["correlation"].get("maxAgeSeconds").is_some());
        assert!(json["dispatch"]["correlation"]["rateLimit"].get("windowSeconds").is_some());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let s: CacoSettings =
            serde_json::from_str(r#"{"dispatch": {"runaway": {"maxDepth": 9}}}"#).unwrap();
        assert_eq!(s.dispatch.runaway.max_depth, 9);
        assert_eq!(s.dispatch.runaway.max_calls_per_window, 20);
        assert_eq!(s.dispatch.correlation.max_depth, 2);
    }

    #[test]
    fn validate_raises_zero_limits() {
        let mut s = CacoSettings::default();
        s.dispatch.runaway.rate_window_seconds = 0;
        s.dispatch.correlation.max_depth = 0;
        s.validate();
        assert_eq!(s.dispatch.runaway.rate_window_seconds, 1);
        assert_eq!(s.dispatch.correlation.max_depth, 1);
    }

    #[test]
    fn validate_caps_huge_limits() {
        let mut s = CacoSettings::default();
        s.dispatch.runaway.rate_window_seconds = 10_000_000_000_000_000;
        s.dispatch.runaway.max_duration_seconds = u64::MAX;
        s.dispatch.correlation.max_age_seconds = u64::MAX;
        s.dispatch.correlation.rate_limit.max_calls = usize::MAX;
        s.validate();
        assert_eq!(s.dispatch.runaway.rate_window_seconds, MAX_WINDOW_SECONDS);
        assert_eq!(s.dispatch.runaway.max_duration_seconds, MAX_WINDOW_SECONDS);
        assert_eq!(s.dispatch.correlation.max_age_seconds, MAX_AGE_SECONDS);
        assert_eq!(s.dispatch.correlation.rate_limit.max_calls, MAX_CALLS);
    }

    #[test]
    fn validate_logs_structured_fields() {
        let (logs, _guard) = capture_logs();
        let mut s = CacoSettings::default();
        s.dispatch.runaway.max_depth = 0;
        s.validate();

        let event = logs.find("setting out of range").unwrap();
        assert_eq!(event.message, "setting out of range, correcting");
        assert_eq!(event.field("key"), Some("runaway.maxDepth"));
        assert_eq!(event.field("value"), Some("0"));
        assert_eq!(event.field("corrected"), Some("1"));
    }

    #[test]
    fn validate_keeps_sane_values() {
        let mut s = CacoSettings::default();
        s.validate();
        assert_eq!(s, CacoSettings::default());
    }
}
