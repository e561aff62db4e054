use serde::{Deserialize, Serialize};

/// Which gate the coordinator applies to agent-to-agent calls.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelegationPolicy {
    /// Composite depth/duration/rate rules with chain collapsing.
    #[default]
    Runaway,
    /// Raw chain length plus a per-correlation rate limit.
    Simple,
}

impl DelegationPolicy {
    /// Parse the snake_case name used in JSON and env vars.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "runaway" => Some(Self::Runaway),
            "simple" => Some(Self::Simple),
            _ => None,
        }
    }
}

/// Dispatch safety configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DispatchSettings {
    /// Gate applied to nested calls.
    pub policy: DelegationPolicy,
    /// Limits for the composite rules engine.
    pub runaway: RunawaySettings,
    /// Limits for per-correlation metrics.
    pub correlation: CorrelationSettings,
}

/// Composite rules engine limits.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunawaySettings {
    /// Maximum effective (collapsed) chain depth.
    pub max_depth: usize,
    /// Maximum age of a delegation flow.
    pub max_duration_seconds: u64,
    /// Calls allowed within one rate window.
    pub max_calls_per_window: usize,
    /// Rate window length.
    pub rate_window_seconds: u64,
}

impl Default for RunawaySettings {
    fn default() -> Self {
        Self {
            max_depth: 5,
            max_duration_seconds: 600,
            max_calls_per_window: 20,
            rate_window_seconds: 60,
        }
    }
}

/// Per-correlation metrics limits.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CorrelationSettings {
    /// Maximum raw chain length.
    pub max_depth: usize,
    /// Age after which a correlation context is expired.
    pub max_age_seconds: u64,
    /// Sliding-window rate limit.
    pub rate_limit: RateLimitSettings,
}

impl Default for CorrelationSettings {
    fn default() -> Self {
        Self {
            max_depth: 2,
            max_age_seconds: 3600,
            rate_limit: RateLimitSettings::default(),
        }
    }
}

/// Sliding-window rate limit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RateLimitSettings {
    /// Calls allowed within one window.
    pub max_calls: usize,
    /// Window length.
    pub window_seconds: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            max_calls: 100,
            window_seconds: 60,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runaway_defaults() {
        let r = RunawaySettings::default();
        assert_eq!(r.max_depth, 5);
        assert_eq!(r.max_calls_per_window, 20);
        assert!(r.rate_window_seconds >= 20);
    }

    #[test]
    fn correlation_defaults() {
        let c = CorrelationSettings::default();
        assert_eq!(c.max_depth, 2);
        assert_eq!(c.max_age_seconds, 3600);
    }

    #[test]
    fn policy_serde_names() {
        assert_eq!(
            serde_json::to_value(DelegationPolicy::Simple).unwrap(),
            serde_json::json!("simple")
        );
        let p: DelegationPolicy = serde_json::from_str("\"runaway\"").unwrap();
        assert_eq!(p, DelegationPolicy::Runaway);
    }

    #[test]
    fn policy_parse_is_case_insensitive() {
        assert_eq!(DelegationPolicy::parse("SIMPLE"), Some(DelegationPolicy::Simple));
        assert_eq!(DelegationPolicy::parse("other"), None);
    }
}
