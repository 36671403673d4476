use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Ok,
    Warning,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Ok => "ok",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// One side (warning or critical) of a threshold override.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ThresholdSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percent: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<f64>,
}

/// Per-limit override, e.g. `{"warning": {"percent": 85}}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ThresholdOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<ThresholdSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub critical: Option<ThresholdSpec>,
}

impl ThresholdOverride {
    pub fn warning_percent(&self) -> Option<f64> {
        self.warning.and_then(|w| w.percent)
    }

    pub fn critical_percent(&self) -> Option<f64> {
        self.critical.and_then(|c| c.percent)
    }

    pub fn warning_count(&self) -> Option<f64> {
        self.warning.and_then(|w| w.count)
    }

    pub fn critical_count(&self) -> Option<f64> {
        self.critical.and_then(|c| c.count)
    }
}

pub fn usage_percent(value: f64, limit: Option<f64>) -> Option<f64> {
    match limit {
        Some(l) if l > 0.0 => Some(value / l * 100.0),
        _ => None,
    }
}

/// Classify one usage value against a limit.
///
/// Count overrides are absolute and apply even when the limit is unknown.
/// Percentages only apply to a known, positive limit. Boundaries are
/// inclusive: usage exactly at a threshold breaches it.
pub fn classify_usage(
    value: f64,
    limit: Option<f64>,
    warning_percent: f64,
    critical_percent: f64,
    over: Option<&ThresholdOverride>,
) -> Severity {
    let over = over.copied().unwrap_or_default();
    let warn_pct = over.warning_percent().unwrap_or(warning_percent);
    let crit_pct = over.critical_percent().unwrap_or(critical_percent);
    let pct = usage_percent(value, limit);

    if over.critical_count().is_some_and(|c| value >= c) {
        return Severity::Critical;
    }
    if pct.is_some_and(|p| p >= crit_pct) {
        return Severity::Critical;
    }
    if over.warning_count().is_some_and(|c| value >= c) {
        return Severity::Warning;
    }
    if pct.is_some_and(|p| p >= warn_pct) {
        return Severity::Warning;
    }
    Severity::Ok
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_boundaries() {
        assert_eq!(classify_usage(79.0, Some(100.0), 80.0, 99.0, None), Severity::Ok);
        assert_eq!(classify_usage(80.0, Some(100.0), 80.0, 99.0, None), Severity::Warning);
        assert_eq!(classify_usage(98.9, Some(100.0), 80.0, 99.0, None), Severity::Warning);
        assert_eq!(classify_usage(99.0, Some(100.0), 80.0, 99.0, None), Severity::Critical);
        assert_eq!(classify_usage(450.0, Some(400.0), 80.0, 99.0, None), Severity::Critical);
    }

    #[test]
    fn test_unknown_or_zero_limit_is_ok_without_counts() {
        assert_eq!(classify_usage(1000.0, None, 80.0, 99.0, None), Severity::Ok);
        assert_eq!(classify_usage(5.0, Some(0.0), 80.0, 99.0, None), Severity::Ok);
    }

    #[test]
    fn test_percent_override_replaces_default() {
        let over = ThresholdOverride {
            warning: Some(ThresholdSpec { percent: Some(50.0), count: None }),
            critical: None,
        };
        assert_eq!(classify_usage(60.0, Some(100.0), 80.0, 99.0, Some(&over)), Severity::Warning);
        assert_eq!(classify_usage(60.0, Some(100.0), 80.0, 99.0, None), Severity::Ok);
        // critical side keeps the default
        assert_eq!(classify_usage(99.5, Some(100.0), 80.0, 99.0, Some(&over)), Severity::Critical);
    }

    #[test]
    fn test_count_overrides() {
        let over = ThresholdOverride {
            warning: Some(ThresholdSpec { percent: None, count: Some(10.0) }),
            critical: Some(ThresholdSpec { percent: None, count: Some(20.0) }),
        };
        assert_eq!(classify_usage(9.0, None, 80.0, 99.0, Some(&over)), Severity::Ok);
        assert_eq!(classify_usage(10.0, None, 80.0, 99.0, Some(&over)), Severity::Warning);
        assert_eq!(classify_usage(20.0, None, 80.0, 99.0, Some(&over)), Severity::Critical);
        assert_eq!(classify_usage(12.0, Some(1000.0), 80.0, 99.0, Some(&over)), Severity::Warning);
    }

    #[test]
    fn test_override_deserializes_from_nested_shape() {
        let over: ThresholdOverride =
            serde_json::from_str(r#"{"warning": {"percent": 85}}"#).unwrap();
        assert_eq!(over.warning_percent(), Some(85.0));
        assert_eq!(over.critical_percent(), None);
        assert_eq!(over.warning_count(), None);
    }

    #[test]
    fn test_severity_display() {
        assert_eq!(Severity::Warning.to_string(), "warning");
        assert_eq!(Severity::Critical.to_string(), "critical");
    }
}
