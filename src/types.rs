use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::thresholds::ThresholdOverride;

/// service -> limit name -> replacement limit value
pub type LimitOverrides = HashMap<String, HashMap<String, f64>>;

/// service -> limit name -> replacement thresholds
pub type ThresholdOverrides = HashMap<String, HashMap<String, ThresholdOverride>>;

#[derive(Debug, Clone)]
pub struct Config {
    pub services: Vec<String>,
    pub warning_threshold: f64,
    pub critical_threshold: f64,
    pub limit_overrides: LimitOverrides,
    pub threshold_overrides: ThresholdOverrides,
    pub email: EmailConfig,
    pub notify_policy: NotifyPolicy,
    pub usage_lookback_minutes: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmailConfig {
    pub sender: String,
    pub warning_subject: String,
    pub critical_subject: String,
    pub warning_recipients: Vec<String>,
    pub critical_recipients: Vec<String>,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            sender: "awslimitchecker <noreply@example.com>".to_string(),
            warning_subject: "awslimitchecker - warning".to_string(),
            critical_subject: "awslimitchecker - critical".to_string(),
            warning_recipients: vec!["warning@example.com".to_string()],
            critical_recipients: vec!["critical@example.com".to_string()],
        }
    }
}

/// How the controller reacts when a notification send fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NotifyPolicy {
    /// Abort on the first failed send; later sends and the summary are skipped.
    #[default]
    FailFast,
    /// Attempt every send, always print the summary, then report all failures.
    Isolated,
}

/// On-disk shape of `OVERRIDES_FILE`.
#[derive(Debug, Default, Deserialize)]
pub struct OverridesFile {
    #[serde(default)]
    pub limit_overrides: LimitOverrides,
    #[serde(default)]
    pub threshold_overrides: ThresholdOverrides,
}

/// Alert lines produced by one evaluation pass, in report order.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Alerts {
    pub warnings: Vec<String>,
    pub criticals: Vec<String>,
}

impl Alerts {
    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty() && self.criticals.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub warnings: usize,
    pub criticals: usize,
}

impl RunSummary {
    pub fn has_alerts(&self) -> bool {
        self.warnings > 0 || self.criticals > 0
    }
}

impl From<&Alerts> for RunSummary {
    fn from(alerts: &Alerts) -> Self {
        Self {
            warnings: alerts.warnings.len(),
            criticals: alerts.criticals.len(),
        }
    }
}
