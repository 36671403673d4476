use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;

use crate::error::CheckError;
use crate::thresholds::{classify_usage, Severity, ThresholdOverride};
use crate::types::{LimitOverrides, ThresholdOverrides};

/// service -> limit name -> result, in whatever order the checker produced.
pub type LimitsByService = HashMap<String, HashMap<String, LimitResult>>;

/// One observed usage of a limit, optionally tied to a resource.
#[derive(Debug, Clone, PartialEq)]
pub struct LimitUsage {
    pub value: f64,
    pub resource_id: Option<String>,
}

impl LimitUsage {
    pub fn new(value: f64) -> Self {
        Self { value, resource_id: None }
    }

    pub fn for_resource<S: Into<String>>(value: f64, resource_id: S) -> Self {
        Self {
            value,
            resource_id: Some(resource_id.into()),
        }
    }
}

impl fmt::Display for LimitUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.resource_id {
            Some(id) => write!(f, "{}={}", id, self.value),
            None => write!(f, "{}", self.value),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LimitResult {
    limit: Option<f64>,
    usage: Vec<LimitUsage>,
    warnings: Vec<LimitUsage>,
    criticals: Vec<LimitUsage>,
}

impl LimitResult {
    pub fn new(limit: Option<f64>) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }

    pub fn with_usage(mut self, usage: LimitUsage) -> Self {
        self.usage.push(usage);
        self
    }

    pub fn with_warning(mut self, usage: LimitUsage) -> Self {
        self.warnings.push(usage);
        self
    }

    pub fn with_critical(mut self, usage: LimitUsage) -> Self {
        self.criticals.push(usage);
        self
    }

    pub fn add_usage(&mut self, usage: LimitUsage) {
        self.usage.push(usage);
    }

    pub fn limit(&self) -> Option<f64> {
        self.limit
    }

    pub fn warnings(&self) -> &[LimitUsage] {
        &self.warnings
    }

    pub fn criticals(&self) -> &[LimitUsage] {
        &self.criticals
    }

    pub fn limit_str(&self) -> String {
        match self.limit {
            Some(l) => l.to_string(),
            None => "unknown".to_string(),
        }
    }

    /// Human-readable usage: the single value, or the maximum followed by
    /// every observation when there are several.
    pub fn current_usage_str(&self) -> String {
        match self.usage.as_slice() {
            [] => "<unknown>".to_string(),
            [only] => only.to_string(),
            many => {
                let max = many
                    .iter()
                    .map(|u| u.value)
                    .fold(f64::NEG_INFINITY, f64::max);
                let all: Vec<String> = many.iter().map(|u| u.to_string()).collect();
                format!("max: {} ({})", max, all.join(", "))
            }
        }
    }

    /// Recompute the warning and critical lists from the recorded usage.
    /// Returns true when nothing breached.
    pub fn evaluate(
        &mut self,
        warning_percent: f64,
        critical_percent: f64,
        over: Option<&ThresholdOverride>,
    ) -> bool {
        self.warnings.clear();
        self.criticals.clear();
        for u in &self.usage {
            match classify_usage(u.value, self.limit, warning_percent, critical_percent, over) {
                Severity::Critical => self.criticals.push(u.clone()),
                Severity::Warning => self.warnings.push(u.clone()),
                Severity::Ok => {}
            }
        }
        self.warnings.is_empty() && self.criticals.is_empty()
    }
}

/// The limit-checking collaborator driven by the evaluator.
///
/// Overrides must be applied before `check_thresholds`, which performs the
/// usage retrieval and threshold comparison.
#[async_trait]
pub trait LimitChecker: Send + Sync {
    fn set_limit_overrides(&mut self, overrides: &LimitOverrides);
    fn set_threshold_overrides(&mut self, overrides: &ThresholdOverrides);
    fn warning_threshold(&self) -> f64;
    fn critical_threshold(&self) -> f64;
    async fn check_thresholds(&mut self) -> Result<(), CheckError>;
    fn get_limits(&self) -> Result<LimitsByService, CheckError>;
}

/// Canned checker for tests; records the order of calls it receives
#[derive(Debug, Default)]
pub struct MockLimitChecker {
    limits: LimitsByService,
    warning_threshold: f64,
    critical_threshold: f64,
    fail_check: Option<String>,
    fail_get_limits: Option<String>,
    pub calls: Vec<&'static str>,
    pub limit_overrides: LimitOverrides,
    pub threshold_overrides: ThresholdOverrides,
}

impl MockLimitChecker {
    pub fn new() -> Self {
        Self {
            warning_threshold: 80.0,
            critical_threshold: 99.0,
            ..Self::default()
        }
    }

    pub fn with_limit<S, L>(mut self, service: S, limit_name: L, result: LimitResult) -> Self
    where
        S: Into<String>,
        L: Into<String>,
    {
        self.limits
            .entry(service.into())
            .or_default()
            .insert(limit_name.into(), result);
        self
    }

    pub fn with_thresholds(mut self, warning: f64, critical: f64) -> Self {
        self.warning_threshold = warning;
        self.critical_threshold = critical;
        self
    }

    pub fn failing<S: Into<String>>(mut self, message: S) -> Self {
        self.fail_check = Some(message.into());
        self
    }

    /// Succeed in `check_thresholds` but fail when results are read.
    pub fn failing_get_limits<S: Into<String>>(mut self, message: S) -> Self {
        self.fail_get_limits = Some(message.into());
        self
    }
}

#[async_trait]
impl LimitChecker for MockLimitChecker {
    fn set_limit_overrides(&mut self, overrides: &LimitOverrides) {
        self.calls.push("set_limit_overrides");
        self.limit_overrides = overrides.clone();
    }

    fn set_threshold_overrides(&mut self, overrides: &ThresholdOverrides) {
        self.calls.push("set_threshold_overrides");
        self.threshold_overrides = overrides.clone();
    }

    fn warning_threshold(&self) -> f64 {
        self.warning_threshold
    }

    fn critical_threshold(&self) -> f64 {
        self.critical_threshold
    }

    async fn check_thresholds(&mut self) -> Result<(), CheckError> {
        self.calls.push("check_thresholds");
        match &self.fail_check {
            Some(message) => Err(CheckError::Quotas {
                service: "mock".to_string(),
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }

    fn get_limits(&self) -> Result<LimitsByService, CheckError> {
        match &self.fail_get_limits {
            Some(message) => Err(CheckError::Quotas {
                service: "mock".to_string(),
                message: message.clone(),
            }),
            None => Ok(self.limits.clone()),
        }
    }
}
