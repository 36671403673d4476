use std::collections::BTreeMap;
use std::io::Write;
use tracing::{debug, info};

use crate::checker::{LimitChecker, LimitResult, LimitUsage};
use crate::error::RunError;
use crate::types::{Alerts, LimitOverrides, ThresholdOverrides};

/// Drives one pass of a `LimitChecker` and turns its breaches into alert lines.
pub struct LimitEvaluator<C> {
    checker: C,
    limit_overrides: LimitOverrides,
    threshold_overrides: ThresholdOverrides,
}

impl<C: LimitChecker> LimitEvaluator<C> {
    pub fn new(checker: C, limit_overrides: LimitOverrides, threshold_overrides: ThresholdOverrides) -> Self {
        Self {
            checker,
            limit_overrides,
            threshold_overrides,
        }
    }

    pub fn checker(&self) -> &C {
        &self.checker
    }

    /// Run the usage check with overrides applied, returning warnings and
    /// criticals ordered by service name, then limit name.
    ///
    /// `verbose` only adds OK lines to `out`; the returned alerts are the same
    /// either way.
    pub async fn check_limits<W: Write + Send>(&mut self, verbose: bool, out: &mut W) -> Result<Alerts, RunError> {
        self.checker.set_limit_overrides(&self.limit_overrides);
        self.checker.set_threshold_overrides(&self.threshold_overrides);

        writeln!(
            out,
            "Checking AWS resource usage; WARNING threshold {}% of limit, CRITICAL threshold {}% of limit",
            self.checker.warning_threshold(),
            self.checker.critical_threshold()
        )?;

        self.checker.check_thresholds().await?;
        let limits = self.checker.get_limits()?;
        info!(services = limits.len(), "limit check complete");

        let mut alerts = Alerts::default();
        let sorted: BTreeMap<_, BTreeMap<_, _>> = limits
            .iter()
            .map(|(svc, lims)| (svc.as_str(), lims.iter().map(|(n, l)| (n.as_str(), l)).collect()))
            .collect();

        for (service, svc_limits) in &sorted {
            debug!(service = %service, limits = svc_limits.len(), "evaluating service");
            for (limit_name, limit) in svc_limits {
                let mut have_alarms = false;
                for warn in limit.warnings() {
                    alerts.warnings.push(format_alert(service, limit_name, warn, limit, "warning"));
                    have_alarms = true;
                }
                for crit in limit.criticals() {
                    alerts.criticals.push(format_alert(service, limit_name, crit, limit, "critical"));
                    have_alarms = true;
                }
                if !have_alarms && verbose {
                    writeln!(
                        out,
                        "{} '{}' OK: {} (limit={})",
                        service,
                        limit_name,
                        limit.current_usage_str(),
                        limit.limit_str()
                    )?;
                }
            }
        }
        if verbose {
            writeln!(out, "\n\n")?;
        }
        Ok(alerts)
    }
}

pub fn format_alert(
    service: &str,
    limit_name: &str,
    usage: &LimitUsage,
    limit: &LimitResult,
    level: &str,
) -> String {
    format!(
        "{} '{}' usage ({}) exceeds {} threshold (limit={})",
        service,
        limit_name,
        usage,
        level,
        limit.limit_str()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::MockLimitChecker;

    fn output(buf: Vec<u8>) -> String {
        String::from_utf8(buf).unwrap()
    }

    #[tokio::test]
    async fn test_single_warning_scenario() {
        let checker = MockLimitChecker::new().with_limit(
            "EC2",
            "Running Instances",
            LimitResult::new(Some(400.0)).with_warning(LimitUsage::new(450.0)),
        );
        let mut evaluator = LimitEvaluator::new(checker, LimitOverrides::new(), ThresholdOverrides::new());
        let mut out = Vec::new();

        let alerts = evaluator.check_limits(false, &mut out).await.unwrap();

        assert_eq!(
            alerts.warnings,
            vec!["EC2 'Running Instances' usage (450) exceeds warning threshold (limit=400)"]
        );
        assert!(alerts.criticals.is_empty());
        assert_eq!(
            output(out),
            "Checking AWS resource usage; WARNING threshold 80% of limit, CRITICAL threshold 99% of limit\n"
        );
    }

    #[tokio::test]
    async fn test_sorted_by_service_then_limit() {
        let checker = MockLimitChecker::new()
            .with_limit("B", "z", LimitResult::new(Some(1.0)).with_warning(LimitUsage::new(1.0)))
            .with_limit("A", "y", LimitResult::new(Some(1.0)).with_warning(LimitUsage::new(2.0)))
            .with_limit("A", "x", LimitResult::new(Some(1.0)).with_critical(LimitUsage::new(3.0)))
            .with_limit("B", "a", LimitResult::new(Some(1.0)).with_critical(LimitUsage::new(4.0)));
        let mut evaluator = LimitEvaluator::new(checker, LimitOverrides::new(), ThresholdOverrides::new());

        let alerts = evaluator.check_limits(false, &mut Vec::new()).await.unwrap();

        assert!(alerts.warnings[0].starts_with("A 'y'"));
        assert!(alerts.warnings[1].starts_with("B 'z'"));
        assert!(alerts.criticals[0].starts_with("A 'x'"));
        assert!(alerts.criticals[1].starts_with("B 'a'"));
        assert!(alerts.criticals[1].contains("exceeds critical threshold"));
    }

    #[tokio::test]
    async fn test_verbose_only_changes_output() {
        let build = || {
            MockLimitChecker::new()
                .with_limit("EC2", "Quiet", LimitResult::new(Some(20.0)).with_usage(LimitUsage::new(5.0)))
                .with_limit("EC2", "Loud", LimitResult::new(None).with_critical(LimitUsage::new(9.0)))
                .with_limit("S3", "Buckets", LimitResult::new(Some(100.0)))
        };

        let mut quiet = LimitEvaluator::new(build(), LimitOverrides::new(), ThresholdOverrides::new());
        let mut quiet_out = Vec::new();
        let quiet_alerts = quiet.check_limits(false, &mut quiet_out).await.unwrap();

        let mut loud = LimitEvaluator::new(build(), LimitOverrides::new(), ThresholdOverrides::new());
        let mut loud_out = Vec::new();
        let loud_alerts = loud.check_limits(true, &mut loud_out).await.unwrap();

        assert_eq!(quiet_alerts, loud_alerts);
        assert_eq!(loud_alerts.criticals, vec!["EC2 'Loud' usage (9) exceeds critical threshold (limit=unknown)"]);

        let quiet_out = output(quiet_out);
        let loud_out = output(loud_out);
        assert!(!quiet_out.contains("OK:"));
        assert!(loud_out.contains("EC2 'Quiet' OK: 5 (limit=20)\n"));
        assert!(loud_out.contains("S3 'Buckets' OK: <unknown> (limit=100)\n"));
        assert!(!loud_out.contains("'Loud' OK"));
        assert!(loud_out.ends_with("\n\n\n"));
    }

    #[tokio::test]
    async fn test_overrides_applied_before_check() {
        let mut limit_overrides = LimitOverrides::new();
        limit_overrides
            .entry("EC2".to_string())
            .or_default()
            .insert("Running On-Demand EC2 instances".to_string(), 400.0);
        let checker = MockLimitChecker::new().with_thresholds(70.0, 90.0);
        let mut evaluator = LimitEvaluator::new(checker, limit_overrides.clone(), ThresholdOverrides::new());
        let mut out = Vec::new();

        evaluator.check_limits(false, &mut out).await.unwrap();

        let checker = evaluator.checker();
        assert_eq!(
            checker.calls,
            vec!["set_limit_overrides", "set_threshold_overrides", "check_thresholds"]
        );
        assert_eq!(checker.limit_overrides, limit_overrides);
        assert!(output(out).contains("WARNING threshold 70% of limit, CRITICAL threshold 90% of limit"));
    }

    #[tokio::test]
    async fn test_check_failure_is_evaluation_error() {
        let checker = MockLimitChecker::new().failing("AccessDenied");
        let mut evaluator = LimitEvaluator::new(checker, LimitOverrides::new(), ThresholdOverrides::new());

        let err = evaluator.check_limits(true, &mut Vec::new()).await.unwrap_err();
        assert!(matches!(err, RunError::Evaluation(_)));
        assert!(err.to_string().contains("AccessDenied"));
    }
}
