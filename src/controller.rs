use std::io::Write;
use tracing::{error, info};

use crate::checker::LimitChecker;
use crate::error::{MailError, NotificationFailure, RunError};
use crate::evaluator::LimitEvaluator;
use crate::notifier::{Mailer, Notifier};
use crate::thresholds::Severity;
use crate::types::{EmailConfig, NotifyPolicy, RunSummary};

/// One check cycle: evaluate, print, notify, summarize.
pub struct RunController<C, M> {
    evaluator: LimitEvaluator<C>,
    notifier: Notifier<M>,
    email: EmailConfig,
    policy: NotifyPolicy,
}

impl<C: LimitChecker, M: Mailer> RunController<C, M> {
    pub fn new(evaluator: LimitEvaluator<C>, notifier: Notifier<M>, email: EmailConfig, policy: NotifyPolicy) -> Self {
        Self {
            evaluator,
            notifier,
            email,
            policy,
        }
    }

    pub fn evaluator(&self) -> &LimitEvaluator<C> {
        &self.evaluator
    }

    pub async fn run<W: Write + Send>(&mut self, verbose: bool, out: &mut W) -> Result<RunSummary, RunError> {
        let alerts = self.evaluator.check_limits(verbose, out).await?;

        if !alerts.warnings.is_empty() {
            writeln!(out, "\nWARNING:\n")?;
            for w in &alerts.warnings {
                writeln!(out, "{}", w)?;
            }
        }
        if !alerts.criticals.is_empty() {
            writeln!(out, "\nCRITICAL:\n")?;
            for c in &alerts.criticals {
                writeln!(out, "{}", c)?;
            }
        }

        let mut failures: Vec<NotificationFailure> = Vec::new();
        let sends = [
            (
                Severity::Warning,
                &alerts.warnings,
                &self.email.warning_subject,
                &self.email.warning_recipients,
            ),
            (
                Severity::Critical,
                &alerts.criticals,
                &self.email.critical_subject,
                &self.email.critical_recipients,
            ),
        ];
        for (severity, lines, subject, recipients) in sends {
            if lines.is_empty() {
                continue;
            }
            let body = lines.join("\n");
            info!(severity = %severity, alerts = lines.len(), "sending notification");
            if let Err(source) = self.notifier.send_mail(subject, &body, recipients.as_slice()).await {
                self.handle_failure(severity, source, &mut failures)?;
            }
        }

        let summary = RunSummary::from(&alerts);
        if summary.has_alerts() {
            writeln!(
                out,
                "\n{} limit(s) above CRITICAL threshold; {} limit(s) above WARNING threshold",
                summary.criticals, summary.warnings
            )?;
        } else {
            writeln!(out, "All limits are within thresholds.")?;
        }

        if !failures.is_empty() {
            return Err(RunError::Notifications(failures));
        }
        Ok(summary)
    }

    fn handle_failure(
        &self,
        severity: Severity,
        source: MailError,
        failures: &mut Vec<NotificationFailure>,
    ) -> Result<(), RunError> {
        match self.policy {
            NotifyPolicy::FailFast => Err(RunError::Notification { severity, source }),
            NotifyPolicy::Isolated => {
                error!(severity = %severity, error = %source, "notification failed, continuing");
                failures.push(NotificationFailure { severity, source });
                Ok(())
            }
        }
    }
}
