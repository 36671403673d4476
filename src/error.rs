use thiserror::Error;

use crate::thresholds::Severity;

/// Failure inside the limit-checking collaborator.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("service quotas request failed for {service}: {message}")]
    Quotas { service: String, message: String },
    #[error("usage query failed for metric {metric}: {message}")]
    Usage { metric: String, message: String },
}

#[derive(Debug, Error)]
pub enum MailError {
    #[error("failed to build email: {0}")]
    Build(String),
    #[error("email send failed: {0}")]
    Send(String),
    #[error("email has no recipients")]
    NoRecipients,
}

#[derive(Debug, Error)]
#[error("{severity} notification failed: {source}")]
pub struct NotificationFailure {
    pub severity: Severity,
    #[source]
    pub source: MailError,
}

/// Outcome of a failed run, split by the stage that failed.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("limit evaluation failed: {0}")]
    Evaluation(#[from] CheckError),
    #[error("{severity} notification failed: {source}")]
    Notification {
        severity: Severity,
        #[source]
        source: MailError,
    },
    #[error("{} notification(s) failed", .0.len())]
    Notifications(Vec<NotificationFailure>),
    #[error("failed to write report output: {0}")]
    Output(#[from] std::io::Error),
}
