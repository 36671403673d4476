// Public modules
pub mod types;
pub mod error;
pub mod config;
pub mod thresholds;
pub mod checker;
pub mod quotas;
pub mod notifier;
pub mod evaluator;
pub mod controller;
pub mod app;

// Re-export commonly used items
pub use types::*;
pub use error::{CheckError, MailError, NotificationFailure, RunError};
pub use config::{load_config, load_config_with_env, EnvironmentProvider, SystemEnvironment, MockEnvironment};
pub use thresholds::{classify_usage, Severity, ThresholdOverride, ThresholdSpec};
pub use checker::{LimitChecker, LimitResult, LimitUsage, LimitsByService, MockLimitChecker};
pub use quotas::{AwsQuotaSource, QuotaInfo, QuotaSource, ServiceQuotasChecker, UsageMetric};
pub use notifier::{Mailer, MockMailer, Notifier, OutboundEmail, Recipients, SesMailer};
pub use evaluator::{format_alert, LimitEvaluator};
pub use controller::RunController;
pub use app::{aws_controller, handle_event, init_tracing, run_once, AwsRunController};
