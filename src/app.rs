use anyhow::Result;
use aws_config::BehaviorVersion;
use serde_json::Value;
use std::io::Write;
use tracing::{debug, info};

use crate::checker::LimitChecker;
use crate::controller::RunController;
use crate::error::RunError;
use crate::evaluator::LimitEvaluator;
use crate::notifier::{Mailer, Notifier, SesMailer};
use crate::quotas::{AwsQuotaSource, ServiceQuotasChecker};
use crate::types::{Config, RunSummary};

pub type AwsRunController = RunController<ServiceQuotasChecker<AwsQuotaSource>, SesMailer>;

/// Wire the Service Quotas checker and SES notifier from the default AWS
/// credential chain.
pub async fn aws_controller(cfg: &Config) -> AwsRunController {
    let sdk_config = aws_config::load_defaults(BehaviorVersion::latest()).await;
    info!(
        region = sdk_config.region().map(|r| r.as_ref()).unwrap_or("-"),
        services = ?cfg.services,
        "starting limit check"
    );

    let checker = ServiceQuotasChecker::new(
        AwsQuotaSource::from_sdk_config(&sdk_config, cfg.usage_lookback_minutes),
        cfg.services.clone(),
        cfg.warning_threshold,
        cfg.critical_threshold,
    );
    let evaluator = LimitEvaluator::new(
        checker,
        cfg.limit_overrides.clone(),
        cfg.threshold_overrides.clone(),
    );
    let notifier = Notifier::new(SesMailer::from_sdk_config(&sdk_config), cfg.email.sender.clone());
    RunController::new(evaluator, notifier, cfg.email.clone(), cfg.notify_policy)
}

/// Run one check cycle against AWS, printing the report to stdout.
pub async fn run_once(cfg: &Config, verbose: bool) -> Result<RunSummary> {
    let mut controller = aws_controller(cfg).await;
    let mut stdout = std::io::stdout();
    let summary = controller.run(verbose, &mut stdout).await?;
    info!(warnings = summary.warnings, criticals = summary.criticals, "limit check finished");
    Ok(summary)
}

/// Event-triggered cycle. The payload is logged and otherwise ignored; the
/// run is always verbose, same as the CLI.
pub async fn handle_event<C, M, W>(
    controller: &mut RunController<C, M>,
    event: &Value,
    out: &mut W,
) -> Result<RunSummary, RunError>
where
    C: LimitChecker,
    M: Mailer,
    W: Write + Send,
{
    debug!(event = %event, "ignoring event payload");
    controller.run(true, out).await
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
