use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use serde_json::Value;
use tracing::info;

use aws_limit_alerter::{aws_controller, handle_event, init_tracing, load_config, RunSummary};

#[tokio::main]
async fn main() -> Result<(), Error> {
    init_tracing();
    run(service_fn(handler)).await
}

async fn handler(event: LambdaEvent<Value>) -> Result<RunSummary, Error> {
    info!(request_id = %event.context.request_id, "new lambda run");
    let cfg = load_config()?;
    let mut controller = aws_controller(&cfg).await;
    let mut stdout = std::io::stdout();
    let summary = handle_event(&mut controller, &event.payload, &mut stdout).await?;
    info!(warnings = summary.warnings, criticals = summary.criticals, "limit check finished");
    Ok(summary)
}
