use anyhow::Result;
use tracing::info;

use aws_limit_alerter::{init_tracing, load_config, run_once};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    println!("new CLI run");

    let cfg = load_config()?;
    info!("services = {:?}", cfg.services);

    let summary = run_once(&cfg, true).await?;
    if summary.has_alerts() {
        info!("{} critical and {} warning alert(s) reported", summary.criticals, summary.warnings);
    } else {
        info!("No limits above thresholds");
    }

    Ok(())
}
