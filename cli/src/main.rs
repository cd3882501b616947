mod args;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;

use catalog::store::sqlite_store::SqliteStore;
use common::logger::{LogFormat, init_logger};
use delivery::config::DeliveryConfig;
use delivery::{DeliveryError, DeliveryService};

use args::{Cli, accepted_values};

const LOG_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let format = if cli.json_logs {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    };
    init_logger("deliver", format);

    let store = SqliteStore::new(&cli.database_url)
        .await
        .with_context(|| format!("opening {}", cli.database_url))?;
    let service = DeliveryService::from_store(DeliveryConfig::from_env(), Arc::new(store));

    let req = cli.to_request();

    if cli.preview {
        let preview = service.preview_strategy(&req).await.map_err(explain)?;
        println!("{}", serde_json::to_string_pretty(&preview)?);
        return Ok(());
    }

    let (result, log_write) = service
        .deliver_with_log_handle(&req, cli.seed)
        .await
        .map_err(explain)?;
    println!("{}", serde_json::to_string_pretty(&result)?);

    // The runtime drops unfinished tasks on exit; let the delivery log land first.
    match tokio::time::timeout(LOG_FLUSH_TIMEOUT, log_write).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(error = %e, "delivery log task failed"),
        Err(_) => tracing::warn!(
            timeout_ms = LOG_FLUSH_TIMEOUT.as_millis() as u64,
            "delivery log write still pending at exit"
        ),
    }

    Ok(())
}

fn explain(err: DeliveryError) -> anyhow::Error {
    if err.is_validation() {
        anyhow::Error::new(err).context(format!("accepted values:\n{}", accepted_values()))
    } else {
        anyhow::Error::new(err)
    }
}
