use std::time::Duration;

use atlas_core::{run_if_stale, AtlasConfig, InProcessTrigger};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::cli::WatchArgs;
use crate::error::CliError;

/// Check-then-collect loop. A failed check or pass is logged and the loop
/// keeps going; only setup errors end it early.
pub async fn run(args: &WatchArgs, config: &AtlasConfig) -> Result<Value, CliError> {
    let (collector, detector) = config.build()?;
    let trigger = InProcessTrigger::new(collector, &config.table_path);
    let interval = Duration::from_secs(args.interval_secs.max(1));

    let mut iterations = 0_u64;
    let mut passes = 0_u64;
    loop {
        iterations += 1;
        match run_if_stale(&detector, &trigger).await {
            Ok(Some(_)) => match trigger.wait().await {
                Some(Ok(summary)) => {
                    passes += 1;
                    info!(rows = summary.rows, errors = summary.errors, "scheduled pass finished");
                }
                Some(Err(error)) => warn!(%error, "scheduled pass failed"),
                None => {}
            },
            Ok(None) => {}
            Err(error) => warn!(%error, "staleness check failed"),
        }

        if args.max_iterations.is_some_and(|max| iterations >= max) {
            break;
        }
        tokio::time::sleep(interval).await;
    }

    Ok(json!({ "iterations": iterations, "passes": passes }))
}
