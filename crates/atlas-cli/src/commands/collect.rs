use atlas_core::{
    read_table, run_pass, sort_rows, write_table, AtlasConfig, CacheMode, InstrumentRow,
    NoopObserver,
};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::cli::CollectArgs;
use crate::error::CliError;

pub async fn run(args: &CollectArgs, mut config: AtlasConfig) -> Result<Value, CliError> {
    if args.refresh_cache {
        config.cache_mode = CacheMode::Refresh;
    }
    let (collector, _) = config.build()?;

    let Some(datatype) = args.datatype.as_deref() else {
        let pass = collector.begin()?;
        let summary = run_pass(&collector, pass, &config.table_path, &NoopObserver).await?;
        return Ok(serde_json::to_value(summary)?);
    };

    let collected = collector.collect_one(datatype).await?;
    let rows = merge_datatype(existing_rows(&config), datatype, collected);
    write_table(&config.table_path, &rows)?;
    info!(datatype, rows = rows.len(), "updated result table");

    Ok(json!({
        "rows": rows.len(),
        "errors": collector.status().errors,
        "table_path": config.table_path,
    }))
}

fn existing_rows(config: &AtlasConfig) -> Vec<InstrumentRow> {
    if !config.table_path.exists() {
        return Vec::new();
    }
    read_table(&config.table_path).unwrap_or_else(|error| {
        warn!(%error, "existing table unreadable, rewriting from scratch");
        Vec::new()
    })
}

/// Replaces every row of `datatype` in `existing` with `collected`.
fn merge_datatype(
    existing: Vec<InstrumentRow>,
    datatype: &str,
    collected: Vec<InstrumentRow>,
) -> Vec<InstrumentRow> {
    let mut rows: Vec<InstrumentRow> = existing
        .into_iter()
        .filter(|row| row.datatype != datatype)
        .chain(collected)
        .collect();
    sort_rows(&mut rows);
    rows
}
