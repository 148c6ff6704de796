use atlas_core::{read_table, rows_for_datatype, AtlasConfig, TableRecord};
use serde_json::Value;

use crate::cli::ShowArgs;
use crate::error::CliError;

pub fn run(args: &ShowArgs, config: &AtlasConfig) -> Result<Value, CliError> {
    if !config.table_path.exists() {
        return Err(CliError::Command(format!(
            "no result table at {}; run 'atlas collect' first",
            config.table_path.display()
        )));
    }

    let rows = read_table(&config.table_path)?;
    let records: Vec<TableRecord> = match args.datatype.as_deref() {
        Some(datatype) => rows_for_datatype(&rows, datatype)
            .map(TableRecord::from)
            .collect(),
        None => rows.iter().map(TableRecord::from).collect(),
    };

    Ok(serde_json::to_value(records)?)
}
