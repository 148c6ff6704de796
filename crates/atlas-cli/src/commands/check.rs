use atlas_core::AtlasConfig;
use serde_json::{json, Value};

use crate::error::CliError;

pub async fn run(config: &AtlasConfig) -> Result<Value, CliError> {
    let (_, detector) = config.build()?;
    let new_data = detector.is_new_data_available().await?;
    Ok(json!({ "new_data": new_data }))
}
