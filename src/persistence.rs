//! Model files
//!
//! A [`PartitionedModel`] travels between the partitioner and the
//! simulator as a pretty-printed JSON file. Models are read once before a
//! run and written by tooling; nothing touches the file mid-run.

use std::path::Path;

use eyre::{Result, WrapErr};

use crate::model::PartitionedModel;

pub fn load_model(path: &Path) -> Result<PartitionedModel> {
    let contents = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("failed to read model file {}", path.display()))?;
    serde_json::from_str(&contents)
        .wrap_err_with(|| format!("invalid model file {}", path.display()))
}

pub fn save_model(path: &Path, model: &PartitionedModel) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .wrap_err_with(|| format!("failed to create {}", parent.display()))?;
    }
    let contents = serde_json::to_string_pretty(model).wrap_err("failed to serialize model")?;
    std::fs::write(path, contents)
        .wrap_err_with(|| format!("failed to write model file {}", path.display()))
}
