//! Document-oriented (JSON) dataset format.
//!
//! One document per file: `{ "created_at", "last_updated_at",
//! "repositories": [...] }`. Serde does the heavy lifting; the record
//! shape lives in [`crate::models`].

use std::fs;
use std::path::Path;

use crate::models::Dataset;
use crate::store::{StoreError, StoreFormat};

pub struct JsonFormat;

impl StoreFormat for JsonFormat {
    fn read(&self, path: &Path) -> Result<Dataset, StoreError> {
        let content = fs::read_to_string(path).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        serde_json::from_str(&content).map_err(|e| StoreError::Parse {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })
    }

    fn write(&self, path: &Path, dataset: &Dataset) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(dataset).map_err(|e| StoreError::Parse {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;

        fs::write(path, content).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}
