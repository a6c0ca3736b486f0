//! JSON-file backed sources
//!
//! Offline ingestion path: a document with a `prices` or `companies` array
//! whose rows use the same wire field names as the HTTP feeds. An unreadable
//! or malformed file is a fatal source error (nothing gets written), while
//! bad individual rows are left for the loader's per-row validation.

use crate::error::{AppError, Result};
use crate::sources::{CompanySource, PriceSource};
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};

fn read_array(path: &Path, key: &str) -> Result<Vec<Value>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        AppError::Source(format!("Cannot read source file {}: {}", path.display(), e))
    })?;

    let document: Value = serde_json::from_str(&content).map_err(|e| {
        AppError::Source(format!("Malformed JSON in {}: {}", path.display(), e))
    })?;

    match document.get(key) {
        Some(Value::Array(rows)) => Ok(rows.clone()),
        Some(_) => Err(AppError::Source(format!(
            "Expected '{}' to be an array in {}",
            key,
            path.display()
        ))),
        None => Err(AppError::Source(format!(
            "Missing '{}' array in {}",
            key,
            path.display()
        ))),
    }
}

/// Price feed read from a local JSON file (`{"prices": [...]}`).
pub struct JsonPriceFile {
    path: PathBuf,
}

impl JsonPriceFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl PriceSource for JsonPriceFile {
    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }

    async fn fetch_prices(&self) -> Result<Vec<Value>> {
        read_array(&self.path, "prices")
    }
}

/// Company feed read from a local JSON file (`{"companies": [...]}`).
pub struct JsonCompanyFile {
    path: PathBuf,
}

impl JsonCompanyFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CompanySource for JsonCompanyFile {
    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }

    async fn fetch_companies(&self) -> Result<Vec<Value>> {
        read_array(&self.path, "companies")
    }
}
