// src/storage/files.rs
//! JSON-file catalog and cost model.

use anyhow::{Context, Result as AnyResult};
use async_trait::async_trait;
use log::{info, warn};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::OnceCell;

use crate::error::{Result, ScanError};
use crate::pricing::types::CostBreakdown;
use crate::scan::job::ScanTarget;
use crate::scan::sources::{CatalogSource, CostLookupError, CostModelSource};

async fn load_json<T: DeserializeOwned>(path: &Path) -> AnyResult<T> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CatalogEntry {
    sku: String,
    asin: String,
    #[serde(default = "default_enabled")]
    enabled: bool,
}

/// Catalog file: `[{"sku": "...", "asin": "...", "enabled": true}]`.
/// Re-read on every call so edits are picked up by the next job.
pub struct JsonCatalogSource {
    path: PathBuf,
}

impl JsonCatalogSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CatalogSource for JsonCatalogSource {
    async fn list_enabled_targets(&self) -> Result<Vec<ScanTarget>> {
        let entries: Vec<CatalogEntry> = load_json(&self.path)
            .await
            .map_err(|e| ScanError::CatalogUnavailable(format!("{:#}", e)))?;

        let total = entries.len();
        let targets: Vec<ScanTarget> = entries
            .into_iter()
            .filter(|entry| entry.enabled)
            .filter(|entry| {
                let usable = !entry.sku.trim().is_empty() && !entry.asin.trim().is_empty();
                if !usable {
                    warn!("⚠️ Skipping catalog entry with blank SKU or ASIN: {:?}", entry);
                }
                usable
            })
            .map(|entry| ScanTarget::new(entry.sku, entry.asin))
            .collect();

        info!("📋 Catalog {}: {} of {} entries enabled", self.path.display(), targets.len(), total);
        Ok(targets)
    }
}

/// Cost model file: `{"<sku>": {"materialCost": .., "shippingCost": .., ...}}`.
/// Loaded once, on first lookup.
pub struct JsonCostModelSource {
    path: PathBuf,
    costs: OnceCell<HashMap<String, CostBreakdown>>,
}

impl JsonCostModelSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            costs: OnceCell::new(),
        }
    }
}

#[async_trait]
impl CostModelSource for JsonCostModelSource {
    async fn get_cost_breakdown(&self, sku: &str) -> std::result::Result<CostBreakdown, CostLookupError> {
        let costs = self
            .costs
            .get_or_try_init(|| async {
                let costs: HashMap<String, CostBreakdown> = load_json(&self.path).await?;
                info!("📦 Loaded cost model for {} SKUs from {}", costs.len(), self.path.display());
                Ok::<_, anyhow::Error>(costs)
            })
            .await
            .map_err(|e| CostLookupError::Unavailable(format!("{:#}", e)))?;

        costs
            .get(sku)
            .cloned()
            .ok_or_else(|| CostLookupError::NotFound(sku.to_string()))
    }
}
