//! Seed loading for externally-owned reference entities.
//!
//! Investors and assets belong to external systems; the engine only reads
//! them. For a standalone deployment they are loaded from a JSON file at
//! startup.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use oc_core::types::market::Asset;
use oc_core::types::Investor;
use oc_store::MemStore;

/// Shape of the seed file.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedFile {
    #[serde(default)]
    pub investors: Vec<Investor>,
    #[serde(default)]
    pub assets: Vec<Asset>,
}

/// Load investors and assets from `path` into the store in one transaction.
pub fn load(path: &Path, store: &MemStore) -> Result<()> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read seed file {}", path.display()))?;
    let seed: SeedFile = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse seed file {}", path.display()))?;

    let mut tx = store.begin().context("failed to open seed transaction")?;
    for investor in &seed.investors {
        tx.put_investor(investor.clone());
    }
    for asset in &seed.assets {
        tx.put_asset(asset.clone());
    }
    tx.commit().context("failed to commit seed data")?;

    tracing::info!(
        investors = seed.investors.len(),
        assets = seed.assets.len(),
        "seed data loaded"
    );
    Ok(())
}
