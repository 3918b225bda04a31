use std::{
    collections::BTreeMap,
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
};

use _model::CanonicalPlace;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    sources::is_zstd,
    stores::{report, BrandStats, Resolved, RunStats},
};

/// The output document of a merge run.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub merged_at: DateTime<Utc>,
    #[serde(default)]
    pub source_files: Vec<String>,
    pub total_stores: usize,
    #[serde(default)]
    pub stats: RunStats,
    #[serde(default)]
    pub brand_stats: BTreeMap<String, BrandStats>,
    pub places: Vec<CanonicalPlace>,
}

impl Dataset {
    /// Returns the dataset and the report's todo list.
    pub fn new(resolved: Resolved, source_files: Vec<String>, merged_at: DateTime<Utc>) -> (Self, String) {
        let dataset = Self {
            merged_at,
            source_files,
            total_stores: resolved.places.len(),
            stats: resolved.stats,
            brand_stats: resolved.brand_stats,
            places: resolved.places,
        };
        (dataset, resolved.todo)
    }
}

/// `<output>.md`, ignoring a `.zst` suffix.
pub fn report_path(path: &Path) -> PathBuf {
    let path = if is_zstd(path) {
        path.with_extension("")
    } else {
        path.to_path_buf()
    };
    path.with_extension("md")
}

/// Writes the dataset as pretty JSON and the run report next to it.
pub fn write(path: &Path, dataset: &Dataset, todo: &str) -> Result<()> {
    let mut contents = serde_json::to_string_pretty(dataset)?;
    contents.push('\n');

    if is_zstd(path) {
        let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
        let mut writer = zstd::Encoder::new(file, 0)?;
        writer.write_all(contents.as_bytes())?;
        writer.finish()?;
    } else {
        fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))?;
    }

    let report = report_path(path);
    fs::write(&report, report::render(dataset, todo)?)
        .with_context(|| format!("failed to write {}", report.display()))?;
    Ok(())
}
