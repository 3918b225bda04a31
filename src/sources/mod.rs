//! Input documents and the observations they turn into.

use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use _model::{CanonicalPlace, RawPlace};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::{config::MatchConfig, error::SourceUnavailable, export::Dataset};

mod brands;
mod search;

pub use brands::{brand_name, BrandDocument};
pub use search::{GooglePlace, SearchDocument};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SourceKind {
    Search,
    Brand,
    /// Output of an earlier run.
    Previous,
}

#[derive(Clone, Debug)]
pub struct Source {
    pub kind: SourceKind,
    pub path: PathBuf,
}

#[derive(Debug)]
pub enum Loaded {
    Places(Vec<RawPlace>),
    Previous(Vec<CanonicalPlace>),
}

impl Loaded {
    pub fn len(&self) -> usize {
        match self {
            Self::Places(x) => x.len(),
            Self::Previous(x) => x.len(),
        }
    }
}

impl Source {
    pub fn new(kind: SourceKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }

    /// `now` stands in for documents that carry no timestamp.
    pub fn load(&self, config: &MatchConfig, now: DateTime<Utc>) -> Result<Loaded, SourceUnavailable> {
        let loaded = match self.kind {
            SourceKind::Search => read_json::<SearchDocument>(&self.path)
                .map(|x| Loaded::Places(x.places(&stem(&self.path), now))),
            SourceKind::Brand => {
                let brand = brand_name(&self.path, &config.brand_names);
                read_json::<BrandDocument>(&self.path).map(|x| {
                    debug!(brand = %brand, url = ?x.source_url(), "brand locator");
                    Loaded::Places(x.places(&brand, now))
                })
            }
            SourceKind::Previous => {
                read_json::<Dataset>(&self.path).map(|x| Loaded::Previous(x.places))
            }
        };
        match loaded {
            Ok(x) => {
                debug!(path = %self.path.display(), records = x.len(), "loaded source");
                Ok(x)
            }
            Err(reason) => Err(SourceUnavailable {
                path: self.path.clone(),
                reason,
            }),
        }
    }
}

/// Parses every source in parallel, keeping their order.
pub fn load_all(
    sources: &[Source],
    config: &MatchConfig,
    now: DateTime<Utc>,
) -> Vec<Result<Loaded, SourceUnavailable>> {
    sources.par_iter().map(|x| x.load(config, now)).collect()
}

/// Reads a JSON document, decompressing `.zst` files on the way.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let parsed = if is_zstd(path) {
        serde_json::from_reader(BufReader::new(zstd::Decoder::new(file)?))
    } else {
        serde_json::from_reader(BufReader::new(file))
    };
    parsed.with_context(|| format!("failed to parse {}", path.display()))
}

pub fn is_zstd(path: &Path) -> bool {
    path.extension().is_some_and(|x| x == "zst")
}

/// File name without `.zst` and `.json`.
pub fn stem(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|x| x.to_string_lossy().to_string())
        .unwrap_or_default();
    let name = name.strip_suffix(".zst").unwrap_or(&name);
    name.strip_suffix(".json").unwrap_or(name).to_string()
}
