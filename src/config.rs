use std::{collections::BTreeMap, fs, path::Path};

use _model::Stage;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{error::ConfigError, stores::normalize_name};

// metres
const GEO_VETO: f64 = 500.0;
const GEO_SATURATION: f64 = 200.0;
const CELL_SIZE: f64 = 100.0;

const THRESHOLD: f64 = 0.75;

const EXCLUDED_CHAINS: [&str; 3] = ["Whole Foods", "Stop & Shop", "Target"];

const BRAND_NAMES: [(&str, &str); 5] = [
    ("alice", "Alice Mushrooms"),
    ("yolele", "Yolele"),
    ("rooted_fare", "Rooted Fare"),
    ("rishi_tea", "Rishi Tea"),
    ("only_bean", "The Only Bean"),
];

/// Everything the matcher can be tuned with. Fixed for the whole run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Minimum combined score for two records to be the same store.
    pub threshold: f64,
    /// Records further apart than this never match, whatever their names say.
    pub geo_veto_m: f64,
    /// Distance at which geo proximity stops contributing to the score.
    pub geo_saturation_m: f64,
    pub cell_size_m: f64,
    pub weights: Weights,
    /// Best stage first. Unlisted stages rank below every listed one.
    pub precedence: Vec<Stage>,
    /// Stores whose normalized name contains one of these are skipped.
    pub excluded_chains: Vec<String>,
    /// File stem to brand display name.
    pub brand_names: BTreeMap<String, String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Weights {
    pub name: f64,
    pub address: f64,
    pub geo: f64,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            name: 0.4,
            address: 0.4,
            geo: 0.2,
        }
    }
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            threshold: THRESHOLD,
            geo_veto_m: GEO_VETO,
            geo_saturation_m: GEO_SATURATION,
            cell_size_m: CELL_SIZE,
            weights: Weights::default(),
            precedence: vec![
                Stage::PlacesApi,
                Stage::BrandLocator,
                Stage::Website,
                Stage::SearchTile,
            ],
            excluded_chains: EXCLUDED_CHAINS.iter().map(|x| x.to_string()).collect(),
            brand_names: BRAND_NAMES
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

impl MatchConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let config: Self = serde_yaml::from_str(
            &fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?,
        )
        .with_context(|| format!("failed to parse config {}", path.display()))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(ConfigError::ThresholdOutOfRange(self.threshold));
        }
        for (name, value) in [
            ("geo_veto_m", self.geo_veto_m),
            ("geo_saturation_m", self.geo_saturation_m),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::NegativeDistance { name, value });
            }
        }
        if !(self.cell_size_m.is_finite() && self.cell_size_m > 0.0) {
            return Err(ConfigError::ZeroCellSize(self.cell_size_m));
        }
        for (name, value) in [
            ("name", self.weights.name),
            ("address", self.weights.address),
            ("geo", self.weights.geo),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConfigError::InvalidWeight { name, value });
            }
        }
        if self.weights.name + self.weights.address + self.weights.geo <= 0.0 {
            return Err(ConfigError::ZeroWeights);
        }
        for (i, stage) in self.precedence.iter().enumerate() {
            if self.precedence[..i].contains(stage) {
                return Err(ConfigError::DuplicateStage(*stage));
            }
        }
        Ok(())
    }

    /// Position in the precedence order; lower wins.
    pub fn rank(&self, stage: Stage) -> usize {
        self.precedence
            .iter()
            .position(|x| *x == stage)
            .unwrap_or(self.precedence.len())
    }

    pub fn is_excluded(&self, normalized_name: &str) -> bool {
        self.excluded_chains.iter().any(|x| {
            let chain = normalize_name(x);
            !chain.is_empty() && normalized_name.contains(&chain)
        })
    }
}
