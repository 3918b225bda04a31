use std::{collections::BTreeSet, fmt, str::FromStr};

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use geo::Point;
use serde::{Deserialize, Serialize};
use serde_with::{DeserializeFromStr, SerializeDisplay};

use crate::{Attributes, PlaceId, Stage};

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "LatLng")]
pub struct Coord {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Deserialize)]
struct LatLng {
    latitude: f64,
    longitude: f64,
}

impl TryFrom<LatLng> for Coord {
    type Error = anyhow::Error;

    fn try_from(x: LatLng) -> Result<Self, Self::Error> {
        Coord::new(x.latitude, x.longitude)
            .with_context(|| format!("coordinate off the globe: {}, {}", x.latitude, x.longitude))
    }
}

impl Coord {
    /// Rejects coordinates that cannot be on the globe.
    pub fn new(latitude: f64, longitude: f64) -> Option<Self> {
        let valid = latitude.is_finite()
            && longitude.is_finite()
            && (-90.0..=90.0).contains(&latitude)
            && (-180.0..=180.0).contains(&longitude);
        valid.then_some(Self {
            latitude,
            longitude,
        })
    }

    pub fn point(&self) -> Point {
        Point::new(self.longitude, self.latitude)
    }
}

/// Which stage and pass produced an observation, written `stage:label`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, DeserializeFromStr, SerializeDisplay)]
pub struct SourceTag {
    pub stage: Stage,
    pub label: String,
}

impl SourceTag {
    pub fn new(stage: Stage, label: impl Into<String>) -> Self {
        Self {
            stage,
            label: label.into(),
        }
    }
}

impl FromStr for SourceTag {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (stage, label) = s.split_once(':').context("source tag without stage")?;
        if label.is_empty() {
            bail!("empty source tag label: {s}");
        }
        Ok(Self::new(stage.parse()?, label))
    }
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.stage, self.label)
    }
}

impl fmt::Debug for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

/// One observation of a place by one source.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawPlace {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<PlaceId>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geo: Option<Coord>,
    pub source: SourceTag,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(default)]
    pub attributes: Attributes,
    pub fetched_at: DateTime<Utc>,
}

impl RawPlace {
    pub fn new(source: SourceTag, fetched_at: DateTime<Utc>) -> Self {
        Self {
            external_id: None,
            name: String::new(),
            address: String::new(),
            geo: None,
            source,
            brand: None,
            attributes: Attributes::default(),
            fetched_at,
        }
    }
}

/// Sources and brands that contributed to a canonical place. Only ever grows.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    /// In arrival order, without repeats.
    pub sources: Vec<SourceTag>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub brands: BTreeSet<String>,
}

impl Provenance {
    pub fn add_source(&mut self, tag: SourceTag) -> bool {
        if self.sources.contains(&tag) {
            return false;
        }
        self.sources.push(tag);
        true
    }

    pub fn add_brand(&mut self, brand: &str) -> bool {
        self.brands.insert(brand.to_string())
    }

    pub fn extend(&mut self, other: Provenance) {
        for tag in other.sources {
            self.add_source(tag);
        }
        self.brands.extend(other.brands);
    }

    pub fn labels(&self) -> BTreeSet<&str> {
        self.sources.iter().map(|x| x.label.as_str()).collect()
    }
}

/// The merged record for one physical store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CanonicalPlace {
    pub id: PlaceId,
    /// Further external ids merged into this place.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub aliases: BTreeSet<PlaceId>,
    pub name: String,
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geo: Option<Coord>,
    #[serde(default)]
    pub attributes: Attributes,
    pub provenance: Provenance,
    #[serde(default)]
    pub brand_count: usize,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl CanonicalPlace {
    /// Every id this place is known under.
    pub fn ids(&self) -> impl Iterator<Item = &PlaceId> {
        std::iter::once(&self.id).chain(self.aliases.iter())
    }

    /// Best stage among the contributing sources.
    pub fn best_stage(&self, precedence: &[Stage]) -> Option<Stage> {
        self.provenance
            .sources
            .iter()
            .map(|x| x.stage)
            .min_by_key(|x| precedence.iter().position(|p| p == x).unwrap_or(usize::MAX))
    }
}
