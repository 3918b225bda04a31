use core::fmt;
use std::str::FromStr;

use anyhow::bail;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

mod attributes;
mod id;
mod place;

pub use attributes::{Attribute, AttributeKey, Attributes, BusinessStatus};
pub use id::PlaceId;
pub use place::{CanonicalPlace, Coord, Provenance, RawPlace, SourceTag};

/// The pipeline stage that produced an observation.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    /// Places API lookups (`google_places` enrichment).
    PlacesApi,
    /// Brand store locator scrapes.
    BrandLocator,
    /// Brand website crawling.
    Website,
    /// Generic area x query search tiles.
    SearchTile,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.slug())
    }
}

impl FromStr for Stage {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "places-api" => Self::PlacesApi,
            "brand-locator" => Self::BrandLocator,
            "website" => Self::Website,
            "search-tile" => Self::SearchTile,
            _ => bail!("Unknown stage: {s}"),
        })
    }
}

impl Stage {
    pub fn all() -> Vec<Self> {
        vec![
            Stage::PlacesApi,
            Stage::BrandLocator,
            Stage::Website,
            Stage::SearchTile,
        ]
    }

    pub fn slug(&self) -> &'static str {
        match self {
            Self::PlacesApi => "places-api",
            Self::BrandLocator => "brand-locator",
            Self::Website => "website",
            Self::SearchTile => "search-tile",
        }
    }
}
