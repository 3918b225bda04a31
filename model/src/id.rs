use std::{fmt, str::FromStr};

use anyhow::{bail, Context, Result};
use serde_with::{DeserializeFromStr, SerializeDisplay};

/// A stable place identifier, written as `kind:value`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, DeserializeFromStr, SerializeDisplay)]
pub enum PlaceId {
    /// Places API place id.
    Google(String),
    /// Store locator id (Stockist, StoreRocket).
    Stockist(String),
    /// Generated for stores no source gave an id to.
    Local(String),
}

impl PlaceId {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Google(_) => "google",
            Self::Stockist(_) => "stockist",
            Self::Local(_) => "local",
        }
    }

    pub fn value(&self) -> &str {
        match self {
            Self::Google(x) | Self::Stockist(x) | Self::Local(x) => x,
        }
    }

    /// Ids issued by a source, as opposed to generated ones.
    pub fn is_external(&self) -> bool {
        !matches!(self, Self::Local(_))
    }

    pub fn link(&self) -> Option<String> {
        match self {
            Self::Google(x) => Some(format!(
                "https://www.google.com/maps/place/?q=place_id:{x}"
            )),
            _ => None,
        }
    }
}

impl FromStr for PlaceId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (kind, value) = s.split_once(':').context("place id without kind")?;
        if value.is_empty() {
            bail!("empty place id: {s}");
        }
        Ok(match kind {
            "google" => Self::Google(value.to_string()),
            "stockist" => Self::Stockist(value.to_string()),
            "local" => Self::Local(value.to_string()),
            _ => bail!("Unknown place id kind: {kind}"),
        })
    }
}

impl fmt::Display for PlaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.value())
    }
}

impl fmt::Debug for PlaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.link() {
            Some(link) => write!(f, "[{self}]({link})"),
            None => write!(f, "{self}"),
        }
    }
}
