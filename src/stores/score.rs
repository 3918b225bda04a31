use std::collections::BTreeSet;

use geo::HaversineDistance;

use crate::config::{MatchConfig, Weights};

use super::normalize::{AddressKey, NormalizedKey};

#[derive(Clone, Debug, PartialEq)]
pub struct Score {
    /// Weighted similarity in [0, 1].
    pub value: f64,
    /// Both sides carry the same external id.
    pub identity: bool,
    pub distance_m: Option<f64>,
    /// Too far apart to be one store.
    pub vetoed: bool,
    pub is_match: bool,
}

impl Score {
    pub(crate) fn identity(distance_m: Option<f64>) -> Self {
        Self {
            value: 1.0,
            identity: true,
            distance_m,
            vetoed: false,
            is_match: true,
        }
    }

    /// Orders candidate scores; identity beats any similarity.
    pub fn beats(&self, other: &Score) -> bool {
        (self.identity, self.value) > (other.identity, other.value)
    }
}

#[derive(Clone, Debug)]
pub struct Scorer {
    weights: Weights,
    threshold: f64,
    geo_veto_m: f64,
    geo_saturation_m: f64,
}

impl Scorer {
    pub fn new(config: &MatchConfig) -> Self {
        Self {
            weights: config.weights.clone(),
            threshold: config.threshold,
            geo_veto_m: config.geo_veto_m,
            geo_saturation_m: config.geo_saturation_m,
        }
    }

    pub fn score(&self, a: &NormalizedKey, b: &NormalizedKey) -> Score {
        let distance_m = match (a.geo, b.geo) {
            (Some(x), Some(y)) => Some(x.point().haversine_distance(&y.point())),
            _ => None,
        };

        if let (Some(x), Some(y)) = (&a.external_id, &b.external_id) {
            if x == y {
                return Score::identity(distance_m);
            }
        }

        // components missing on either side are left out of the weighting
        let mut total = 0.0;
        let mut weight = 0.0;
        let mut located = false;
        if !a.name.is_empty() && !b.name.is_empty() {
            total += self.weights.name * name_similarity(&a.name, &b.name);
            weight += self.weights.name;
        }
        if a.address != AddressKey::Empty && b.address != AddressKey::Empty {
            total += self.weights.address * address_similarity(a, b);
            weight += self.weights.address;
            located = true;
        }
        if let Some(d) = distance_m {
            total += self.weights.geo * (1.0 - d / self.geo_saturation_m).max(0.0);
            weight += self.weights.geo;
            located = true;
        }

        let value = if weight > 0.0 {
            (total / weight).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let vetoed = distance_m.is_some_and(|d| d > self.geo_veto_m);

        Score {
            value,
            identity: false,
            distance_m,
            vetoed,
            // a name alone never places two records in the same store
            is_match: located && !vetoed && value >= self.threshold,
        }
    }
}

pub fn name_similarity(a: &str, b: &str) -> f64 {
    let tokens = jaccard(a.split(' '), b.split(' '));
    let squashed = strsim::normalized_levenshtein(&a.replace(' ', ""), &b.replace(' ', ""));
    tokens.max(squashed)
}

pub fn address_similarity(a: &NormalizedKey, b: &NormalizedKey) -> f64 {
    match (&a.address, &b.address) {
        (
            AddressKey::Street {
                number: n1,
                street: s1,
                postcode: p1,
            },
            AddressKey::Street {
                number: n2,
                street: s2,
                postcode: p2,
            },
        ) => {
            if n1 != n2 {
                return 0.0;
            }
            let mut x = jaccard(s1.iter().map(|x| x.as_str()), s2.iter().map(|x| x.as_str()));
            if let (Some(p1), Some(p2)) = (p1, p2) {
                if p1 != p2 {
                    x *= 0.5;
                }
            }
            x
        }
        _ => dice(&a.address_tokens, &b.address_tokens),
    }
}

fn jaccard<'a>(a: impl Iterator<Item = &'a str>, b: impl Iterator<Item = &'a str>) -> f64 {
    let a: BTreeSet<_> = a.filter(|x| !x.is_empty()).collect();
    let b: BTreeSet<_> = b.filter(|x| !x.is_empty()).collect();
    let union = a.union(&b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(&b).count() as f64 / union as f64
}

fn dice(a: &[String], b: &[String]) -> f64 {
    let a: BTreeSet<_> = a.iter().collect();
    let b: BTreeSet<_> = b.iter().collect();
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    2.0 * a.intersection(&b).count() as f64 / (a.len() + b.len()) as f64
}
