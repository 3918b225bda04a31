use std::{collections::BTreeMap, path::Path};

use _model::{Coord, PlaceId, RawPlace, SourceTag, Stage};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::utils::{parse_timestamp, slug, title_case};

use super::{search::GooglePlace, stem};

const SUFFIXES: [&str; 3] = ["_enriched", "_raw", "_google"];

/// A store locator scrape, possibly enriched by the places API and a website crawl.
#[derive(Debug, Deserialize)]
pub struct BrandDocument {
    #[serde(default)]
    source_url: Option<String>,
    #[serde(default)]
    scraped_at: Option<String>,
    #[serde(default)]
    stores: Vec<BrandStore>,
}

// locators disagree on types, so anything scalar is read loosely
#[derive(Debug, Deserialize)]
struct BrandStore {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    name: Option<Value>,
    #[serde(default)]
    address_line_1: Option<Value>,
    #[serde(default)]
    address: Option<Value>,
    #[serde(default)]
    city: Option<Value>,
    #[serde(default)]
    state: Option<Value>,
    #[serde(default)]
    postal_code: Option<Value>,
    #[serde(default)]
    latitude: Option<Value>,
    #[serde(default)]
    longitude: Option<Value>,
    #[serde(default)]
    phone: Option<Value>,
    #[serde(default)]
    website: Option<Value>,
    #[serde(default)]
    google_places: Option<GooglePlace>,
    #[serde(default)]
    enrichment: Option<BTreeMap<String, Value>>,
}

/// Display name of the brand a locator file belongs to.
pub fn brand_name(path: &Path, names: &BTreeMap<String, String>) -> String {
    let mut base = stem(path);
    for suffix in SUFFIXES {
        if let Some(x) = base.strip_suffix(suffix) {
            base = x.to_string();
            break;
        }
    }
    match names.get(&base) {
        Some(x) => x.clone(),
        None => title_case(&base.replace('_', " ")),
    }
}

impl BrandDocument {
    pub fn source_url(&self) -> Option<&str> {
        self.source_url.as_deref()
    }

    /// Up to three observations per store: the locator entry, its places API
    /// match and its website crawl.
    pub fn places(self, brand: &str, now: DateTime<Utc>) -> Vec<RawPlace> {
        let fetched_at = self
            .scraped_at
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or(now);
        let label = slug(brand);

        let mut output = Vec::new();
        for store in self.stores {
            let google = store
                .google_places
                .as_ref()
                .and_then(|x| x.id.clone())
                .filter(|x| !x.trim().is_empty())
                .map(PlaceId::Google);
            let id = google.or_else(|| text(&store.id).map(PlaceId::Stockist));
            let name = text(&store.name).unwrap_or_default();
            let address = store.full_address();

            let mut locator = RawPlace::new(SourceTag::new(Stage::BrandLocator, &label), fetched_at);
            locator.external_id = id.clone();
            locator.name = name.clone();
            locator.address = address.clone();
            locator.geo = number(&store.latitude)
                .zip(number(&store.longitude))
                .and_then(|(lat, lon)| Coord::new(lat, lon));
            locator.brand = Some(brand.to_string());
            locator.attributes.phone = text(&store.phone);
            locator.attributes.website = text(&store.website);
            output.push(locator);

            if let Some(x) = store.google_places {
                let mut place = x.simplify(SourceTag::new(Stage::PlacesApi, &label), fetched_at);
                place.brand = Some(brand.to_string());
                output.push(place);
            }

            let enrichment: BTreeMap<String, Value> = store
                .enrichment
                .unwrap_or_default()
                .into_iter()
                .filter(|(_, v)| !is_blank(v))
                .collect();
            if !enrichment.is_empty() {
                let mut place = RawPlace::new(SourceTag::new(Stage::Website, &label), fetched_at);
                place.external_id = id;
                place.name = name;
                place.address = address;
                place.brand = Some(brand.to_string());
                place.attributes.absorb(enrichment);
                output.push(place);
            }
        }
        output
    }
}

impl BrandStore {
    /// `street, city, state postcode`, skipping what is missing.
    fn full_address(&self) -> String {
        let street = text(&self.address_line_1).or_else(|| text(&self.address));
        let region = [text(&self.state), text(&self.postal_code)]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");
        [street, text(&self.city), Some(region)]
            .into_iter()
            .flatten()
            .filter(|x| !x.is_empty())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn text(value: &Option<Value>) -> Option<String> {
    match value.as_ref()? {
        Value::String(x) => Some(x.trim().to_string()).filter(|x| !x.is_empty()),
        Value::Number(x) => Some(x.to_string()),
        _ => None,
    }
}

fn number(value: &Option<Value>) -> Option<f64> {
    match value.as_ref()? {
        Value::Number(x) => x.as_f64(),
        Value::String(x) => x.trim().parse().ok(),
        _ => None,
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(x) => x.trim().is_empty(),
        Value::Array(x) => x.is_empty(),
        Value::Object(x) => x.is_empty(),
        _ => false,
    }
}
