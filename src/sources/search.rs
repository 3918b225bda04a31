use std::collections::BTreeMap;

use _model::{Coord, PlaceId, RawPlace, SourceTag, Stage};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::utils::{parse_timestamp, slug};

/// Output of the paginated text search, either flat or split by area and query.
#[derive(Debug, Deserialize)]
pub struct SearchDocument {
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    total_results: Option<usize>,
    #[serde(default)]
    places: Vec<GooglePlace>,
    #[serde(default)]
    batches: Vec<Batch>,
}

#[derive(Debug, Deserialize)]
struct Batch {
    area: String,
    query: String,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    places: Vec<GooglePlace>,
}

/// A place as the places API returns it.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GooglePlace {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    display_name: Option<LocalizedText>,
    #[serde(default)]
    formatted_address: Option<String>,
    #[serde(default)]
    location: Option<LatLng>,
    #[serde(default)]
    regular_opening_hours: Option<OpeningHours>,
    #[serde(default)]
    source_tag: Option<String>,
    #[serde(flatten)]
    rest: BTreeMap<String, Value>,
}

#[derive(Clone, Debug, Deserialize)]
struct LocalizedText {
    #[serde(default)]
    text: String,
}

#[derive(Clone, Debug, Deserialize)]
struct LatLng {
    latitude: f64,
    longitude: f64,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpeningHours {
    #[serde(default)]
    weekday_descriptions: Vec<String>,
}

impl SearchDocument {
    /// Loose places are tagged with `fallback`, batches with their area and query.
    pub fn places(self, fallback: &str, now: DateTime<Utc>) -> Vec<RawPlace> {
        let fetched_at = self
            .timestamp
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or(now);
        if let Some(total) = self.total_results {
            if total != self.places.len() {
                warn!(total, found = self.places.len(), "search document total does not add up");
            }
        }

        let mut output = Vec::new();
        let tag = SourceTag::new(Stage::SearchTile, fallback);
        for x in self.places {
            output.push(x.simplify_tagged(&tag, fetched_at));
        }
        for batch in self.batches {
            let tag = SourceTag::new(
                Stage::SearchTile,
                format!("{}-{}", slug(&batch.area), slug(&batch.query)),
            );
            let fetched_at = batch
                .timestamp
                .as_deref()
                .and_then(parse_timestamp)
                .unwrap_or(fetched_at);
            for x in batch.places {
                output.push(x.simplify_tagged(&tag, fetched_at));
            }
        }
        output
    }
}

impl GooglePlace {
    /// A place's own `sourceTag` wins over the batch tag.
    fn simplify_tagged(mut self, tag: &SourceTag, fetched_at: DateTime<Utc>) -> RawPlace {
        let tag = match self.source_tag.take() {
            Some(x) if x.contains(':') => x.parse().unwrap_or_else(|_| tag.clone()),
            Some(x) if !x.trim().is_empty() => SourceTag::new(Stage::SearchTile, x.trim()),
            _ => tag.clone(),
        };
        self.simplify(tag, fetched_at)
    }

    pub fn simplify(self, source: SourceTag, fetched_at: DateTime<Utc>) -> RawPlace {
        let mut place = RawPlace::new(source, fetched_at);
        place.external_id = self
            .id
            .filter(|x| !x.trim().is_empty())
            .map(PlaceId::Google);
        place.name = self.display_name.map(|x| x.text).unwrap_or_default();
        place.address = self.formatted_address.unwrap_or_default();
        place.geo = self
            .location
            .and_then(|x| Coord::new(x.latitude, x.longitude));
        place.attributes.absorb(self.rest);
        if let Some(x) = self.regular_opening_hours {
            if !x.weekday_descriptions.is_empty() {
                place.attributes.hours = Some(x.weekday_descriptions);
            }
        }
        place
    }
}

#[cfg(test)]
mod tests {
    use _model::BusinessStatus;
    use chrono::TimeZone;

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn google_fields() {
        let place: GooglePlace = serde_json::from_str(
            r#"{
                "id": "ChIJ1",
                "displayName": {"text": "Pop Up Grocer", "languageCode": "en"},
                "formattedAddress": "1 E 28th St, New York, NY 10016, USA",
                "location": {"latitude": 40.7449, "longitude": -73.9887},
                "rating": 4.6,
                "userRatingCount": 812,
                "businessStatus": "OPERATIONAL",
                "websiteUri": "https://popupgrocer.com",
                "internationalPhoneNumber": "+1 646-555-0199",
                "regularOpeningHours": {"weekdayDescriptions": ["Monday: 8:00 AM – 9:00 PM"]},
                "types": ["grocery_store", "store"]
            }"#,
        )
        .unwrap();
        let place = place.simplify(SourceTag::new(Stage::PlacesApi, "alice"), now());

        assert_eq!(place.external_id, Some(PlaceId::Google("ChIJ1".into())));
        assert_eq!(place.name, "Pop Up Grocer");
        assert_eq!(place.geo, Coord::new(40.7449, -73.9887));
        let x = &place.attributes;
        assert_eq!(x.rating.map(|x| x.get()), Some(4.6));
        assert_eq!(x.review_count, Some(812));
        assert_eq!(x.business_status, Some(BusinessStatus::Operational));
        assert_eq!(x.website.as_deref(), Some("https://popupgrocer.com"));
        assert_eq!(x.phone.as_deref(), Some("+1 646-555-0199"));
        assert_eq!(x.hours.as_ref().map(|x| x.len()), Some(1));
        assert!(x.extra.contains_key("types"));
        assert!(!x.extra.contains_key("displayName"));
    }

    #[test]
    fn batches_are_tagged_by_area_and_query() {
        let document: SearchDocument = serde_json::from_str(
            r#"{
                "timestamp": "2025-10-03T14:22:05.123456",
                "total_results": 1,
                "places": [{"id": "a"}],
                "batches": [
                    {"area": "Flatiron / NoMad", "query": "specialty grocery", "places": [
                        {"id": "b"},
                        {"id": "c", "sourceTag": "tileB-query2"},
                        {"id": "d", "sourceTag": "website:alice"}
                    ]}
                ]
            }"#,
        )
        .unwrap();
        let places = document.places("nyc_grocery", now());

        let tags: Vec<String> = places.iter().map(|x| x.source.to_string()).collect();
        assert_eq!(
            tags,
            vec![
                "search-tile:nyc_grocery",
                "search-tile:flatiron-nomad-specialty-grocery",
                "search-tile:tileB-query2",
                "website:alice",
            ]
        );
        assert!(places.iter().all(|x| x.fetched_at != now()));
    }

    #[test]
    fn missing_fields_stay_empty() {
        let document: SearchDocument =
            serde_json::from_str(r#"{"places": [{"displayName": null, "id": ""}]}"#).unwrap();
        let places = document.places("x", now());
        assert_eq!(places.len(), 1);
        assert_eq!(places[0].external_id, None);
        assert_eq!(places[0].name, "");
        assert_eq!(places[0].fetched_at, now());
        assert!(places[0].attributes.is_empty());
    }
}
