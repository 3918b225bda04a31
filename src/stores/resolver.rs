//! Folds a stream of observations into one canonical record per store.
//!
//! Every record goes through candidate lookup (`MatchIndex`), is scored
//! against each candidate cluster's current canonical record and either joins
//! the best matching cluster or starts a new one. Records are applied one at a
//! time by a single owner, so every decision sees all earlier insertions.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::Write,
};

use _model::{
    AttributeKey, Attributes, CanonicalPlace, Coord, PlaceId, Provenance, RawPlace, SourceTag,
    Stage,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    config::MatchConfig,
    error::{ConfigError, MalformedRecord},
    utils::slug,
};

use super::{
    index::{ClusterId, MatchIndex},
    normalize::{NormalizedKey, Normalizer},
    score::{Score, Scorer},
};

#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    Inserted(ClusterId),
    Merged { cluster: ClusterId, score: f64 },
    Rejected(MalformedRecord),
    /// Name matched an excluded chain.
    Excluded,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub records_seen: usize,
    pub records_merged: usize,
    pub records_rejected: usize,
    pub records_excluded: usize,
    pub clusters_formed: usize,
    /// Matches that only the distance ceiling kept apart.
    pub geo_vetoes: usize,
}

/// Counted over brand locator listings only, one per listed store.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrandStats {
    pub total_stores: usize,
    pub new_stores: usize,
    pub existing_stores: usize,
}

/// The finished run.
#[derive(Debug)]
pub struct Resolved {
    pub places: Vec<CanonicalPlace>,
    pub stats: RunStats,
    pub brand_stats: BTreeMap<String, BrandStats>,
    /// Markdown list items for the run report.
    pub todo: String,
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Field {
    Name,
    Address,
    Geo,
    Attribute(AttributeKey),
}

/// What the resolver needs from an observation, raw or re-fed.
struct Incoming {
    ids: Vec<PlaceId>,
    name: String,
    address: String,
    geo: Option<Coord>,
    attributes: Attributes,
    provenance: Provenance,
    rank: usize,
    first_seen: DateTime<Utc>,
    last_seen: DateTime<Utc>,
    label: String,
    /// Comes from an earlier run's output.
    previous: bool,
}

struct Cluster {
    id: ClusterId,
    place: CanonicalPlace,
    /// Precedence rank of the source each field's value came from.
    ranks: BTreeMap<Field, usize>,
    /// The canonical id was made up by this run.
    generated: bool,
    /// Holds a place from an earlier run's output.
    previous: bool,
    exemplar: NormalizedKey,
}

impl Cluster {
    fn holds(&self, id: &PlaceId) -> bool {
        self.place.id == *id || self.place.aliases.contains(id)
    }

    fn add_id(&mut self, id: PlaceId) {
        if self.holds(&id) {
            return;
        }
        if !self.place.id.is_external() && id.is_external() {
            let previous = std::mem::replace(&mut self.place.id, id);
            if !self.generated {
                self.place.aliases.insert(previous);
            }
            self.generated = false;
        } else {
            self.place.aliases.insert(id);
        }
    }

    fn absorb(&mut self, incoming: Incoming) {
        let rank = incoming.rank;
        self.previous |= incoming.previous;
        for id in incoming.ids {
            self.add_id(id);
        }

        let place = &mut self.place;
        let ranks = &mut self.ranks;
        if !incoming.name.trim().is_empty()
            && wins(ranks, Field::Name, !place.name.is_empty(), rank)
        {
            place.name = incoming.name.trim().to_string();
        }
        if !incoming.address.trim().is_empty()
            && wins(ranks, Field::Address, !place.address.is_empty(), rank)
        {
            place.address = incoming.address.trim().to_string();
        }
        if let Some(geo) = incoming.geo {
            if wins(ranks, Field::Geo, place.geo.is_some(), rank) {
                place.geo = Some(geo);
            }
        }
        for attribute in incoming.attributes.into_attributes() {
            let key = attribute.key();
            let present = place.attributes.has(&key);
            if wins(ranks, Field::Attribute(key), present, rank) {
                place.attributes.set(attribute);
            }
        }

        place.provenance.extend(incoming.provenance);
        place.brand_count = place.provenance.brands.len();
        place.first_seen = place.first_seen.min(incoming.first_seen);
        place.last_seen = place.last_seen.max(incoming.last_seen);
    }
}

/// Whether a value from a source of `rank` replaces the current one: it fills
/// gaps, and overrides only values from strictly lower ranked sources.
fn wins(ranks: &mut BTreeMap<Field, usize>, field: Field, present: bool, rank: usize) -> bool {
    let take = !present || ranks.get(&field).map_or(true, |x| rank < *x);
    if take {
        ranks.insert(field, rank);
    }
    take
}

/// One resolver per run, passed by `&mut` to every ingestion call.
pub struct Resolver {
    config: MatchConfig,
    normalizer: Normalizer,
    scorer: Scorer,
    index: MatchIndex,
    clusters: Vec<Cluster>,
    stats: RunStats,
    brand_stats: BTreeMap<String, BrandStats>,
    todo: String,
}

impl Resolver {
    pub fn new(config: MatchConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let normalizer = Normalizer::new(config.cell_size_m);
        Ok(Self {
            scorer: Scorer::new(&config),
            index: MatchIndex::new(normalizer.clone()),
            normalizer,
            config,
            clusters: Vec::new(),
            stats: RunStats::default(),
            brand_stats: BTreeMap::new(),
            todo: String::new(),
        })
    }

    pub fn ingest(&mut self, place: RawPlace) -> Outcome {
        self.stats.records_seen += 1;

        let has_name = !place.name.trim().is_empty();
        let has_address = !place.address.trim().is_empty();
        let usable = place.external_id.is_some()
            || (has_name && (has_address || place.geo.is_some()));
        if !usable {
            let reason = match (has_name, has_address) {
                (false, false) => "no external id, name or address",
                (false, true) => "no external id or name",
                (true, _) => "no external id, address or coordinate",
            };
            return self.reject(&place.source, reason);
        }

        let key = self.normalizer.normalize(&place);
        if self.config.is_excluded(&key.name) {
            debug!(source = %place.source, name = %place.name, "excluded chain");
            self.stats.records_excluded += 1;
            return Outcome::Excluded;
        }

        let brand = match (&place.brand, place.source.stage) {
            (Some(x), Stage::BrandLocator) => Some(x.clone()),
            _ => None,
        };

        let mut provenance = Provenance::default();
        provenance.add_source(place.source.clone());
        if let Some(x) = &place.brand {
            provenance.add_brand(x);
        }
        let incoming = Incoming {
            ids: place.external_id.into_iter().collect(),
            label: format!("{:?} ({})", place.name, place.source),
            name: place.name,
            address: place.address,
            geo: place.geo,
            attributes: place.attributes,
            provenance,
            rank: self.config.rank(place.source.stage),
            first_seen: place.fetched_at,
            last_seen: place.fetched_at,
            previous: false,
        };

        let outcome = self.resolve(key, incoming);
        if let Some(brand) = brand {
            let stats = self.brand_stats.entry(brand).or_default();
            stats.total_stores += 1;
            match outcome {
                Outcome::Inserted(_) => stats.new_stores += 1,
                _ => stats.existing_stores += 1,
            }
        }
        outcome
    }

    /// Re-feeds a place from an earlier run, keeping its ids and provenance.
    pub fn ingest_canonical(&mut self, place: CanonicalPlace) -> Outcome {
        self.stats.records_seen += 1;

        let key = self.normalizer.normalize_canonical(&place);
        if self.config.is_excluded(&key.name) {
            self.stats.records_excluded += 1;
            return Outcome::Excluded;
        }

        let rank = place
            .best_stage(&self.config.precedence)
            .map_or(self.config.precedence.len(), |x| self.config.rank(x));
        let mut ids = vec![place.id.clone()];
        ids.extend(place.aliases);
        let incoming = Incoming {
            ids,
            label: format!("{:?} ({})", place.name, place.id),
            name: place.name,
            address: place.address,
            geo: place.geo,
            attributes: place.attributes,
            provenance: place.provenance,
            rank,
            first_seen: place.first_seen,
            last_seen: place.last_seen,
            previous: true,
        };

        let outcome = self.resolve(key, incoming);
        // aliases are not part of the key, index them too
        if let Outcome::Inserted(cluster) | Outcome::Merged { cluster, .. } = &outcome {
            let ids: Vec<PlaceId> = self.clusters[cluster.0].place.ids().cloned().collect();
            for id in ids {
                self.index.insert_id(id, *cluster);
            }
        }
        outcome
    }

    pub fn ingest_all(&mut self, places: impl IntoIterator<Item = RawPlace>) -> Vec<Outcome> {
        places.into_iter().map(|x| self.ingest(x)).collect()
    }

    fn reject(&mut self, source: &SourceTag, reason: &'static str) -> Outcome {
        let error = MalformedRecord {
            source_tag: source.to_string(),
            reason,
        };
        warn!(source = %source, reason, "rejected record");
        self.stats.records_rejected += 1;
        let _ = writeln!(self.todo, "- {source}: rejected, {reason}");
        Outcome::Rejected(error)
    }

    fn resolve(&mut self, key: NormalizedKey, incoming: Incoming) -> Outcome {
        let mut best: Option<(ClusterId, Score)> = None;
        for id in self.index.candidates(&key) {
            let cluster = &self.clusters[id.0];
            let mut score = self.scorer.score(&key, &cluster.exemplar);
            if !score.identity && incoming.ids.iter().any(|x| cluster.holds(x)) {
                score = Score::identity(score.distance_m);
            }
            // places of one earlier output were already kept apart
            if incoming.previous && cluster.previous && !score.identity {
                continue;
            }

            if score.vetoed && score.value >= self.config.threshold {
                self.stats.geo_vetoes += 1;
                let _ = writeln!(
                    self.todo,
                    "- {} is {:.00}m away from {:?}, kept apart",
                    incoming.label,
                    score.distance_m.unwrap_or_default(),
                    cluster.place.id,
                );
            }

            // candidates come earliest first, so ties keep the earlier cluster
            if score.is_match && best.as_ref().map_or(true, |(_, x)| score.beats(x)) {
                best = Some((id, score));
            }
        }

        match best {
            Some((id, score)) => {
                debug!(record = %incoming.label, cluster = id.0, score = score.value, "matched");
                let cluster = &mut self.clusters[id.0];
                cluster.absorb(incoming);
                cluster.exemplar = self.normalizer.normalize_canonical(&cluster.place);
                self.index.insert(&key, id);
                self.index.insert(&cluster.exemplar, id);
                self.stats.records_merged += 1;
                Outcome::Merged {
                    cluster: id,
                    score: score.value,
                }
            }
            None => {
                let id = ClusterId(self.clusters.len());
                debug!(record = %incoming.label, cluster = id.0, "unmatched, new cluster");
                let cluster = self.seed(id, incoming);
                self.index.insert(&key, id);
                self.index.insert(&cluster.exemplar, id);
                self.clusters.push(cluster);
                self.stats.clusters_formed += 1;
                Outcome::Inserted(id)
            }
        }
    }

    fn seed(&self, id: ClusterId, incoming: Incoming) -> Cluster {
        let (place_id, generated) = match incoming.ids.first() {
            Some(x) => (x.clone(), false),
            None => (self.local_id(&incoming), true),
        };
        let mut cluster = Cluster {
            id,
            place: CanonicalPlace {
                id: place_id,
                aliases: BTreeSet::new(),
                name: String::new(),
                address: String::new(),
                geo: None,
                attributes: Attributes::default(),
                provenance: Provenance::default(),
                brand_count: 0,
                first_seen: incoming.first_seen,
                last_seen: incoming.last_seen,
            },
            ranks: BTreeMap::new(),
            generated,
            previous: false,
            exemplar: self.normalizer.key(None, "", "", None),
        };
        cluster.absorb(incoming);
        cluster.exemplar = self.normalizer.normalize_canonical(&cluster.place);
        cluster
    }

    /// Readable id from name and street; suffixed when already taken.
    fn local_id(&self, incoming: &Incoming) -> PlaceId {
        let street = incoming.address.split(',').next().unwrap_or_default();
        let mut base = slug(&format!("{} {street}", incoming.name));
        if base.is_empty() {
            base = "place".to_string();
        }

        let mut candidate = PlaceId::Local(base.clone());
        let mut n = 1;
        while !self.index.by_id(&candidate).is_empty() {
            n += 1;
            candidate = PlaceId::Local(format!("{base}-{n}"));
        }
        candidate
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    pub fn places(&self) -> impl Iterator<Item = &CanonicalPlace> {
        self.clusters.iter().map(|x| &x.place)
    }

    /// Freezes the clusters. Valid at any point of a run.
    pub fn finish(self) -> Resolved {
        debug!(indexed = ?self.index.len(), "finishing");
        let mut places = Vec::with_capacity(self.clusters.len());
        for cluster in self.clusters {
            debug_assert_eq!(cluster.id.0, places.len());
            places.push(cluster.place);
        }
        Resolved {
            places,
            stats: self.stats,
            brand_stats: self.brand_stats,
            todo: self.todo,
        }
    }
}

#[cfg(test)]
mod tests {
    use _model::BusinessStatus;
    use chrono::TimeZone;
    use itertools::Itertools;

    use super::*;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, 3, 12, minute, 0).unwrap()
    }

    fn place(tag: &str, name: &str, address: &str, geo: Option<(f64, f64)>) -> RawPlace {
        let mut x = RawPlace::new(tag.parse().unwrap(), at(0));
        x.name = name.to_string();
        x.address = address.to_string();
        x.geo = geo.and_then(|(lat, lon)| Coord::new(lat, lon));
        x
    }

    fn resolver() -> Resolver {
        Resolver::new(MatchConfig::default()).unwrap()
    }

    fn pop_up_grocer() -> Vec<RawPlace> {
        vec![
            place(
                "search-tile:tileA-query1",
                "Pop Up Grocer",
                "1 E 28th St, New York, NY 10016",
                Some((40.7449, -73.9887)),
            ),
            place(
                "search-tile:tileA-query3",
                "Pop-Up Grocer",
                "1 East 28th Street, NY 10016",
                Some((40.7450, -73.9886)),
            ),
            place("search-tile:tileB-query2", "POP UP GROCER", "1 E 28th St", None),
        ]
    }

    fn eataly() -> Vec<RawPlace> {
        vec![
            place(
                "search-tile:tileC-query1",
                "Eataly NYC",
                "200 5th Ave, New York, NY 10010",
                Some((40.7420, -73.9897)),
            ),
            place(
                "search-tile:tileC-query4",
                "Eataly",
                "200 5th Avenue, NY 10010",
                Some((40.7421, -73.9898)),
            ),
        ]
    }

    fn partition(places: &[CanonicalPlace]) -> BTreeSet<BTreeSet<String>> {
        places
            .iter()
            .map(|x| {
                x.provenance
                    .labels()
                    .into_iter()
                    .map(|x| x.to_string())
                    .collect::<BTreeSet<String>>()
            })
            .collect()
    }

    #[test]
    fn scenario_a_tile_variants_merge() {
        let mut resolver = resolver();
        let mut records = pop_up_grocer();
        records.truncate(2);
        let outcomes = resolver.ingest_all(records);
        assert_eq!(outcomes[0], Outcome::Inserted(ClusterId(0)));
        assert!(matches!(outcomes[1], Outcome::Merged { cluster: ClusterId(0), .. }));

        let resolved = resolver.finish();
        assert_eq!(resolved.places.len(), 1);
        assert_eq!(
            resolved.places[0].provenance.labels(),
            BTreeSet::from(["tileA-query1", "tileA-query3"])
        );
        assert_eq!(resolved.stats.records_merged, 1);
        assert_eq!(resolved.stats.clusters_formed, 1);
    }

    #[test]
    fn scenario_b_distant_duplicates_stay_apart() {
        let mut resolver = resolver();
        resolver.ingest(place(
            "search-tile:a",
            "Pop Up Grocer",
            "1 E 28th St, New York, NY 10016",
            Some((40.7449, -73.9887)),
        ));
        let outcome = resolver.ingest(place(
            "search-tile:b",
            "Pop Up Grocer",
            "1 E 28th St, New York, NY 10016",
            Some((40.7899, -73.9887)),
        ));
        assert_eq!(outcome, Outcome::Inserted(ClusterId(1)));

        let resolved = resolver.finish();
        assert_eq!(resolved.places.len(), 2);
        assert_eq!(resolved.stats.geo_vetoes, 1);
        assert!(resolved.todo.contains("kept apart"));
        // generated ids never collide
        assert_ne!(resolved.places[0].id, resolved.places[1].id);
        assert_eq!(
            resolved.places[0].id,
            PlaceId::Local("pop-up-grocer-1-e-28th-st".into())
        );
    }

    #[test]
    fn scenario_c_unusable_records_are_rejected() {
        let mut resolver = resolver();
        resolver.ingest_all(pop_up_grocer());
        let before = resolver.stats().records_rejected;

        let outcome = resolver.ingest(place("search-tile:broken", "", "", Some((40.7, -73.9))));
        assert_eq!(
            outcome,
            Outcome::Rejected(MalformedRecord {
                source_tag: "search-tile:broken".into(),
                reason: "no external id, name or address",
            })
        );

        let resolved = resolver.finish();
        assert_eq!(resolved.stats.records_rejected, before + 1);
        assert_eq!(resolved.places.len(), 1);
        assert!(!partition(&resolved.places)
            .iter()
            .any(|x| x.contains("broken")));
        assert!(resolved.todo.contains("search-tile:broken: rejected"));
    }

    #[test]
    fn scenario_d_brand_site_phone_beats_tile_phone() {
        let mut brand = place(
            "brand-locator:alice",
            "Pop Up Grocer",
            "1 E 28th St, New York, NY 10016",
            None,
        );
        brand.attributes.phone = Some("+1 212-555-0100".into());
        let mut tile = place(
            "search-tile:tileA-query1",
            "Pop Up Grocer",
            "1 E 28th St, New York, NY 10016",
            Some((40.7449, -73.9887)),
        );
        tile.attributes.phone = Some("+1 646-555-0199".into());
        tile.attributes.website = Some("https://popupgrocer.com".into());

        for records in [vec![brand.clone(), tile.clone()], vec![tile, brand]] {
            let mut resolver = resolver();
            resolver.ingest_all(records);
            let resolved = resolver.finish();
            assert_eq!(resolved.places.len(), 1);
            let attributes = &resolved.places[0].attributes;
            assert_eq!(attributes.phone.as_deref(), Some("+1 212-555-0100"));
            // lower ranked sources still fill gaps
            assert_eq!(attributes.website.as_deref(), Some("https://popupgrocer.com"));
            assert!(resolved.places[0].geo.is_some());
        }
    }

    #[test]
    fn shared_ids_merge_regardless_of_content() {
        let mut a = place("places-api:alice", "Pop Up Grocer", "1 E 28th St", Some((40.7449, -73.9887)));
        a.external_id = Some(PlaceId::Google("ChIJ1".into()));
        let mut b = place("website:alice", "Totally Different", "99 Elsewhere Rd", Some((41.5, -72.0)));
        b.external_id = Some(PlaceId::Google("ChIJ1".into()));

        let mut resolver = resolver();
        resolver.ingest(a);
        assert!(matches!(resolver.ingest(b), Outcome::Merged { score, .. } if score == 1.0));
        let resolved = resolver.finish();
        assert_eq!(resolved.places.len(), 1);
        // places api outranks the website crawl
        assert_eq!(resolved.places[0].name, "Pop Up Grocer");
    }

    #[test]
    fn first_external_id_sticks_and_later_ones_become_aliases() {
        let mut resolver = resolver();
        resolver.ingest(place(
            "search-tile:t",
            "Pop Up Grocer",
            "1 E 28th St, New York, NY 10016",
            None,
        ));
        let mut stockist = place("brand-locator:alice", "Pop Up Grocer", "1 E 28th St, NY 10016", None);
        stockist.external_id = Some(PlaceId::Stockist("123".into()));
        resolver.ingest(stockist);
        let mut google = place("places-api:alice", "Pop Up Grocer", "1 E 28th St, NY 10016", None);
        google.external_id = Some(PlaceId::Google("ChIJ1".into()));
        resolver.ingest(google);

        let resolved = resolver.finish();
        assert_eq!(resolved.places.len(), 1);
        let place = &resolved.places[0];
        assert_eq!(place.id, PlaceId::Stockist("123".into()));
        assert_eq!(place.aliases, BTreeSet::from([PlaceId::Google("ChIJ1".into())]));
    }

    #[test]
    fn aliases_are_matched_by_identity() {
        let mut resolver = resolver();
        let mut stockist = place("brand-locator:alice", "Pop Up Grocer", "1 E 28th St, NY 10016", None);
        stockist.external_id = Some(PlaceId::Stockist("123".into()));
        let mut google = place("places-api:alice", "Pop Up Grocer", "1 E 28th St, NY 10016", None);
        google.external_id = Some(PlaceId::Google("ChIJ1".into()));
        let mut later = place("places-api:yolele", "Pop Up Grocer Flatiron", "", Some((40.7449, -73.9887)));
        later.external_id = Some(PlaceId::Google("ChIJ1".into()));

        resolver.ingest_all([stockist, google]);
        assert!(matches!(resolver.ingest(later), Outcome::Merged { score, .. } if score == 1.0));
        assert_eq!(resolver.len(), 1);
    }

    #[test]
    fn ties_go_to_the_earliest_cluster() {
        let mut resolver = resolver();
        // the same store twice, 600m apart, so the two never merge
        resolver.ingest(place("search-tile:a", "Pop Up Grocer", "1 E 28th St, NY 10016", Some((40.7449, -73.9887))));
        resolver.ingest(place("search-tile:b", "Pop Up Grocer", "1 E 28th St, NY 10016", Some((40.7503, -73.9887))));
        assert_eq!(resolver.len(), 2);

        // scores the same against both
        let outcome = resolver.ingest(place("search-tile:c", "Pop Up Grocer", "1 E 28th St, NY 10016", None));
        assert!(matches!(outcome, Outcome::Merged { cluster: ClusterId(0), .. }));
    }

    #[test]
    fn provenance_never_shrinks() {
        let mut resolver = resolver();
        let mut sizes = Vec::new();
        let mut records = pop_up_grocer();
        records.push(place(
            "search-tile:tileA-query1",
            "Pop Up Grocer",
            "1 E 28th St, New York, NY 10016",
            None,
        ));
        for record in records {
            resolver.ingest(record);
            sizes.push(resolver.places().next().unwrap().provenance.sources.len());
        }
        assert_eq!(sizes, vec![1, 2, 3, 3]);
        assert!(sizes.windows(2).all(|x| x[0] <= x[1]));

        let resolved = resolver.finish();
        assert_eq!(
            resolved.places[0].provenance.labels(),
            BTreeSet::from(["tileA-query1", "tileA-query3", "tileB-query2"])
        );
    }

    #[test]
    fn clustering_ignores_arrival_order() {
        let records: Vec<RawPlace> = pop_up_grocer().into_iter().chain(eataly()).collect();
        let expected = {
            let mut resolver = resolver();
            resolver.ingest_all(records.clone());
            partition(&resolver.finish().places)
        };
        assert_eq!(expected.len(), 2);

        for order in records.iter().cloned().permutations(records.len()) {
            let mut resolver = resolver();
            resolver.ingest_all(order);
            assert_eq!(partition(&resolver.finish().places), expected);
        }
    }

    #[test]
    fn re_merging_the_output_changes_nothing() {
        let mut records: Vec<RawPlace> = pop_up_grocer().into_iter().chain(eataly()).collect();
        records[1].attributes.rating = typed_floats::tf64::NonNaN::new(4.6).ok();
        records[3].external_id = Some(PlaceId::Google("ChIJeataly".into()));
        records.push(place(
            "search-tile:far",
            "Pop Up Grocer",
            "1 E 28th St, New York, NY 10016",
            Some((40.7899, -73.9887)),
        ));

        for precedence in [
            MatchConfig::default().precedence,
            vec![Stage::SearchTile, Stage::Website],
        ] {
            let config = MatchConfig {
                precedence,
                ..MatchConfig::default()
            };
            let mut first = Resolver::new(config.clone()).unwrap();
            first.ingest_all(records.clone());
            let first = first.finish();
            assert_eq!(first.places.len(), 3);

            let mut second = Resolver::new(config).unwrap();
            for place in first.places.clone() {
                assert!(matches!(second.ingest_canonical(place), Outcome::Inserted(_)));
            }
            let second = second.finish();
            assert_eq!(second.stats.records_merged, 0);
            assert_eq!(second.places, first.places);
        }
    }

    #[test]
    fn re_fed_places_only_merge_by_id() {
        let mut api = place("places-api:alice", "Pop Up Grocer", "1 E 28th St, NY 10016", Some((40.7476, -73.9887)));
        api.brand = Some("Alice Mushrooms".into());
        let records = vec![
            place("search-tile:a", "Pop Up Grocer", "1 E 28th St, NY 10016", Some((40.7449, -73.9887))),
            // 600m north of the first, vetoed
            place("search-tile:b", "Pop Up Grocer", "1 E 28th St, NY 10016", Some((40.7503, -73.9887))),
            // halfway, joins the first and pulls its coordinate north
            api,
        ];

        let mut first = resolver();
        let outcomes = first.ingest_all(records);
        assert!(matches!(outcomes[2], Outcome::Merged { cluster: ClusterId(0), .. }));
        let first = first.finish();
        assert_eq!(first.places.len(), 2);
        assert_eq!(first.places[0].geo, Coord::new(40.7476, -73.9887));

        let mut second = resolver();
        for place in first.places.clone() {
            assert!(matches!(second.ingest_canonical(place), Outcome::Inserted(_)));
        }
        let second = second.finish();
        assert_eq!(second.stats.records_merged, 0);
        assert_eq!(second.places, first.places);

        // fresh observations still join re-fed places
        let mut third = resolver();
        for place in first.places.clone() {
            third.ingest_canonical(place);
        }
        let outcome = third.ingest(place(
            "search-tile:c",
            "Pop-Up Grocer",
            "1 East 28th Street, NY 10016",
            Some((40.7503, -73.9887)),
        ));
        assert!(matches!(outcome, Outcome::Merged { cluster: ClusterId(1), .. }));
    }

    #[test]
    fn excluded_chains_are_skipped() {
        let config = MatchConfig {
            excluded_chains: vec!["Whole Foods".into(), "Stop & Shop".into()],
            ..MatchConfig::default()
        };
        let mut resolver = Resolver::new(config).unwrap();
        let outcomes = resolver.ingest_all([
            place(
                "brand-locator:alice",
                "Whole Foods Market - Chelsea",
                "250 7th Ave, New York, NY 10001",
                None,
            ),
            place(
                "brand-locator:yolele",
                "Stop & Shop",
                "1 Main St, Hartford, CT 06103",
                Some((41.7637, -72.6851)),
            ),
        ]);
        assert_eq!(outcomes, vec![Outcome::Excluded, Outcome::Excluded]);
        assert_eq!(resolver.stats().records_excluded, 2);
        assert!(resolver.is_empty());
    }

    #[test]
    fn brands_are_unioned_and_counted() {
        let mut resolver = resolver();
        let mut alice = place("brand-locator:alice", "Pop Up Grocer", "1 E 28th St, NY 10016", None);
        alice.brand = Some("Alice Mushrooms".into());
        let mut alice_api = place("places-api:alice", "Pop Up Grocer", "1 E 28th St, NY 10016", None);
        alice_api.brand = Some("Alice Mushrooms".into());
        alice_api.attributes.business_status = Some(BusinessStatus::Operational);
        let mut yolele = place("brand-locator:yolele", "Pop-Up Grocer", "1 East 28th Street", None);
        yolele.brand = Some("Yolele".into());
        let mut other = place("brand-locator:yolele", "Essex Market", "88 Essex St, NY 10002", None);
        other.brand = Some("Yolele".into());

        resolver.ingest_all([alice, alice_api, yolele, other]);
        let resolved = resolver.finish();
        assert_eq!(resolved.places.len(), 2);
        assert_eq!(resolved.places[0].brand_count, 2);
        assert_eq!(
            resolved.places[0].attributes.business_status,
            Some(BusinessStatus::Operational)
        );
        assert_eq!(
            resolved.brand_stats["Alice Mushrooms"],
            BrandStats {
                total_stores: 1,
                new_stores: 1,
                existing_stores: 0
            }
        );
        assert_eq!(
            resolved.brand_stats["Yolele"],
            BrandStats {
                total_stores: 2,
                new_stores: 1,
                existing_stores: 1
            }
        );
    }

    #[test]
    fn higher_ranked_name_replaces_earlier_one() {
        let mut resolver = resolver();
        resolver.ingest(place("search-tile:t", "POP UP GROCER NYC", "1 E 28th St, NY 10016", None));
        resolver.ingest(place("places-api:alice", "Pop Up Grocer", "1 E 28th St, New York, NY 10016", None));
        resolver.ingest(place("website:alice", "Pop Up Grocer | Home", "1 E 28th St", None));

        let resolved = resolver.finish();
        assert_eq!(resolved.places.len(), 1);
        assert_eq!(resolved.places[0].name, "Pop Up Grocer");
        assert_eq!(resolved.places[0].address, "1 E 28th St, New York, NY 10016");
    }

    #[test]
    fn timestamps_span_all_observations() {
        let mut resolver = resolver();
        let mut records = pop_up_grocer();
        records[0].fetched_at = at(30);
        records[1].fetched_at = at(10);
        records[2].fetched_at = at(50);
        resolver.ingest_all(records);

        let resolved = resolver.finish();
        assert_eq!(resolved.places[0].first_seen, at(10));
        assert_eq!(resolved.places[0].last_seen, at(50));
    }

    #[test]
    fn invalid_config_fails_before_any_record() {
        let config = MatchConfig {
            geo_veto_m: -5.0,
            ..MatchConfig::default()
        };
        assert!(matches!(
            Resolver::new(config),
            Err(ConfigError::NegativeDistance { .. })
        ));
    }
}
