use std::collections::{BTreeMap, BTreeSet};

use _model::PlaceId;

use super::normalize::{Cell, NormalizedKey, Normalizer};

/// Position of a cluster in insertion order. Lower ids were created earlier,
/// which makes them the tie-break winners.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClusterId(pub usize);

/// Finds clusters that could hold the same store as a key, without comparing
/// against every cluster.
#[derive(Debug)]
pub struct MatchIndex {
    normalizer: Normalizer,
    by_id: BTreeMap<PlaceId, BTreeSet<ClusterId>>,
    by_address: BTreeMap<String, BTreeSet<ClusterId>>,
    by_cell: BTreeMap<Cell, BTreeSet<ClusterId>>,
}

impl MatchIndex {
    pub fn new(normalizer: Normalizer) -> Self {
        Self {
            normalizer,
            by_id: BTreeMap::new(),
            by_address: BTreeMap::new(),
            by_cell: BTreeMap::new(),
        }
    }

    /// Clusters sharing any one key dimension with `key`, earliest first.
    pub fn candidates(&self, key: &NormalizedKey) -> BTreeSet<ClusterId> {
        let mut output = BTreeSet::new();
        if let Some(x) = key.external_id.as_ref().and_then(|x| self.by_id.get(x)) {
            output.extend(x);
        }
        if let Some(x) = key.address.bucket().and_then(|x| self.by_address.get(&x)) {
            output.extend(x);
        }
        if let Some(geo) = key.geo {
            for cell in self.normalizer.neighbourhood(geo) {
                if let Some(x) = self.by_cell.get(&cell) {
                    output.extend(x);
                }
            }
        }
        output
    }

    /// Clusters already holding the key's external id.
    pub fn by_id(&self, id: &PlaceId) -> BTreeSet<ClusterId> {
        self.by_id.get(id).cloned().unwrap_or_default()
    }

    pub fn insert(&mut self, key: &NormalizedKey, cluster: ClusterId) {
        if let Some(x) = &key.external_id {
            self.insert_id(x.clone(), cluster);
        }
        if let Some(x) = key.address.bucket() {
            self.by_address.entry(x).or_default().insert(cluster);
        }
        if let Some(x) = key.cell {
            self.by_cell.entry(x).or_default().insert(cluster);
        }
    }

    pub fn insert_id(&mut self, id: PlaceId, cluster: ClusterId) {
        self.by_id.entry(id).or_default().insert(cluster);
    }

    pub fn len(&self) -> (usize, usize, usize) {
        (self.by_id.len(), self.by_address.len(), self.by_cell.len())
    }
}
