//! Store deduplication: normalization, candidate lookup, scoring and merging.

mod index;
mod normalize;
pub mod report;
mod resolver;
mod score;

pub use normalize::normalize_name;
pub use resolver::{BrandStats, Resolved, Resolver, RunStats};
