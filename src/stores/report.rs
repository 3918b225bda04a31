use std::{collections::BTreeMap, fmt::Write};

use anyhow::Result;
use itertools::Itertools;

use crate::export::Dataset;

const TOP_MULTI_BRAND: usize = 10;

/// Markdown summary of a merge run.
pub fn render(dataset: &Dataset, todo: &str) -> Result<String> {
    let stats = &dataset.stats;
    let matchable = stats
        .records_seen
        .saturating_sub(stats.records_rejected + stats.records_excluded);

    let mut md = String::new();
    writeln!(md, "## Statistics\n")?;
    writeln!(
        md,
        "- {} records from {} sources",
        stats.records_seen,
        dataset.source_files.len()
    )?;
    writeln!(
        md,
        "- {} stores, {} merged into an existing one",
        dataset.total_stores, stats.records_merged
    )?;
    writeln!(
        md,
        "- {} rejected, {} excluded chains",
        stats.records_rejected, stats.records_excluded
    )?;
    writeln!(md, "- {} kept apart by distance", stats.geo_vetoes)?;
    writeln!(
        md,
        "- {} with an external id",
        dataset.places.iter().filter(|x| x.id.is_external()).count()
    )?;
    if matchable > 0 {
        writeln!(
            md,
            "- {:.01}% merged",
            stats.records_merged as f64 / matchable as f64 * 100.0
        )?;
    }
    writeln!(md)?;

    if !dataset.brand_stats.is_empty() {
        writeln!(md, "## Brands\n")?;
        writeln!(md, "| Brand | Stores | New | Existing |")?;
        writeln!(md, "| --- | --- | --- | --- |")?;
        for (brand, x) in &dataset.brand_stats {
            writeln!(
                md,
                "| {brand} | {} | {} | {} |",
                x.total_stores, x.new_stores, x.existing_stores
            )?;
        }
        writeln!(md)?;

        let mut counts: BTreeMap<usize, usize> = BTreeMap::new();
        for x in dataset.places.iter().filter(|x| x.brand_count > 0) {
            *counts.entry(x.brand_count).or_default() += 1;
        }
        for (brands, stores) in counts {
            match brands {
                1 => writeln!(md, "- exclusive to 1 brand: {stores} stores")?,
                _ => writeln!(md, "- found in {brands} brands: {stores} stores")?,
            }
        }

        let mut multi: Vec<_> = dataset.places.iter().filter(|x| x.brand_count > 1).collect();
        // stable, so equal counts keep dataset order
        multi.sort_by(|a, b| b.brand_count.cmp(&a.brand_count));
        if !multi.is_empty() {
            writeln!(md, "\nTop multi-brand stores:\n")?;
            for x in multi.into_iter().take(TOP_MULTI_BRAND) {
                writeln!(
                    md,
                    "- {} {:?}: {}",
                    x.name,
                    x.id,
                    x.provenance.brands.iter().join(", ")
                )?;
            }
        }
        writeln!(md)?;
    }

    if !todo.is_empty() {
        writeln!(md, "## Todo\n")?;
        writeln!(md, "{todo}")?;
    }
    Ok(md)
}
