use std::fmt::Write;

use anyhow::Result;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::{
    export::{self, Dataset},
    sources::{self, Loaded, Source, SourceKind},
    stores::Resolver,
    utils::progress_bar,
    MergeArgs,
};

pub fn run(args: MergeArgs) -> Result<()> {
    let config = args.overrides.config(args.config.as_ref())?;
    let now = Utc::now();

    // earlier output first, so its ids are claimed before new ones are made up
    let mut inputs = Vec::new();
    inputs.extend(args.previous.iter().map(|x| Source::new(SourceKind::Previous, x)));
    inputs.extend(args.search.iter().map(|x| Source::new(SourceKind::Search, x)));
    inputs.extend(args.brand.iter().map(|x| Source::new(SourceKind::Brand, x)));
    if inputs.is_empty() {
        warn!("no inputs given, writing an empty dataset");
    }

    let loaded = sources::load_all(&inputs, &config, now);
    let mut resolver = Resolver::new(config)?;
    let mut skipped = String::new();
    let mut batches = Vec::new();
    for (source, result) in inputs.iter().zip(loaded) {
        match result {
            Ok(x) => batches.push((source, x)),
            Err(err) if args.allow_partial => {
                warn!(error = %err, "skipping source");
                writeln!(skipped, "- skipped {}: {:#}", source.path.display(), err.reason)?;
            }
            Err(err) => return Err(err.into()),
        }
    }

    let pb = progress_bar(batches.iter().map(|(_, x)| x.len() as u64).sum());
    let mut source_files = Vec::new();
    for (source, batch) in batches {
        info!(path = %source.path.display(), records = batch.len(), "merging");
        match batch {
            Loaded::Places(x) => {
                for place in x {
                    resolver.ingest(place);
                    pb.inc(1);
                }
            }
            Loaded::Previous(x) => {
                for place in x {
                    resolver.ingest_canonical(place);
                    pb.inc(1);
                }
            }
        }
        debug!(
            stores = resolver.len(),
            merged = resolver.stats().records_merged,
            "source merged"
        );
        source_files.push(source.path.display().to_string());
    }
    pb.finish_and_clear();

    let (dataset, mut todo) = Dataset::new(resolver.finish(), source_files, now);
    todo.push_str(&skipped);
    export::write(&args.output, &dataset, &todo)?;

    let stats = &dataset.stats;
    info!(
        output = %args.output.display(),
        stores = dataset.total_stores,
        seen = stats.records_seen,
        merged = stats.records_merged,
        rejected = stats.records_rejected,
        excluded = stats.records_excluded,
        "merge complete"
    );
    Ok(())
}
