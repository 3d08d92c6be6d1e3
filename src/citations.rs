use anyhow::Result;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use tracing::{info, warn};

use crate::checkpoint::{unprocessed_shards, Checkpointer};
use crate::config::RunConfig;
use crate::corpus::{find_shards, for_each_record};
use crate::mapping::{load_wanted_set, WantedSet};
use crate::stats::{progress_bar, ProcessingStats};

/// Target paper ID to the IDs of papers citing it.
///
/// Citer order carries no meaning. A citer appears once per record that
/// cites the target, so a shard processed twice leaves duplicates behind;
/// callers must not feed the same shard in twice.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CitationIndex {
    citers: HashMap<String, Vec<String>>,
}

impl CitationIndex {
    pub fn add_citer(&mut self, target: &str, citer: &str) {
        match self.citers.get_mut(target) {
            Some(list) => list.push(citer.to_string()),
            None => {
                self.citers
                    .insert(target.to_string(), vec![citer.to_string()]);
            }
        }
    }

    /// Empty when nothing cites `target`.
    pub fn citers(&self, target: &str) -> &[String] {
        self.citers.get(target).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn citer_set(&self, target: &str) -> HashSet<&str> {
        self.citers(target).iter().map(String::as_str).collect()
    }

    /// Concatenates `other`'s citer lists onto ours.
    pub fn merge(&mut self, other: CitationIndex) {
        for (target, mut citers) in other.citers {
            self.citers.entry(target).or_default().append(&mut citers);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.citers.iter()
    }

    pub fn len(&self) -> usize {
        self.citers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.citers.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.citers.values().map(Vec::len).sum()
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ShardExtraction {
    pub records: u64,
    pub edges: u64,
}

/// Adds every record in `shard` as a citer of each wanted paper it
/// references. Repeated references inside one record count once.
pub fn extract_citations(
    wanted: &WantedSet,
    shard: &Path,
    citations: &mut CitationIndex,
) -> Result<ShardExtraction> {
    let mut edges = 0u64;
    let records = for_each_record(shard, |record| {
        let cited: HashSet<&str> = record
            .referenced_works
            .iter()
            .map(String::as_str)
            .filter(|id| wanted.contains(*id))
            .collect();

        for target in cited {
            citations.add_citer(target, &record.id);
            edges += 1;
        }
        Ok(())
    })?;

    Ok(ShardExtraction { records, edges })
}

#[derive(Debug, Clone)]
pub struct CollectOptions {
    /// Restore the checkpoint and only scan shards missing from the
    /// processed log.
    pub resume: bool,
    /// Log and record an unreadable shard instead of aborting the run.
    pub skip_corrupt: bool,
    /// Shards extracted concurrently before their results are merged and
    /// checkpointed one by one. 1 means strictly sequential.
    pub parallel_shards: usize,
}

impl Default for CollectOptions {
    fn default() -> Self {
        Self {
            resume: false,
            skip_corrupt: false,
            parallel_shards: 1,
        }
    }
}

/// Drives [`extract_citations`] over `shards`, checkpointing after every
/// shard in enumeration order.
pub fn aggregate_citations(
    wanted: &WantedSet,
    shards: &[PathBuf],
    mut citations: CitationIndex,
    checkpointer: &Checkpointer,
    options: &CollectOptions,
    stats: &ProcessingStats,
) -> Result<CitationIndex> {
    let progress = progress_bar(shards.len(), "files")?;
    progress.set_message("Collecting citations...");

    for batch in shards.chunks(options.parallel_shards.max(1)) {
        let partials: Vec<(&PathBuf, Result<(CitationIndex, ShardExtraction)>)> = batch
            .par_iter()
            .map(|shard| {
                let mut partial = CitationIndex::default();
                let result = extract_citations(wanted, shard, &mut partial)
                    .map(|extraction| (partial, extraction));
                (shard, result)
            })
            .collect();

        // Merge and checkpoint on this thread only, in shard order.
        for (shard, result) in partials {
            match result {
                Ok((partial, extraction)) => {
                    citations.merge(partial);
                    stats.add_records(extraction.records);
                    stats.add_edges(extraction.edges);
                    checkpointer.commit(&citations, shard)?;
                    stats.files_processed.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) if options.skip_corrupt => {
                    warn!("Skipping shard {}: {:#}", shard.display(), e);
                    checkpointer.record_skip(shard, &e)?;
                    stats.files_skipped.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => return Err(e),
            }
            progress.inc(1);
        }
        progress.set_message(stats.progress_message());
    }

    progress.finish_with_message("Citation collection complete");
    Ok(citations)
}

/// The `collect-citations` stage.
pub fn collect_citations(
    config: &RunConfig,
    options: &CollectOptions,
    stats: &ProcessingStats,
) -> Result<CitationIndex> {
    let wanted = load_wanted_set(
        &config.mapping_file,
        config.secondary_mapping_file.as_deref(),
    )?;
    let checkpointer = Checkpointer::new(config);
    let mut shards = find_shards(&config.corpus_root)?;

    let citations = if options.resume {
        let state = checkpointer.resume()?;
        shards = unprocessed_shards(shards, &state.processed);
        state.citations
    } else {
        checkpointer.start_fresh()?;
        CitationIndex::default()
    };
    checkpointer.ensure_written(&citations)?;

    info!(
        "Collecting citations from {} shards into {}",
        shards.len(),
        checkpointer.citations_path().display()
    );

    let citations =
        aggregate_citations(&wanted, &shards, citations, &checkpointer, options, stats)?;

    info!(
        "{} of {} target papers are cited ({} citation edges)",
        citations.len(),
        wanted.len(),
        citations.edge_count()
    );
    info!("Done.");
    Ok(citations)
}
