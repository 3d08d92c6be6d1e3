use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use tracing::info;

use crate::checkpoint::write_json;
use crate::config::RunConfig;
use crate::corpus::{find_shards, for_each_record};
use crate::error::PipelineError;
use crate::mapping::{load_wanted_set, WantedSet};
use crate::stats::{progress_bar, ProcessingStats};

/// Focal paper ID to its own reference list. The keys are the papers that
/// receive a disruption score.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReferenceIndex {
    references: HashMap<String, Vec<String>>,
}

impl ReferenceIndex {
    /// The corpus holds each ID once; a second sighting is fatal.
    pub fn insert(
        &mut self,
        id: String,
        references: Vec<String>,
        shard: &Path,
    ) -> Result<(), PipelineError> {
        match self.references.entry(id) {
            Entry::Occupied(entry) => Err(PipelineError::DuplicateFocalPaper {
                id: entry.key().clone(),
                shard: shard.to_path_buf(),
            }),
            Entry::Vacant(entry) => {
                entry.insert(references);
                Ok(())
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&[String]> {
        self.references.get(id).map(Vec::as_slice)
    }

    pub fn focal_papers(&self) -> impl Iterator<Item = &String> {
        self.references.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.references.iter()
    }

    pub fn len(&self) -> usize {
        self.references.len()
    }

    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }
}

impl FromIterator<(String, Vec<String>)> for ReferenceIndex {
    fn from_iter<I: IntoIterator<Item = (String, Vec<String>)>>(iter: I) -> Self {
        Self {
            references: iter.into_iter().collect(),
        }
    }
}

/// One pass over `shards`, keeping the reference list of every wanted
/// record.
pub fn gather_references(
    wanted: &WantedSet,
    shards: &[PathBuf],
    stats: &ProcessingStats,
) -> Result<ReferenceIndex> {
    let progress = progress_bar(shards.len(), "files")?;
    progress.set_message("Collecting references...");

    let mut index = ReferenceIndex::default();
    for shard in shards {
        let records = for_each_record(shard, |record| {
            if wanted.contains(&record.id) {
                index.insert(record.id, record.referenced_works, shard)?;
                stats.focal_papers_found.fetch_add(1, Ordering::Relaxed);
            }
            Ok(())
        })?;

        stats.add_records(records);
        stats.files_processed.fetch_add(1, Ordering::Relaxed);
        progress.inc(1);
        progress.set_message(stats.progress_message());
    }

    progress.finish_with_message("Reference collection complete");
    Ok(index)
}

/// The `collect-references` stage: writes `references.json`.
pub fn collect_references(config: &RunConfig, stats: &ProcessingStats) -> Result<ReferenceIndex> {
    let wanted = load_wanted_set(
        &config.mapping_file,
        config.secondary_mapping_file.as_deref(),
    )?;
    let shards = find_shards(&config.corpus_root)?;

    let references = gather_references(&wanted, &shards, stats)?;
    info!(
        "Found references for {} of {} target papers",
        references.len(),
        wanted.len()
    );

    write_json(&config.references_path(), &references)?;
    info!("Done.");
    Ok(references)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::testing::write_shard;
    use tempfile::TempDir;

    fn wanted(ids: &[&str]) -> WantedSet {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_keeps_only_wanted_records() {
        let dir = TempDir::new().unwrap();
        let shard = dir.path().join("part_000.gz");
        write_shard(
            &shard,
            &[
                r#"{"id":"A","referenced_works":["B","C"]}"#,
                r#"{"id":"D","referenced_works":["A"]}"#,
                r#"{"id":"E","referenced_works":[]}"#,
            ],
        );

        let index =
            gather_references(&wanted(&["A", "E", "F"]), &[shard], &ProcessingStats::new())
                .unwrap();

        assert_eq!(index.len(), 2);
        assert_eq!(index.get("A").unwrap(), &["B", "C"]);
        assert_eq!(index.get("E").unwrap().len(), 0);
        assert!(index.get("D").is_none());
    }

    #[test]
    fn test_duplicate_across_shards_is_fatal() {
        let dir = TempDir::new().unwrap();
        let first = dir.path().join("part_000.gz");
        let second = dir.path().join("part_001.gz");
        write_shard(&first, &[r#"{"id":"A","referenced_works":["B"]}"#]);
        write_shard(&second, &[r#"{"id":"A","referenced_works":["C"]}"#]);

        let err = gather_references(&wanted(&["A"]), &[first, second.clone()], &ProcessingStats::new())
            .unwrap_err();

        match err.downcast_ref::<PipelineError>() {
            Some(PipelineError::DuplicateFocalPaper { id, shard }) => {
                assert_eq!(id, "A");
                assert_eq!(shard, &second);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_insert_rejects_second_sighting() {
        let mut index = ReferenceIndex::default();
        index.insert("A".into(), vec!["B".into()], Path::new("s.gz")).unwrap();
        assert!(index.insert("A".into(), vec![], Path::new("s.gz")).is_err());
        assert_eq!(index.get("A").unwrap(), &["B"]);
    }
}
