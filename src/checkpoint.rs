//! Crash-recovery state for the citation pass.
//!
//! After each shard the whole citation index is rewritten as one JSON
//! document (the previous one rotated to `.bak`) and the shard path is
//! appended to the processed log. A resumed run restores the index from
//! the checkpoint and skips every logged shard.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::citations::CitationIndex;
use crate::config::{backup_path, RunConfig};

pub struct Checkpointer {
    citations_path: PathBuf,
    processed_log: PathBuf,
    skipped_log: PathBuf,
}

/// State recovered from a previous, interrupted run.
#[derive(Debug, Default)]
pub struct ResumeState {
    pub citations: CitationIndex,
    pub processed: HashSet<PathBuf>,
}

impl Checkpointer {
    pub fn new(config: &RunConfig) -> Self {
        Self {
            citations_path: config.citations_path(),
            processed_log: config.processed_log_path(),
            skipped_log: config.skipped_log_path(),
        }
    }

    pub fn citations_path(&self) -> &Path {
        &self.citations_path
    }

    /// Rotate the previous checkpoint, write the full index, then log the
    /// shard as done. The log line is only written once the JSON is on disk.
    pub fn commit(&self, citations: &CitationIndex, shard: &Path) -> Result<()> {
        if self.citations_path.exists() {
            fs::rename(&self.citations_path, backup_path(&self.citations_path)).with_context(
                || format!("Failed to back up {}", self.citations_path.display()),
            )?;
        }
        write_json(&self.citations_path, citations)?;

        append_line(&self.processed_log, &shard.display().to_string())?;
        debug!("Checkpointed after {}", shard.display());
        Ok(())
    }

    /// Begins a run from an empty index. The previous checkpoint and
    /// processed log are rotated to `.bak`, so a later resume cannot skip
    /// shards that only an earlier run had folded in.
    pub fn start_fresh(&self) -> Result<()> {
        for path in [&self.citations_path, &self.processed_log] {
            if !path.exists() {
                continue;
            }
            let backup = backup_path(path);
            fs::rename(path, &backup)
                .with_context(|| format!("Failed to back up {}", path.display()))?;
            warn!("Starting over; moved {} to {}", path.display(), backup.display());
        }
        Ok(())
    }

    /// Writes `citations` when no checkpoint is on disk yet, so later
    /// stages find an index even if no shard gets committed.
    pub fn ensure_written(&self, citations: &CitationIndex) -> Result<()> {
        if !self.citations_path.exists() {
            write_json(&self.citations_path, citations)?;
        }
        Ok(())
    }

    /// Skipped shards are not marked processed, so a resume retries them.
    pub fn record_skip(&self, shard: &Path, reason: &anyhow::Error) -> Result<()> {
        let reason = format!("{:#}", reason).replace(['\n', '\t'], " ");
        append_line(&self.skipped_log, &format!("{}\t{}", shard.display(), reason))
    }

    pub fn processed_shards(&self) -> Result<HashSet<PathBuf>> {
        if !self.processed_log.exists() {
            return Ok(HashSet::new());
        }
        let file = File::open(&self.processed_log)
            .with_context(|| format!("Failed to open {}", self.processed_log.display()))?;

        let mut processed = HashSet::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            let line = line.trim();
            if !line.is_empty() {
                processed.insert(PathBuf::from(line));
            }
        }
        Ok(processed)
    }

    /// Loads the last checkpoint, falling back to `.bak` when the primary
    /// file is missing or was cut short mid-write. No files means no state.
    pub fn load_citations(&self) -> Result<CitationIndex> {
        let backup = backup_path(&self.citations_path);
        match read_json::<CitationIndex>(&self.citations_path) {
            Ok(Some(index)) => return Ok(index),
            Ok(None) => {}
            Err(e) if backup.exists() => {
                warn!("Checkpoint unreadable ({:#}), falling back to backup", e);
            }
            Err(e) => return Err(e),
        }

        match read_json::<CitationIndex>(&backup)? {
            Some(index) => {
                info!("Restored citations from {}", backup.display());
                Ok(index)
            }
            None => Ok(CitationIndex::default()),
        }
    }

    pub fn resume(&self) -> Result<ResumeState> {
        let citations = self.load_citations()?;
        let processed = self.processed_shards()?;
        info!(
            "Resuming with {} targets cited and {} shards already processed",
            citations.len(),
            processed.len()
        );
        Ok(ResumeState {
            citations,
            processed,
        })
    }
}

/// `all − processed`, keeping enumeration order.
pub fn unprocessed_shards(all: Vec<PathBuf>, processed: &HashSet<PathBuf>) -> Vec<PathBuf> {
    all.into_iter()
        .filter(|shard| !processed.contains(shard))
        .collect()
}

pub fn write_json<T: serde::Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, value)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    writer.flush()?;
    Ok(())
}

/// `Ok(None)` when the file does not exist.
pub fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let value = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(Some(value))
}

fn append_line(path: &Path, line: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    writeln!(file, "{}", line)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn checkpointer(dir: &Path) -> Checkpointer {
        Checkpointer::new(&RunConfig::new("/corpus", dir, "/map.txt"))
    }

    fn index(pairs: &[(&str, &[&str])]) -> CitationIndex {
        let mut index = CitationIndex::default();
        for (target, citers) in pairs {
            for citer in *citers {
                index.add_citer(target, citer);
            }
        }
        index
    }

    #[test]
    fn test_first_run_has_no_state() {
        let dir = TempDir::new().unwrap();
        let state = checkpointer(dir.path()).resume().unwrap();
        assert!(state.citations.is_empty());
        assert!(state.processed.is_empty());
    }

    #[test]
    fn test_commit_rotates_backup_and_logs() {
        let dir = TempDir::new().unwrap();
        let cp = checkpointer(dir.path());

        cp.commit(&index(&[("A", &["X"])]), Path::new("/corpus/part_000.gz"))
            .unwrap();
        assert!(!backup_path(cp.citations_path()).exists());

        cp.commit(&index(&[("A", &["X", "Y"])]), Path::new("/corpus/part_001.gz"))
            .unwrap();

        let backup: CitationIndex = read_json(&backup_path(cp.citations_path()))
            .unwrap()
            .unwrap();
        assert_eq!(backup.citers("A"), ["X"]);

        let current = cp.load_citations().unwrap();
        assert_eq!(current.citers("A").len(), 2);

        let log = fs::read_to_string(dir.path().join("processed_files.txt")).unwrap();
        assert_eq!(log, "/corpus/part_000.gz\n/corpus/part_001.gz\n");
    }

    #[test]
    fn test_truncated_checkpoint_falls_back_to_backup() {
        let dir = TempDir::new().unwrap();
        let cp = checkpointer(dir.path());
        cp.commit(&index(&[("A", &["X"])]), Path::new("s0.gz")).unwrap();
        cp.commit(&index(&[("A", &["X", "Y"])]), Path::new("s1.gz")).unwrap();

        fs::write(cp.citations_path(), "{\"A\": [\"X\"").unwrap();
        let restored = cp.load_citations().unwrap();
        assert_eq!(restored.citers("A"), ["X"]);
    }

    #[test]
    fn test_unprocessed_is_set_difference_in_order() {
        let all: Vec<PathBuf> = ["a.gz", "b.gz", "c.gz"].iter().map(PathBuf::from).collect();
        let processed: HashSet<PathBuf> = [PathBuf::from("b.gz")].into_iter().collect();
        assert_eq!(
            unprocessed_shards(all, &processed),
            vec![PathBuf::from("a.gz"), PathBuf::from("c.gz")]
        );
    }

    #[test]
    fn test_start_fresh_rotates_processed_log() {
        let dir = TempDir::new().unwrap();
        let cp = checkpointer(dir.path());
        cp.commit(&index(&[("A", &["X"])]), Path::new("s0.gz")).unwrap();

        cp.start_fresh().unwrap();
        assert!(cp.processed_shards().unwrap().is_empty());
        assert!(!cp.citations_path().exists());
        let rotated = fs::read_to_string(dir.path().join("processed_files.txt.bak")).unwrap();
        assert_eq!(rotated, "s0.gz\n");
        let previous: CitationIndex = read_json(&backup_path(cp.citations_path()))
            .unwrap()
            .unwrap();
        assert_eq!(previous.citers("A"), ["X"]);

        // nothing to rotate the second time
        cp.start_fresh().unwrap();
    }

    #[test]
    fn test_ensure_written_keeps_existing_checkpoint() {
        let dir = TempDir::new().unwrap();
        let cp = checkpointer(dir.path());

        cp.ensure_written(&CitationIndex::default()).unwrap();
        assert_eq!(fs::read_to_string(cp.citations_path()).unwrap(), "{}");

        cp.commit(&index(&[("A", &["X"])]), Path::new("s0.gz")).unwrap();
        cp.ensure_written(&CitationIndex::default()).unwrap();
        assert_eq!(cp.load_citations().unwrap().citers("A"), ["X"]);
    }

    #[test]
    fn test_record_skip_appends_reason() {
        let dir = TempDir::new().unwrap();
        let cp = checkpointer(dir.path());
        cp.record_skip(Path::new("bad.gz"), &anyhow::anyhow!("corrupt\ndata"))
            .unwrap();
        let log = fs::read_to_string(dir.path().join("skipped_files.txt")).unwrap();
        assert_eq!(log, "bad.gz\tcorrupt data\n");
    }
}
