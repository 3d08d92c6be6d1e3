use anyhow::{bail, Context, Result};
use flate2::read::MultiGzDecoder;
use glob::glob;
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// One works record. Everything except the ID and outgoing references is
/// ignored on decode.
#[derive(Debug, Clone, Deserialize)]
pub struct PaperRecord {
    pub id: String,
    #[serde(default)]
    pub referenced_works: Vec<String>,
}

/// Every `*.gz` file below `root`, in walk order.
pub fn find_shards(root: &Path) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        bail!("Corpus root {} is not a directory", root.display());
    }

    let pattern = format!("{}/**/*.gz", root.display());
    info!("Searching for shards with pattern: {}", pattern);

    let mut files = Vec::new();
    for entry in glob(&pattern)? {
        match entry {
            Ok(path) if path.is_file() => files.push(path),
            Ok(_) => {}
            Err(e) => warn!("Error reading glob entry: {}", e),
        }
    }

    files.sort();
    info!("Found {} shard files", files.len());
    Ok(files)
}

/// Streams one gzip shard, decoding each non-blank line as a
/// [`PaperRecord`]. Concatenated gzip members are read through to the end.
/// Returns the number of records visited.
pub fn for_each_record<F>(path: &Path, mut visit: F) -> Result<u64>
where
    F: FnMut(PaperRecord) -> Result<()>,
{
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let reader = BufReader::with_capacity(256 * 1024, MultiGzDecoder::new(file));

    let mut records = 0u64;
    for (index, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("Failed to decompress {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }

        let record: PaperRecord = serde_json::from_str(&line)
            .with_context(|| format!("Failed to decode {}:{}", path.display(), index + 1))?;
        visit(record)?;
        records += 1;
    }

    Ok(records)
}
