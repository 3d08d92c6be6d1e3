use anyhow::{Context, Result};
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::info;

use crate::error::PipelineError;

/// Fixed universe of target paper IDs for one run.
pub type WantedSet = HashSet<String>;

/// External-system ID to the corpus IDs it was matched to.
#[derive(Debug, Default, Clone)]
pub struct ExternalMapping {
    entries: HashMap<String, Vec<String>>,
}

impl ExternalMapping {
    /// Reads `externalID, id1;id2;...` lines after a discarded header.
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open mapping file {}", path.display()))?;
        Self::from_reader(BufReader::new(file), path)
    }

    fn from_reader<R: BufRead>(reader: R, path: &Path) -> Result<Self> {
        let mut lines = reader.lines();
        match lines.next() {
            Some(header) => {
                header.with_context(|| format!("Failed to read {}", path.display()))?;
            }
            None => return Err(PipelineError::MissingMappingHeader { path: path.into() }.into()),
        }

        let mut mapping = Self::default();
        for (index, line) in lines.enumerate() {
            let line = line.with_context(|| format!("Failed to read {}", path.display()))?;
            if line.trim().is_empty() {
                continue;
            }

            let (external_id, paper_ids) =
                parse_mapping_line(&line).ok_or_else(|| PipelineError::MalformedMappingLine {
                    path: path.into(),
                    // header is line 1
                    line_number: index + 2,
                    line: line.clone(),
                })?;
            mapping.insert(external_id, paper_ids);
        }
        Ok(mapping)
    }

    /// A repeated external ID unions its lists.
    pub fn insert(&mut self, external_id: String, paper_ids: Vec<String>) {
        let existing = self.entries.entry(external_id).or_default();
        for id in paper_ids {
            if !existing.contains(&id) {
                existing.push(id);
            }
        }
    }

    pub fn get(&self, external_id: &str) -> Option<&[String]> {
        self.entries.get(external_id).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Flattens every mapped corpus ID into one set.
    pub fn paper_ids(&self) -> WantedSet {
        self.entries.values().flatten().cloned().collect()
    }
}

fn parse_mapping_line(line: &str) -> Option<(String, Vec<String>)> {
    let mut fields = line.trim_end_matches(['\r', '\n']).split(", ");
    let external_id = fields.next()?.trim();
    let paper_ids = fields.next()?;
    if fields.next().is_some() || external_id.is_empty() {
        return None;
    }

    let paper_ids = paper_ids
        .trim()
        .split(';')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect();
    Some((external_id.to_string(), paper_ids))
}

/// Builds the wanted set from the primary mapping, optionally widened by a
/// second mapping file.
pub fn load_wanted_set(primary: &Path, secondary: Option<&Path>) -> Result<WantedSet> {
    let mut wanted = ExternalMapping::load(primary)?.paper_ids();
    info!("Loaded {} target IDs from {}", wanted.len(), primary.display());

    if let Some(secondary) = secondary {
        let extra = ExternalMapping::load(secondary)?.paper_ids();
        let before = wanted.len();
        wanted.extend(extra);
        info!(
            "Secondary mapping {} added {} target IDs",
            secondary.display(),
            wanted.len() - before
        );
    }

    info!("Number of all papers: {}", wanted.len());
    Ok(wanted)
}
