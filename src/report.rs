use anyhow::{Context, Result};
use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::info;

use crate::checkpoint::{read_json, write_json};
use crate::citations::CitationIndex;
use crate::config::RunConfig;
use crate::disruption::load_inputs;
use crate::mapping::ExternalMapping;
use crate::references::ReferenceIndex;

/// External ID to a deduplicated, sorted list of corpus IDs.
pub type ExternalReport = HashMap<String, Vec<String>>;

fn union_by_external<'a, F>(mapping: &ExternalMapping, lookup: F) -> ExternalReport
where
    F: Fn(&str) -> &'a [String],
{
    mapping
        .iter()
        .map(|(external_id, paper_ids)| {
            let merged: BTreeSet<&String> =
                paper_ids.iter().flat_map(|id| lookup(id.as_str())).collect();
            (
                external_id.clone(),
                merged.into_iter().cloned().collect(),
            )
        })
        .collect()
}

/// Citers of every corpus ID mapped to each external ID. Unlike the raw
/// citation index, the lists are deduplicated.
pub fn process_citations(mapping: &ExternalMapping, citations: &CitationIndex) -> ExternalReport {
    union_by_external(mapping, |id| citations.citers(id))
}

/// References of every corpus ID mapped to each external ID, deduplicated.
pub fn convert_references(
    mapping: &ExternalMapping,
    references: &ReferenceIndex,
) -> ExternalReport {
    union_by_external(mapping, |id| references.get(id).unwrap_or(&[]))
}

/// Focal papers, their citers, their references and the citers of those
/// references.
pub fn involved_papers(citations: &CitationIndex, references: &ReferenceIndex) -> BTreeSet<String> {
    let mut all = BTreeSet::new();
    for (paper, refs) in references.iter() {
        all.insert(paper.clone());
        all.extend(citations.citers(paper).iter().cloned());
        for reference in refs {
            all.insert(reference.clone());
            all.extend(citations.citers(reference).iter().cloned());
        }
    }
    all
}

fn write_lines<'a>(path: &Path, lines: impl IntoIterator<Item = &'a String>) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    for line in lines {
        writeln!(writer, "{}", line)?;
    }
    writer.flush()?;
    Ok(())
}

/// The `process-citations` stage.
pub fn run_process_citations(config: &RunConfig) -> Result<ExternalReport> {
    let citations_path = config.citations_path();
    let citations: CitationIndex = read_json(&citations_path)?
        .with_context(|| format!("{} not found", citations_path.display()))?;
    let mapping = ExternalMapping::load(&config.mapping_file)?;

    let report = process_citations(&mapping, &citations);
    write_json(&config.external_citations_path(), &report)?;
    info!("Done.");
    Ok(report)
}

/// The `convert-references` stage.
pub fn run_convert_references(config: &RunConfig) -> Result<ExternalReport> {
    let references_path = config.references_path();
    let references: ReferenceIndex = read_json(&references_path)?
        .with_context(|| format!("{} not found", references_path.display()))?;
    let mapping = ExternalMapping::load(&config.mapping_file)?;

    let report = convert_references(&mapping, &references);
    write_json(&config.external_references_path(), &report)?;
    info!("Done.");
    Ok(report)
}

/// The `involved-papers` stage.
pub fn run_involved_papers(config: &RunConfig, citations_variant: Option<&str>) -> Result<usize> {
    let (citations, references) = load_inputs(config, citations_variant)?;

    let all = involved_papers(&citations, &references);
    info!("Total number of involved papers: {}", all.len());

    let path = config.involved_papers_path();
    write_lines(&path, &all)?;
    info!("{} saved.", path.display());
    Ok(all.len())
}
