//! Disruption index.
//!
//! For a focal paper `p`, with `C(p)` its citers and `C(R)` the citers of
//! any of its references:
//!
//! * `P_i = C(p) − C(R)` cite `p` only,
//! * `P_j = C(p) ∩ C(R)` cite `p` and its references,
//! * `P_k = C(R) − C(p)` cite the references only,
//!
//! and `DI(p) = (n_i − n_j) / (n_i + n_j + n_k)`, or 0 when the numerator
//! or the denominator is zero.

use anyhow::{Context, Result};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::info;

use crate::checkpoint::{read_json, write_json};
use crate::citations::CitationIndex;
use crate::config::{citations_file, RunConfig};
use crate::references::ReferenceIndex;

/// Paper ID to disruption score.
pub type DiResult = HashMap<String, f64>;

/// Degenerate scores go to `DI_values.json` as the integer `0`, all others
/// as floats.
#[derive(Debug, Clone, Copy)]
struct DiScore(f64);

impl Serialize for DiScore {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.0 == 0.0 {
            serializer.serialize_i64(0)
        } else {
            serializer.serialize_f64(self.0)
        }
    }
}

fn di_values_json(di_values: &DiResult) -> HashMap<&str, DiScore> {
    di_values
        .iter()
        .map(|(paper, score)| (paper.as_str(), DiScore(*score)))
        .collect()
}

/// The three disjoint citer sets around one focal paper.
#[derive(Debug, Default)]
pub struct Partition<'a> {
    pub focal_only: HashSet<&'a str>,
    pub both: HashSet<&'a str>,
    pub references_only: HashSet<&'a str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Disruption {
    pub n_i: usize,
    pub n_j: usize,
    pub n_k: usize,
    pub score: f64,
}

impl<'a> Partition<'a> {
    pub fn of(paper: &str, citations: &'a CitationIndex, references: &ReferenceIndex) -> Self {
        let citing_paper = citations.citer_set(paper);

        let mut citing_references = HashSet::new();
        for reference in references.get(paper).unwrap_or(&[]) {
            citing_references.extend(citations.citers(reference).iter().map(String::as_str));
        }

        Self {
            focal_only: citing_paper.difference(&citing_references).copied().collect(),
            both: citing_paper.intersection(&citing_references).copied().collect(),
            references_only: citing_references.difference(&citing_paper).copied().collect(),
        }
    }

    pub fn disruption(&self) -> Disruption {
        let (n_i, n_j, n_k) = (
            self.focal_only.len(),
            self.both.len(),
            self.references_only.len(),
        );
        Disruption {
            n_i,
            n_j,
            n_k,
            score: disruption_score(n_i, n_j, n_k),
        }
    }
}

pub fn disruption_score(n_i: usize, n_j: usize, n_k: usize) -> f64 {
    let total = n_i + n_j + n_k;
    if n_i == n_j || total == 0 {
        return 0.0;
    }
    (n_i as f64 - n_j as f64) / total as f64
}

/// Per-paper partition sizes and score for every focal paper.
pub fn compute_disruption(
    citations: &CitationIndex,
    references: &ReferenceIndex,
) -> HashMap<String, Disruption> {
    let focal: Vec<&String> = references.focal_papers().collect();
    focal
        .par_iter()
        .map(|paper| {
            let disruption = Partition::of(paper, citations, references).disruption();
            ((*paper).clone(), disruption)
        })
        .collect()
}

pub fn calculate_di(citations: &CitationIndex, references: &ReferenceIndex) -> DiResult {
    compute_disruption(citations, references)
        .into_iter()
        .map(|(paper, disruption)| (paper, disruption.score))
        .collect()
}

/// Reads `citations[_<variant>].json` and `references.json` from the
/// output directory. Both must come from compatible snapshots.
pub fn load_inputs(
    config: &RunConfig,
    citations_variant: Option<&str>,
) -> Result<(CitationIndex, ReferenceIndex)> {
    let citations_path = citations_file(&config.output_dir, citations_variant);
    info!("Loading citations from {}...", citations_path.display());
    let citations: CitationIndex = read_json(&citations_path)?
        .with_context(|| format!("{} not found", citations_path.display()))?;
    info!("Done.");

    let references_path = config.references_path();
    info!("Loading references from {}...", references_path.display());
    let references: ReferenceIndex = read_json(&references_path)?
        .with_context(|| format!("{} not found", references_path.display()))?;
    info!("Done.");

    Ok((citations, references))
}

/// The `calculate-di` stage: writes `DI_values.json`.
pub fn run_calculate_di(config: &RunConfig, citations_variant: Option<&str>) -> Result<DiResult> {
    let (citations, references) = load_inputs(config, citations_variant)?;

    let di_values = calculate_di(&citations, &references);
    info!("DI calculation finished for {} papers", di_values.len());

    let path = config.di_values_path();
    write_json(&path, &di_values_json(&di_values))?;
    info!("{} saved.", path.display());
    Ok(di_values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn citations(pairs: &[(&str, &[&str])]) -> CitationIndex {
        let mut index = CitationIndex::default();
        for (target, citers) in pairs {
            for citer in *citers {
                index.add_citer(target, citer);
            }
        }
        index
    }

    fn references(pairs: &[(&str, &[&str])]) -> ReferenceIndex {
        let mut index = ReferenceIndex::default();
        for (paper, refs) in pairs {
            let refs = refs.iter().map(|r| r.to_string()).collect();
            index.insert(paper.to_string(), refs, Path::new("t.gz")).unwrap();
        }
        index
    }

    #[test]
    fn test_consolidating_paper() {
        let cit = citations(&[("A", &["X"]), ("B", &["X", "Z"])]);
        let refs = references(&[("A", &["B", "C"])]);

        let partition = Partition::of("A", &cit, &refs);
        assert!(partition.focal_only.is_empty());
        assert_eq!(partition.both, HashSet::from(["X"]));
        assert_eq!(partition.references_only, HashSet::from(["Z"]));

        let d = partition.disruption();
        assert_eq!((d.n_i, d.n_j, d.n_k), (0, 1, 1));
        assert_eq!(d.score, -0.5);
        assert_eq!(calculate_di(&cit, &refs)["A"], -0.5);
    }

    #[test]
    fn test_uncited_paper_scores_zero() {
        let cit = citations(&[("B", &[])]);
        let refs = references(&[("A", &["B", "C"])]);
        let d = Partition::of("A", &cit, &refs).disruption();
        assert_eq!((d.n_i, d.n_j, d.n_k), (0, 0, 0));
        assert_eq!(d.score, 0.0);
    }

    #[test]
    fn test_disruptive_paper() {
        let cit = citations(&[("A", &["X", "Y", "W"]), ("B", &["W", "Q"])]);
        let refs = references(&[("A", &["B"])]);
        let d = Partition::of("A", &cit, &refs).disruption();
        assert_eq!((d.n_i, d.n_j, d.n_k), (2, 1, 1));
        assert_eq!(d.score, 0.25);
    }

    #[test]
    fn test_duplicate_citers_count_once() {
        let cit = citations(&[("A", &["X", "X", "Y"]), ("B", &["Y", "Y"])]);
        let refs = references(&[("A", &["B"])]);
        let d = Partition::of("A", &cit, &refs).disruption();
        assert_eq!((d.n_i, d.n_j, d.n_k), (1, 1, 0));
        assert_eq!(d.score, 0.0);
    }

    #[test]
    fn test_partition_is_disjoint_and_complete() {
        let cit = citations(&[
            ("A", &["1", "2", "3", "4"]),
            ("B", &["3", "5"]),
            ("C", &["4", "6", "7"]),
        ]);
        let refs = references(&[("A", &["B", "C", "D"])]);
        let p = Partition::of("A", &cit, &refs);

        assert!(p.focal_only.is_disjoint(&p.both));
        assert!(p.focal_only.is_disjoint(&p.references_only));
        assert!(p.both.is_disjoint(&p.references_only));

        let union: HashSet<&str> = p
            .focal_only
            .iter()
            .chain(&p.both)
            .chain(&p.references_only)
            .copied()
            .collect();
        let expected: HashSet<&str> = ["1", "2", "3", "4", "5", "6", "7"].into_iter().collect();
        assert_eq!(union, expected);
    }

    #[test]
    fn test_score_bounds() {
        assert_eq!(disruption_score(0, 0, 0), 0.0);
        assert_eq!(disruption_score(3, 3, 10), 0.0);
        assert_eq!(disruption_score(0, 0, 5), 0.0);
        for (i, j, k) in [(1, 0, 0), (0, 1, 0), (5, 2, 9), (0, 7, 1)] {
            let score = disruption_score(i, j, k);
            assert!(score > -1.0 - f64::EPSILON && score < 1.0 + f64::EPSILON);
            assert_ne!(score, 0.0);
        }
    }

    #[test]
    fn test_only_reference_collected_papers_scored() {
        let cit = citations(&[("A", &["X"]), ("Q", &["X"])]);
        let refs = references(&[("A", &[])]);
        let di = calculate_di(&cit, &refs);
        assert_eq!(di.len(), 1);
        assert_eq!(di["A"], 1.0);
    }

    #[test]
    fn test_degenerate_score_written_as_integer_zero() {
        let di: DiResult = [("A", 0.0), ("B", -0.5), ("C", 1.0)]
            .into_iter()
            .map(|(paper, score)| (paper.to_string(), score))
            .collect();
        let json = serde_json::to_value(di_values_json(&di)).unwrap();

        assert!(json["A"].is_i64());
        assert_eq!(json["A"], 0);
        assert_eq!(json["B"].as_f64(), Some(-0.5));
        assert!(json["C"].is_f64());

        let single: DiResult = [("A".to_string(), 0.0)].into_iter().collect();
        let text = serde_json::to_string(&di_values_json(&single)).unwrap();
        assert_eq!(text, r#"{"A":0}"#);

        let restored: DiResult = serde_json::from_str(&text).unwrap();
        assert_eq!(restored["A"], 0.0);
    }
}
