use std::path::{Path, PathBuf};

/// Paths and knobs for one pipeline invocation. Built once from the CLI
/// and handed to every stage by reference.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub corpus_root: PathBuf,
    pub output_dir: PathBuf,
    pub mapping_file: PathBuf,
    /// Widens the wanted set when present. Off unless asked for.
    pub secondary_mapping_file: Option<PathBuf>,
    /// Suffix for the citations checkpoint and its logs:
    /// `citations_<variant>.json`, `processed_files_<variant>.txt`.
    pub variant: Option<String>,
}

impl RunConfig {
    pub fn new(
        corpus_root: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        mapping_file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            corpus_root: corpus_root.into(),
            output_dir: output_dir.into(),
            mapping_file: mapping_file.into(),
            secondary_mapping_file: None,
            variant: None,
        }
    }

    pub fn with_secondary_mapping(mut self, path: Option<PathBuf>) -> Self {
        self.secondary_mapping_file = path;
        self
    }

    pub fn with_variant(mut self, variant: Option<String>) -> Self {
        self.variant = variant;
        self
    }

    fn output(&self, name: &str) -> PathBuf {
        self.output_dir.join(name)
    }

    pub fn citations_path(&self) -> PathBuf {
        citations_file(&self.output_dir, self.variant.as_deref())
    }

    /// Shards folded into this variant's checkpoint. Each variant keeps
    /// its own log so a resume only skips what its own checkpoint holds.
    pub fn processed_log_path(&self) -> PathBuf {
        self.output(&variant_name("processed_files", self.variant.as_deref(), "txt"))
    }

    pub fn skipped_log_path(&self) -> PathBuf {
        self.output(&variant_name("skipped_files", self.variant.as_deref(), "txt"))
    }

    pub fn references_path(&self) -> PathBuf {
        self.output("references.json")
    }

    pub fn di_values_path(&self) -> PathBuf {
        self.output("DI_values.json")
    }

    pub fn involved_papers_path(&self) -> PathBuf {
        self.output("all_involved_papers.txt")
    }

    pub fn external_citations_path(&self) -> PathBuf {
        self.output("scopus_to_alex_citations.json")
    }

    pub fn external_references_path(&self) -> PathBuf {
        self.output("scopus_to_alex_references.json")
    }

    pub fn di_parquet_path(&self) -> PathBuf {
        self.output("di_values.parquet")
    }

    pub fn citation_edges_parquet_path(&self) -> PathBuf {
        self.output("citation_edges.parquet")
    }
}

fn variant_name(stem: &str, variant: Option<&str>, extension: &str) -> String {
    match variant {
        Some(v) if !v.is_empty() => format!("{}_{}.{}", stem, v, extension),
        _ => format!("{}.{}", stem, extension),
    }
}

/// `citations.json` or `citations_<variant>.json` under `dir`.
pub fn citations_file(dir: &Path, variant: Option<&str>) -> PathBuf {
    dir.join(variant_name("citations", variant, "json"))
}

/// Sibling `.bak` path used for the single-generation checkpoint backup.
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".bak");
    PathBuf::from(name)
}
