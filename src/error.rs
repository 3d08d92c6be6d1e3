use std::path::PathBuf;

use thiserror::Error;

/// Fatal conditions the pipeline refuses to paper over.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Malformed mapping line {line_number} in {}: {line:?}", path.display())]
    MalformedMappingLine {
        path: PathBuf,
        line_number: usize,
        line: String,
    },

    #[error("Mapping file {} has no header line", path.display())]
    MissingMappingHeader { path: PathBuf },

    #[error("Duplicate ID: {id} (seen again in {})", shard.display())]
    DuplicateFocalPaper { id: String, shard: PathBuf },
}
