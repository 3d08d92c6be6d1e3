//! Disruption index over an OpenAlex works snapshot.
//!
//! The pipeline runs one stage per invocation: a resumable citation pass
//! over every shard, a reference pass for the focal papers, then the
//! disruption computation and the reports built on the two JSON outputs.

pub mod checkpoint;
pub mod citations;
pub mod config;
pub mod corpus;
pub mod disruption;
pub mod error;
pub mod export;
pub mod mapping;
pub mod references;
pub mod report;
pub mod stats;

pub use citations::{CitationIndex, CollectOptions};
pub use config::RunConfig;
pub use disruption::{calculate_di, DiResult, Disruption};
pub use error::PipelineError;
pub use references::ReferenceIndex;
