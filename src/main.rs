use anyhow::Result;
use clap::{Parser, Subcommand};
use std::fs::create_dir_all;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, warn};

use openalex_disruption::citations::collect_citations;
use openalex_disruption::disruption::run_calculate_di;
use openalex_disruption::export::run_export;
use openalex_disruption::references::collect_references;
use openalex_disruption::report::{
    run_convert_references, run_involved_papers, run_process_citations,
};
use openalex_disruption::stats::ProcessingStats;
use openalex_disruption::{CollectOptions, RunConfig};

#[derive(Parser)]
#[command(name = "openalex_disruption")]
#[command(about = "Disruption index over an OpenAlex works snapshot")]
struct Cli {
    /// Directory containing the works shards (*.gz)
    #[arg(short, long, default_value = "../download/openalex-snapshot/data/works")]
    input_dir: PathBuf,

    /// Output directory for checkpoints and reports
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,

    /// External ID to OpenAlex ID mapping file
    #[arg(short, long, default_value = "../map_novelty_pap_alex/scopus_id_to_alex.txt")]
    mapping_file: PathBuf,

    /// Second mapping file whose IDs widen the target set
    #[arg(long)]
    secondary_mapping_file: Option<PathBuf>,

    /// Number of parallel workers (default: all cores, capped at 32)
    #[arg(short, long)]
    workers: Option<usize>,

    #[command(subcommand)]
    stage: Stage,
}

#[derive(Subcommand)]
enum Stage {
    /// Scan every shard for papers citing the targets, checkpointing per shard
    CollectCitations {
        /// Write citations_<variant>.json (and variant-scoped logs) instead of citations.json
        #[arg(long)]
        variant: Option<String>,

        /// Restore the checkpoint and skip shards in the processed log
        #[arg(long)]
        resume: bool,

        /// Record unreadable shards in the skipped log instead of aborting
        #[arg(long)]
        skip_corrupt: bool,
    },
    /// Record the reference list of every target paper
    CollectReferences,
    /// Compute DI_values.json from a citations file and references.json
    CalculateDi {
        /// Read citations_<variant>.json
        #[arg(long)]
        citations_variant: Option<String>,
    },
    /// List every paper involved in the DI computation
    InvolvedPapers {
        #[arg(long)]
        citations_variant: Option<String>,
    },
    /// Citations keyed by external ID
    ProcessCitations {
        #[arg(long)]
        variant: Option<String>,
    },
    /// References keyed by external ID
    ConvertReferences,
    /// Export DI values and citation edges as Parquet
    Export {
        #[arg(long)]
        citations_variant: Option<String>,

        /// Rows per Parquet batch
        #[arg(short, long, default_value = "1000000")]
        batch_size: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Cli::parse();

    let max_workers = num_cpus::get();
    let num_workers = args.workers.unwrap_or(std::cmp::min(max_workers, 32));
    info!("Using {} workers (max available: {})", num_workers, max_workers);

    rayon::ThreadPoolBuilder::new()
        .num_threads(num_workers)
        .thread_name(|i| format!("disruption-worker-{}", i))
        .build_global()?;

    create_dir_all(&args.output_dir)?;
    info!("Output directory: {}", args.output_dir.display());

    let config = RunConfig::new(&args.input_dir, &args.output_dir, &args.mapping_file)
        .with_secondary_mapping(args.secondary_mapping_file.clone());
    if let Some(secondary) = &config.secondary_mapping_file {
        warn!(
            "Target set widened with {}; citations will not match a primary-only run",
            secondary.display()
        );
    }

    let started = Instant::now();
    let stats = ProcessingStats::new();

    match args.stage {
        Stage::CollectCitations {
            variant,
            resume,
            skip_corrupt,
        } => {
            let config = config.with_variant(variant);
            let options = CollectOptions {
                resume,
                skip_corrupt,
                parallel_shards: num_workers,
            };
            collect_citations(&config, &options, &stats)?;
            stats.log_summary();
        }
        Stage::CollectReferences => {
            collect_references(&config, &stats)?;
            stats.log_summary();
        }
        Stage::CalculateDi { citations_variant } => {
            run_calculate_di(&config, citations_variant.as_deref())?;
        }
        Stage::InvolvedPapers { citations_variant } => {
            run_involved_papers(&config, citations_variant.as_deref())?;
        }
        Stage::ProcessCitations { variant } => {
            run_process_citations(&config.with_variant(variant))?;
        }
        Stage::ConvertReferences => {
            run_convert_references(&config)?;
        }
        Stage::Export {
            citations_variant,
            batch_size,
        } => {
            run_export(&config, citations_variant.as_deref(), batch_size)?;
        }
    }

    info!("Finished in {:.1?}", started.elapsed());
    Ok(())
}
