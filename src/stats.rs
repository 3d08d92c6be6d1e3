use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

pub fn progress_bar(len: usize, unit: &str) -> Result<ProgressBar> {
    let progress = ProgressBar::new(len as u64);
    progress.set_style(ProgressStyle::with_template(&format!(
        "[{{elapsed_precise}}] {{bar:50.cyan/blue}} {{pos:>7}}/{{len:7}} {} | {{msg}}",
        unit
    ))?);
    Ok(progress)
}

// ====== PROCESSING STATISTICS ======
#[derive(Debug, Default)]
pub struct ProcessingStats {
    pub records_scanned: AtomicU64,
    pub citation_edges: AtomicU64,
    pub focal_papers_found: AtomicU64,
    pub files_processed: AtomicU64,
    pub files_skipped: AtomicU64,
}

impl ProcessingStats {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn add_records(&self, n: u64) {
        self.records_scanned.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_edges(&self, n: u64) {
        self.citation_edges.fetch_add(n, Ordering::Relaxed);
    }

    pub fn progress_message(&self) -> String {
        format!(
            "{}M records | {} edges | {}",
            self.records_scanned.load(Ordering::Relaxed) / 1_000_000,
            self.citation_edges.load(Ordering::Relaxed),
            rss_summary()
        )
    }

    pub fn log_summary(&self) {
        info!("Final Processing Statistics:");
        info!("  Files processed: {}", self.files_processed.load(Ordering::Relaxed));
        info!("  Files skipped: {}", self.files_skipped.load(Ordering::Relaxed));
        info!("  Records scanned: {}", self.records_scanned.load(Ordering::Relaxed));
        info!("  Citation edges: {}", self.citation_edges.load(Ordering::Relaxed));
        info!("  Focal papers found: {}", self.focal_papers_found.load(Ordering::Relaxed));
    }
}

// ====== MEMORY MONITORING ======
fn resident_kb() -> Option<u64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    status
        .lines()
        .find(|line| line.starts_with("VmRSS:"))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|kb| kb.parse().ok())
}

pub fn rss_summary() -> String {
    match resident_kb() {
        Some(kb) => format!("{}MB RAM", kb / 1_000),
        None => "RAM unavailable".to_string(),
    }
}
