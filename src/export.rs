use anyhow::Result;
use arrow::array::{ArrayRef, Float64Array, StringArray, UInt64Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::citations::CitationIndex;
use crate::config::RunConfig;
use crate::disruption::{compute_disruption, load_inputs, Disruption};

// Macro for creating Arrow schema fields
macro_rules! field {
    ($name:expr, $data_type:expr) => {
        Field::new($name, $data_type, true)
    };
    ($name:expr, $data_type:expr, $nullable:expr) => {
        Field::new($name, $data_type, $nullable)
    };
}

// Macro for creating schemas with less boilerplate
macro_rules! schema {
    ($($name:expr => $data_type:expr $(, $nullable:expr)?);* $(;)?) => {
        Schema::new(vec![
            $(field!($name, $data_type $(, $nullable)?),)*
        ])
    };
}

// Macro for creating string arrays from record fields
macro_rules! string_array {
    ($records:expr, $field:ident) => {
        Arc::new(StringArray::from_iter_values(
            $records.iter().map(|r| &r.$field),
        )) as ArrayRef
    };
}

macro_rules! uint64_array {
    ($records:expr, $field:ident) => {
        Arc::new(UInt64Array::from_iter_values(
            $records.iter().map(|r| r.$field as u64),
        )) as ArrayRef
    };
}

macro_rules! record_batch {
    ($schema:expr, $($array:expr),* $(,)?) => {
        RecordBatch::try_new(Arc::new($schema), vec![$($array,)*])
    };
}

#[derive(Debug, Clone)]
pub struct DiRow {
    pub paper_id: String,
    pub di: f64,
    pub n_i: usize,
    pub n_j: usize,
    pub n_k: usize,
}

/// One citer → cited target edge.
#[derive(Debug, Clone)]
pub struct CitationEdge {
    pub work_id: String,
    pub referenced_work_id: String,
}

fn di_schema() -> Schema {
    schema! {
        "paper_id" => DataType::Utf8, false;
        "di" => DataType::Float64, false;
        "n_i" => DataType::UInt64, false;
        "n_j" => DataType::UInt64, false;
        "n_k" => DataType::UInt64, false;
    }
}

fn citation_edges_schema() -> Schema {
    schema! {
        "work_id" => DataType::Utf8, false;
        "referenced_work_id" => DataType::Utf8, false;
    }
}

fn di_to_record_batch(records: Vec<DiRow>) -> Result<RecordBatch> {
    let batch = record_batch!(
        di_schema(),
        string_array!(records, paper_id),
        Arc::new(Float64Array::from_iter_values(records.iter().map(|r| r.di))) as ArrayRef,
        uint64_array!(records, n_i),
        uint64_array!(records, n_j),
        uint64_array!(records, n_k),
    )?;

    Ok(batch)
}

fn citations_to_record_batch(records: Vec<CitationEdge>) -> Result<RecordBatch> {
    let batch = record_batch!(
        citation_edges_schema(),
        string_array!(records, work_id),
        string_array!(records, referenced_work_id),
    )?;

    Ok(batch)
}

fn create_parquet_writer(output_path: &Path, schema: Schema) -> Result<ArrowWriter<File>> {
    let file = File::create(output_path)?;
    let props = WriterProperties::builder()
        .set_compression(parquet::basic::Compression::SNAPPY)
        .set_max_row_group_size(1_000_000)
        .build();

    let writer = ArrowWriter::try_new(file, Arc::new(schema), Some(props))?;
    Ok(writer)
}

fn write_parquet_batch<T>(
    writer: &mut ArrowWriter<File>,
    records: Vec<T>,
    to_record_batch: fn(Vec<T>) -> Result<RecordBatch>,
) -> Result<()> {
    if records.is_empty() {
        return Ok(());
    }

    let batch = to_record_batch(records)?;
    writer.write(&batch)?;
    Ok(())
}

/// Writes one row per focal paper, sorted by paper ID.
pub fn export_di(path: &Path, disruption: &HashMap<String, Disruption>) -> Result<usize> {
    let mut rows: Vec<DiRow> = disruption
        .iter()
        .map(|(paper_id, d)| DiRow {
            paper_id: paper_id.clone(),
            di: d.score,
            n_i: d.n_i,
            n_j: d.n_j,
            n_k: d.n_k,
        })
        .collect();
    rows.sort_by(|a, b| a.paper_id.cmp(&b.paper_id));
    let count = rows.len();

    let mut writer = create_parquet_writer(path, di_schema())?;
    write_parquet_batch(&mut writer, rows, di_to_record_batch)?;
    writer.close()?;
    Ok(count)
}

/// Flattens the citation index into edges, flushing every `batch_size`.
pub fn export_citation_edges(
    path: &Path,
    citations: &CitationIndex,
    batch_size: usize,
) -> Result<usize> {
    let batch_size = batch_size.max(1);
    let mut writer = create_parquet_writer(path, citation_edges_schema())?;
    let mut buffer = Vec::with_capacity(batch_size);
    let mut count = 0;

    for (target, citers) in citations.iter() {
        for citer in citers {
            buffer.push(CitationEdge {
                work_id: citer.clone(),
                referenced_work_id: target.clone(),
            });
            if buffer.len() >= batch_size {
                count += buffer.len();
                write_parquet_batch(&mut writer, std::mem::take(&mut buffer), citations_to_record_batch)?;
            }
        }
    }
    count += buffer.len();
    write_parquet_batch(&mut writer, buffer, citations_to_record_batch)?;

    writer.close()?;
    Ok(count)
}

/// The `export` stage: `di_values.parquet` and `citation_edges.parquet`.
pub fn run_export(
    config: &RunConfig,
    citations_variant: Option<&str>,
    batch_size: usize,
) -> Result<()> {
    let (citations, references) = load_inputs(config, citations_variant)?;

    let disruption = compute_disruption(&citations, &references);
    let rows = export_di(&config.di_parquet_path(), &disruption)?;
    info!("Wrote {} DI rows to {}", rows, config.di_parquet_path().display());

    let edges = export_citation_edges(&config.citation_edges_parquet_path(), &citations, batch_size)?;
    info!(
        "Wrote {} citation edges to {}",
        edges,
        config.citation_edges_parquet_path().display()
    );
    info!("Done.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use parquet::file::reader::{FileReader, SerializedFileReader};
    use tempfile::TempDir;

    fn row_count(path: &Path) -> i64 {
        let reader = SerializedFileReader::new(File::open(path).unwrap()).unwrap();
        reader.metadata().file_metadata().num_rows()
    }

    #[test]
    fn test_export_citation_edges_in_small_batches() {
        let dir = TempDir::new().unwrap();
        let mut citations = CitationIndex::default();
        citations.add_citer("A", "X");
        citations.add_citer("A", "Y");
        citations.add_citer("B", "X");

        let path = dir.path().join("edges.parquet");
        assert_eq!(export_citation_edges(&path, &citations, 2).unwrap(), 3);
        assert_eq!(row_count(&path), 3);
    }

    #[test]
    fn test_export_di_rows() {
        let dir = TempDir::new().unwrap();
        let disruption: HashMap<String, Disruption> = [
            ("A".to_string(), Disruption { n_i: 0, n_j: 1, n_k: 1, score: -0.5 }),
            ("B".to_string(), Disruption { n_i: 0, n_j: 0, n_k: 0, score: 0.0 }),
        ]
        .into_iter()
        .collect();

        let path = dir.path().join("di.parquet");
        assert_eq!(export_di(&path, &disruption).unwrap(), 2);
        assert_eq!(row_count(&path), 2);
    }

    #[test]
    fn test_empty_index_writes_empty_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("edges.parquet");
        assert_eq!(export_citation_edges(&path, &CitationIndex::default(), 10).unwrap(), 0);
        assert_eq!(row_count(&path), 0);
    }
}
