use std::path::Path;

use rayon::prelude::*;

use crate::{
    error::{Error, Result},
    table_store::{TableRecord, TableStore},
    tantivy_index::SearchIndex,
};

const WRITER_MEMORY_BUDGET: usize = 15_000_000;

/// Ingest a JSONL corpus dump: one table record per line, camelCase field
/// names as produced by the corpus extractor.
///
/// Records land in the store and the index in one pass; the index commit
/// happens once at the end. A malformed line aborts the whole ingest with
/// its line number.
pub fn ingest_path(
    store: &TableStore,
    index: &SearchIndex,
    path: &Path,
) -> Result<usize> {
    let content = std::fs::read_to_string(path)?;
    ingest_jsonl(store, index, &content)
}

/// Parse and ingest JSONL content. Blank lines are skipped.
pub fn ingest_jsonl(
    store: &TableStore,
    index: &SearchIndex,
    content: &str,
) -> Result<usize> {
    let numbered: Vec<(usize, &str)> = content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .collect();

    // Parse in parallel, then index sequentially through one writer.
    let records: Result<Vec<TableRecord>> = numbered
        .par_iter()
        .map(|(lineno, line)| {
            serde_json::from_str::<TableRecord>(line).map_err(|e| {
                Error::Config(format!(
                    "line {}: invalid table record: {e}",
                    lineno + 1
                ))
            })
        })
        .collect();
    let records = records?;

    ingest_records(store, index, &records)?;
    Ok(records.len())
}

/// Store and index a batch of already-parsed records.
pub fn ingest_records(
    store: &TableStore,
    index: &SearchIndex,
    records: &[TableRecord],
) -> Result<()> {
    if records.is_empty() {
        return Ok(());
    }

    store.batch_insert(records)?;

    let mut writer = index.writer(WRITER_MEMORY_BUDGET)?;
    for record in records {
        index.add_record(&writer, record)?;
    }
    writer.commit()?;

    Ok(())
}
