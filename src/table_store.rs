use std::path::Path;

use redb::{
    Database,
    ReadableDatabase,
    ReadableTable,
    ReadableTableMetadata,
    TableDefinition,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const TABLES: TableDefinition<&str, &str> = TableDefinition::new("tables");

/// One web table and its page context, as dumped by the corpus extractor.
///
/// `relation` is column-major: each inner vector is one column, and element 0
/// of every column is its header cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableRecord {
    pub docno: String,
    #[serde(default)]
    pub page_title: String,
    /// Table title (caption), distinct from the page title.
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub text_before: String,
    #[serde(default)]
    pub text_after: String,
    #[serde(default)]
    pub relation: Vec<Vec<String>>,
}

impl TableRecord {
    /// The header row: element 0 of every column.
    pub fn header(&self) -> Vec<&str> {
        self.relation
            .iter()
            .map(|col| col.first().map(String::as_str).unwrap_or(""))
            .collect()
    }

    /// Data rows, in row order. Ragged columns yield empty cells.
    pub fn rows(&self) -> Vec<Vec<&str>> {
        let height = self
            .relation
            .iter()
            .map(Vec::len)
            .max()
            .unwrap_or(0);
        (1..height)
            .map(|row| {
                self.relation
                    .iter()
                    .map(|col| col.get(row).map(String::as_str).unwrap_or(""))
                    .collect()
            })
            .collect()
    }
}

/// Stores table records keyed by docno, JSON-encoded.
pub struct TableStore {
    db: Database,
}

impl TableStore {
    /// Open or create a table store at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path)?;

        let txn = db.begin_write()?;
        txn.open_table(TABLES)?;
        txn.commit()?;

        Ok(Self { db })
    }

    pub fn insert(&self, record: &TableRecord) -> Result<()> {
        let encoded = serde_json::to_string(record)?;
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(TABLES)?;
            table.insert(record.docno.as_str(), encoded.as_str())?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Insert multiple records in a single transaction.
    pub fn batch_insert(&self, records: &[TableRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(TABLES)?;
            for record in records {
                let encoded = serde_json::to_string(record)?;
                table.insert(record.docno.as_str(), encoded.as_str())?;
            }
        }
        txn.commit()?;
        Ok(())
    }

    pub fn get(&self, docno: &str) -> Result<Option<TableRecord>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(TABLES)?;
        match table.get(docno)? {
            Some(guard) => Ok(Some(serde_json::from_str(guard.value())?)),
            None => Ok(None),
        }
    }

    /// Fetch records for every docno, preserving input order.
    ///
    /// A docno absent from the store is a data-consistency error: the index
    /// and the store have diverged, and the caller's score and feature lists
    /// are positional.
    pub fn get_many(&self, docnos: &[String]) -> Result<Vec<TableRecord>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(TABLES)?;

        let mut records = Vec::with_capacity(docnos.len());
        for docno in docnos {
            match table.get(docno.as_str())? {
                Some(guard) => records.push(serde_json::from_str(guard.value())?),
                None => {
                    return Err(Error::MissingDocument {
                        docno: docno.clone(),
                    });
                }
            }
        }
        Ok(records)
    }

    pub fn list_docnos(&self) -> Result<Vec<String>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(TABLES)?;
        let mut result = Vec::new();
        for entry in table.iter()? {
            let (k, _) = entry?;
            result.push(k.value().to_string());
        }
        Ok(result)
    }

    pub fn len(&self) -> Result<usize> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(TABLES)?;
        Ok(table.len()? as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

impl std::fmt::Debug for TableStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableStore").finish_non_exhaustive()
    }
}
