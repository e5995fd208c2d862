use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Redb(#[from] redb::Error),

    #[error("database open error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("database storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("database transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("database table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("database commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("search index error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),

    #[error("record decode error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("data directory does not exist and could not be created: {0}")]
    DataDir(PathBuf),

    /// The index returned a docno the table store does not hold. Dropping it
    /// silently would desynchronize the score and feature lists, so the
    /// pipeline refuses to continue.
    #[error("document '{docno}' is indexed but missing from the table store")]
    MissingDocument { docno: String },

    #[error("document '{docno}' is not in the current result set")]
    NotInResults { docno: String },

    #[error("nothing to train on: no feedback for the current result set")]
    NoFeedback,

    #[error("no model trained for the current query")]
    NoModel,

    #[error(
        "feature shape mismatch: model was trained with {expected} query terms, got {actual}"
    )]
    ShapeMismatch { expected: usize, actual: usize },
}
