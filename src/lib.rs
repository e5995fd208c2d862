//! tabrank - interactive table search with relevance-feedback reranking.
//!
//! tabrank retrieves web tables from a [Tantivy](https://github.com/quickwit-oss/tantivy)
//! BM25 index, enriches every candidate with a per-term/per-field count
//! matrix, lets the user blacklist source domains, and trains a random-forest
//! regressor on binary relevance feedback whose predictions become a new
//! scoring stage in the same pipeline.
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use tabrank::{Session, SearchIndex, TableStore};
//!
//! let store = TableStore::open("tables.redb".as_ref()).unwrap();
//! let index = SearchIndex::open("tantivy".as_ref()).unwrap();
//!
//! let mut session = Session::new(Arc::new(index), Arc::new(store));
//! session.set_query("red chair").unwrap();
//!
//! for bundle in session.bundles().unwrap() {
//!     println!("#{} (score: {:.3})", bundle.docno, bundle.score);
//! }
//!
//! // judge two results, train, rerank
//! let first = session.candidates()[0].docno.clone();
//! session.mark(&first, true).unwrap();
//! session.apply_feedback().unwrap();
//! session.rerank().unwrap();
//! ```

pub mod assemble;
pub mod data_dir;
pub mod domain;
pub mod error;
pub mod features;
pub mod feedback;
pub mod forest;
pub mod ingestion;
pub mod ltr;
pub mod pipeline;
pub mod session;
pub mod shell;
pub mod stats;
pub mod table_store;
pub mod tantivy_index;

pub use assemble::ResultBundle;
pub use data_dir::DataDir;
pub use domain::DomainFilterSet;
pub use error::{Error, Result};
pub use features::FeatureMatrix;
pub use session::Session;
pub use table_store::{TableRecord, TableStore};
pub use tantivy_index::SearchIndex;
