use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// Binary relevance labels for the active query's result set.
///
/// Labels are scoped to one query: the session clears the store whenever the
/// query text changes, and keeps it across result-count changes. Keys are
/// validated against the current result set at record time.
#[derive(Debug, Clone, Default)]
pub struct FeedbackStore {
    labels: BTreeMap<String, bool>,
}

impl FeedbackStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a judgment for a document in the current result set.
    ///
    /// `current_docnos` is the docno list of the most recent retrieval; a
    /// docno outside it is rejected so a stale click cannot silently label
    /// a document the user is no longer looking at.
    pub fn record(
        &mut self,
        docno: &str,
        relevant: bool,
        current_docnos: &[String],
    ) -> Result<()> {
        if !current_docnos.iter().any(|d| d == docno) {
            return Err(Error::NotInResults {
                docno: docno.to_string(),
            });
        }
        self.labels.insert(docno.to_string(), relevant);
        Ok(())
    }

    /// Invoked on every query-text change.
    pub fn clear(&mut self) {
        self.labels.clear();
    }

    /// The current label mapping, for the trainer.
    pub fn snapshot(&self) -> &BTreeMap<String, bool> {
        &self.labels
    }

    pub fn get(&self, docno: &str) -> Option<bool> {
        self.labels.get(docno).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }
}
