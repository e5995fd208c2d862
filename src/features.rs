use crate::{
    error::{Error, Result},
    table_store::TableRecord,
};

/// Number of text fields a term is counted against.
pub const NUM_FIELDS: usize = 6;

/// Display labels for the six fields, in matrix column order.
pub const FIELD_LABELS: [&str; NUM_FIELDS] = [
    "Page title",
    "Table title",
    "Table header",
    "Table content",
    "Context before",
    "Context after",
];

/// Split a query into its terms.
///
/// Splits on single spaces, so an empty query yields one empty-string term
/// and the term count always equals `spaces + 1`. The term count is what
/// fixes the feature-matrix shape for the whole session.
pub fn query_terms(query: &str) -> Vec<String> {
    query.split(' ').map(str::to_string).collect()
}

/// A term × field occurrence-count matrix for one document.
///
/// Row-major storage: `data[term * NUM_FIELDS + field]`. The flatten/reshape
/// pair below is the contract the trainer and the rerank head rely on; it is
/// tested, not incidental.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureMatrix {
    num_terms: usize,
    data: Vec<u32>,
}

impl FeatureMatrix {
    pub fn new(num_terms: usize, data: Vec<u32>) -> Self {
        assert_eq!(
            data.len(),
            num_terms * NUM_FIELDS,
            "data length must equal num_terms * NUM_FIELDS"
        );
        Self { num_terms, data }
    }

    /// Rebuild a matrix from a row-major flat vector.
    ///
    /// The length must be exactly `num_terms * NUM_FIELDS`; anything else is
    /// a shape error, never a truncation or padding.
    pub fn from_flat(num_terms: usize, data: Vec<u32>) -> Result<Self> {
        if data.len() != num_terms * NUM_FIELDS {
            return Err(Error::ShapeMismatch {
                expected: num_terms,
                actual: data.len() / NUM_FIELDS,
            });
        }
        Ok(Self { num_terms, data })
    }

    pub fn num_terms(&self) -> usize {
        self.num_terms
    }

    pub fn get(&self, term: usize, field: usize) -> u32 {
        self.data[term * NUM_FIELDS + field]
    }

    /// Row-major flat view: term-major, field-minor.
    pub fn flat(&self) -> &[u32] {
        &self.data
    }

    /// Row-major flat copy as model inputs.
    pub fn flatten(&self) -> Vec<f64> {
        self.data.iter().map(|&v| v as f64).collect()
    }
}

/// Count case-insensitive, non-overlapping occurrences of `term` in `text`.
fn count_in(text: &str, term: &str) -> u32 {
    let text = text.to_lowercase();
    let term = term.to_lowercase();
    text.matches(term.as_str()).count() as u32
}

/// Compute the feature matrix for one record against the query terms.
///
/// M[i][j] = substring count of term i in field j, fields in
/// [`FIELD_LABELS`] order. Empty field text gives 0 down that column.
pub fn extract_features(record: &TableRecord, terms: &[String]) -> FeatureMatrix {
    let header = record.header().join(" ");
    let content = record
        .rows()
        .iter()
        .map(|row| row.join(" "))
        .collect::<Vec<_>>()
        .join(" ");

    let fields: [&str; NUM_FIELDS] = [
        &record.page_title,
        &record.title,
        &header,
        &content,
        &record.text_before,
        &record.text_after,
    ];

    let mut data = Vec::with_capacity(terms.len() * NUM_FIELDS);
    for term in terms {
        for field in &fields {
            data.push(count_in(field, term));
        }
    }

    FeatureMatrix::new(terms.len(), data)
}
