use std::collections::HashMap;

use crate::{
    error::Result,
    feedback::FeedbackStore,
    features::FeatureMatrix,
    pipeline::{Candidate, features_of},
    table_store::TableStore,
};

/// The display bundle for one ranked document: store content joined with
/// the candidate's current score and feature matrix.
#[derive(Debug, Clone)]
pub struct ResultBundle {
    pub docno: String,
    pub page_title: String,
    pub table_title: String,
    pub url: String,
    pub text_before: String,
    pub text_after: String,
    /// Score after the stage chain (base, filtered, or learned).
    pub score: f32,
    /// Cached learned score from the last training, if any.
    pub ltr_score: Option<f32>,
    /// The user's judgment for this document, if any.
    pub feedback: Option<bool>,
    /// De-duplicated header row.
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub features: FeatureMatrix,
}

/// Disambiguate repeated header names with a numeric suffix.
///
/// Walks right to left; each duplicate gets the count of occurrences still
/// remaining at that point, so the rightmost duplicate carries the highest
/// suffix and the first occurrence keeps its original label:
/// `["a", "b", "a", "a"]` becomes `["a", "b", "a2", "a3"]`.
pub fn dedupe_header(cols: &[&str]) -> Vec<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for &name in cols {
        *counts.entry(name).or_insert(0) += 1;
    }

    let mut out: Vec<String> = cols.iter().map(|s| s.to_string()).collect();
    for i in (0..cols.len()).rev() {
        let remaining = counts.get_mut(cols[i]).unwrap();
        if *remaining > 1 {
            out[i] = format!("{}{}", cols[i], remaining);
            *remaining -= 1;
        }
    }
    out
}

/// Join ranked candidates with store content into display bundles.
///
/// Order follows the candidate list. A docno missing from the store is a
/// hard error, surfaced from the store lookup itself.
pub fn assemble(
    candidates: &[Candidate],
    store: &TableStore,
    ltr_scores: &HashMap<String, f32>,
    feedback: &FeedbackStore,
) -> Result<Vec<ResultBundle>> {
    let docnos: Vec<String> =
        candidates.iter().map(|c| c.docno.clone()).collect();
    let records = store.get_many(&docnos)?;

    let mut bundles = Vec::with_capacity(candidates.len());
    for (candidate, record) in candidates.iter().zip(records) {
        let header = dedupe_header(&record.header());
        let rows = record
            .rows()
            .iter()
            .map(|row| row.iter().map(|cell| cell.to_string()).collect())
            .collect();

        bundles.push(ResultBundle {
            docno: candidate.docno.clone(),
            page_title: record.page_title,
            table_title: record.title,
            url: record.url,
            text_before: record.text_before,
            text_after: record.text_after,
            score: candidate.score,
            ltr_score: ltr_scores.get(&candidate.docno).copied(),
            feedback: feedback.get(&candidate.docno),
            header,
            rows,
            features: features_of(candidate)?.clone(),
        });
    }

    Ok(bundles)
}
