use std::collections::HashMap;
use std::sync::Arc;

use crate::{
    assemble::{ResultBundle, assemble},
    domain::DomainFilterSet,
    error::{Error, Result},
    feedback::FeedbackStore,
    features::{FeatureMatrix, query_terms},
    forest::ForestParams,
    ltr::{self, ImportanceMatrix, RerankHead, TrainedModel},
    pipeline::{Candidate, RetrievalPipeline, Stage, features_of},
    stats::{self, DomainStat},
    table_store::TableStore,
    tantivy_index::SearchIndex,
};

/// All per-session state, held explicitly and passed nowhere else.
///
/// One session owns one query, its feedback, its domain filter choices and
/// its trained model; two sessions never share mutable state. The index and
/// store behind the pipeline are shared read-only.
///
/// Every user action maps to one method, and each method leaves the session
/// internally consistent: query changes drop feedback, model and cached
/// learned scores; result-count changes recompute the candidate set but
/// keep feedback; training and reranking refuse to run on state that is
/// not there.
pub struct Session {
    pipeline: RetrievalPipeline,
    query: String,
    terms: Vec<String>,
    num_results: usize,
    filter: DomainFilterSet,
    feedback: FeedbackStore,
    model: Option<Arc<TrainedModel>>,
    candidates: Vec<Candidate>,
    ltr_scores: HashMap<String, f32>,
    forest_params: ForestParams,
}

impl Session {
    pub const DEFAULT_NUM_RESULTS: usize = 5;

    pub fn new(index: Arc<SearchIndex>, store: Arc<TableStore>) -> Self {
        Self {
            pipeline: RetrievalPipeline::new(index, store),
            query: String::new(),
            terms: query_terms(""),
            num_results: Self::DEFAULT_NUM_RESULTS,
            filter: DomainFilterSet::new(),
            feedback: FeedbackStore::new(),
            model: None,
            candidates: Vec::new(),
            ltr_scores: HashMap::new(),
            forest_params: ForestParams::default(),
        }
    }

    pub fn with_forest_params(mut self, params: ForestParams) -> Self {
        self.forest_params = params;
        self
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    pub fn num_results(&self) -> usize {
        self.num_results
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn filter(&self) -> &DomainFilterSet {
        &self.filter
    }

    pub fn feedback(&self) -> &FeedbackStore {
        &self.feedback
    }

    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }

    /// Change the query text. Clears feedback, the trained model and cached
    /// learned scores, then recomputes the result set.
    pub fn set_query(&mut self, text: &str) -> Result<()> {
        self.query = text.to_string();
        self.terms = query_terms(text);
        self.feedback.clear();
        self.model = None;
        self.ltr_scores.clear();
        self.refresh()
    }

    /// Change the result limit. Feedback is preserved; the result set is
    /// recomputed from scratch.
    pub fn set_num_results(&mut self, n: usize) -> Result<()> {
        self.num_results = n;
        self.refresh()
    }

    /// Flip the blacklist flag of a domain and recompute base results.
    pub fn set_domain_filter(
        &mut self,
        domain: &str,
        blacklisted: bool,
    ) -> Result<()> {
        self.filter.set(domain, blacklisted);
        self.refresh()
    }

    /// Record a relevance judgment for a document in the current results.
    pub fn mark(&mut self, docno: &str, relevant: bool) -> Result<()> {
        let current: Vec<String> =
            self.candidates.iter().map(|c| c.docno.clone()).collect();
        self.feedback.record(docno, relevant, &current)
    }

    /// Train the model from the recorded feedback and cache learned scores
    /// for the current result set.
    pub fn apply_feedback(&mut self) -> Result<()> {
        if self.feedback.is_empty() {
            return Err(Error::NoFeedback);
        }

        let features = self.current_features()?;
        let model = ltr::train(
            &self.terms,
            &features,
            self.feedback.snapshot(),
            &self.forest_params,
        )?;
        let model = Arc::new(model);

        self.ltr_scores = ltr::predict_scores(&model, &self.candidates)?;
        self.model = Some(model);
        Ok(())
    }

    /// Re-run the pipeline with the trained model substituting the score.
    ///
    /// Refuses when no model exists for the current query; there is no
    /// silent fallback to base scores.
    pub fn rerank(&mut self) -> Result<()> {
        let model = self.model.clone().ok_or(Error::NoModel)?;
        let head = RerankHead::new(model);
        self.candidates = self.pipeline.execute(
            &self.query,
            self.num_results,
            &self.filter,
            Some(&head as &dyn Stage),
        )?;
        Ok(())
    }

    /// Domain-frequency distribution over a large sample, with every newly
    /// observed domain seeded into the filter set.
    pub fn domain_stats(
        &mut self,
        sample_size: usize,
    ) -> Result<Vec<DomainStat>> {
        let head = self.model.clone().map(RerankHead::new);
        let head_ref: Option<&dyn Stage> =
            head.as_ref().map(|h| h as &dyn Stage);
        let stats = stats::domain_stats(
            &self.pipeline,
            &self.query,
            &self.filter,
            head_ref,
            sample_size,
        )?;
        stats::merge_into_filter(&stats, &mut self.filter);
        Ok(stats)
    }

    /// Importances of the trained model, shaped (num_terms, 6).
    pub fn importances(&self) -> Result<ImportanceMatrix> {
        let model = self.model.as_ref().ok_or(Error::NoModel)?;
        Ok(model.importances())
    }

    /// Display bundles for the current result set.
    pub fn bundles(&self) -> Result<Vec<ResultBundle>> {
        assemble(
            &self.candidates,
            self.pipeline.store(),
            &self.ltr_scores,
            &self.feedback,
        )
    }

    /// Recompute the candidate set through the base pipeline.
    fn refresh(&mut self) -> Result<()> {
        self.candidates = self.pipeline.execute(
            &self.query,
            self.num_results,
            &self.filter,
            None,
        )?;
        Ok(())
    }

    fn current_features(&self) -> Result<HashMap<String, FeatureMatrix>> {
        let mut features = HashMap::with_capacity(self.candidates.len());
        for candidate in &self.candidates {
            features.insert(
                candidate.docno.clone(),
                features_of(candidate)?.clone(),
            );
        }
        Ok(features)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("query", &self.query)
            .field("num_results", &self.num_results)
            .field("feedback", &self.feedback.len())
            .field("has_model", &self.model.is_some())
            .finish_non_exhaustive()
    }
}
