use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::{
    error::{Error, Result},
    features::{FeatureMatrix, NUM_FIELDS},
    forest::{ForestParams, RandomForest},
    pipeline::{Candidate, Stage, StageContext, features_of},
};

/// Per-(term, field) importance scores of a trained model, reshaped from the
/// forest's flat importance vector.
#[derive(Debug, Clone)]
pub struct ImportanceMatrix {
    num_terms: usize,
    data: Vec<f64>,
}

impl ImportanceMatrix {
    pub fn num_terms(&self) -> usize {
        self.num_terms
    }

    pub fn get(&self, term: usize, field: usize) -> f64 {
        self.data[term * NUM_FIELDS + field]
    }
}

/// A regression model fit on one query's feedback.
///
/// The model is only meaningful for feature matrices with the same term
/// count it was trained on; the session discards it on query change, and
/// [`TrainedModel::predict`] re-checks the shape as a second line of
/// defense.
#[derive(Debug)]
pub struct TrainedModel {
    forest: RandomForest,
    num_terms: usize,
}

impl TrainedModel {
    pub fn num_terms(&self) -> usize {
        self.num_terms
    }

    /// Score one feature matrix.
    ///
    /// A term-count mismatch between the matrix and the training shape is a
    /// hard error, never a truncation or padding.
    pub fn predict(&self, features: &FeatureMatrix) -> Result<f32> {
        if features.num_terms() != self.num_terms {
            return Err(Error::ShapeMismatch {
                expected: self.num_terms,
                actual: features.num_terms(),
            });
        }
        Ok(self.forest.predict(&features.flatten()) as f32)
    }

    /// The forest's raw per-dimension importances, reshaped to
    /// (num_terms, 6).
    pub fn importances(&self) -> ImportanceMatrix {
        ImportanceMatrix {
            num_terms: self.num_terms,
            data: self.forest.feature_importances().to_vec(),
        }
    }
}

/// Fit a model from the current result set's features and feedback labels.
///
/// The training set is the intersection of `labels` with `features`: only
/// labeled documents that are still in the current result set contribute
/// rows. Refuses with [`Error::NoFeedback`] when that intersection is empty
/// and with [`Error::ShapeMismatch`] when any contributing matrix does not
/// match the active query's term count (a query change slipped between
/// feature computation and training).
pub fn train(
    terms: &[String],
    features: &HashMap<String, FeatureMatrix>,
    labels: &BTreeMap<String, bool>,
    params: &ForestParams,
) -> Result<TrainedModel> {
    if labels.is_empty() {
        return Err(Error::NoFeedback);
    }

    let num_terms = terms.len();
    let mut samples = Vec::new();
    let mut targets = Vec::new();

    for (docno, &relevant) in labels {
        let Some(matrix) = features.get(docno) else {
            // labeled under a wider result limit, currently out of view
            continue;
        };
        if matrix.num_terms() != num_terms {
            return Err(Error::ShapeMismatch {
                expected: num_terms,
                actual: matrix.num_terms(),
            });
        }
        samples.push(matrix.flatten());
        targets.push(if relevant { 1.0 } else { 0.0 });
    }

    if samples.is_empty() {
        return Err(Error::NoFeedback);
    }

    let forest = RandomForest::fit(&samples, &targets, params);
    Ok(TrainedModel { forest, num_terms })
}

/// Predictions for the given candidates, keyed by docno, for display next
/// to the base score.
pub fn predict_scores(
    model: &TrainedModel,
    candidates: &[Candidate],
) -> Result<HashMap<String, f32>> {
    let mut scores = HashMap::with_capacity(candidates.len());
    for candidate in candidates {
        let features = features_of(candidate)?;
        scores.insert(candidate.docno.clone(), model.predict(features)?);
    }
    Ok(scores)
}

/// Pipeline stage that substitutes the learned score for the current one.
///
/// The feature matrix flows through unchanged so downstream stages and the
/// display keep working on exactly the inputs the model saw.
pub struct RerankHead {
    model: Arc<TrainedModel>,
}

impl RerankHead {
    pub fn new(model: Arc<TrainedModel>) -> Self {
        Self { model }
    }
}

impl Stage for RerankHead {
    fn name(&self) -> &'static str {
        "rerank"
    }

    fn process(
        &self,
        candidates: &mut [Candidate],
        _ctx: &StageContext<'_>,
    ) -> Result<()> {
        for candidate in candidates.iter_mut() {
            let features = features_of(candidate)?;
            candidate.score = self.model.predict(features)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{domain::DomainFilterSet, features::query_terms};

    fn terms() -> Vec<String> {
        query_terms("red chair")
    }

    fn matrix(counts: [u32; 12]) -> FeatureMatrix {
        FeatureMatrix::new(2, counts.to_vec())
    }

    fn fixture() -> (HashMap<String, FeatureMatrix>, BTreeMap<String, bool>) {
        let mut features = HashMap::new();
        features.insert(
            "d1".to_string(),
            matrix([4, 2, 1, 3, 0, 0, 5, 1, 0, 2, 0, 0]),
        );
        features.insert(
            "d2".to_string(),
            matrix([0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0]),
        );
        features.insert(
            "d3".to_string(),
            matrix([3, 1, 1, 2, 0, 0, 4, 1, 0, 1, 0, 0]),
        );

        let mut labels = BTreeMap::new();
        labels.insert("d1".to_string(), true);
        labels.insert("d2".to_string(), false);
        (features, labels)
    }

    fn params() -> ForestParams {
        ForestParams {
            n_trees: 25,
            ..ForestParams::default()
        }
    }

    #[test]
    fn train_produces_term_shaped_importances() {
        let (features, labels) = fixture();
        let model = train(&terms(), &features, &labels, &params()).unwrap();

        assert_eq!(model.num_terms(), 2);
        let importances = model.importances();
        assert_eq!(importances.num_terms(), 2);
        // every cell addressable within (2, 6)
        for term in 0..2 {
            for field in 0..NUM_FIELDS {
                assert!(importances.get(term, field) >= 0.0);
            }
        }
    }

    #[test]
    fn trained_model_separates_the_feedback() {
        let (features, labels) = fixture();
        let model = train(&terms(), &features, &labels, &params()).unwrap();

        let relevant = model.predict(&features["d1"]).unwrap();
        let irrelevant = model.predict(&features["d2"]).unwrap();
        assert!(relevant > irrelevant);

        // d3 looks like d1, so it should score closer to relevant
        let similar = model.predict(&features["d3"]).unwrap();
        assert!(similar > irrelevant);
    }

    #[test]
    fn empty_labels_refuse_to_train() {
        let (features, _) = fixture();
        let err = train(&terms(), &features, &BTreeMap::new(), &params())
            .unwrap_err();
        assert!(matches!(err, Error::NoFeedback));
    }

    #[test]
    fn labels_outside_result_set_refuse_to_train() {
        let (features, _) = fixture();
        let mut labels = BTreeMap::new();
        labels.insert("ghost".to_string(), true);

        let err = train(&terms(), &features, &labels, &params()).unwrap_err();
        assert!(matches!(err, Error::NoFeedback));
    }

    #[test]
    fn stale_matrix_shape_refuses_to_train() {
        let (mut features, labels) = fixture();
        // d2's matrix was computed for a three-term query
        features.insert(
            "d2".to_string(),
            FeatureMatrix::new(3, vec![0; 18]),
        );

        let err = train(&terms(), &features, &labels, &params()).unwrap_err();
        assert!(matches!(
            err,
            Error::ShapeMismatch {
                expected: 2,
                actual: 3
            }
        ));
    }

    #[test]
    fn predict_rejects_term_count_mismatch() {
        let (features, labels) = fixture();
        let model = train(&terms(), &features, &labels, &params()).unwrap();

        let three_term = FeatureMatrix::new(3, vec![1; 18]);
        let err = model.predict(&three_term).unwrap_err();
        assert!(matches!(
            err,
            Error::ShapeMismatch {
                expected: 2,
                actual: 3
            }
        ));
    }

    #[test]
    fn rerank_head_replaces_score_and_keeps_features() {
        let (features, labels) = fixture();
        let model =
            Arc::new(train(&terms(), &features, &labels, &params()).unwrap());

        let mut candidates: Vec<Candidate> = ["d1", "d2", "d3"]
            .iter()
            .map(|d| Candidate {
                docno: d.to_string(),
                score: 10.0,
                domain: None,
                features: Some(features[*d].clone()),
            })
            .collect();

        let before: Vec<FeatureMatrix> = candidates
            .iter()
            .map(|c| c.features.clone().unwrap())
            .collect();

        let head = RerankHead::new(Arc::clone(&model));
        let terms = terms();
        let records = Vec::new();
        let filter = DomainFilterSet::new();
        let ctx = StageContext {
            terms: &terms,
            records: &records,
            filter: &filter,
        };
        head.process(&mut candidates, &ctx).unwrap();

        for (candidate, original) in candidates.iter().zip(&before) {
            assert_eq!(candidate.features.as_ref().unwrap(), original);
            let expected = model.predict(original).unwrap();
            assert_eq!(candidate.score, expected);
        }
        // order untouched
        let order: Vec<&str> =
            candidates.iter().map(|c| c.docno.as_str()).collect();
        assert_eq!(order, vec!["d1", "d2", "d3"]);
    }

    #[test]
    fn predict_scores_keys_by_docno() {
        let (features, labels) = fixture();
        let model = train(&terms(), &features, &labels, &params()).unwrap();

        let candidates: Vec<Candidate> = ["d1", "d2"]
            .iter()
            .map(|d| Candidate {
                docno: d.to_string(),
                score: 1.0,
                domain: None,
                features: Some(features[*d].clone()),
            })
            .collect();

        let scores = predict_scores(&model, &candidates).unwrap();
        assert_eq!(scores.len(), 2);
        assert!(scores.contains_key("d1"));
        assert!(scores.contains_key("d2"));
    }
}
