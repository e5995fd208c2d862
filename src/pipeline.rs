use std::sync::Arc;

use rayon::prelude::*;

use crate::{
    domain::{DomainFilterSet, resolve_domain},
    error::{Error, Result},
    features::{FeatureMatrix, extract_features, query_terms},
    table_store::{TableRecord, TableStore},
    tantivy_index::SearchIndex,
};

/// One ranked document flowing through the stage chain.
///
/// `features` is filled by [`FeatureStage`]; the rerank head replaces
/// `score` but leaves the matrix untouched.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub docno: String,
    pub score: f32,
    pub domain: Option<String>,
    pub features: Option<FeatureMatrix>,
}

/// Read-only context shared by all stages of one execution.
///
/// `records[i]` is the store record for `candidates[i]`; the pipeline builds
/// both from the same ranked hit list, so the correspondence is positional.
pub struct StageContext<'a> {
    pub terms: &'a [String],
    pub records: &'a [TableRecord],
    pub filter: &'a DomainFilterSet,
}

/// A pipeline stage. Stages mutate candidates in place and never reorder
/// or drop them; ranked order is owned by base retrieval.
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    fn process(
        &self,
        candidates: &mut [Candidate],
        ctx: &StageContext<'_>,
    ) -> Result<()>;
}

/// Multiplies each candidate's score by the filter factor of its domain.
///
/// A blacklisted domain zeroes the score but the document keeps its rank
/// position; there is deliberately no re-sort afterwards.
pub struct DomainFilterStage;

impl Stage for DomainFilterStage {
    fn name(&self) -> &'static str {
        "domain_filter"
    }

    fn process(
        &self,
        candidates: &mut [Candidate],
        ctx: &StageContext<'_>,
    ) -> Result<()> {
        for candidate in candidates.iter_mut() {
            candidate.score *= ctx.filter.factor(candidate.domain.as_deref());
        }
        Ok(())
    }
}

/// Computes the term × field count matrix for every candidate.
pub struct FeatureStage;

impl Stage for FeatureStage {
    fn name(&self) -> &'static str {
        "features"
    }

    fn process(
        &self,
        candidates: &mut [Candidate],
        ctx: &StageContext<'_>,
    ) -> Result<()> {
        candidates
            .par_iter_mut()
            .zip(ctx.records.par_iter())
            .for_each(|(candidate, record)| {
                candidate.features =
                    Some(extract_features(record, ctx.terms));
            });
        Ok(())
    }
}

/// Composes base retrieval with the stage chain.
///
/// Stage order is fixed: retrieve → domain filter → feature extraction →
/// (optional rerank head → domain filter again). The second filter pass
/// re-zeroes blacklisted documents whose score the head just replaced.
pub struct RetrievalPipeline {
    index: Arc<SearchIndex>,
    store: Arc<TableStore>,
}

impl RetrievalPipeline {
    pub fn new(index: Arc<SearchIndex>, store: Arc<TableStore>) -> Self {
        Self { index, store }
    }

    pub fn store(&self) -> &Arc<TableStore> {
        &self.store
    }

    /// Run base retrieval and the stage chain for one query.
    ///
    /// Retrieval failure propagates; a hit whose docno is missing from the
    /// table store is a hard [`Error::MissingDocument`].
    pub fn execute(
        &self,
        query: &str,
        limit: usize,
        filter: &DomainFilterSet,
        rerank_head: Option<&dyn Stage>,
    ) -> Result<Vec<Candidate>> {
        let terms = query_terms(query);

        let hits = self.index.search(query, limit)?;
        let docnos: Vec<String> =
            hits.iter().map(|hit| hit.docno.clone()).collect();
        let records = self.store.get_many(&docnos)?;

        let mut candidates: Vec<Candidate> = hits
            .into_iter()
            .zip(records.iter())
            .map(|(hit, record)| Candidate {
                docno: hit.docno,
                score: hit.score,
                domain: resolve_domain(&record.url),
                features: None,
            })
            .collect();

        let mut stages: Vec<&dyn Stage> =
            vec![&DomainFilterStage, &FeatureStage];
        if let Some(head) = rerank_head {
            stages.push(head);
            stages.push(&DomainFilterStage);
        }

        let ctx = StageContext {
            terms: &terms,
            records: &records,
            filter,
        };
        for stage in stages {
            stage.process(&mut candidates, &ctx)?;
        }

        Ok(candidates)
    }
}

/// Fetch the feature matrix of a candidate, which every stage after
/// [`FeatureStage`] may rely on.
pub fn features_of(candidate: &Candidate) -> Result<&FeatureMatrix> {
    candidate.features.as_ref().ok_or_else(|| {
        Error::Config(format!(
            "candidate '{}' reached a scoring stage before feature extraction",
            candidate.docno
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::NUM_FIELDS;

    fn record(docno: &str, url: &str, cell: &str) -> TableRecord {
        TableRecord {
            docno: docno.to_string(),
            page_title: "Furniture".to_string(),
            title: "Chairs".to_string(),
            url: url.to_string(),
            text_before: String::new(),
            text_after: String::new(),
            relation: vec![vec!["item".to_string(), cell.to_string()]],
        }
    }

    fn setup(
        records: &[TableRecord],
    ) -> (tempfile::TempDir, RetrievalPipeline) {
        let tmp = tempfile::tempdir().unwrap();
        let store = TableStore::open(&tmp.path().join("tables.redb")).unwrap();
        store.batch_insert(records).unwrap();

        let index = SearchIndex::open_in_ram().unwrap();
        let mut writer = index.writer(15_000_000).unwrap();
        for r in records {
            index.add_record(&writer, r).unwrap();
        }
        writer.commit().unwrap();

        let pipeline =
            RetrievalPipeline::new(Arc::new(index), Arc::new(store));
        (tmp, pipeline)
    }

    #[test]
    fn execute_resolves_domains_and_features() {
        let records = vec![
            record("t1", "https://www.shop.example/1", "red chair"),
            record("t2", "not a url at all ://", "blue chair"),
        ];
        let (_tmp, pipeline) = setup(&records);

        let filter = DomainFilterSet::new();
        let candidates =
            pipeline.execute("chair", 10, &filter, None).unwrap();

        assert_eq!(candidates.len(), 2);
        for candidate in &candidates {
            let features = candidate.features.as_ref().unwrap();
            assert_eq!(features.num_terms(), 1);
            assert_eq!(features.flat().len(), NUM_FIELDS);
        }

        let by_docno = |d: &str| {
            candidates.iter().find(|c| c.docno == d).unwrap().clone()
        };
        assert_eq!(by_docno("t1").domain.as_deref(), Some("shop.example"));
    }

    #[test]
    fn blacklisted_domain_zeroes_score_but_keeps_rank() {
        let records = vec![
            record("t1", "https://spam.example/1", "red chair chair chair"),
            record("t2", "https://ok.example/2", "red chair"),
        ];
        let (_tmp, pipeline) = setup(&records);

        let filter = DomainFilterSet::new();
        let unfiltered =
            pipeline.execute("chair", 10, &filter, None).unwrap();
        let order: Vec<&str> =
            unfiltered.iter().map(|c| c.docno.as_str()).collect();

        let mut filter = DomainFilterSet::new();
        filter.set("spam.example", true);
        let filtered = pipeline.execute("chair", 10, &filter, None).unwrap();

        let filtered_order: Vec<&str> =
            filtered.iter().map(|c| c.docno.as_str()).collect();
        assert_eq!(order, filtered_order, "filtering must not reorder");

        let spam = filtered.iter().find(|c| c.docno == "t1").unwrap();
        let ok = filtered.iter().find(|c| c.docno == "t2").unwrap();
        assert_eq!(spam.score, 0.0);
        assert!(ok.score > 0.0);
    }

    #[test]
    fn filter_is_idempotent() {
        let records =
            vec![record("t1", "https://spam.example/1", "red chair")];
        let (_tmp, pipeline) = setup(&records);

        let mut filter = DomainFilterSet::new();
        filter.set("spam.example", true);

        let mut candidates =
            pipeline.execute("chair", 10, &filter, None).unwrap();
        let once: Vec<f32> = candidates.iter().map(|c| c.score).collect();

        // apply the stage a second time over already-filtered scores
        let terms = query_terms("chair");
        let records_again = pipeline
            .store()
            .get_many(&["t1".to_string()])
            .unwrap();
        let ctx = StageContext {
            terms: &terms,
            records: &records_again,
            filter: &filter,
        };
        DomainFilterStage.process(&mut candidates, &ctx).unwrap();
        let twice: Vec<f32> = candidates.iter().map(|c| c.score).collect();

        assert_eq!(once, twice);
    }

    #[test]
    fn missing_store_record_is_a_hard_error() {
        let records = vec![
            record("t1", "https://a.example/1", "red chair"),
            record("t2", "https://b.example/2", "blue chair"),
        ];
        let (_tmp, pipeline) = setup(&records);

        // re-create the pipeline with a store that lacks t2
        let tmp2 = tempfile::tempdir().unwrap();
        let partial =
            TableStore::open(&tmp2.path().join("tables.redb")).unwrap();
        partial.insert(&records[0]).unwrap();

        let index = SearchIndex::open_in_ram().unwrap();
        let mut writer = index.writer(15_000_000).unwrap();
        for r in &records {
            index.add_record(&writer, r).unwrap();
        }
        writer.commit().unwrap();

        let broken =
            RetrievalPipeline::new(Arc::new(index), Arc::new(partial));
        let err = broken
            .execute("chair", 10, &DomainFilterSet::new(), None)
            .unwrap_err();
        assert!(matches!(err, Error::MissingDocument { .. }));
        drop(pipeline);
    }

    #[test]
    fn limit_caps_the_candidate_count() {
        let records: Vec<TableRecord> = (0..8)
            .map(|i| {
                record(
                    &format!("t{i}"),
                    &format!("https://d{i}.example/"),
                    "chair",
                )
            })
            .collect();
        let (_tmp, pipeline) = setup(&records);

        let candidates = pipeline
            .execute("chair", 3, &DomainFilterSet::new(), None)
            .unwrap();
        assert_eq!(candidates.len(), 3);
    }
}
