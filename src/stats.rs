use std::collections::HashMap;

use crate::{
    domain::DomainFilterSet,
    error::Result,
    pipeline::{RetrievalPipeline, Stage},
};

/// Sample size for the domain-frequency distribution, independent of the
/// user-facing result limit.
pub const DEFAULT_SAMPLE_SIZE: usize = 1000;

/// Frequency of one source domain over the sampled result set.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainStat {
    pub domain: String,
    pub count: usize,
    /// Share of the *requested* sample size, in percent.
    pub percentage: f64,
}

/// Run the pipeline at `sample_size` and count resolved domains.
///
/// Unresolvable domains are left out of the statistics entirely. Stats are
/// sorted by count descending, ties by domain name for stable output.
pub fn domain_stats(
    pipeline: &RetrievalPipeline,
    query: &str,
    filter: &DomainFilterSet,
    rerank_head: Option<&dyn Stage>,
    sample_size: usize,
) -> Result<Vec<DomainStat>> {
    if sample_size == 0 {
        return Ok(Vec::new());
    }

    let candidates =
        pipeline.execute(query, sample_size, filter, rerank_head)?;

    let mut counts: HashMap<String, usize> = HashMap::new();
    for candidate in &candidates {
        if let Some(domain) = &candidate.domain {
            *counts.entry(domain.clone()).or_insert(0) += 1;
        }
    }

    let mut stats: Vec<DomainStat> = counts
        .into_iter()
        .map(|(domain, count)| DomainStat {
            domain,
            count,
            percentage: count as f64 / sample_size as f64 * 100.0,
        })
        .collect();
    stats.sort_by(|a, b| {
        b.count.cmp(&a.count).then_with(|| a.domain.cmp(&b.domain))
    });

    Ok(stats)
}

/// Seed every observed domain into the filter set as not-blacklisted,
/// leaving existing user choices untouched.
pub fn merge_into_filter(stats: &[DomainStat], filter: &mut DomainFilterSet) {
    for stat in stats {
        filter.observe(&stat.domain);
    }
}
