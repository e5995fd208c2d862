use rand::{Rng, SeedableRng, rngs::StdRng};

/// Tuning knobs for [`RandomForest::fit`].
///
/// The defaults mirror a stock 400-tree regression forest: unbounded depth,
/// single-sample leaves, bootstrap resampling. The fixed seed makes training
/// reproducible for a given training set.
#[derive(Debug, Clone)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_depth: Option<usize>,
    pub min_samples_leaf: usize,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 400,
            max_depth: None,
            min_samples_leaf: 1,
            seed: 0x7ab_5eed,
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn predict(&self, x: &[f64]) -> f64 {
        let mut i = 0;
        loop {
            match &self.nodes[i] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    i = if x[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }
}

/// A bagged ensemble of variance-reduction regression trees.
///
/// Importances are impurity-based: every split credits its feature with the
/// sum-of-squares reduction it achieves, per-tree vectors are normalized to
/// sum to one, and the forest importance is their mean.
#[derive(Debug, Clone)]
pub struct RandomForest {
    trees: Vec<Tree>,
    n_features: usize,
    importances: Vec<f64>,
}

impl RandomForest {
    /// Fit a forest on `samples` (rows) against `targets`.
    ///
    /// All rows must share one length, and there must be at least one row;
    /// the caller is expected to have validated its training set.
    pub fn fit(
        samples: &[Vec<f64>],
        targets: &[f64],
        params: &ForestParams,
    ) -> Self {
        assert!(!samples.is_empty(), "training set must not be empty");
        assert_eq!(
            samples.len(),
            targets.len(),
            "samples and targets must have equal length"
        );
        let n_features = samples[0].len();
        assert!(
            samples.iter().all(|row| row.len() == n_features),
            "all sample rows must have equal length"
        );

        let n = samples.len();
        let mut rng = StdRng::seed_from_u64(params.seed);
        let mut trees = Vec::with_capacity(params.n_trees);
        let mut importances = vec![0.0; n_features];

        for _ in 0..params.n_trees {
            let bootstrap: Vec<usize> =
                (0..n).map(|_| rng.gen_range(0..n)).collect();

            let mut builder = TreeBuilder {
                samples,
                targets,
                params,
                nodes: Vec::new(),
                importances: vec![0.0; n_features],
                n_total: bootstrap.len() as f64,
            };
            builder.grow(bootstrap, 0);

            let total: f64 = builder.importances.iter().sum();
            if total > 0.0 {
                for (acc, imp) in
                    importances.iter_mut().zip(&builder.importances)
                {
                    *acc += imp / total;
                }
            }
            trees.push(Tree {
                nodes: builder.nodes,
            });
        }

        for imp in importances.iter_mut() {
            *imp /= params.n_trees as f64;
        }

        Self {
            trees,
            n_features,
            importances,
        }
    }

    /// Mean prediction over all trees.
    pub fn predict(&self, x: &[f64]) -> f64 {
        debug_assert_eq!(x.len(), self.n_features);
        let sum: f64 = self.trees.iter().map(|tree| tree.predict(x)).sum();
        sum / self.trees.len() as f64
    }

    /// Normalized per-input-dimension importances, summing to one when any
    /// split happened at all.
    pub fn feature_importances(&self) -> &[f64] {
        &self.importances
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }
}

struct TreeBuilder<'a> {
    samples: &'a [Vec<f64>],
    targets: &'a [f64],
    params: &'a ForestParams,
    nodes: Vec<Node>,
    importances: Vec<f64>,
    n_total: f64,
}

impl TreeBuilder<'_> {
    /// Grow a subtree over `indices`, returning its node id.
    fn grow(&mut self, indices: Vec<usize>, depth: usize) -> usize {
        let (sum, sumsq) = self.target_moments(&indices);
        let n = indices.len() as f64;
        let mean = sum / n;
        let sse = sumsq - sum * sum / n;

        let depth_exhausted = self
            .params
            .max_depth
            .is_some_and(|max| depth >= max);
        if indices.len() < 2 || sse <= f64::EPSILON || depth_exhausted {
            return self.push(Node::Leaf { value: mean });
        }

        let Some(split) = self.best_split(&indices, sse) else {
            return self.push(Node::Leaf { value: mean });
        };

        self.importances[split.feature] += split.sse_decrease / self.n_total;

        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) =
            indices.into_iter().partition(|&i| {
                self.samples[i][split.feature] <= split.threshold
            });

        // reserve the split slot before growing children
        let id = self.push(Node::Leaf { value: mean });
        let left = self.grow(left_idx, depth + 1);
        let right = self.grow(right_idx, depth + 1);
        self.nodes[id] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        id
    }

    fn push(&mut self, node: Node) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    fn target_moments(&self, indices: &[usize]) -> (f64, f64) {
        indices.iter().fold((0.0, 0.0), |(sum, sumsq), &i| {
            let t = self.targets[i];
            (sum + t, sumsq + t * t)
        })
    }

    /// Exhaustive best split over all features and distinct value gaps,
    /// minimizing the children's summed squared error.
    fn best_split(&self, indices: &[usize], parent_sse: f64) -> Option<Split> {
        let n_features = self.samples[indices[0]].len();
        let min_leaf = self.params.min_samples_leaf;
        let mut best: Option<Split> = None;

        for feature in 0..n_features {
            let mut order: Vec<usize> = indices.to_vec();
            order.sort_by(|&a, &b| {
                self.samples[a][feature]
                    .partial_cmp(&self.samples[b][feature])
                    .unwrap_or(std::cmp::Ordering::Equal)
            });

            let (total_sum, total_sumsq) = self.target_moments(&order);
            let n = order.len();
            let mut left_sum = 0.0;
            let mut left_sumsq = 0.0;

            for cut in 1..n {
                let t = self.targets[order[cut - 1]];
                left_sum += t;
                left_sumsq += t * t;

                let lo = self.samples[order[cut - 1]][feature];
                let hi = self.samples[order[cut]][feature];
                if hi <= lo {
                    continue;
                }
                if cut < min_leaf || n - cut < min_leaf {
                    continue;
                }

                let nl = cut as f64;
                let nr = (n - cut) as f64;
                let right_sum = total_sum - left_sum;
                let right_sumsq = total_sumsq - left_sumsq;
                let sse_left = left_sumsq - left_sum * left_sum / nl;
                let sse_right = right_sumsq - right_sum * right_sum / nr;
                let children_sse = sse_left + sse_right;

                let improves = best
                    .as_ref()
                    .is_none_or(|b| children_sse < b.children_sse);
                if improves && parent_sse - children_sse > f64::EPSILON {
                    best = Some(Split {
                        feature,
                        threshold: (lo + hi) / 2.0,
                        children_sse,
                        sse_decrease: parent_sse - children_sse,
                    });
                }
            }
        }

        best
    }
}

struct Split {
    feature: usize,
    threshold: f64,
    children_sse: f64,
    sse_decrease: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_params() -> ForestParams {
        ForestParams {
            n_trees: 25,
            ..ForestParams::default()
        }
    }

    #[test]
    fn constant_target_predicts_constant() {
        let samples = vec![vec![0.0, 1.0], vec![1.0, 0.0], vec![2.0, 5.0]];
        let targets = vec![3.5, 3.5, 3.5];

        let forest = RandomForest::fit(&samples, &targets, &small_params());
        assert!((forest.predict(&[0.5, 0.5]) - 3.5).abs() < 1e-9);
    }

    #[test]
    fn separable_data_is_fit() {
        // target depends only on feature 0
        let samples: Vec<Vec<f64>> =
            (0..20).map(|i| vec![i as f64, (i % 3) as f64]).collect();
        let targets: Vec<f64> =
            (0..20).map(|i| if i < 10 { 0.0 } else { 1.0 }).collect();

        let forest = RandomForest::fit(&samples, &targets, &small_params());
        assert!(forest.predict(&[2.0, 1.0]) < 0.5);
        assert!(forest.predict(&[17.0, 1.0]) > 0.5);
    }

    #[test]
    fn importance_concentrates_on_informative_feature() {
        let samples: Vec<Vec<f64>> = (0..24)
            .map(|i| vec![(i % 2) as f64, i as f64])
            .collect();
        // target is exactly feature 1 split at the midpoint
        let targets: Vec<f64> =
            (0..24).map(|i| if i < 12 { 0.0 } else { 1.0 }).collect();

        let forest = RandomForest::fit(&samples, &targets, &small_params());
        let imp = forest.feature_importances();
        assert!(imp[1] > imp[0]);
        assert!((imp.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn deterministic_under_fixed_seed() {
        let samples: Vec<Vec<f64>> =
            (0..10).map(|i| vec![i as f64, (10 - i) as f64]).collect();
        let targets: Vec<f64> = (0..10).map(|i| i as f64 * 0.1).collect();

        let a = RandomForest::fit(&samples, &targets, &small_params());
        let b = RandomForest::fit(&samples, &targets, &small_params());

        let x = [4.2, 6.1];
        assert_eq!(a.predict(&x), b.predict(&x));
        assert_eq!(a.feature_importances(), b.feature_importances());
    }

    #[test]
    fn predictions_stay_within_target_range() {
        let samples: Vec<Vec<f64>> = (0..16).map(|i| vec![i as f64]).collect();
        let targets: Vec<f64> = (0..16).map(|i| (i % 5) as f64).collect();

        let forest = RandomForest::fit(&samples, &targets, &small_params());
        for i in 0..16 {
            let p = forest.predict(&[i as f64]);
            assert!((0.0..=4.0).contains(&p));
        }
    }

    #[test]
    fn two_sample_training_set() {
        // the smallest feedback set: one relevant, one not
        let samples = vec![vec![3.0, 0.0], vec![0.0, 2.0]];
        let targets = vec![1.0, 0.0];

        let forest = RandomForest::fit(&samples, &targets, &small_params());
        assert!(forest.predict(&[3.0, 0.0]) > forest.predict(&[0.0, 2.0]));
    }

    #[test]
    fn max_depth_one_produces_stumps() {
        let params = ForestParams {
            n_trees: 10,
            max_depth: Some(1),
            ..ForestParams::default()
        };
        let samples: Vec<Vec<f64>> = (0..8).map(|i| vec![i as f64]).collect();
        let targets: Vec<f64> =
            (0..8).map(|i| if i < 4 { 0.0 } else { 1.0 }).collect();

        let forest = RandomForest::fit(&samples, &targets, &params);
        // a stump can still separate this data
        assert!(forest.predict(&[0.0]) < forest.predict(&[7.0]));
    }
}
