//! Regression trees and the two tree ensembles used by the vote:
//! random forest (bootstrap + best split) and extra trees (full sample +
//! random split).

use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::ForestParams;

/// How a node picks its threshold for a feature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SplitStrategy {
    /// Best midpoint between adjacent distinct values
    Best,
    /// One uniform draw between the node's min and max
    Random,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

#[derive(Debug, Clone, Copy)]
struct TreeParams {
    max_depth: Option<usize>,
    min_samples_split: usize,
    min_samples_leaf: usize,
    strategy: SplitStrategy,
}

struct Candidate {
    feature: usize,
    threshold: f64,
    /// Weighted child SSE; lower is better
    score: f64,
}

/// Squared-error regression tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    root: Node,
}

impl RegressionTree {
    fn fit(
        x: ArrayView2<f64>,
        y: ArrayView1<f64>,
        samples: &mut [usize],
        params: TreeParams,
        rng: &mut ChaCha8Rng,
    ) -> Self {
        let root = build_node(x, y, samples, 0, params, rng);
        Self { root }
    }

    pub fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        let mut node = &self.root;
        loop {
            match node {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if row[*feature] <= *threshold { left } else { right };
                }
            }
        }
    }

    pub fn depth(&self) -> usize {
        fn depth_of(node: &Node) -> usize {
            match node {
                Node::Leaf { .. } => 1,
                Node::Split { left, right, .. } => 1 + depth_of(left).max(depth_of(right)),
            }
        }
        depth_of(&self.root)
    }
}

fn mean_of(y: ArrayView1<f64>, samples: &[usize]) -> f64 {
    samples.iter().map(|&i| y[i]).sum::<f64>() / samples.len() as f64
}

fn sse_of(y: ArrayView1<f64>, samples: &[usize]) -> f64 {
    let mean = mean_of(y, samples);
    samples.iter().map(|&i| (y[i] - mean).powi(2)).sum()
}

fn build_node(
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    samples: &mut [usize],
    depth: usize,
    params: TreeParams,
    rng: &mut ChaCha8Rng,
) -> Node {
    let value = mean_of(y, samples);
    let n = samples.len();

    if params.max_depth.map_or(false, |max| depth >= max)
        || n < params.min_samples_split
        || n < 2 * params.min_samples_leaf
        || sse_of(y, samples) < 1e-12
    {
        return Node::Leaf { value };
    }

    let best = match params.strategy {
        SplitStrategy::Best => best_split(x, y, samples, params.min_samples_leaf, rng),
        SplitStrategy::Random => random_split(x, y, samples, params.min_samples_leaf, rng),
    };

    let Some(split) = best else {
        return Node::Leaf { value };
    };

    // Partition in place: rows going left end up in the front
    let mut boundary = 0;
    for i in 0..n {
        if x[[samples[i], split.feature]] <= split.threshold {
            samples.swap(i, boundary);
            boundary += 1;
        }
    }
    if boundary == 0 || boundary == n {
        return Node::Leaf { value };
    }

    let (left_samples, right_samples) = samples.split_at_mut(boundary);
    let left = build_node(x, y, left_samples, depth + 1, params, rng);
    let right = build_node(x, y, right_samples, depth + 1, params, rng);

    Node::Split {
        feature: split.feature,
        threshold: split.threshold,
        left: Box::new(left),
        right: Box::new(right),
    }
}

fn shuffled_features(n_features: usize, rng: &mut ChaCha8Rng) -> Vec<usize> {
    let mut features: Vec<usize> = (0..n_features).collect();
    features.shuffle(rng);
    features
}

/// Exhaustive scan using running sums over the rows sorted by feature value
fn best_split(
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    samples: &[usize],
    min_leaf: usize,
    rng: &mut ChaCha8Rng,
) -> Option<Candidate> {
    let n = samples.len();
    let total_sum: f64 = samples.iter().map(|&i| y[i]).sum();
    let total_sq: f64 = samples.iter().map(|&i| y[i] * y[i]).sum();
    let mut best: Option<Candidate> = None;
    let mut order = samples.to_vec();

    for feature in shuffled_features(x.ncols(), rng) {
        order.sort_by(|&a, &b| x[[a, feature]].total_cmp(&x[[b, feature]]));

        let mut left_sum = 0.0;
        let mut left_sq = 0.0;
        for pos in 0..n - 1 {
            let target = y[order[pos]];
            left_sum += target;
            left_sq += target * target;

            let n_left = pos + 1;
            let n_right = n - n_left;
            if n_left < min_leaf || n_right < min_leaf {
                continue;
            }
            let current = x[[order[pos], feature]];
            let next = x[[order[pos + 1], feature]];
            if next <= current {
                continue;
            }

            let right_sum = total_sum - left_sum;
            let right_sq = total_sq - left_sq;
            let score = (left_sq - left_sum * left_sum / n_left as f64)
                + (right_sq - right_sum * right_sum / n_right as f64);

            if best.as_ref().map_or(true, |b| score < b.score) {
                let mut threshold = (current + next) / 2.0;
                // Midpoint can round up to `next` for adjacent floats
                if threshold >= next {
                    threshold = current;
                }
                best = Some(Candidate {
                    feature,
                    threshold,
                    score,
                });
            }
        }
    }

    best
}

/// Extremely randomised split: one random threshold per feature
fn random_split(
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    samples: &[usize],
    min_leaf: usize,
    rng: &mut ChaCha8Rng,
) -> Option<Candidate> {
    let mut best: Option<Candidate> = None;

    for feature in shuffled_features(x.ncols(), rng) {
        let (lo, hi) = samples.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &i| {
            let v = x[[i, feature]];
            (lo.min(v), hi.max(v))
        });
        if !(hi > lo) {
            continue;
        }
        let threshold = rng.gen_range(lo..hi);

        let (mut n_left, mut left_sum, mut left_sq) = (0usize, 0.0, 0.0);
        let (mut n_right, mut right_sum, mut right_sq) = (0usize, 0.0, 0.0);
        for &i in samples {
            let target = y[i];
            if x[[i, feature]] <= threshold {
                n_left += 1;
                left_sum += target;
                left_sq += target * target;
            } else {
                n_right += 1;
                right_sum += target;
                right_sq += target * target;
            }
        }
        if n_left < min_leaf.max(1) || n_right < min_leaf.max(1) {
            continue;
        }

        let score = (left_sq - left_sum * left_sum / n_left as f64)
            + (right_sq - right_sum * right_sum / n_right as f64);
        if best.as_ref().map_or(true, |b| score < b.score) {
            best = Some(Candidate {
                feature,
                threshold,
                score,
            });
        }
    }

    best
}

/// Averaging ensemble of regression trees
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forest {
    strategy: SplitStrategy,
    trees: Vec<RegressionTree>,
}

impl Forest {
    /// Grow `params.n_estimators` trees on a rayon pool of `params.n_jobs`
    /// threads. Tree `i` is seeded with `params.seed + i`, so the result does
    /// not depend on how the work is scheduled.
    pub fn fit(
        x: ArrayView2<f64>,
        y: ArrayView1<f64>,
        params: &ForestParams,
        strategy: SplitStrategy,
    ) -> crate::Result<Self> {
        let n = x.nrows();
        if n == 0 || n != y.len() {
            anyhow::bail!("forest needs matching non-empty features and targets ({} vs {})", n, y.len());
        }
        if params.n_estimators == 0 {
            anyhow::bail!("forest needs at least one tree");
        }

        let tree_params = TreeParams {
            max_depth: params.max_depth,
            min_samples_split: params.min_samples_split.max(2),
            min_samples_leaf: params.min_samples_leaf.max(1),
            strategy,
        };

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(params.n_jobs)
            .build()?;

        let trees: Vec<RegressionTree> = pool.install(|| {
            (0..params.n_estimators)
                .into_par_iter()
                .map(|i| {
                    let mut rng = ChaCha8Rng::seed_from_u64(params.seed.wrapping_add(i as u64));
                    let mut samples: Vec<usize> = if params.bootstrap {
                        (0..n).map(|_| rng.gen_range(0..n)).collect()
                    } else {
                        (0..n).collect()
                    };
                    RegressionTree::fit(x, y, &mut samples, tree_params, &mut rng)
                })
                .collect()
        });

        tracing::debug!(
            strategy = ?strategy,
            trees = trees.len(),
            max_depth = trees.iter().map(RegressionTree::depth).max().unwrap_or(0),
            "forest fitted"
        );

        Ok(Self { strategy, trees })
    }

    pub fn predict(&self, x: ArrayView2<f64>) -> Array1<f64> {
        let n_trees = self.trees.len() as f64;
        x.rows()
            .into_iter()
            .map(|row| self.trees.iter().map(|t| t.predict_row(row)).sum::<f64>() / n_trees)
            .collect()
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn strategy(&self) -> SplitStrategy {
        self.strategy
    }
}
