//! CART regression tree
//!
//! Array-based node storage in pre-order: every child index is larger than
//! its parent's, so traversal of a validated tree always terminates.
//! Splits minimize the summed squared error of the two children; a sample
//! goes left when `feature <= threshold`.

use crate::error::{IkuError, Result};
use crate::models::NUM_FEATURES;
use rand::seq::index;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Split-search tolerance on squared-error improvements
const MIN_IMPURITY_DECREASE: f64 = 1e-12;

/// A node in the regression tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeNode {
    /// Feature index to split on (`None` for leaf nodes).
    pub feature: Option<usize>,
    /// Split threshold (features <= threshold go left).
    pub threshold: f64,
    /// Index of left child (unused for leaves).
    pub left: usize,
    /// Index of right child (unused for leaves).
    pub right: usize,
    /// Mean target of the training samples that reached this node.
    pub value: f64,
    /// Number of (bootstrap) samples that reached this node.
    pub n_samples: usize,
}

impl TreeNode {
    fn leaf(value: f64, n_samples: usize) -> Self {
        Self {
            feature: None,
            threshold: 0.0,
            left: 0,
            right: 0,
            value,
            n_samples,
        }
    }

    /// Returns `true` if this node is a leaf (no children).
    pub fn is_leaf(&self) -> bool {
        self.feature.is_none()
    }
}

/// Growth limits for a single tree
#[derive(Debug, Clone, Copy)]
pub struct TreeParams {
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Number of candidate features drawn at every split
    pub max_features: usize,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: NUM_FEATURES,
        }
    }
}

/// A fitted regression tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<TreeNode>,
    /// Unnormalized squared-error decrease attributed to each feature
    impurity_decrease: [f64; NUM_FEATURES],
}

struct Builder<'a, R: Rng> {
    x: &'a [[f64; NUM_FEATURES]],
    y: &'a [f64],
    params: TreeParams,
    rng: &'a mut R,
    nodes: Vec<TreeNode>,
    impurity_decrease: [f64; NUM_FEATURES],
}

struct Split {
    feature: usize,
    threshold: f64,
    sse: f64,
}

impl RegressionTree {
    /// Fit a tree on the rows selected by `sample` (duplicates allowed, as
    /// produced by bootstrap sampling).
    pub fn fit<R: Rng>(
        x: &[[f64; NUM_FEATURES]],
        y: &[f64],
        sample: &[usize],
        params: TreeParams,
        rng: &mut R,
    ) -> Result<Self> {
        if x.len() != y.len() {
            return Err(IkuError::Training(format!(
                "feature rows ({}) and targets ({}) differ in length",
                x.len(),
                y.len()
            )));
        }
        if sample.is_empty() {
            return Err(IkuError::Training("cannot fit a tree on zero samples".to_string()));
        }
        if let Some(&bad) = sample.iter().find(|&&i| i >= x.len()) {
            return Err(IkuError::Training(format!("sample index {} out of range", bad)));
        }
        if params.max_features == 0 || params.max_features > NUM_FEATURES {
            return Err(IkuError::InvalidParameter(format!(
                "max_features must be in 1..={}, got {}",
                NUM_FEATURES, params.max_features
            )));
        }

        let mut builder = Builder {
            x,
            y,
            params,
            rng,
            nodes: Vec::new(),
            impurity_decrease: [0.0; NUM_FEATURES],
        };
        let mut indices = sample.to_vec();
        builder.grow(&mut indices, 0);

        Ok(Self {
            nodes: builder.nodes,
            impurity_decrease: builder.impurity_decrease,
        })
    }

    /// Predict a single sample by walking from the root to a leaf.
    pub fn predict(&self, features: &[f64; NUM_FEATURES]) -> f64 {
        let mut idx = 0usize;
        while let Some(node) = self.nodes.get(idx) {
            match node.feature {
                None => return node.value,
                Some(feature) => {
                    idx = if features[feature] <= node.threshold {
                        node.left
                    } else {
                        node.right
                    };
                }
            }
        }
        // Unreachable for validated trees
        0.0
    }

    /// Number of nodes in the tree.
    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Number of leaf nodes.
    pub fn n_leaves(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    /// Tree depth (longest root-to-leaf path).
    pub fn depth(&self) -> usize {
        if self.nodes.is_empty() {
            return 0;
        }
        self.node_depth(0)
    }

    fn node_depth(&self, idx: usize) -> usize {
        let node = &self.nodes[idx];
        if node.is_leaf() {
            return 0;
        }
        1 + self.node_depth(node.left).max(self.node_depth(node.right))
    }

    pub fn impurity_decrease(&self) -> [f64; NUM_FEATURES] {
        self.impurity_decrease
    }

    /// Check the structure of a deserialized tree
    pub fn validate(&self) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(IkuError::ModelLoad("tree has no nodes".to_string()));
        }
        for (i, node) in self.nodes.iter().enumerate() {
            if !node.value.is_finite() {
                return Err(IkuError::ModelLoad(format!("node {} has a non-finite value", i)));
            }
            if let Some(feature) = node.feature {
                if feature >= NUM_FEATURES {
                    return Err(IkuError::ModelLoad(format!(
                        "node {} splits on unknown feature {}",
                        i, feature
                    )));
                }
                let children_valid = node.left > i
                    && node.right > i
                    && node.left < self.nodes.len()
                    && node.right < self.nodes.len();
                if !children_valid || node.threshold.is_nan() {
                    return Err(IkuError::ModelLoad(format!("node {} has an invalid split", i)));
                }
            }
        }
        Ok(())
    }
}

impl<R: Rng> Builder<'_, R> {
    fn grow(&mut self, indices: &mut [usize], depth: usize) -> usize {
        let n = indices.len();
        let sum: f64 = indices.iter().map(|&i| self.y[i]).sum();
        let mean = sum / n as f64;
        let sse: f64 = indices.iter().map(|&i| (self.y[i] - mean).powi(2)).sum();

        let node_idx = self.nodes.len();
        self.nodes.push(TreeNode::leaf(mean, n));

        let depth_reached = self.params.max_depth.map_or(false, |max| depth >= max);
        if depth_reached || n < self.params.min_samples_split || sse <= MIN_IMPURITY_DECREASE {
            return node_idx;
        }

        let split = match self.best_split(indices, sse) {
            Some(split) => split,
            None => return node_idx,
        };

        self.impurity_decrease[split.feature] += sse - split.sse;

        // Partition in place: left block holds feature <= threshold
        let mut boundary = 0;
        for k in 0..n {
            if self.x[indices[k]][split.feature] <= split.threshold {
                indices.swap(k, boundary);
                boundary += 1;
            }
        }
        let (left_indices, right_indices) = indices.split_at_mut(boundary);

        let left = self.grow(left_indices, depth + 1);
        let right = self.grow(right_indices, depth + 1);

        let node = &mut self.nodes[node_idx];
        node.feature = Some(split.feature);
        node.threshold = split.threshold;
        node.left = left;
        node.right = right;
        node_idx
    }

    fn candidate_features(&mut self) -> Vec<usize> {
        if self.params.max_features >= NUM_FEATURES {
            (0..NUM_FEATURES).collect()
        } else {
            let mut features =
                index::sample(&mut *self.rng, NUM_FEATURES, self.params.max_features).into_vec();
            features.sort_unstable();
            features
        }
    }

    fn best_split(&mut self, indices: &[usize], parent_sse: f64) -> Option<Split> {
        let n = indices.len();
        let min_leaf = self.params.min_samples_leaf.max(1);
        let mut best: Option<Split> = None;

        for feature in self.candidate_features() {
            let mut pairs: Vec<(f64, f64)> = indices
                .iter()
                .map(|&i| (self.x[i][feature], self.y[i]))
                .collect();
            pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

            let total_sum: f64 = pairs.iter().map(|p| p.1).sum();
            let total_sq: f64 = pairs.iter().map(|p| p.1 * p.1).sum();
            let mut left_sum = 0.0;
            let mut left_sq = 0.0;

            for k in 1..n {
                let (prev_value, prev_target) = pairs[k - 1];
                left_sum += prev_target;
                left_sq += prev_target * prev_target;

                let value = pairs[k].0;
                if value <= prev_value || k < min_leaf || n - k < min_leaf {
                    continue;
                }

                let left_n = k as f64;
                let right_n = (n - k) as f64;
                let right_sum = total_sum - left_sum;
                let right_sq = total_sq - left_sq;
                let sse = (left_sq - left_sum * left_sum / left_n)
                    + (right_sq - right_sum * right_sum / right_n);

                if best.as_ref().map_or(true, |b| sse < b.sse) {
                    let mut threshold = (prev_value + value) / 2.0;
                    if threshold >= value {
                        threshold = prev_value;
                    }
                    best = Some(Split {
                        feature,
                        threshold,
                        sse,
                    });
                }
            }
        }

        best.filter(|split| parent_sse - split.sse > MIN_IMPURITY_DECREASE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn step_data() -> (Vec<[f64; NUM_FEATURES]>, Vec<f64>) {
        // target depends only on feature 2: <= 5 -> 10, > 5 -> 30
        let x: Vec<[f64; NUM_FEATURES]> = (0..10)
            .map(|i| [1.0, 0.0, i as f64, 7.0])
            .collect();
        let y = x.iter().map(|r| if r[2] <= 5.0 { 10.0 } else { 30.0 }).collect();
        (x, y)
    }

    fn fit_all(x: &[[f64; NUM_FEATURES]], y: &[f64], params: TreeParams) -> RegressionTree {
        let sample: Vec<usize> = (0..x.len()).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        RegressionTree::fit(x, y, &sample, params, &mut rng).unwrap()
    }

    #[test]
    fn test_single_split_on_step_function() {
        let (x, y) = step_data();
        let tree = fit_all(&x, &y, TreeParams::default());

        assert_eq!(tree.n_nodes(), 3);
        assert_eq!(tree.n_leaves(), 2);
        assert_eq!(tree.depth(), 1);
        assert_eq!(tree.predict(&[1.0, 0.0, 2.0, 7.0]), 10.0);
        assert_eq!(tree.predict(&[1.0, 0.0, 8.0, 7.0]), 30.0);
        // midpoint threshold between 5 and 6
        assert_eq!(tree.predict(&[1.0, 0.0, 5.5, 7.0]), 10.0);
        assert_eq!(tree.predict(&[1.0, 0.0, 5.6, 7.0]), 30.0);
    }

    #[test]
    fn test_leaves_saturate_outside_training_range() {
        let (x, y) = step_data();
        let tree = fit_all(&x, &y, TreeParams::default());
        assert_eq!(tree.predict(&[1.0, 0.0, 1e9, 7.0]), 30.0);
        assert_eq!(tree.predict(&[1.0, 0.0, -1e9, 7.0]), 10.0);
    }

    #[test]
    fn test_importance_goes_to_split_feature() {
        let (x, y) = step_data();
        let tree = fit_all(&x, &y, TreeParams::default());
        let importance = tree.impurity_decrease();
        assert!(importance[2] > 0.0);
        assert_eq!(importance[0], 0.0);
        assert_eq!(importance[1], 0.0);
        assert_eq!(importance[3], 0.0);
    }

    #[test]
    fn test_max_depth_zero_gives_mean_leaf() {
        let (x, y) = step_data();
        let params = TreeParams {
            max_depth: Some(0),
            ..TreeParams::default()
        };
        let tree = fit_all(&x, &y, params);
        assert_eq!(tree.n_nodes(), 1);
        assert_eq!(tree.predict(&[0.0; NUM_FEATURES]), 18.0);
    }

    #[test]
    fn test_min_samples_leaf_respected() {
        let x: Vec<[f64; NUM_FEATURES]> = (0..6).map(|i| [i as f64, 0.0, 0.0, 0.0]).collect();
        let y = vec![0.0, 0.0, 0.0, 0.0, 0.0, 100.0];
        let params = TreeParams {
            min_samples_leaf: 2,
            ..TreeParams::default()
        };
        let tree = fit_all(&x, &y, params);
        for node in tree.nodes.iter().filter(|n| n.is_leaf()) {
            assert!(node.n_samples >= 2);
        }
    }

    #[test]
    fn test_constant_target_is_single_leaf() {
        let x: Vec<[f64; NUM_FEATURES]> = (0..5).map(|i| [i as f64, 1.0, 2.0, 3.0]).collect();
        let y = vec![42.0; 5];
        let tree = fit_all(&x, &y, TreeParams::default());
        assert_eq!(tree.n_nodes(), 1);
        assert_eq!(tree.predict(&[100.0, 1.0, 2.0, 3.0]), 42.0);
    }

    #[test]
    fn test_validate_rejects_backward_child() {
        let (x, y) = step_data();
        let mut tree = fit_all(&x, &y, TreeParams::default());
        assert!(tree.validate().is_ok());
        tree.nodes[0].left = 0;
        assert!(matches!(tree.validate(), Err(IkuError::ModelLoad(_))));
    }

    #[test]
    fn test_fit_rejects_empty_sample() {
        let (x, y) = step_data();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let result = RegressionTree::fit(&x, &y, &[], TreeParams::default(), &mut rng);
        assert!(matches!(result, Err(IkuError::Training(_))));
    }
}
