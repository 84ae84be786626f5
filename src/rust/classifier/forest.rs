//! Binary decision trees and random forests over sparse feature matrices.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::error::{ClassifierError, Result};
use super::features::{FeatureMatrix, FeatureVector};

/// Number of features drawn as split candidates at each node
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MaxFeatures {
    /// Square root of the feature count
    Sqrt,
    /// Log2 of the feature count
    Log2,
    /// Every feature
    All,
    /// Fixed number, capped at the feature count
    Fixed(usize),
    /// Fraction of the feature count
    Fraction(f64),
}

impl MaxFeatures {
    pub fn resolve(&self, n_features: usize) -> usize {
        let n = n_features as f64;
        let k = match *self {
            MaxFeatures::Sqrt => n.sqrt().floor() as usize,
            MaxFeatures::Log2 => n.log2().floor() as usize,
            MaxFeatures::All => n_features,
            MaxFeatures::Fixed(k) => k,
            MaxFeatures::Fraction(f) => (n * f).floor() as usize,
        };
        k.clamp(1, n_features.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum TreeNode {
    Leaf {
        /// Fraction of positive samples reaching this leaf
        probability: f64,
        n_samples: usize,
    },
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
        n_samples: usize,
    },
}

/// Column-major view of a feature matrix: for each feature, the rows where it is non-zero.
pub(crate) struct ColumnIndex {
    columns: Vec<Vec<(usize, f64)>>,
}

impl ColumnIndex {
    pub(crate) fn new(x: &FeatureMatrix) -> Self {
        let mut columns = vec![Vec::new(); x.ncols()];
        for (row_idx, row) in x.rows().iter().enumerate() {
            for (col, value) in row.iter() {
                columns[col].push((row_idx, value));
            }
        }
        Self { columns }
    }
}

#[derive(Debug, Clone, Copy)]
struct TreeParams {
    max_depth: Option<usize>,
    min_samples_split: usize,
    min_samples_leaf: usize,
    max_features: usize,
}

fn gini(n: u64, positives: u64) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let p = positives as f64 / n as f64;
    2.0 * p * (1.0 - p)
}

struct TreeBuilder<'a> {
    x: &'a FeatureMatrix,
    columns: &'a ColumnIndex,
    y: &'a [u8],
    params: TreeParams,
    rng: ChaCha8Rng,
    /// How many times each row occurs in the node being split (bootstrap draws repeat rows)
    multiplicity: Vec<u32>,
}

impl<'a> TreeBuilder<'a> {
    fn build(&mut self, samples: &[usize], depth: usize) -> TreeNode {
        let n = samples.len();
        let positives = samples.iter().filter(|&&i| self.y[i] == 1).count();

        let should_stop = n < self.params.min_samples_split
            || positives == 0
            || positives == n
            || self.params.max_depth.map_or(false, |d| depth >= d);

        let leaf = || TreeNode::Leaf {
            probability: if n == 0 { 0.0 } else { positives as f64 / n as f64 },
            n_samples: n,
        };
        if should_stop {
            return leaf();
        }

        match self.find_best_split(samples, positives as u64) {
            Some((feature_idx, threshold)) => {
                let (left_samples, right_samples): (Vec<usize>, Vec<usize>) = samples
                    .iter()
                    .partition(|&&i| self.x.get(i, feature_idx) <= threshold);
                let left = Box::new(self.build(&left_samples, depth + 1));
                let right = Box::new(self.build(&right_samples, depth + 1));
                TreeNode::Split {
                    feature_idx,
                    threshold,
                    left,
                    right,
                    n_samples: n,
                }
            }
            None => leaf(),
        }
    }

    /// Best (feature, threshold) by Gini gain among a random subset of features.
    ///
    /// Features are drawn in random order until `max_features` of them vary within the node or
    /// none are left. Constant features do not count toward the draw. Any valid partition is
    /// accepted, including one with zero gain, so only pure or inseparable nodes become leaves.
    fn find_best_split(&mut self, samples: &[usize], positives: u64) -> Option<(usize, f64)> {
        let n = samples.len() as u64;
        let parent = gini(n, positives);

        for &i in samples {
            self.multiplicity[i] += 1;
        }

        // A feature that is zero on every row of the node is constant there.
        let mut candidates: Vec<usize> = samples
            .iter()
            .flat_map(|&i| self.x.row(i).iter().map(|(col, _)| col))
            .collect();
        candidates.sort_unstable();
        candidates.dedup();

        let mut best: Option<(usize, f64, f64)> = None;
        let mut varying = 0;
        let mut drawn = 0;
        while varying < self.params.max_features && drawn < candidates.len() {
            let pick = self.rng.gen_range(drawn..candidates.len());
            candidates.swap(drawn, pick);
            let feature_idx = candidates[drawn];
            drawn += 1;

            let Some(scan) = self.scan_feature(feature_idx, n, positives, parent) else {
                continue;
            };
            varying += 1;
            if let Some((threshold, gain)) = scan {
                if best.map_or(true, |(_, _, best_gain)| gain > best_gain) {
                    best = Some((feature_idx, threshold, gain));
                }
            }
        }

        for &i in samples {
            self.multiplicity[i] = 0;
        }
        best.map(|(feature_idx, threshold, _)| (feature_idx, threshold))
    }

    /// Best threshold and gain for one feature over the rows flagged in `multiplicity`.
    ///
    /// Returns `None` when the feature is constant within the node, and `Some(None)` when it
    /// varies but no threshold leaves `min_samples_leaf` rows on both sides. Rows where the
    /// feature is zero always fall left, so only the stored non-zero entries are sorted.
    fn scan_feature(
        &self,
        feature_idx: usize,
        n: u64,
        positives: u64,
        parent: f64,
    ) -> Option<Option<(f64, f64)>> {
        let mut entries: Vec<(f64, u64, u64)> = self.columns.columns[feature_idx]
            .iter()
            .filter(|(row, _)| self.multiplicity[*row] > 0)
            .map(|&(row, value)| {
                let count = self.multiplicity[row] as u64;
                (value, count, if self.y[row] == 1 { count } else { 0 })
            })
            .collect();
        entries.sort_by(|a, b| a.0.total_cmp(&b.0));

        let non_zero: u64 = entries.iter().map(|e| e.1).sum();
        let (first, last) = (entries.first()?.0, entries.last()?.0);
        if non_zero == n && first == last {
            return None;
        }

        let min_leaf = self.params.min_samples_leaf as u64;
        let non_zero_pos: u64 = entries.iter().map(|e| e.2).sum();
        let mut left_n = n - non_zero;
        let mut left_pos = positives - non_zero_pos;
        let mut prev_value = 0.0;
        let mut best: Option<(f64, f64)> = None;

        for &(value, count, pos) in &entries {
            if left_n > 0 && value > prev_value {
                let right_n = n - left_n;
                if left_n >= min_leaf && right_n >= min_leaf {
                    let weighted = (left_n as f64 * gini(left_n, left_pos)
                        + right_n as f64 * gini(right_n, positives - left_pos))
                        / n as f64;
                    let gain = parent - weighted;
                    if best.map_or(true, |(_, best_gain)| gain > best_gain) {
                        best = Some(((prev_value + value) / 2.0, gain));
                    }
                }
            }
            left_n += count;
            left_pos += pos;
            prev_value = value;
        }
        Some(best)
    }
}

/// A binary classification tree grown with Gini impurity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    root: TreeNode,
}

impl DecisionTree {
    /// Probability that `row` belongs to the positive class
    pub fn predict_proba_row(&self, row: &FeatureVector) -> f64 {
        let mut node = &self.root;
        loop {
            match node {
                TreeNode::Leaf { probability, .. } => return *probability,
                TreeNode::Split {
                    feature_idx,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    node = if row.get(*feature_idx) <= *threshold { left } else { right };
                }
            }
        }
    }

    pub fn depth(&self) -> usize {
        fn depth_of(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf { .. } => 0,
                TreeNode::Split { left, right, .. } => 1 + depth_of(left).max(depth_of(right)),
            }
        }
        depth_of(&self.root)
    }

    pub fn n_samples(&self) -> usize {
        match &self.root {
            TreeNode::Leaf { n_samples, .. } | TreeNode::Split { n_samples, .. } => *n_samples,
        }
    }
}

/// An ensemble of decision trees for one binary label. Each tree is grown on a bootstrap draw
/// of the rows (when enabled) and a random feature subset per split; predictions average the
/// trees' leaf probabilities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
    pub bootstrap: bool,
    pub random_state: u64,
    n_features: usize,
}

impl Default for RandomForest {
    fn default() -> Self {
        Self::new(100)
    }
}

impl RandomForest {
    pub fn new(n_estimators: usize) -> Self {
        Self {
            trees: Vec::new(),
            n_estimators,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::Sqrt,
            bootstrap: true,
            random_state: 42,
            n_features: 0,
        }
    }

    pub fn with_max_depth(mut self, depth: Option<usize>) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.min_samples_split = min_samples;
        self
    }

    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples;
        self
    }

    pub fn with_max_features(mut self, max_features: MaxFeatures) -> Self {
        self.max_features = max_features;
        self
    }

    pub fn with_bootstrap(mut self, bootstrap: bool) -> Self {
        self.bootstrap = bootstrap;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    pub fn is_fitted(&self) -> bool {
        !self.trees.is_empty()
    }

    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }

    /// Fits the forest to `x` against the 0/1 labels `y`
    pub fn fit(&mut self, x: &FeatureMatrix, y: &[u8]) -> Result<&mut Self> {
        let columns = ColumnIndex::new(x);
        self.fit_with_columns(x, &columns, y)
    }

    pub(crate) fn fit_with_columns(&mut self, x: &FeatureMatrix, columns: &ColumnIndex, y: &[u8]) -> Result<&mut Self> {
        let n_samples = x.nrows();
        if n_samples == 0 {
            return Err(ClassifierError::EmptyTrainingSet);
        }
        if n_samples != y.len() {
            return Err(ClassifierError::dimension_mismatch(
                format!("{} labels", n_samples),
                format!("{} labels", y.len()),
            ));
        }
        if x.ncols() == 0 {
            return Err(ClassifierError::InvalidInput("feature matrix has no columns".into()));
        }
        if let Some(bad) = y.iter().find(|&&v| v > 1) {
            return Err(ClassifierError::InvalidInput(format!("label value {} is not 0 or 1", bad)));
        }
        if self.n_estimators == 0 {
            return Err(ClassifierError::Config("n_estimators must be at least 1".into()));
        }

        let params = TreeParams {
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split.max(2),
            min_samples_leaf: self.min_samples_leaf.max(1),
            max_features: self.max_features.resolve(x.ncols()),
        };
        let base_seed = self.random_state;
        let bootstrap = self.bootstrap;

        let trees: Vec<DecisionTree> = (0..self.n_estimators)
            .into_par_iter()
            .map(|tree_idx| {
                let mut rng = ChaCha8Rng::seed_from_u64(base_seed.wrapping_add(tree_idx as u64));
                let samples: Vec<usize> = if bootstrap {
                    (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect()
                } else {
                    (0..n_samples).collect()
                };
                let mut builder = TreeBuilder {
                    x,
                    columns,
                    y,
                    params,
                    rng,
                    multiplicity: vec![0; n_samples],
                };
                let root = builder.build(&samples, 0);
                DecisionTree { root }
            })
            .collect();

        self.trees = trees;
        self.n_features = x.ncols();
        Ok(self)
    }

    /// Positive-class probability per row
    pub fn predict_proba(&self, x: &FeatureMatrix) -> Result<Vec<f64>> {
        if !self.is_fitted() {
            return Err(ClassifierError::NotFitted("random forest has no trees".into()));
        }
        if x.ncols() != self.n_features {
            return Err(ClassifierError::dimension_mismatch(
                format!("{} features", self.n_features),
                format!("{} features", x.ncols()),
            ));
        }
        let n_trees = self.trees.len() as f64;
        Ok(x.rows()
            .iter()
            .map(|row| self.trees.iter().map(|t| t.predict_proba_row(row)).sum::<f64>() / n_trees)
            .collect())
    }

    /// 0/1 prediction per row; positive when more than half of the averaged vote is positive
    pub fn predict(&self, x: &FeatureMatrix) -> Result<Vec<u8>> {
        Ok(self.predict_proba(x)?.into_iter().map(|p| u8::from(p > 0.5)).collect())
    }
}
