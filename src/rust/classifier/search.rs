//! Cross-validated grid search over pipeline hyperparameters.
//!
//! The grid is an explicit, enumerable configuration space. Each (candidate, fold) pair is an
//! independent unit of work: it fits a private pipeline on its own training folds and scores it
//! on its own validation fold. Units may run on any number of workers; the reduction over their
//! scores happens afterwards in grid order, so the selected candidate does not depend on
//! scheduling or on the worker count.

use std::fmt;

use log::{debug, info};
use ndarray::{Array2, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::error::{ClassifierError, Result};
use super::features::TokenizedDoc;
use super::forest::MaxFeatures;
use super::model::{Hyperparameters, Model};
use super::utils::mean_and_std;
use crate::runtime::{run_with_pool, RuntimeConfig};

/// Candidate values per hyperparameter. Enumeration order is fixed: `n_estimators` is the
/// outermost axis and `use_idf` varies fastest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamGrid {
    pub n_estimators: Vec<usize>,
    pub max_depth: Vec<Option<usize>>,
    pub min_samples_split: Vec<usize>,
    pub max_features: Vec<MaxFeatures>,
    pub bootstrap: Vec<bool>,
    pub use_idf: Vec<bool>,
    /// Not searched; applied to every candidate
    pub min_samples_leaf: usize,
}

impl Default for ParamGrid {
    fn default() -> Self {
        Self::single(Hyperparameters::default())
    }
}

impl ParamGrid {
    /// A grid holding exactly one candidate
    pub fn single(params: Hyperparameters) -> Self {
        Self {
            n_estimators: vec![params.n_estimators],
            max_depth: vec![params.max_depth],
            min_samples_split: vec![params.min_samples_split],
            max_features: vec![params.max_features],
            bootstrap: vec![params.bootstrap],
            use_idf: vec![params.use_idf],
            min_samples_leaf: params.min_samples_leaf,
        }
    }

    pub fn with_n_estimators(mut self, values: Vec<usize>) -> Self {
        self.n_estimators = values;
        self
    }

    pub fn with_max_depth(mut self, values: Vec<Option<usize>>) -> Self {
        self.max_depth = values;
        self
    }

    pub fn with_min_samples_split(mut self, values: Vec<usize>) -> Self {
        self.min_samples_split = values;
        self
    }

    pub fn with_max_features(mut self, values: Vec<MaxFeatures>) -> Self {
        self.max_features = values;
        self
    }

    pub fn with_bootstrap(mut self, values: Vec<bool>) -> Self {
        self.bootstrap = values;
        self
    }

    pub fn with_use_idf(mut self, values: Vec<bool>) -> Self {
        self.use_idf = values;
        self
    }

    /// Number of candidates
    pub fn len(&self) -> usize {
        self.n_estimators.len()
            * self.max_depth.len()
            * self.min_samples_split.len()
            * self.max_features.len()
            * self.bootstrap.len()
            * self.use_idf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Candidates in enumeration order
    pub fn iter(&self) -> impl Iterator<Item = Hyperparameters> + '_ {
        let min_samples_leaf = self.min_samples_leaf;
        self.n_estimators.iter().flat_map(move |&n_estimators| {
            self.max_depth.iter().flat_map(move |&max_depth| {
                self.min_samples_split.iter().flat_map(move |&min_samples_split| {
                    self.max_features.iter().flat_map(move |&max_features| {
                        self.bootstrap.iter().flat_map(move |&bootstrap| {
                            self.use_idf.iter().map(move |&use_idf| Hyperparameters {
                                n_estimators,
                                max_depth,
                                min_samples_split,
                                min_samples_leaf,
                                max_features,
                                bootstrap,
                                use_idf,
                            })
                        })
                    })
                })
            })
        })
    }
}

/// Validation score of a fitted model on one fold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Scoring {
    /// Fraction of messages whose every category is predicted correctly
    #[default]
    SubsetAccuracy,
    /// Fraction of (message, category) cells predicted correctly
    HammingAccuracy,
}

impl Scoring {
    pub fn score(&self, y_true: &Array2<u8>, y_pred: &Array2<u8>) -> f64 {
        let n = y_true.nrows();
        if n == 0 {
            return 0.0;
        }
        match self {
            Scoring::SubsetAccuracy => {
                let exact = y_true
                    .axis_iter(Axis(0))
                    .zip(y_pred.axis_iter(Axis(0)))
                    .filter(|(t, p)| t == p)
                    .count();
                exact as f64 / n as f64
            }
            Scoring::HammingAccuracy => {
                let cells = y_true.len();
                if cells == 0 {
                    return 0.0;
                }
                let correct = y_true.iter().zip(y_pred.iter()).filter(|(t, p)| t == p).count();
                correct as f64 / cells as f64
            }
        }
    }
}

/// One train/validation split
#[derive(Debug, Clone)]
pub struct FoldSplit {
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
}

/// K-fold splitter. Folds are contiguous blocks of the (optionally shuffled) row order; the
/// first `n % k` folds hold one extra row.
#[derive(Debug, Clone)]
pub struct KFold {
    pub n_splits: usize,
    pub shuffle: bool,
    pub seed: u64,
}

impl KFold {
    pub fn new(n_splits: usize) -> Self {
        Self {
            n_splits,
            shuffle: false,
            seed: 0,
        }
    }

    pub fn with_shuffle(mut self, seed: u64) -> Self {
        self.shuffle = true;
        self.seed = seed;
        self
    }

    pub fn split(&self, n_samples: usize) -> Result<Vec<FoldSplit>> {
        if self.n_splits < 2 {
            return Err(ClassifierError::Config("number of folds must be at least 2".into()));
        }
        if n_samples < self.n_splits {
            return Err(ClassifierError::Config(format!(
                "cannot split {} rows into {} folds",
                n_samples, self.n_splits
            )));
        }

        let mut indices: Vec<usize> = (0..n_samples).collect();
        if self.shuffle {
            indices.shuffle(&mut ChaCha8Rng::seed_from_u64(self.seed));
        }

        let base = n_samples / self.n_splits;
        let remainder = n_samples % self.n_splits;
        let mut splits = Vec::with_capacity(self.n_splits);
        let mut current = 0;
        for fold_idx in 0..self.n_splits {
            let fold_size = if fold_idx < remainder { base + 1 } else { base };
            let test_indices = indices[current..current + fold_size].to_vec();
            let train_indices = indices[..current]
                .iter()
                .chain(indices[current + fold_size..].iter())
                .copied()
                .collect();
            splits.push(FoldSplit {
                train_indices,
                test_indices,
            });
            current += fold_size;
        }
        Ok(splits)
    }
}

/// Cross-validation outcome of one candidate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateResult {
    pub params: Hyperparameters,
    pub fold_scores: Vec<f64>,
    pub mean_score: f64,
    pub std_score: f64,
}

/// Outcome of a grid search: every candidate in grid order and the index of the winner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchReport {
    pub candidates: Vec<CandidateResult>,
    pub best_index: usize,
    pub scoring: Scoring,
}

impl SearchReport {
    pub fn best(&self) -> &CandidateResult {
        &self.candidates[self.best_index]
    }
}

impl fmt::Display for SearchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Grid search ({:?}, {} candidates):", self.scoring, self.candidates.len())?;
        for (idx, candidate) in self.candidates.iter().enumerate() {
            let marker = if idx == self.best_index { "*" } else { " " };
            writeln!(
                f,
                "{} {:.4} (+/- {:.4})  {}",
                marker, candidate.mean_score, candidate.std_score, candidate.params
            )?;
        }
        Ok(())
    }
}

/// Index of the highest mean score; the earliest candidate wins ties.
pub(crate) fn select_best(means: &[f64]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (idx, &mean) in means.iter().enumerate() {
        match best {
            Some(b) if mean <= means[b] => {}
            _ => best = Some(idx),
        }
    }
    best
}

/// Exhaustive cross-validated search over a `ParamGrid`.
#[derive(Debug, Clone)]
pub struct GridSearch {
    pub grid: ParamGrid,
    pub folds: KFold,
    pub scoring: Scoring,
    pub seed: u64,
    pub runtime: RuntimeConfig,
}

impl GridSearch {
    /// Scores every candidate on every fold, selects the best mean, and refits that candidate
    /// on all rows.
    pub fn run(&self, docs: &[TokenizedDoc], categories: &[String], y: &Array2<u8>) -> Result<(Model, SearchReport)> {
        if docs.is_empty() {
            return Err(ClassifierError::EmptyTrainingSet);
        }
        if self.grid.is_empty() {
            return Err(ClassifierError::Config("hyperparameter grid has no candidates".into()));
        }

        let candidates: Vec<Hyperparameters> = self.grid.iter().collect();
        let splits = self.folds.split(docs.len())?;
        let units: Vec<(usize, usize)> = (0..candidates.len())
            .flat_map(|c| (0..splits.len()).map(move |f| (c, f)))
            .collect();
        info!(
            "Searching {} candidates x {} folds = {} fits",
            candidates.len(),
            splits.len(),
            units.len()
        );

        let scores: Vec<f64> = run_with_pool(&self.runtime, || {
            units
                .par_iter()
                .map(|&(c, f)| self.score_unit(&candidates[c], &splits[f], docs, categories, y))
                .collect::<Result<Vec<f64>>>()
        })??;

        let results: Vec<CandidateResult> = candidates
            .into_iter()
            .enumerate()
            .map(|(c, params)| {
                let fold_scores = scores[c * splits.len()..(c + 1) * splits.len()].to_vec();
                let (mean_score, std_score) = mean_and_std(&fold_scores);
                debug!("Candidate {} [{}]: folds {:?}", c, params, fold_scores);
                CandidateResult {
                    params,
                    fold_scores,
                    mean_score,
                    std_score,
                }
            })
            .collect();

        let means: Vec<f64> = results.iter().map(|r| r.mean_score).collect();
        let best_index = select_best(&means)
            .ok_or_else(|| ClassifierError::Config("hyperparameter grid has no candidates".into()))?;
        info!(
            "Selected candidate {} with mean {:?} {:.4}: {}",
            best_index, self.scoring, results[best_index].mean_score, results[best_index].params
        );

        let mut model = Model::new(results[best_index].params.clone(), self.seed);
        run_with_pool(&self.runtime, || model.fit_tokens(docs, categories, y).map(|_| ()))??;

        Ok((
            model,
            SearchReport {
                candidates: results,
                best_index,
                scoring: self.scoring,
            },
        ))
    }

    fn score_unit(
        &self,
        params: &Hyperparameters,
        split: &FoldSplit,
        docs: &[TokenizedDoc],
        categories: &[String],
        y: &Array2<u8>,
    ) -> Result<f64> {
        let train_docs: Vec<TokenizedDoc> = split.train_indices.iter().map(|&i| docs[i].clone()).collect();
        let test_docs: Vec<TokenizedDoc> = split.test_indices.iter().map(|&i| docs[i].clone()).collect();
        let y_train = y.select(Axis(0), &split.train_indices);
        let y_test = y.select(Axis(0), &split.test_indices);

        let mut model = Model::new(params.clone(), self.seed);
        model.fit_tokens(&train_docs, categories, &y_train)?;
        let y_pred = model.predict_tokens(&test_docs)?;
        Ok(self.scoring.score(&y_test, &y_pred))
    }
}
