use log::info;

use super::error::{ClassifierError, Result};
use super::features::tokenize_all;
use super::model::Model;
use super::search::{GridSearch, KFold, ParamGrid, Scoring, SearchReport};
use crate::corpus::{Corpus, LabelMatrix};
use crate::runtime::{ensure_initialized, RuntimeConfig};

/// Settings of one training run
#[derive(Debug, Clone)]
pub struct TrainerConfig {
    /// Cross-validation folds per candidate
    pub folds: usize,
    /// Shuffle rows before cutting folds
    pub shuffle_folds: bool,
    /// Seed for fold shuffling and every forest
    pub seed: u64,
    pub scoring: Scoring,
    pub grid: ParamGrid,
    pub runtime: RuntimeConfig,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            folds: 3,
            shuffle_folds: false,
            seed: 42,
            scoring: Scoring::default(),
            grid: ParamGrid::default(),
            runtime: RuntimeConfig::default(),
        }
    }
}

/// A builder for constructing a ModelTrainer with a fluent interface.
#[derive(Debug, Default)]
pub struct TrainerBuilder {
    config: TrainerConfig,
}

impl TrainerBuilder {
    /// Creates a builder holding the default configuration
    ///
    /// # Example
    /// ```
    /// use triage::TrainerBuilder;
    ///
    /// let trainer = TrainerBuilder::new().build().unwrap();
    /// assert_eq!(trainer.config().folds, 3);
    /// ```
    pub fn new() -> Self {
        Self {
            config: TrainerConfig::default(),
        }
    }

    /// Sets the hyperparameter grid searched during training
    ///
    /// # Example
    /// ```
    /// use triage::{ParamGrid, TrainerBuilder};
    ///
    /// let grid = ParamGrid::default()
    ///     .with_n_estimators(vec![10, 50])
    ///     .with_use_idf(vec![true, false]);
    /// let trainer = TrainerBuilder::new().with_grid(grid).build().unwrap();
    /// assert_eq!(trainer.config().grid.len(), 4);
    /// ```
    pub fn with_grid(mut self, grid: ParamGrid) -> Self {
        self.config.grid = grid;
        self
    }

    /// Sets the number of cross-validation folds (at least 2)
    pub fn with_folds(mut self, folds: usize) -> Self {
        self.config.folds = folds;
        self
    }

    pub fn with_shuffle_folds(mut self, shuffle: bool) -> Self {
        self.config.shuffle_folds = shuffle;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }

    pub fn with_scoring(mut self, scoring: Scoring) -> Self {
        self.config.scoring = scoring;
        self
    }

    /// Sets the worker pool used for the search
    ///
    /// # Example
    /// ```
    /// use triage::{RuntimeConfig, TrainerBuilder};
    ///
    /// let trainer = TrainerBuilder::new()
    ///     .with_runtime_config(RuntimeConfig { n_jobs: 1 })
    ///     .build()
    ///     .unwrap();
    /// ```
    pub fn with_runtime_config(mut self, config: RuntimeConfig) -> Self {
        self.config.runtime = config;
        self
    }

    /// Validates the configuration and creates the trainer
    ///
    /// # Errors
    /// * `ClassifierError::Config` if there are fewer than 2 folds, the grid is empty, or a
    ///   candidate can never be trained (no trees, `min_samples_split < 2`,
    ///   `min_samples_leaf == 0`, a zero depth limit)
    pub fn build(self) -> Result<ModelTrainer> {
        let config = self.config;
        if config.folds < 2 {
            return Err(ClassifierError::Config(format!(
                "at least 2 folds are required, got {}",
                config.folds
            )));
        }
        if config.grid.is_empty() {
            return Err(ClassifierError::Config("hyperparameter grid has no candidates".into()));
        }
        if config.grid.n_estimators.contains(&0) {
            return Err(ClassifierError::Config("n_estimators must be positive".into()));
        }
        if config.grid.max_depth.contains(&Some(0)) {
            return Err(ClassifierError::Config("max_depth must be positive".into()));
        }
        if config.grid.min_samples_split.iter().any(|&m| m < 2) {
            return Err(ClassifierError::Config("min_samples_split must be at least 2".into()));
        }
        if config.grid.min_samples_leaf == 0 {
            return Err(ClassifierError::Config("min_samples_leaf must be positive".into()));
        }
        Ok(ModelTrainer { config })
    }
}

/// Produces one fitted `Model` from a labeled corpus by cross-validated grid search.
///
/// Every (candidate, fold) unit fits its own pipeline, so vocabulary and term weights never see
/// the validation fold. The winning candidate is refit on all training rows and returned.
#[derive(Debug, Clone)]
pub struct ModelTrainer {
    config: TrainerConfig,
}

impl ModelTrainer {
    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    /// Fits on messages and their labels.
    ///
    /// # Errors
    /// * `ClassifierError::EmptyTrainingSet` if there are no rows
    /// * `ClassifierError::DimensionMismatch` if messages and label rows disagree
    /// * `ClassifierError::Config` if a fold would be empty
    pub fn fit<S: AsRef<str>>(&self, messages: &[S], labels: &LabelMatrix) -> Result<(Model, SearchReport)> {
        if messages.is_empty() {
            return Err(ClassifierError::EmptyTrainingSet);
        }
        if messages.len() != labels.nrows() {
            return Err(ClassifierError::dimension_mismatch(
                format!("{} label rows", messages.len()),
                format!("{} label rows", labels.nrows()),
            ));
        }
        if labels.categories().is_empty() {
            return Err(ClassifierError::EmptyCategorySet);
        }

        ensure_initialized();
        info!(
            "Training on {} messages, {} categories, {} folds",
            messages.len(),
            labels.categories().len(),
            self.config.folds
        );
        let docs = tokenize_all(messages);

        let mut folds = KFold::new(self.config.folds);
        if self.config.shuffle_folds {
            folds = folds.with_shuffle(self.config.seed);
        }
        let search = GridSearch {
            grid: self.config.grid.clone(),
            folds,
            scoring: self.config.scoring,
            seed: self.config.seed,
            runtime: self.config.runtime.clone(),
        };
        let (model, report) = search.run(&docs, labels.categories(), labels.values())?;
        model.log_summary();
        Ok((model, report))
    }

    /// Fits on every record of a corpus
    pub fn fit_corpus(&self, corpus: &Corpus) -> Result<(Model, SearchReport)> {
        self.fit(corpus.messages(), corpus.labels())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::forest::MaxFeatures;
    use crate::classifier::model::Hyperparameters;

    fn small_grid() -> ParamGrid {
        ParamGrid::single(Hyperparameters {
            n_estimators: 3,
            bootstrap: false,
            max_features: MaxFeatures::All,
            ..Hyperparameters::default()
        })
    }

    #[test]
    fn test_build_validation() {
        assert!(matches!(TrainerBuilder::new().with_folds(1).build(), Err(ClassifierError::Config(_))));
        let empty = ParamGrid::default().with_use_idf(vec![]);
        assert!(matches!(TrainerBuilder::new().with_grid(empty).build(), Err(ClassifierError::Config(_))));
        let no_trees = ParamGrid::default().with_n_estimators(vec![0]);
        assert!(matches!(TrainerBuilder::new().with_grid(no_trees).build(), Err(ClassifierError::Config(_))));
        let bad_split = ParamGrid::default().with_min_samples_split(vec![1]);
        assert!(matches!(TrainerBuilder::new().with_grid(bad_split).build(), Err(ClassifierError::Config(_))));
    }

    #[test]
    fn test_empty_training_set() {
        let trainer = TrainerBuilder::new().with_grid(small_grid()).build().unwrap();
        let labels = LabelMatrix::from_rows(vec!["water".into()], &[]).unwrap();
        let messages: Vec<String> = Vec::new();
        assert!(matches!(trainer.fit(&messages, &labels), Err(ClassifierError::EmptyTrainingSet)));
    }

    #[test]
    fn test_fit_reports_every_candidate() {
        let messages = [
            "we need water",
            "send food",
            "water please",
            "food please",
            "no water here",
            "food is gone",
        ];
        let labels = LabelMatrix::from_rows(
            vec!["water".into(), "food".into()],
            &[vec![1, 0], vec![0, 1], vec![1, 0], vec![0, 1], vec![1, 0], vec![0, 1]],
        )
        .unwrap();
        let grid = small_grid().with_use_idf(vec![true, false]);
        let trainer = TrainerBuilder::new()
            .with_grid(grid)
            .with_folds(2)
            .with_runtime_config(RuntimeConfig { n_jobs: 2 })
            .build()
            .unwrap();

        let (model, report) = trainer.fit(&messages, &labels).unwrap();
        assert_eq!(report.candidates.len(), 2);
        assert!(report.candidates.iter().all(|c| c.fold_scores.len() == 2));
        assert_eq!(model.params(), &report.best().params);
        assert_eq!(&model.predict(&messages).unwrap(), labels.values());
    }
}
