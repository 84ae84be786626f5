//! An offline trainer for multi-label disaster message classifiers.
//!
//! Messages are tokenized and lemmatized, turned into tf-idf weighted term vectors, and
//! classified by one random forest per category. Hyperparameters are chosen by cross-validated
//! grid search; the winning pipeline is refit on all training rows.
//!
//! # Basic Usage
//!
//! ```rust
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use triage::{Evaluator, Hyperparameters, LabelMatrix, MaxFeatures, ParamGrid, TrainerBuilder};
//!
//! let messages = ["we need water", "send food", "water please", "food please"];
//! let labels = LabelMatrix::from_rows(
//!     vec!["water".into(), "food".into()],
//!     &[vec![1, 0], vec![0, 1], vec![1, 0], vec![0, 1]],
//! )?;
//!
//! let grid = ParamGrid::single(Hyperparameters {
//!     n_estimators: 10,
//!     bootstrap: false,
//!     max_features: MaxFeatures::All,
//!     ..Hyperparameters::default()
//! });
//! let trainer = TrainerBuilder::new().with_grid(grid).with_folds(2).build()?;
//! let (model, _search) = trainer.fit(&messages, &labels)?;
//!
//! let report = Evaluator::new().evaluate(&model, &messages, &labels, labels.categories())?;
//! println!("{}", report);
//! # Ok(())
//! # }
//! ```
//!
//! # Thread Safety
//!
//! A fitted `Model` is read-only and can be shared across threads using `Arc`. Training uses a
//! rayon pool sized by `RuntimeConfig::n_jobs`; results do not depend on the pool size.

pub mod classifier;
pub mod corpus;
mod runtime;
pub mod store;

pub use classifier::{
    lemmatize, tokenize, CandidateResult, CategoryScore, ClassifierError, EvaluationReport, Evaluator,
    FeatureExtractor, FeatureMatrix, FeatureVector, Hyperparameters, KFold, MaxFeatures, MetricSummary, Model,
    ModelInfo, ModelTrainer, ParamGrid, Result, Scoring, SearchReport, TrainerBuilder, TrainerConfig, Transformer,
};
pub use corpus::{Corpus, LabelMatrix, TableSchema};
pub use runtime::{create_thread_pool, ensure_initialized, RuntimeConfig};
pub use store::{ModelStore, CURRENT_SCHEMA_VERSION};

pub fn init_logger() {
    env_logger::init();
}
