mod builder;
mod error;
mod evaluation;
mod features;
mod forest;
mod model;
mod multi_output;
mod search;
pub(crate) mod tokenizer;
mod utils;

pub use builder::{ModelTrainer, TrainerBuilder, TrainerConfig};
pub use error::{ClassifierError, Result};
pub use evaluation::{CategoryScore, EvaluationReport, Evaluator, MetricSummary};
pub use features::{
    tokenize_all, CountVectorizer, FeatureExtractor, FeatureMatrix, FeatureVector, TfidfTransformer, TokenizedDoc,
    Transformer,
};
pub use forest::{DecisionTree, MaxFeatures, RandomForest};
pub use model::{Hyperparameters, Model};
pub use multi_output::MultiOutputClassifier;
pub use search::{CandidateResult, FoldSplit, GridSearch, KFold, ParamGrid, Scoring, SearchReport};
pub use tokenizer::{lemmatize, tokenize};

/// Information about a fitted model
#[derive(Debug, Clone)]
pub struct ModelInfo {
    /// Category names in prediction column order
    pub categories: Vec<String>,
    /// Number of terms in the frozen vocabulary
    pub vocabulary_size: usize,
    /// Number of trees in each category's forest
    pub trees_per_category: Vec<usize>,
    /// Hyperparameters the model was fitted with
    pub params: Hyperparameters,
}
