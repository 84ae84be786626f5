use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use log::info;
use triage::{
    init_logger, Corpus, Evaluator, Hyperparameters, ModelStore, ParamGrid, RuntimeConfig, TableSchema, TrainerBuilder,
};

const USAGE: &str = "Please provide the filepath of the disaster messages database as the first argument \
and the filepath of the model file to save the model to as the second argument.\n\n\
Example: triage_train data/disaster_messages.csv models/classifier.bin";

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Cleaned message table (CSV)
    database_filepath: Option<PathBuf>,

    /// Where to write the trained model
    model_filepath: Option<PathBuf>,

    /// Fraction of rows held out for evaluation
    #[arg(long, default_value_t = 0.2)]
    test_size: f64,

    /// Cross-validation folds
    #[arg(long, default_value_t = 3)]
    folds: usize,

    /// Worker threads (0 = one per core)
    #[arg(short, long, default_value_t = 0)]
    jobs: usize,

    /// Seed for the train/test split, fold shuffling and every forest
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Candidate forest sizes
    #[arg(long, value_delimiter = ',', default_values_t = vec![100])]
    n_estimators: Vec<usize>,

    /// Candidate depth limits; unlimited when omitted
    #[arg(long, value_delimiter = ',')]
    max_depth: Vec<usize>,

    /// Candidate minimum node sizes for a split
    #[arg(long, value_delimiter = ',', default_values_t = vec![2])]
    min_samples_split: Vec<usize>,

    /// Also try plain term frequencies without idf weighting
    #[arg(long)]
    search_idf: bool,

    /// Header of the message column
    #[arg(long, default_value = "message")]
    message_column: String,

    /// Index of the first category column
    #[arg(long, default_value_t = 4)]
    label_offset: usize,
}

impl Args {
    fn grid(&self) -> ParamGrid {
        let max_depth = if self.max_depth.is_empty() {
            vec![None]
        } else {
            self.max_depth.iter().copied().map(Some).collect()
        };
        let use_idf = if self.search_idf { vec![true, false] } else { vec![true] };
        ParamGrid::single(Hyperparameters::default())
            .with_n_estimators(self.n_estimators.clone())
            .with_max_depth(max_depth)
            .with_min_samples_split(self.min_samples_split.clone())
            .with_use_idf(use_idf)
    }
}

fn main() -> anyhow::Result<()> {
    init_logger();
    let args = Args::parse();

    let (database_filepath, model_filepath) = match (&args.database_filepath, &args.model_filepath) {
        (Some(db), Some(model)) => (db.clone(), model.clone()),
        _ => {
            println!("{}", USAGE);
            return Ok(());
        }
    };

    let start_time = Instant::now();
    println!("Loading data...\n    DATABASE: {}", database_filepath.display());
    let schema = TableSchema {
        message_column: args.message_column.clone(),
        label_offset: args.label_offset,
    };
    let corpus = Corpus::from_csv_path(&database_filepath, &schema)
        .with_context(|| format!("failed to load {}", database_filepath.display()))?;
    let (train, test) = corpus.train_test_split(args.test_size, args.seed)?;
    info!("Split {} rows into {} train / {} test", corpus.len(), train.len(), test.len());

    println!("Building model...");
    let trainer = TrainerBuilder::new()
        .with_grid(args.grid())
        .with_folds(args.folds)
        .with_seed(args.seed)
        .with_runtime_config(RuntimeConfig { n_jobs: args.jobs })
        .build()?;

    println!("Training model...");
    let (model, search) = trainer.fit_corpus(&train)?;
    info!("\n{}", search);

    println!("Evaluating model...");
    let report = Evaluator::new().evaluate(&model, test.messages(), test.labels(), test.category_names())?;
    println!("{}", report);

    println!("Saving model...\n    MODEL: {}", model_filepath.display());
    ModelStore::new()
        .save(&model, &model_filepath)
        .with_context(|| format!("failed to save {}", model_filepath.display()))?;

    println!("Trained model saved!");
    info!("Done in {:.2?}", start_time.elapsed());
    Ok(())
}
