use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::Once;

use crate::classifier::tokenizer::init_lemmatizer;
use crate::classifier::{ClassifierError, Result};

static INIT: Once = Once::new();

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Worker threads for training; 0 uses one per available core
    pub n_jobs: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            n_jobs: 0, // Let rayon decide
        }
    }
}

impl RuntimeConfig {
    pub fn with_n_jobs(n_jobs: usize) -> Self {
        Self { n_jobs }
    }
}

/// Builds the shared lemmatizer tables once per process
pub fn ensure_initialized() {
    INIT.call_once(init_lemmatizer);
}

pub fn create_thread_pool(config: &RuntimeConfig) -> Result<ThreadPool> {
    ensure_initialized();
    let mut builder = ThreadPoolBuilder::new()
        .thread_name(|idx| format!("triage-worker-{}", idx))
        .stack_size(8 * 1024 * 1024);

    // Configure threading
    if config.n_jobs > 0 {
        builder = builder.num_threads(config.n_jobs);
    }

    builder
        .build()
        .map_err(|e| ClassifierError::Config(format!("failed to build worker pool: {}", e)))
}

/// Runs `op` inside a worker pool sized by `config`. Parallel iterators started by `op` use
/// that pool instead of the global one.
pub fn run_with_pool<OP, R>(config: &RuntimeConfig, op: OP) -> Result<R>
where
    OP: FnOnce() -> R + Send,
    R: Send,
{
    let pool = create_thread_pool(config)?;
    Ok(pool.install(op))
}
