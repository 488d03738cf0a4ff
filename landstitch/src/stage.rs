//! Lazy, memoized pipeline stages.
//!
//! A [`Stage`] wraps one computation step of the tile cleanup pipeline. The
//! computation runs at most once, on first demand, and the result is shared
//! behind an `Arc` by every downstream consumer. Stages chain into a lazy
//! dependency graph, so a pipeline that short-circuits early never pays for
//! the steps it skipped.

use std::sync::{Arc, Mutex, OnceLock};
use std::time::Instant;
use tracing::debug;

type Compute<T> = Box<dyn FnOnce() -> Vec<T> + Send>;

/// One memoized computation step producing a set of geometries.
pub struct Stage<T> {
    name: &'static str,
    compute: Mutex<Option<Compute<T>>>,
    result: OnceLock<Arc<Vec<T>>>,
}

impl<T: Send + Sync + 'static> Stage<T> {
    /// Creates a stage from a deferred computation.
    pub fn new<F>(name: &'static str, compute: F) -> Arc<Self>
    where
        F: FnOnce() -> Vec<T> + Send + 'static,
    {
        Arc::new(Self {
            name,
            compute: Mutex::new(Some(Box::new(compute))),
            result: OnceLock::new(),
        })
    }

    /// Creates an already-resolved stage holding `value`.
    pub fn from_value(name: &'static str, value: Vec<T>) -> Arc<Self> {
        let stage = Self {
            name,
            compute: Mutex::new(None),
            result: OnceLock::new(),
        };
        stage
            .result
            .set(Arc::new(value))
            .unwrap_or_else(|_| unreachable!("fresh OnceLock"));
        Arc::new(stage)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Runs the computation if it has not run yet and returns the shared
    /// result.
    pub fn execute(&self) -> Arc<Vec<T>> {
        self.result
            .get_or_init(|| {
                let compute = self
                    .compute
                    .lock()
                    .expect("stage mutex poisoned")
                    .take()
                    .expect("stage computation already consumed");
                let started = Instant::now();
                let value = compute();
                debug!(
                    stage = self.name,
                    items = value.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "stage complete"
                );
                Arc::new(value)
            })
            .clone()
    }

    /// Derives a new stage whose computation consumes this stage's result.
    pub fn chain<U, F>(self: &Arc<Self>, name: &'static str, transform: F) -> Arc<Stage<U>>
    where
        U: Send + Sync + 'static,
        F: FnOnce(&[T]) -> Vec<U> + Send + 'static,
    {
        let parent = Arc::clone(self);
        Stage::new(name, move || transform(&parent.execute()))
    }
}
