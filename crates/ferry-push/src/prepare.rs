//! Once-per-repository preparation.
//!
//! Every tag of a destination repository waits on the same preparation:
//! pre-push hooks plus the listing of tags that already exist. The first
//! task to arrive runs it; the rest wait and share the outcome, success or
//! failure.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::OnceCell;

use crate::error::PushError;

/// Tags already present in a destination repository.
pub(crate) type ExistingTags = Arc<HashSet<String>>;

/// Memoized outcome of preparing one repository.
pub(crate) type Preparation = Result<ExistingTags, Arc<PushError>>;

/// Runs each repository's preparation at most once.
#[derive(Debug, Default)]
pub(crate) struct PreparationBarrier {
    cells: Mutex<HashMap<String, Arc<OnceCell<Preparation>>>>,
}

impl PreparationBarrier {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Returns the preparation result for `repository`, running `prepare`
    /// only if no other task has started it.
    pub(crate) async fn get_or_prepare<F, Fut>(&self, repository: &str, prepare: F) -> Preparation
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<HashSet<String>, PushError>>,
    {
        let cell = {
            let mut cells = self.cells.lock();
            Arc::clone(cells.entry(repository.to_string()).or_default())
        };

        cell.get_or_init(|| async move {
            prepare().await.map(Arc::new).map_err(Arc::new)
        })
        .await
        .clone()
    }
}
