use std::collections::HashMap;

use crossbeam::channel;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::coordinator::search::{CoordinatedSearchResult, SearchCoordinator};
use crate::core::types::CancellationToken;

impl SearchCoordinator {
    /// Search many variables with bounded concurrency.
    ///
    /// `concurrency` caps the worker threads; zero means one per CPU. Workers
    /// pull variables from a shared queue and stop dispatching once the token
    /// is cancelled; items already being searched run to completion. A
    /// variable whose search fails is logged and left out of the result map.
    pub fn batch_search(
        &self,
        variables: &[String],
        concurrency: usize,
        token: &CancellationToken,
    ) -> HashMap<String, CoordinatedSearchResult> {
        if variables.is_empty() {
            return HashMap::new();
        }
        let workers = if concurrency == 0 {
            num_cpus::get()
        } else {
            concurrency
        }
        .min(variables.len())
        .max(1);

        let (tx, rx) = channel::unbounded::<String>();
        for variable in variables {
            let _ = tx.send(variable.clone());
        }
        drop(tx);

        let results: Mutex<HashMap<String, CoordinatedSearchResult>> = Mutex::new(HashMap::new());
        std::thread::scope(|scope| {
            for _ in 0..workers {
                let rx = rx.clone();
                let results = &results;
                scope.spawn(move || {
                    while let Ok(variable) = rx.recv() {
                        if token.is_cancelled() {
                            debug!("batch search cancelled, worker stopping");
                            break;
                        }
                        match self.search(&variable) {
                            Ok(result) => {
                                results.lock().insert(variable, result);
                            }
                            Err(err) => {
                                warn!(variable = %variable, error = %err, "batch search item failed");
                            }
                        }
                    }
                });
            }
        });
        results.into_inner()
    }
}
