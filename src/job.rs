use crate::dispatch::{Dispatched, Dispatcher};
use crate::error::{RemuxError, RemuxResult};
use crate::report::Report;
use crate::scanner::Scanner;
use crate::unit::{ConversionUnit, DirectoryPair};
use async_channel::{Receiver, Sender};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info, warn};

/// Upper bound on concurrent transcoder processes.
pub const MAX_WORKERS: usize = 256;

struct JobOutcome {
    context: PathBuf,
    result: RemuxResult<Dispatched>,
}

/// Feeds scanned units to a fixed number of workers, each running one transcoder at a time.
#[derive(Clone, Debug)]
pub struct JobRunner {
    dispatcher: Dispatcher,
    workers: usize,
    fail_fast: bool,
}

impl JobRunner {
    pub fn new(dispatcher: Dispatcher, workers: usize, fail_fast: bool) -> Self {
        Self {
            dispatcher,
            workers: workers.clamp(1, MAX_WORKERS),
            fail_fast,
        }
    }

    /// Scan `pair.input` and convert everything found into `pair.output`.
    ///
    /// Unit failures are recorded in `report`. With `fail_fast` the first failure stops
    /// the scan, no further unit is started, and the error is returned once in-flight
    /// units have finished.
    pub async fn run_pair(&self, pair: &DirectoryPair, report: &mut Report) -> RemuxResult<()> {
        let scanner = Scanner::new(&pair.input)?;
        info!(
            input = %pair.input.display(),
            output = %pair.output.display(),
            workers = self.workers,
            "Processing directory pair"
        );

        let (unit_tx, unit_rx) = async_channel::bounded(self.workers.saturating_mul(2));
        let (outcome_tx, outcome_rx) = async_channel::unbounded();
        let cancelled = Arc::new(AtomicBool::new(false));

        let producer = {
            let pair = pair.clone();
            tokio::task::spawn_blocking(move || {
                for item in scanner {
                    let item = item.map(|entry| ConversionUnit::new(entry, &pair));
                    if unit_tx.send_blocking(item).is_err() {
                        debug!(input = %pair.input.display(), "Unit queue closed, stop scanning");
                        break;
                    }
                }
            })
        };

        let workers = (0..self.workers)
            .map(|worker| {
                let worker = Worker {
                    id: worker,
                    input: pair.input.clone(),
                    dispatcher: self.dispatcher.clone(),
                    units: unit_rx.clone(),
                    outcomes: outcome_tx.clone(),
                    cancelled: cancelled.clone(),
                    fail_fast: self.fail_fast,
                };
                tokio::spawn(worker.run())
            })
            .collect::<Vec<_>>();
        drop(outcome_tx);

        let mut abort = None;
        while let Ok(JobOutcome { context, result }) = outcome_rx.recv().await {
            match result {
                Ok(dispatched) => {
                    info!(
                        entry = %context.display(),
                        output = %dispatched.output.display(),
                        "Remux completed"
                    );
                    report.record_success(dispatched.output);
                }
                Err(error) if self.fail_fast && abort.is_none() => {
                    error!(entry = %context.display(), %error, "Aborting run");
                    abort = Some(error);
                }
                Err(error) => {
                    warn!(entry = %context.display(), %error, "Unit failed");
                    report.record_failure(context, error);
                }
            }
        }

        for result in futures::future::join_all(workers).await {
            if let Err(error) = result {
                error!(%error, "Worker task failed");
            }
        }
        if let Err(error) = producer.await {
            error!(%error, "Scanner task failed");
        }

        match abort {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

struct Worker {
    id: usize,
    input: PathBuf,
    dispatcher: Dispatcher,
    units: Receiver<RemuxResult<ConversionUnit>>,
    outcomes: Sender<JobOutcome>,
    cancelled: Arc<AtomicBool>,
    fail_fast: bool,
}

impl Worker {
    async fn run(self) {
        while let Ok(item) = self.units.recv().await {
            if self.cancelled.load(Ordering::Acquire) {
                break;
            }

            let outcome = match item {
                Ok(unit) => {
                    debug!(worker = self.id, entry = %unit.entry_dir.display(), "Unit received");
                    JobOutcome {
                        context: unit.entry_dir.clone(),
                        result: self.dispatcher.dispatch(&unit).await,
                    }
                }
                Err(error) => JobOutcome {
                    context: error_context(&error).unwrap_or_else(|| self.input.clone()),
                    result: Err(error),
                },
            };

            if self.fail_fast && outcome.result.is_err() {
                self.cancelled.store(true, Ordering::Release);
                self.units.close();
            }

            if self.outcomes.send(outcome).await.is_err() {
                break;
            }
        }
        debug!(worker = self.id, "Worker finished");
    }
}

/// Directory an entry-level error points at, if any.
fn error_context(error: &RemuxError) -> Option<PathBuf> {
    match error {
        RemuxError::Metadata { path, .. } => path.parent().map(PathBuf::from),
        RemuxError::Scan { path, .. } => Some(path.clone()),
        _ => None,
    }
}
