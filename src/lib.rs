pub mod config;
pub mod dispatch;
pub mod entry;
pub mod error;
pub mod job;
pub mod report;
pub mod scanner;
pub mod tool;
pub mod unit;

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{error, info};

//
// Re-export
//
pub use config::Config;
pub use dispatch::{Dispatched, Dispatcher};
pub use entry::{ENTRY_FILE, Entry, read_entry, sanitize_segment};
pub use error::{RemuxError, RemuxResult};
pub use job::JobRunner;
pub use report::{Failure, Report};
pub use scanner::{Scanner, scan};
pub use tool::ToolLocation;
pub use unit::{ConversionUnit, DirectoryPair};

/// Convert every entry found below the configured inputs.
///
/// Usage errors and a missing transcoder end the run before anything is scanned.
/// Otherwise each directory pair is processed in turn; per-unit and per-pair failures
/// are collected into the returned [`Report`] unless `fail_fast` is set, in which case
/// the first one is returned as the error.
pub async fn run(config: Config) -> anyhow::Result<Report> {
    run_with_search_path(config, tool::search_path()).await
}

/// [`run`], looking for the transcoder in `search_path` rather than `PATH`.
pub async fn run_with_search_path(
    config: Config,
    search_path: Vec<PathBuf>,
) -> anyhow::Result<Report> {
    let started = unix_timestamp();
    let pairs = config.directory_pairs(started)?;
    let tool = ToolLocation::resolve_in(config.ffmpeg.as_deref(), search_path)?;

    let threads = config.threads();
    info!(
        tool = %tool.path().display(),
        processor = config.processor,
        threads,
        pairs = pairs.len(),
        "Transcoder resolved"
    );

    let runner = JobRunner::new(
        Dispatcher::new(tool, threads),
        config.processor,
        config.fail_fast,
    );

    let mut report = Report::default();
    for pair in pairs {
        match runner.run_pair(&pair, &mut report).await {
            Ok(()) => {}
            Err(error) if config.fail_fast => {
                report.log_summary();
                return Err(error.into());
            }
            Err(error) => {
                error!(input = %pair.input.display(), %error, "Skipping directory pair");
                report.record_failure(pair.input, error);
            }
        }
    }

    report.log_summary();
    Ok(report)
}

fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default()
}
