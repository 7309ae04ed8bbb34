use crate::error::RemuxError;
use std::path::PathBuf;
use tracing::{error, info};

/// A unit or directory pair that could not be converted.
#[derive(Debug)]
pub struct Failure {
    /// Entry directory, or input root when the failure happened before any entry was read.
    pub context: PathBuf,
    pub error: RemuxError,
}

/// What a run produced.
#[derive(Debug, Default)]
pub struct Report {
    pub converted: Vec<PathBuf>,
    pub failures: Vec<Failure>,
}

impl Report {
    pub fn record_success(&mut self, output: PathBuf) {
        self.converted.push(output);
    }

    pub fn record_failure(&mut self, context: PathBuf, error: RemuxError) {
        self.failures.push(Failure { context, error });
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn log_summary(&self) {
        for Failure { context, error } in &self.failures {
            error!(context = %context.display(), %error, "Conversion failed");
        }
        info!(
            converted = self.converted.len(),
            failed = self.failures.len(),
            "Run finished"
        );
    }
}
