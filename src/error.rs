use std::path::PathBuf;
use std::process::ExitStatus;
use thiserror::Error;

/// Everything that can go wrong while discovering and remuxing fragment pairs.
#[derive(Debug, Error)]
pub enum RemuxError {
    #[error("usage error: {0}")]
    Usage(String),

    #[error("input directory {} does not exist", .0.display())]
    InputNotFound(PathBuf),

    #[error("transcoder `{0}` not found, pass its location with --ffmpeg")]
    ToolNotFound(String),

    #[error("invalid entry in {}: {reason}", .path.display())]
    Metadata { path: PathBuf, reason: String },

    #[error("failed to walk {}: {source}", .path.display())]
    Scan {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("fragment {} is missing", .0.display())]
    MissingFragment(PathBuf),

    #[error("failed to create output directory {}: {source}", .path.display())]
    OutputWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("output {} is already produced by another entry", .0.display())]
    DuplicateOutput(PathBuf),

    #[error("failed to start {}: {source}", .tool.display())]
    Spawn {
        tool: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("transcoder exited with {status} for {}: {stderr}", .output.display())]
    ToolFailed {
        output: PathBuf,
        status: ExitStatus,
        stderr: String,
    },
}

impl RemuxError {
    pub(crate) fn metadata(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        RemuxError::Metadata {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Process exit code used when this error ends the run.
    pub fn exit_code(&self) -> i32 {
        match self {
            RemuxError::Usage(_) => 2,
            _ => 1,
        }
    }
}

pub type RemuxResult<T> = Result<T, RemuxError>;
