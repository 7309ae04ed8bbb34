use crate::error::{RemuxError, RemuxResult};
use crate::tool::ToolLocation;
use crate::unit::ConversionUnit;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Lines of transcoder stderr kept when it fails.
const STDERR_TAIL_LINES: usize = 20;

/// A finished remux.
#[derive(Clone, Debug)]
pub struct Dispatched {
    pub output: PathBuf,
    pub status: ExitStatus,
}

/// Runs the transcoder for one unit at a time per caller; clones share all state.
#[derive(Clone, Debug)]
pub struct Dispatcher {
    tool: Arc<ToolLocation>,
    threads: usize,
    running: Arc<AtomicUsize>,
    claimed: Arc<Mutex<HashSet<PathBuf>>>,
}

impl Dispatcher {
    pub fn new(tool: ToolLocation, threads: usize) -> Self {
        Self {
            tool: Arc::new(tool),
            threads,
            running: Arc::new(AtomicUsize::new(0)),
            claimed: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Number of transcoder processes currently running.
    pub fn running(&self) -> usize {
        self.running.load(Ordering::Acquire)
    }

    /// Remux `unit` into `<output_root>/<title>/<page>-<subtitle>.mp4` and wait for the transcoder.
    pub async fn dispatch(&self, unit: &ConversionUnit) -> RemuxResult<Dispatched> {
        for fragment in [&unit.video, &unit.audio] {
            if !is_file(fragment).await {
                return Err(RemuxError::MissingFragment(fragment.clone()));
            }
        }

        let output = unit.output_file();
        self.claim(&output)?;

        let output_dir = unit.output_dir();
        tokio::fs::create_dir_all(&output_dir)
            .await
            .map_err(|source| RemuxError::OutputWrite {
                path: output_dir,
                source,
            })?;

        let mut command = self
            .tool
            .remux_command(&unit.video, &unit.audio, &output, self.threads);

        let _running = RunningGuard::new(&self.running);
        info!(
            entry = %unit.entry_dir.display(),
            output = %output.display(),
            running = self.running(),
            "Remux started"
        );

        let result = command
            .output()
            .await
            .map_err(|source| RemuxError::Spawn {
                tool: self.tool.path().to_path_buf(),
                source,
            })?;

        if !result.status.success() {
            let stderr = stderr_tail(&result.stderr);
            warn!(
                output = %output.display(),
                status = %result.status,
                running = self.running(),
                %stderr,
                "Transcoder failed"
            );
            return Err(RemuxError::ToolFailed {
                output,
                status: result.status,
                stderr,
            });
        }

        debug!(output = %output.display(), running = self.running(), "Remux finished");
        Ok(Dispatched {
            output,
            status: result.status,
        })
    }

    /// Two entries of one run must not write the same file.
    fn claim(&self, output: &Path) -> RemuxResult<()> {
        let mut claimed = self
            .claimed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if claimed.insert(output.to_path_buf()) {
            Ok(())
        } else {
            Err(RemuxError::DuplicateOutput(output.to_path_buf()))
        }
    }
}

struct RunningGuard<'a>(&'a AtomicUsize);

impl<'a> RunningGuard<'a> {
    fn new(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(counter)
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|meta| meta.is_file())
        .unwrap_or(false)
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines = text.lines().collect::<Vec<_>>();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::Entry;
    use crate::unit::DirectoryPair;
    use tempfile::TempDir;

    fn unit_in(root: &Path, title: &str) -> ConversionUnit {
        let dir = root.join("cache/A");
        let fragments = dir.join("64");
        std::fs::create_dir_all(&fragments).unwrap();
        std::fs::write(fragments.join("video.m4s"), b"v").unwrap();
        std::fs::write(fragments.join("audio.m4s"), b"a").unwrap();

        let entry = Entry {
            dir: dir.clone(),
            type_tag: "64".to_string(),
            page: 1,
            title: title.to_string(),
            subtitle: "Part1".to_string(),
            video: fragments.join("video.m4s"),
            audio: fragments.join("audio.m4s"),
        };
        let pair = DirectoryPair::new(root.join("cache"), Some(root.join("out")), 0);
        ConversionUnit::new(entry, &pair)
    }

    #[tokio::test]
    async fn test_dispatch_missing_fragment() {
        let root = TempDir::new().unwrap();
        let unit = unit_in(root.path(), "Show");
        std::fs::remove_file(&unit.audio).unwrap();

        let dispatcher = Dispatcher::new(ToolLocation::resolve(Some(Path::new("true"))).unwrap(), 1);
        let result = dispatcher.dispatch(&unit).await;

        assert!(matches!(result, Err(RemuxError::MissingFragment(path)) if path == unit.audio));
        assert!(!unit.output_dir().exists());
    }

    #[tokio::test]
    async fn test_dispatch_missing_tool() {
        let root = TempDir::new().unwrap();
        let unit = unit_in(root.path(), "Show");
        let tool = root.path().join("no-such-ffmpeg");

        let dispatcher = Dispatcher::new(ToolLocation::resolve(Some(tool.as_path())).unwrap(), 1);
        let result = dispatcher.dispatch(&unit).await;

        assert!(matches!(result, Err(RemuxError::Spawn { .. })));
        assert_eq!(dispatcher.running(), 0);
    }

    #[tokio::test]
    async fn test_dispatch_output_dir_blocked() {
        let root = TempDir::new().unwrap();
        let unit = unit_in(root.path(), "Show");
        // a regular file where the output root should be
        std::fs::write(root.path().join("out"), b"").unwrap();

        let dispatcher = Dispatcher::new(ToolLocation::resolve(Some(Path::new("true"))).unwrap(), 1);
        let result = dispatcher.dispatch(&unit).await;

        assert!(matches!(result, Err(RemuxError::OutputWrite { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_dispatch_rejects_duplicate_output() {
        let root = TempDir::new().unwrap();
        let unit = unit_in(root.path(), "Show");

        let dispatcher = Dispatcher::new(ToolLocation::resolve(Some(Path::new("true"))).unwrap(), 1);
        let first = dispatcher.dispatch(&unit).await.unwrap();
        assert_eq!(first.output, root.path().join("out/Show/1-Part1.mp4"));
        assert!(first.status.success());
        assert!(root.path().join("out/Show").is_dir());

        let second = dispatcher.clone().dispatch(&unit).await;
        assert!(matches!(second, Err(RemuxError::DuplicateOutput(path)) if path == first.output));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_dispatch_reports_exit_status() {
        let root = TempDir::new().unwrap();
        let unit = unit_in(root.path(), "Show");

        let dispatcher = Dispatcher::new(ToolLocation::resolve(Some(Path::new("false"))).unwrap(), 1);
        let result = dispatcher.dispatch(&unit).await;

        assert!(matches!(
            result,
            Err(RemuxError::ToolFailed { status, .. }) if !status.success()
        ));
    }

    #[test]
    fn test_stderr_tail() {
        let stderr = (0..30).map(|i| format!("line {i}\n")).collect::<String>();
        let tail = stderr_tail(stderr.as_bytes());
        assert!(tail.starts_with("line 10"));
        assert!(tail.ends_with("line 29"));
        assert_eq!(stderr_tail(b""), "");
    }
}
