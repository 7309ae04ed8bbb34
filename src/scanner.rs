use crate::entry::{ENTRY_FILE, Entry, read_entry};
use crate::error::{RemuxError, RemuxResult};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};
use walkdir::WalkDir;

/// Lazily walks an input root and yields one [`Entry`] per directory holding an `entry.json`.
///
/// Directories are visited in file name order, so two scans of an unchanged tree
/// yield the same entries in the same order.
pub struct Scanner {
    root: PathBuf,
    walker: walkdir::IntoIter,
}

impl Scanner {
    pub fn new(root: impl Into<PathBuf>) -> RemuxResult<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(RemuxError::InputNotFound(root));
        }

        debug!(root = %root.display(), "Start scanning");
        let walker = WalkDir::new(&root).sort_by_file_name().into_iter();
        Ok(Self { root, walker })
    }
}

impl Iterator for Scanner {
    type Item = RemuxResult<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let dir = match self.walker.next()? {
                Ok(dir) => dir,
                Err(source) => {
                    let path = source
                        .path()
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|| self.root.clone());
                    return Some(Err(RemuxError::Scan { path, source }));
                }
            };

            if !dir.file_type().is_dir() {
                continue;
            }

            if dir.path().join(ENTRY_FILE).is_file() {
                trace!(dir = %dir.path().display(), "Found entry");
                return Some(read_entry(dir.path()));
            }
        }
    }
}

/// Shorthand for [`Scanner::new`].
pub fn scan(root: impl Into<PathBuf>) -> RemuxResult<Scanner> {
    Scanner::new(root)
}
