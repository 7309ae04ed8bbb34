use crate::entry::Entry;
use std::path::{Path, PathBuf};

/// Extension of every remuxed file.
pub const OUTPUT_EXTENSION: &str = "mp4";

/// Prefix of the output directory created inside an input root when no output is given.
pub const DEFAULT_OUTPUT_PREFIX: &str = "output-";

/// One input root to scan and the root its outputs are written to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirectoryPair {
    pub input: PathBuf,
    pub output: PathBuf,
}

impl DirectoryPair {
    /// Pair `input` with `output`, or with `<input>/output-<timestamp>` when no output is given.
    pub fn new(input: impl Into<PathBuf>, output: Option<PathBuf>, timestamp: u64) -> Self {
        let input = input.into();
        let output = output.unwrap_or_else(|| default_output(&input, timestamp));
        Self { input, output }
    }
}

pub fn default_output(input: &Path, timestamp: u64) -> PathBuf {
    input.join(format!("{DEFAULT_OUTPUT_PREFIX}{timestamp}"))
}

/// `<output_root>/<title>/<page>-<subtitle>.mp4`
pub fn output_file(output_root: &Path, title: &str, page: u32, subtitle: &str) -> PathBuf {
    output_root
        .join(title)
        .join(format!("{page}-{subtitle}.{OUTPUT_EXTENSION}"))
}

/// An audio and video fragment pair that becomes a single output file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConversionUnit {
    /// Directory holding the `entry.json` this unit was read from.
    pub entry_dir: PathBuf,
    pub page: u32,
    pub title: String,
    pub subtitle: String,
    pub video: PathBuf,
    pub audio: PathBuf,
    pub input_root: PathBuf,
    pub output_root: PathBuf,
}

impl ConversionUnit {
    pub fn new(entry: Entry, pair: &DirectoryPair) -> Self {
        let Entry {
            dir,
            page,
            title,
            subtitle,
            video,
            audio,
            ..
        } = entry;

        Self {
            entry_dir: dir,
            page,
            title,
            subtitle,
            video,
            audio,
            input_root: pair.input.clone(),
            output_root: pair.output.clone(),
        }
    }

    pub fn output_dir(&self) -> PathBuf {
        self.output_root.join(&self.title)
    }

    pub fn output_file(&self) -> PathBuf {
        output_file(&self.output_root, &self.title, self.page, &self.subtitle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(title: &str, page: u32, subtitle: &str) -> ConversionUnit {
        let pair = DirectoryPair::new("/cache", Some(PathBuf::from("/out")), 0);
        let entry = Entry {
            dir: PathBuf::from("/cache/A"),
            type_tag: "64".to_string(),
            page,
            title: title.to_string(),
            subtitle: subtitle.to_string(),
            video: PathBuf::from("/cache/A/64/video.m4s"),
            audio: PathBuf::from("/cache/A/64/audio.m4s"),
        };
        ConversionUnit::new(entry, &pair)
    }

    #[test]
    fn test_output_file_layout() {
        let unit = unit("Show", 1, "Part1");
        assert_eq!(unit.output_dir(), PathBuf::from("/out/Show"));
        assert_eq!(unit.output_file(), PathBuf::from("/out/Show/1-Part1.mp4"));
        assert_eq!(unit.input_root, PathBuf::from("/cache"));
    }

    #[test]
    fn test_output_file_keeps_dots_in_subtitle() {
        let path = output_file(Path::new("/out"), "Show", 12, "v1.2 final");
        assert_eq!(path, PathBuf::from("/out/Show/12-v1.2 final.mp4"));
        assert_eq!(path, output_file(Path::new("/out"), "Show", 12, "v1.2 final"));
    }

    #[test]
    fn test_default_output_uses_timestamp() {
        let pair = DirectoryPair::new("/cache", None, 1_667_000_000);
        assert_eq!(pair.output, PathBuf::from("/cache/output-1667000000"));

        let explicit = DirectoryPair::new("/cache", Some(PathBuf::from("/videos")), 1_667_000_000);
        assert_eq!(explicit.output, PathBuf::from("/videos"));
    }
}
