use crate::error::{RemuxError, RemuxResult};
use serde::Deserialize;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Descriptor file that marks a directory as holding one fragment pair.
pub const ENTRY_FILE: &str = "entry.json";
pub const VIDEO_FRAGMENT: &str = "video.m4s";
pub const AUDIO_FRAGMENT: &str = "audio.m4s";

/// Characters that are never kept in an output path segment.
const RESERVED: [char; 9] = ['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

#[derive(Debug, Deserialize)]
struct RawEntry {
    type_tag: TypeTag,
    title: String,
    page_data: RawPageData,
}

#[derive(Debug, Deserialize)]
struct RawPageData {
    page: i64,
    download_subtitle: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TypeTag {
    Text(String),
    Number(serde_json::Number),
}

impl TypeTag {
    fn into_string(self) -> String {
        match self {
            TypeTag::Text(text) => text,
            TypeTag::Number(number) => number.to_string(),
        }
    }
}

/// A parsed and validated `entry.json`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    pub dir: PathBuf,
    pub type_tag: String,
    pub page: u32,
    /// Sanitized, safe to use as a single path segment.
    pub title: String,
    /// Sanitized, safe to use inside a file name.
    pub subtitle: String,
    pub video: PathBuf,
    pub audio: PathBuf,
}

/// Read the descriptor directly inside `dir`.
pub fn read_entry(dir: &Path) -> RemuxResult<Entry> {
    let path = dir.join(ENTRY_FILE);
    let content =
        std::fs::read_to_string(&path).map_err(|error| RemuxError::metadata(&path, error))?;
    // some cache writers prepend a BOM
    let content = content.trim_start_matches('\u{feff}');
    let raw: RawEntry =
        serde_json::from_str(content).map_err(|error| RemuxError::metadata(&path, error))?;

    let type_tag = raw.type_tag.into_string();
    if !is_single_component(&type_tag) {
        return Err(RemuxError::metadata(
            &path,
            format!("type_tag {type_tag:?} is not a plain directory name"),
        ));
    }

    let page = u32::try_from(raw.page_data.page)
        .ok()
        .filter(|page| *page > 0)
        .ok_or_else(|| {
            RemuxError::metadata(
                &path,
                format!("page {} is not a positive integer", raw.page_data.page),
            )
        })?;

    let title = sanitize_segment(&raw.title);
    let subtitle = sanitize_segment(&raw.page_data.download_subtitle);
    if title != raw.title || subtitle != raw.page_data.download_subtitle {
        debug!(
            entry = %path.display(),
            raw_title = %raw.title,
            title = %title,
            raw_subtitle = %raw.page_data.download_subtitle,
            subtitle = %subtitle,
            "Sanitized entry names"
        );
    }

    let fragments = dir.join(&type_tag);
    Ok(Entry {
        dir: dir.to_path_buf(),
        video: fragments.join(VIDEO_FRAGMENT),
        audio: fragments.join(AUDIO_FRAGMENT),
        type_tag,
        page,
        title,
        subtitle,
    })
}

/// Make an untrusted name usable as one path segment.
///
/// Separators, control characters and characters reserved on common filesystems
/// become `_`. Names that would resolve to `.`/`..` or nothing become `_`.
pub fn sanitize_segment(raw: &str) -> String {
    let replaced: String = raw
        .chars()
        .map(|c| {
            if c.is_control() || RESERVED.contains(&c) {
                '_'
            } else {
                c
            }
        })
        .collect();

    let trimmed = replaced.trim();
    if trimmed.chars().all(|c| c == '.') {
        "_".to_string()
    } else {
        trimmed.to_string()
    }
}

fn is_single_component(name: &str) -> bool {
    if name.contains(['/', '\\']) {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn write_entry(value: serde_json::Value) -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(ENTRY_FILE), value.to_string()).unwrap();
        dir
    }

    #[test]
    fn test_read_entry_fragment_paths() {
        let dir = write_entry(json!({
            "type_tag": "64",
            "title": "Show",
            "page_data": { "page": 1, "download_subtitle": "Part1", "cid": 42 },
            "avid": 170001
        }));

        let entry = read_entry(dir.path()).unwrap();
        assert_eq!(entry.dir, dir.path());
        assert_eq!(entry.video, dir.path().join("64").join("video.m4s"));
        assert_eq!(entry.audio, dir.path().join("64").join("audio.m4s"));
        assert_eq!(entry.page, 1);
        assert_eq!(entry.title, "Show");
        assert_eq!(entry.subtitle, "Part1");
    }

    #[test]
    fn test_read_entry_numeric_type_tag() {
        let dir = write_entry(json!({
            "type_tag": 80,
            "title": "Show",
            "page_data": { "page": 3, "download_subtitle": "Ep3" }
        }));

        let entry = read_entry(dir.path()).unwrap();
        assert_eq!(entry.type_tag, "80");
        assert_eq!(entry.video, dir.path().join("80").join("video.m4s"));
    }

    #[test]
    fn test_read_entry_with_bom() {
        let dir = TempDir::new().unwrap();
        let content = format!(
            "\u{feff}{}",
            json!({
                "type_tag": "64",
                "title": "Show",
                "page_data": { "page": 2, "download_subtitle": "Part2" }
            })
        );
        std::fs::write(dir.path().join(ENTRY_FILE), content).unwrap();

        assert_eq!(read_entry(dir.path()).unwrap().page, 2);
    }

    #[test]
    fn test_read_entry_missing_fields() {
        let cases = [
            json!({ "title": "Show", "page_data": { "page": 1, "download_subtitle": "P" } }),
            json!({ "type_tag": "64", "page_data": { "page": 1, "download_subtitle": "P" } }),
            json!({ "type_tag": "64", "title": "Show", "page_data": { "download_subtitle": "P" } }),
            json!({ "type_tag": "64", "title": "Show", "page_data": { "page": 1 } }),
            json!({ "type_tag": "64", "title": "Show" }),
        ];

        for case in cases {
            let dir = write_entry(case.clone());
            let result = read_entry(dir.path());
            assert!(
                matches!(result, Err(RemuxError::Metadata { .. })),
                "expected metadata error for {case}"
            );
        }
    }

    #[test]
    fn test_read_entry_missing_or_malformed_file() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            read_entry(dir.path()),
            Err(RemuxError::Metadata { .. })
        ));

        std::fs::write(dir.path().join(ENTRY_FILE), "{ not json").unwrap();
        assert!(matches!(
            read_entry(dir.path()),
            Err(RemuxError::Metadata { .. })
        ));
    }

    #[test]
    fn test_read_entry_rejects_bad_page_and_tag() {
        let zero_page = write_entry(json!({
            "type_tag": "64",
            "title": "Show",
            "page_data": { "page": 0, "download_subtitle": "P" }
        }));
        assert!(matches!(
            read_entry(zero_page.path()),
            Err(RemuxError::Metadata { .. })
        ));

        for tag in ["..", "a/b", "", "."] {
            let dir = write_entry(json!({
                "type_tag": tag,
                "title": "Show",
                "page_data": { "page": 1, "download_subtitle": "P" }
            }));
            assert!(
                matches!(read_entry(dir.path()), Err(RemuxError::Metadata { .. })),
                "tag {tag:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_read_entry_sanitizes_names() {
        let dir = write_entry(json!({
            "type_tag": "64",
            "title": "../../etc",
            "page_data": { "page": 1, "download_subtitle": "a/b\\c\nd" }
        }));

        let entry = read_entry(dir.path()).unwrap();
        assert_eq!(entry.title, ".._.._etc");
        assert_eq!(entry.subtitle, "a_b_c_d");
    }

    #[test]
    fn test_sanitize_segment() {
        assert_eq!(sanitize_segment("Show"), "Show");
        assert_eq!(sanitize_segment("第1集 开始"), "第1集 开始");
        assert_eq!(sanitize_segment("What? A: B"), "What_ A_ B");
        assert_eq!(sanitize_segment("  padded  "), "padded");
        assert_eq!(sanitize_segment(".."), "_");
        assert_eq!(sanitize_segment("."), "_");
        assert_eq!(sanitize_segment(""), "_");
        assert_eq!(sanitize_segment("tab\there"), "tab_here");
    }
}
