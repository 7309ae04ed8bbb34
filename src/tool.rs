use crate::error::{RemuxError, RemuxResult};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// Transcoder looked up on `PATH` when none is configured.
pub const DEFAULT_TOOL: &str = "ffmpeg";

/// Resolved location of the external transcoder, shared by every unit of a run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolLocation(PathBuf);

impl ToolLocation {
    /// Use `explicit` as given, otherwise search `PATH` for `ffmpeg`.
    pub fn resolve(explicit: Option<&Path>) -> RemuxResult<Self> {
        Self::resolve_in(explicit, search_path())
    }

    /// Like [`ToolLocation::resolve`], searching `dirs` instead of `PATH`.
    pub fn resolve_in(
        explicit: Option<&Path>,
        dirs: impl IntoIterator<Item = PathBuf>,
    ) -> RemuxResult<Self> {
        match explicit {
            Some(path) => Ok(Self(path.to_path_buf())),
            None => Self::search_in(DEFAULT_TOOL, dirs),
        }
    }

    /// Return the first executable named `name` inside `dirs`.
    pub fn search_in(name: &str, dirs: impl IntoIterator<Item = PathBuf>) -> RemuxResult<Self> {
        dirs.into_iter()
            .flat_map(|dir| candidates(name).into_iter().map(move |file| dir.join(file)))
            .find(|path| is_executable(path))
            .map(Self)
            .ok_or_else(|| RemuxError::ToolNotFound(name.to_string()))
    }

    pub fn path(&self) -> &Path {
        &self.0
    }

    /// Build the remux invocation: video copied from the first input, audio from the second.
    pub fn remux_command(&self, video: &Path, audio: &Path, output: &Path, threads: usize) -> Command {
        let mut command = Command::new(&self.0);
        command
            .args(remux_args(video, audio, output, threads))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        command
    }
}

/// Directories listed in `PATH`.
pub fn search_path() -> Vec<PathBuf> {
    let paths = std::env::var_os("PATH").unwrap_or_default();
    std::env::split_paths(&paths).collect()
}

/// Arguments passed to the transcoder, without the program itself.
pub fn remux_args(video: &Path, audio: &Path, output: &Path, threads: usize) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-hide_banner", "-nostdin", "-y", "-threads"]
        .into_iter()
        .map(OsString::from)
        .collect();
    args.push(threads.to_string().into());
    args.push("-i".into());
    args.push(path_arg(video));
    args.push("-i".into());
    args.push(path_arg(audio));
    args.extend(
        ["-map", "0:v:0", "-map", "1:a:0", "-c:v", "copy", "-c:a", "copy"]
            .into_iter()
            .map(OsString::from),
    );
    args.push(path_arg(output));
    args
}

/// Relative paths get a `./` prefix so a leading `-` is never read as an option.
fn path_arg(path: &Path) -> OsString {
    if path.is_relative() {
        Path::new(".").join(path).into_os_string()
    } else {
        path.as_os_str().to_os_string()
    }
}

fn candidates(name: &str) -> Vec<String> {
    if cfg!(windows) && Path::new(name).extension().is_none() {
        vec![format!("{name}.exe"), name.to_string()]
    } else {
        vec![name.to_string()]
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
