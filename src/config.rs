use crate::error::{RemuxError, RemuxResult};
use crate::job::MAX_WORKERS;
use crate::unit::DirectoryPair;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::info;

static NUM_CPUS: LazyLock<usize> = LazyLock::new(|| {
    let n = num_cpus::get();
    let num = if n > 16 { 16 } else { n };
    info!(num, "Detecting CPU cores");
    num
});

/// Convert cached m4s audio/video fragment pairs into mp4 files.
///
/// Every directory below an input that holds an `entry.json` is one conversion unit.
///
/// Example configuration file content
/// # m4s-remux configuration
///
/// inputs = ["/sdcard/Android/data/tv.danmaku.bili/download"]
/// outputs = ["/videos"]            # Optional: defaults to <input>/output-<timestamp>
/// ffmpeg = "/usr/local/bin/ffmpeg" # Optional: searched on PATH
/// processor = 4                    # Concurrent transcoder processes
/// threads = 8                      # Passed to the transcoder as -threads
/// fail_fast = false
#[derive(Debug, Clone, Serialize, Deserialize, Parser)]
#[serde(default)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// Directory to scan for entry.json, may be repeated
    #[arg(short = 'i', long = "input", value_name = "DIR")]
    #[serde(alias = "input")]
    pub inputs: Vec<PathBuf>,

    /// Output directory: none for <input>/output-<timestamp>, one shared by every input,
    /// or one per input
    #[arg(short = 'o', long = "output", value_name = "DIR")]
    #[serde(alias = "output")]
    pub outputs: Vec<PathBuf>,

    /// Location of the ffmpeg binary, searched on PATH when omitted
    #[arg(long, value_name = "PATH")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ffmpeg: Option<PathBuf>,

    /// Number of transcoder processes running at the same time (at most 256)
    #[arg(short, long, default_value_t = 1)]
    #[serde(default = "default_processor")]
    pub processor: usize,

    /// Threads requested from the transcoder (default: CPU cores, at most 16)
    #[arg(short, long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threads: Option<usize>,

    /// Abort the whole run on the first failure instead of skipping the failed unit
    #[arg(long)]
    pub fail_fast: bool,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path, command line values take precedence
    #[arg(short, long)]
    #[serde(skip)]
    pub config: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            inputs: Vec::new(),
            outputs: Vec::new(),
            ffmpeg: None,
            processor: default_processor(),
            threads: None,
            fail_fast: false,
            verbose: false,
            config: None,
        }
    }
}

impl Config {
    /// Load configuration from CLI args, optionally merging with a config file
    pub fn load() -> anyhow::Result<Self> {
        Config::parse().resolve()
    }

    /// Merge the config file named by `--config`, if any, and validate the result.
    pub fn resolve(mut self) -> anyhow::Result<Self> {
        if let Some(config_path) = &self.config {
            let file_config = Self::from_file(config_path)?;
            self = self.merge_with_file(file_config);
        }

        self.validate()?;
        Ok(self)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Merge with file config, CLI args take precedence
    fn merge_with_file(mut self, file_config: Config) -> Self {
        if self.inputs.is_empty() {
            self.inputs = file_config.inputs;
        }
        if self.outputs.is_empty() {
            self.outputs = file_config.outputs;
        }
        if self.ffmpeg.is_none() {
            self.ffmpeg = file_config.ffmpeg;
        }
        if self.processor == default_processor() {
            self.processor = file_config.processor;
        }
        if self.threads.is_none() {
            self.threads = file_config.threads;
        }
        self.fail_fast |= file_config.fail_fast;
        self.verbose |= file_config.verbose;

        self
    }

    pub fn validate(&self) -> RemuxResult<()> {
        if self.processor == 0 {
            return Err(RemuxError::Usage("--processor must be at least 1".to_string()));
        }
        if self.processor > MAX_WORKERS {
            return Err(RemuxError::Usage(format!(
                "--processor must be at most {MAX_WORKERS}"
            )));
        }
        if self.threads == Some(0) {
            return Err(RemuxError::Usage("--threads must be at least 1".to_string()));
        }
        self.directory_pairs(0).map(|_| ())
    }

    /// Pair inputs with outputs.
    ///
    /// No output gives every input `<input>/output-<timestamp>`, a single output is shared
    /// by every input, otherwise outputs pair with inputs by position.
    pub fn directory_pairs(&self, timestamp: u64) -> RemuxResult<Vec<DirectoryPair>> {
        let inputs = self.inputs.iter().cloned();
        match (self.inputs.len(), self.outputs.as_slice()) {
            (0, _) => Err(RemuxError::Usage(
                "at least one --input directory is required".to_string(),
            )),
            (_, []) => Ok(inputs
                .map(|input| DirectoryPair::new(input, None, timestamp))
                .collect()),
            (_, [output]) => Ok(inputs
                .map(|input| DirectoryPair::new(input, Some(output.clone()), timestamp))
                .collect()),
            (n, outputs) if n == outputs.len() => Ok(inputs
                .zip(outputs.iter().cloned())
                .map(|(input, output)| DirectoryPair::new(input, Some(output), timestamp))
                .collect()),
            (n, outputs) => Err(RemuxError::Usage(format!(
                "{} output directories cannot be paired with {n} input directories",
                outputs.len()
            ))),
        }
    }

    /// Value passed to the transcoder's `-threads`.
    pub fn threads(&self) -> usize {
        self.threads.unwrap_or(*NUM_CPUS)
    }
}

fn default_processor() -> usize {
    1
}
