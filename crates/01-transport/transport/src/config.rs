//! Tunables for the shared-memory channel and discovery of the mapped file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Command-line flag naming the mapped file.
pub const MEMORY_PATH_ARG: &str = "--memory-path";
/// Directory under the system temp dir used for well-known files.
pub const MEMORY_DIRECTORY: &str = "ml-agents";
/// File name used when no path is given explicitly.
pub const DEFAULT_MEMORY_FILE: &str = "default";

/// Channel configuration. Every field has a default, so partial files deserialize.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Appended to the current path to name the next file on growth.
    pub handoff_suffix: String,
    /// Version tag written into and expected from the header.
    pub api_version: i32,
    /// Polling behaviour while waiting for the peer.
    pub poll: PollConfig,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            handoff_suffix: "_".to_owned(),
            api_version: crate::header::API_VERSION,
            poll: PollConfig::default(),
        }
    }
}

/// Spin-then-sleep backoff used by [`SharedMemoryChannel::wait_for_turn`](crate::SharedMemoryChannel::wait_for_turn).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Busy polls before the waiter starts yielding.
    pub spin_iterations: u32,
    /// Sleep between polls once spinning and yielding are exhausted.
    pub sleep_micros: u64,
    /// Give up after this long without a turn change.
    pub timeout_millis: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            spin_iterations: 1_000,
            sleep_micros: 50,
            timeout_millis: 15_000,
        }
    }
}

impl PollConfig {
    /// Sleep interval as a [`Duration`].
    pub fn sleep(&self) -> Duration {
        Duration::from_micros(self.sleep_micros)
    }

    /// Timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_millis)
    }
}

/// Location of the well-known default file.
pub fn default_memory_path() -> PathBuf {
    std::env::temp_dir()
        .join(MEMORY_DIRECTORY)
        .join(DEFAULT_MEMORY_FILE)
}

/// Resolves the mapped file from process arguments.
///
/// `--memory-path <path>` and `--memory-path=<path>` win; otherwise the default
/// file is used when it already exists. `None` means no trainer is attached.
pub fn memory_path_from_args<I, S>(args: I) -> Option<PathBuf>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    resolve_memory_path(args, &default_memory_path())
}

fn resolve_memory_path<I, S>(args: I, fallback: &Path) -> Option<PathBuf>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        let arg = arg.as_ref();
        if arg == MEMORY_PATH_ARG {
            return args.next().map(|path| PathBuf::from(path.as_ref()));
        }
        if let Some(path) = arg
            .strip_prefix(MEMORY_PATH_ARG)
            .and_then(|rest| rest.strip_prefix('='))
        {
            return Some(PathBuf::from(path));
        }
    }
    fallback.exists().then(|| fallback.to_path_buf())
}
