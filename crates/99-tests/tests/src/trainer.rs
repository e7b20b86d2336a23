//! A scripted trainer running on its own thread.

use std::path::{Path, PathBuf};
use std::thread;
use tempfile::TempDir;
use transport::{ChannelConfig, Command, Role, SharedMemoryChannel};

pub const SESSION_FILE: &str = "session";

/// Creates the trainer's end of a fresh channel inside `dir`.
///
/// The file starts on the trainer's turn, as a freshly created one does.
pub fn create(
    dir: &TempDir,
    side_channel_capacity: usize,
    world_capacity: usize,
) -> (PathBuf, SharedMemoryChannel) {
    let path = dir.path().join(SESSION_FILE);
    let channel = SharedMemoryChannel::create(
        &path,
        side_channel_capacity,
        world_capacity,
        Role::Trainer,
        ChannelConfig::default(),
    )
    .expect("create trainer channel");
    (path, channel)
}

/// `path` with the default hand-off suffix appended `generations` times.
pub fn handoff_path(path: &Path, generations: usize) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    for _ in 0..generations {
        name.push(&ChannelConfig::default().handoff_suffix);
    }
    PathBuf::from(name)
}

/// Runs `turns` trainer turns. `on_turn` gets the channel and the turn index
/// and returns the command to leave for the simulation.
pub fn spawn<F>(
    mut channel: SharedMemoryChannel,
    turns: usize,
    mut on_turn: F,
) -> thread::JoinHandle<SharedMemoryChannel>
where
    F: FnMut(&mut SharedMemoryChannel, usize) -> Command + Send + 'static,
{
    thread::spawn(move || {
        for turn in 0..turns {
            let left = channel.wait_for_turn().expect("trainer turn");
            assert_eq!(left, Command::Default, "simulation always hands over with DEFAULT");
            let command = on_turn(&mut channel, turn);
            channel.hand_over(command).expect("trainer hand over");
        }
        channel
    })
}
