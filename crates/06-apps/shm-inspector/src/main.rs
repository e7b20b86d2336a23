//! Prints the contents of a shared-memory channel file without touching it.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use tracing_subscriber::{fmt, EnvFilter};
use transport::{default_memory_path, ChannelConfig, ChannelSnapshot, Command as WireCommand};
use world_codec::WorldBlockReader;

/// Text rendering helpers used by the CLI commands.
mod render {
    use std::fmt::Write;
    use transport::side_channel::SideChannelMessage;
    use transport::{Header, Role};
    use world_codec::WorldBlockReader;

    /// Header fields, one per line.
    pub fn header(header: &Header) -> String {
        let mut out = String::new();
        writeln!(out, "capacity: {} bytes, version {}", header.capacity, header.version)
            .expect("write capacity");
        let turn = if header.ready_flag == Role::Trainer.turn_value() {
            "trainer"
        } else if header.ready_flag == Role::Simulation.turn_value() {
            "simulation"
        } else {
            "unknown"
        };
        writeln!(out, "turn: {turn} (flag {})", header.ready_flag).expect("write turn");
        let command = match header.command() {
            Ok(command) => format!("{command:?}"),
            Err(_) => format!("invalid ({})", header.command),
        };
        writeln!(out, "command: {command}").expect("write command");
        writeln!(
            out,
            "side channel: {} of {} bytes used",
            header.side_channel_size, header.side_channel_capacity
        )
        .expect("write side channel");
        writeln!(
            out,
            "world section: offset {}, {} bytes",
            header.world_section_offset(),
            header.world_capacity()
        )
        .expect("write world section");
        out
    }

    /// One side-channel frame; text bodies are quoted, others shown as hex.
    pub fn message(message: &SideChannelMessage<'_>) -> String {
        let body = match std::str::from_utf8(message.payload) {
            Ok(text) if !text.chars().any(char::is_control) => format!("{text:?}"),
            _ => {
                let mut hex = String::new();
                for byte in message.payload.iter().take(16) {
                    write!(hex, "{byte:02x}").expect("write byte");
                }
                if message.payload.len() > 16 {
                    hex.push_str("..");
                }
                hex
            }
        };
        format!(
            "channel {}: {} bytes {body}\n",
            message.channel_id,
            message.payload.len()
        )
    }

    /// Declaration of a world block and, with `agents`, every requested slot.
    pub fn world(name: &str, reader: &WorldBlockReader<'_>, agents: bool) -> String {
        let header = reader.header();
        let mut out = String::new();
        writeln!(
            out,
            "world {name}: capacity {}, {} agent(s) this step",
            header.capacity,
            reader.agents_this_step()
        )
        .expect("write world");
        let actions = if header.actions.is_continuous() {
            format!("continuous, width {}", header.actions.width())
        } else {
            format!("discrete, branches {:?}", header.actions.branches())
        };
        writeln!(out, "  actions: {actions}").expect("write actions");
        let shapes: Vec<String> = header
            .observations
            .iter()
            .map(|shape| format!("{:?}", shape.dims()))
            .collect();
        writeln!(out, "  observations: {}", shapes.join(", ")).expect("write observations");
        if !agents {
            return out;
        }

        for (slot, decision) in reader.decisions().enumerate() {
            writeln!(
                out,
                "  slot {slot}: agent {}, reward {}, done {}, max step {}",
                decision.agent.0, decision.reward, decision.done, decision.max_step_reached
            )
            .expect("write slot");
            for (index, observation) in decision.observations.iter().enumerate() {
                writeln!(out, "    obs {index}: {observation:?}").expect("write observation");
            }
            if !decision.mask.is_empty() {
                let mask: String = decision
                    .mask
                    .iter()
                    .map(|masked| if *masked { '1' } else { '0' })
                    .collect();
                writeln!(out, "    mask: {mask}").expect("write mask");
            }
            if let Some(actions) = reader.continuous_actions(slot) {
                writeln!(out, "    actions: {actions:?}").expect("write actions");
            } else if let Some(actions) = reader.discrete_actions(slot) {
                writeln!(out, "    actions: {actions:?}").expect("write actions");
            }
        }
        out
    }
}

/// Inspect a shared-memory channel between a simulation and its trainer.
#[derive(Parser, Debug)]
#[command(author, version, about = "Inspect a shared-memory channel file", long_about = None)]
struct Cli {
    /// Channel file; defaults to the well-known location in the temp directory.
    #[arg(value_name = "PATH")]
    path: Option<PathBuf>,

    /// TOML file with a `[channel]` table (hand-off suffix, API version).
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Follow CHANGE_FILE hand-offs to the newest file.
    #[arg(long)]
    follow: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the header fields.
    Header,
    /// List pending side-channel messages without consuming them.
    SideChannel,
    /// Decode the world blocks.
    Worlds {
        /// Only show the world with this name.
        #[arg(long)]
        name: Option<String>,
        /// Print every requested slot, not just the declaration.
        #[arg(long)]
        agents: bool,
    },
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct InspectorConfig {
    channel: ChannelConfig,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    let path = cli.path.clone().unwrap_or_else(default_memory_path);
    let (path, snapshot) = read_snapshot(&path, &config.channel, cli.follow)?;
    debug!(path = %path.display(), "read channel snapshot");

    if snapshot.header().version != config.channel.api_version {
        warn!(
            expected = config.channel.api_version,
            found = snapshot.header().version,
            "channel file has a different API version"
        );
    }

    match cli.command {
        Command::Header => {
            println!("path: {}", path.display());
            print!("{}", render::header(snapshot.header()));
        }
        Command::SideChannel => {
            for message in snapshot.side_channel_messages() {
                match message {
                    Ok(message) => print!("{}", render::message(&message)),
                    Err(err) => warn!(%err, "stopping at malformed side-channel data"),
                }
            }
        }
        Command::Worlds { name, agents } => {
            let entries = snapshot.worlds().context("failed to list world blocks")?;
            for entry in entries {
                let entry = entry.context("failed to read world entry")?;
                if name.as_deref().is_some_and(|wanted| wanted != entry.name) {
                    continue;
                }
                let reader = WorldBlockReader::parse(entry.block)
                    .with_context(|| format!("failed to decode world {:?}", entry.name))?;
                print!("{}", render::world(entry.name, &reader, agents));
            }
        }
    }

    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt().with_env_filter(env_filter).with_writer(std::io::stderr).try_init();
}

fn load_config(path: Option<&Path>) -> Result<InspectorConfig> {
    let Some(path) = path else {
        return Ok(InspectorConfig::default());
    };
    let text =
        fs::read_to_string(path).with_context(|| format!("failed to read config {path:?}"))?;
    toml::from_str(&text).with_context(|| format!("failed to parse config {path:?}"))
}

/// Reads `path`, moving on to `path + suffix` while `follow` is set and the
/// file points at a successor that exists.
fn read_snapshot(
    path: &Path,
    config: &ChannelConfig,
    follow: bool,
) -> Result<(PathBuf, ChannelSnapshot)> {
    let mut path = path.to_path_buf();
    loop {
        let snapshot = ChannelSnapshot::read(&path)
            .with_context(|| format!("failed to read channel file {path:?}"))?;
        if !follow || !matches!(snapshot.command(), Ok(WireCommand::ChangeFile)) {
            return Ok((path, snapshot));
        }
        let mut next = OsString::from(path.as_os_str());
        next.push(&config.handoff_suffix);
        let next = PathBuf::from(next);
        if !next.exists() {
            warn!(path = %next.display(), "hand-off target is gone");
            return Ok((path, snapshot));
        }
        path = next;
    }
}
