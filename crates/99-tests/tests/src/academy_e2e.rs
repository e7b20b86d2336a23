//! The academy stepping against a scripted trainer thread.

use crate::trainer;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use transport::side_channel::{
    frame_message, parse_messages, ConfigurationUpdate, StringLogChannel,
    ENGINE_CONFIGURATION_CHANNEL_ID, STRING_LOG_CHANNEL_ID,
};
use transport::{Command, SideChannel};
use world::{AgentId, DecisionBuffer, ObservationShape, WorldSpec};
use world_codec::WorldChannelExt;
use world_processor::{Academy, ProcessError, StepOutcome, WorldId};

const WORLD: &str = "walker";

fn walker_buffer(capacity: usize) -> DecisionBuffer {
    DecisionBuffer::new(
        WorldSpec::builder(capacity)
            .observation(ObservationShape::vector(3))
            .continuous_actions(3)
            .build()
            .expect("spec"),
    )
}

fn connect(path: &Path, capacity: usize) -> (Academy, WorldId) {
    let mut academy = Academy::builder()
        .memory_path(path)
        .build()
        .expect("academy");
    let id = academy
        .subscribe_world(WORLD, walker_buffer(capacity), None)
        .expect("subscribe");
    (academy, id)
}

fn request_all(academy: &Academy, id: WorldId, agents: i32) {
    let buffer = academy.buffer(id).expect("buffer");
    for agent in 0..agents {
        buffer
            .request_decision(AgentId(agent))
            .expect("slot")
            .set_reward(agent as f32)
            .set_observation_from_slice(0, &[agent as f32, 1.0, 2.0])
            .expect("observation");
    }
}

/// Answers every slot with `[reward, reward, reward]`.
fn echo_rewards(channel: &mut transport::SharedMemoryChannel) -> Vec<f32> {
    let rewards: Vec<f32> = channel
        .read_world(WORLD)
        .expect("read world")
        .decisions()
        .map(|decision| decision.reward)
        .collect();
    let mut section = channel.actions_section(WORLD).expect("actions");
    for (slot, reward) in rewards.iter().enumerate() {
        section
            .write_continuous(slot, &[*reward; 3])
            .expect("write action");
    }
    rewards
}

/// Records every message sent to one channel id.
struct Recorder {
    channel_id: i32,
    seen: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl SideChannel for Recorder {
    fn channel_id(&self) -> i32 {
        self.channel_id
    }

    fn on_message(&mut self, payload: &[u8]) {
        self.seen.lock().push(payload.to_vec());
    }
}

#[test]
fn ten_agents_round_trip_through_a_grown_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (path, mut channel) = trainer::create(&dir, 16, 16);
    channel.hand_over(Command::Default).expect("first turn");
    let (mut academy, id) = connect(&path, 10);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let trainer_seen = Arc::clone(&seen);
    let peer = trainer::spawn(channel, 1, move |channel, _| {
        trainer_seen.lock().extend(echo_rewards(channel));
        Command::Default
    });

    request_all(&academy, id, 10);
    assert_eq!(academy.step().expect("step"), StepOutcome::Stepped);
    let channel = peer.join().expect("trainer thread");

    let rewards: BTreeSet<i32> = seen.lock().iter().map(|reward| *reward as i32).collect();
    assert_eq!(rewards, (0..10).collect::<BTreeSet<_>>());
    assert_eq!(channel.path(), trainer::handoff_path(&path, 1).as_path());

    let actions: Vec<(AgentId, Vec<f32>)> = academy
        .buffer(id)
        .expect("buffer")
        .ready_actions()
        .map(|action| (action.agent(), action.continuous().expect("continuous").to_vec()))
        .collect();
    assert_eq!(actions.len(), 10);
    for (agent, values) in actions {
        assert_eq!(values, vec![agent.0 as f32; 3]);
    }
}

#[test]
fn reset_clears_every_world_and_stepping_resumes() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (path, mut channel) = trainer::create(&dir, 16, 512);
    channel.hand_over(Command::Default).expect("first turn");
    let (mut academy, id) = connect(&path, 4);

    let peer = trainer::spawn(channel, 2, |channel, turn| {
        if turn == 0 {
            Command::Reset
        } else {
            echo_rewards(channel);
            Command::Default
        }
    });

    request_all(&academy, id, 3);
    assert_eq!(academy.step().expect("step"), StepOutcome::Reset);
    let buffer = academy.buffer(id).expect("buffer");
    assert_eq!(buffer.decisions_requested(), 0);
    assert_eq!(buffer.actions_ready(), 0);

    request_all(&academy, id, 2);
    assert_eq!(academy.step().expect("step"), StepOutcome::Stepped);
    let _channel = peer.join().expect("trainer thread");
    assert_eq!(academy.buffer(id).expect("buffer").actions_ready(), 2);
}

#[test]
fn close_in_the_first_turn_stops_before_any_world_is_sent() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (path, mut channel) = trainer::create(&dir, 16, 512);
    channel.hand_over(Command::Close).expect("close");
    let (mut academy, id) = connect(&path, 4);

    request_all(&academy, id, 1);
    assert_eq!(academy.step().expect("step"), StepOutcome::Closed);
    assert!(academy.is_closed());
    assert!(matches!(academy.update_world(id), Err(ProcessError::Closed)));
    assert!(channel.world_names().expect("names").is_empty());
}

#[test]
fn hello_on_a_custom_channel_is_delivered_once() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (path, mut channel) = trainer::create(&dir, 64, 512);
    let mut data = Vec::new();
    frame_message(&mut data, 5, b"hello");
    channel.write_side_channel_data(&data).expect("side data");
    channel.hand_over(Command::Default).expect("first turn");

    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut academy = Academy::builder()
        .memory_path(&path)
        .side_channel(Recorder {
            channel_id: 5,
            seen: Arc::clone(&seen),
        })
        .expect("register")
        .build()
        .expect("academy");
    let id = academy
        .subscribe_world(WORLD, walker_buffer(2), None)
        .expect("subscribe");

    let peer = trainer::spawn(channel, 2, |channel, _| {
        echo_rewards(channel);
        Command::Default
    });
    for _ in 0..2 {
        request_all(&academy, id, 1);
        assert_eq!(academy.step().expect("step"), StepOutcome::Stepped);
    }
    let _channel = peer.join().expect("trainer thread");

    assert_eq!(*seen.lock(), vec![b"hello".to_vec()]);
}

#[test]
fn built_in_channels_carry_logs_and_engine_settings() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (path, mut channel) = trainer::create(&dir, 64, 512);
    channel.hand_over(Command::Default).expect("first turn");

    let (log, sender) = StringLogChannel::new();
    let mut academy = Academy::builder()
        .memory_path(&path)
        .side_channel(log)
        .expect("register")
        .build()
        .expect("academy");
    let id = academy
        .subscribe_world(WORLD, walker_buffer(2), None)
        .expect("subscribe");
    let engine = academy.engine_configuration().expect("engine handle").clone();

    let peer = trainer::spawn(channel, 1, |channel, _| {
        let received = channel
            .read_and_clear_side_channel_data()
            .expect("side data");
        let mut reply = Vec::new();
        for update in [
            ConfigurationUpdate::TimeScale(500.0),
            ConfigurationUpdate::QualityLevel(3),
        ] {
            frame_message(&mut reply, ENGINE_CONFIGURATION_CHANNEL_ID, &update.encode());
        }
        channel.write_side_channel_data(&reply).expect("reply");
        echo_rewards(channel);
        let logs: Vec<Vec<u8>> = parse_messages(&received)
            .map(|frame| frame.expect("frame"))
            .filter(|frame| frame.channel_id == STRING_LOG_CHANNEL_ID)
            .map(|frame| frame.payload.to_vec())
            .collect();
        assert_eq!(logs, vec![b"episode 1 started".to_vec()]);
        Command::Default
    });

    sender.send("episode 1 started");
    request_all(&academy, id, 1);
    assert_eq!(academy.step().expect("step"), StepOutcome::Stepped);
    let _channel = peer.join().expect("trainer thread");

    let settings = engine.current();
    assert_eq!(settings.time_scale, Some(100.0));
    assert_eq!(settings.quality_level, Some(3));
    assert_eq!(sender.pending(), 0);
}
