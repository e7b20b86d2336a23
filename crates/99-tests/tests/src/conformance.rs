//! Byte-level checks of the mapped layout as a peer in another process sees it.

use crate::trainer;
use std::fs;
use transport::{
    ChannelConfig, ChannelSnapshot, Command, Role, SharedMemoryChannel, WorldPayload,
    COMMAND_OFFSET, HEADER_SIZE, READY_FLAG_OFFSET, SIDE_CHANNEL_CAPACITY_OFFSET,
};
use world::{AgentId, DecisionBuffer, ObservationShape, WorldSpec};
use world_codec::{WorldBlock, WorldChannelExt};

fn le_i32(bytes: &[u8], offset: usize) -> i32 {
    i32::from_le_bytes(bytes[offset..offset + 4].try_into().expect("four bytes"))
}

#[test]
fn header_fields_sit_at_their_wire_offsets() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (path, _trainer) = trainer::create(&dir, 24, 100);
    let bytes = fs::read(&path).expect("read file");

    assert_eq!(le_i32(&bytes, 0) as usize, bytes.len());
    assert_eq!(bytes.len(), HEADER_SIZE + 24 + 4 + 100);
    assert_eq!(le_i32(&bytes, 4), 0, "version tag");
    assert_eq!(le_i32(&bytes, SIDE_CHANNEL_CAPACITY_OFFSET), 24);
    assert_eq!(le_i32(&bytes, 14), 0, "side-channel size");
    assert_eq!(le_i32(&bytes, HEADER_SIZE + 24), 0, "world payload size");
}

#[test]
fn ready_flag_polarity_and_command_bytes() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (path, mut trainer) = trainer::create(&dir, 0, 64);
    let mut simulation =
        SharedMemoryChannel::open(&path, Role::Simulation, ChannelConfig::default())
            .expect("open");
    let raw = |offset: usize| fs::read(&path).expect("read file")[offset];

    assert_eq!(raw(READY_FLAG_OFFSET), 0, "a trainer-created file starts on the trainer's turn");
    assert!(trainer.is_my_turn());
    assert!(!simulation.is_my_turn());

    trainer.hand_over(Command::Default).expect("hand over");
    assert_eq!(raw(READY_FLAG_OFFSET), 1, "flag 1 means the simulation may proceed");
    assert_eq!(raw(COMMAND_OFFSET), 0);

    simulation.hand_over(Command::Default).expect("hand over");
    assert_eq!(raw(READY_FLAG_OFFSET), 0);
    trainer.hand_over(Command::Reset).expect("reset");
    assert_eq!(raw(COMMAND_OFFSET), 3);
    assert_eq!(simulation.wait_for_turn().expect("turn"), Command::Reset);
    simulation.hand_over(Command::Default).expect("hand over");
    trainer.hand_over(Command::Close).expect("close");
    assert_eq!(raw(COMMAND_OFFSET), 2);
    assert_eq!(simulation.wait_for_turn().expect("turn"), Command::Close);
}

#[test]
fn world_section_names_are_zero_padded() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (path, mut trainer) = trainer::create(&dir, 8, 256);
    let mut simulation =
        SharedMemoryChannel::open(&path, Role::Simulation, ChannelConfig::default())
            .expect("open");
    trainer.hand_over(Command::Default).expect("hand over");

    let mut buffer = DecisionBuffer::new(
        WorldSpec::builder(1)
            .observation(ObservationShape::vector(1))
            .continuous_actions(1)
            .build()
            .expect("spec"),
    );
    buffer.request_decision(AgentId(9)).expect("slot");
    simulation.write_world("ant", &mut buffer).expect("write");
    let block_len = WorldBlock::new(buffer.decisions()).expect("block").encoded_len();

    let bytes = fs::read(&path).expect("read file");
    let section = HEADER_SIZE + 8;
    let payload = section + 4;
    assert_eq!(le_i32(&bytes, section) as usize, 4 + 1 + 63 + 4 + block_len);
    assert_eq!(le_i32(&bytes, payload), 1, "world count");
    assert_eq!(bytes[payload + 4], 3, "name length");
    assert_eq!(&bytes[payload + 5..payload + 8], b"ant");
    assert!(bytes[payload + 8..payload + 5 + 63].iter().all(|byte| *byte == 0));
    assert_eq!(le_i32(&bytes, payload + 68) as usize, block_len);

    let snapshot = ChannelSnapshot::read(&path).expect("snapshot");
    let names: Vec<_> = snapshot
        .worlds()
        .expect("worlds")
        .map(|entry| entry.expect("entry").name.to_owned())
        .collect();
    assert_eq!(names, vec!["ant"]);
}

#[test]
fn growth_leaves_change_file_behind_for_the_trainer() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (path, mut trainer) = trainer::create(&dir, 4, 16);
    let mut simulation =
        SharedMemoryChannel::open(&path, Role::Simulation, ChannelConfig::default())
            .expect("open");
    trainer.hand_over(Command::Default).expect("hand over");

    let mut buffer = DecisionBuffer::new(
        WorldSpec::builder(8)
            .observation(ObservationShape::vector(16))
            .continuous_actions(2)
            .build()
            .expect("spec"),
    );
    for agent in 0..8 {
        buffer.request_decision(AgentId(agent)).expect("slot");
    }
    simulation.write_world("big", &mut buffer).expect("write");
    simulation.hand_over(Command::Default).expect("hand over");

    let grown = trainer::handoff_path(&path, 1);
    let old = ChannelSnapshot::read(&path).expect("old file");
    assert_eq!(old.command().expect("command"), Command::ChangeFile);
    assert_eq!(old.header().ready_flag, 0);
    let new = ChannelSnapshot::read(&grown).expect("new file");
    assert!(new.header().capacity > old.header().capacity);
    assert_eq!(new.header().ready_flag, 0);

    assert_eq!(trainer.wait_for_turn().expect("turn"), Command::Default);
    assert_eq!(trainer.path(), grown.as_path());
    assert!(!path.exists(), "the follower deletes the abandoned file");
    let reader = trainer.read_world("big").expect("read");
    assert_eq!(reader.agents_this_step(), 8);
}
