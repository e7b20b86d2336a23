//! World blocks across a real channel: the simulation writes decisions, the
//! trainer reads them and answers with actions.

use proptest::prelude::*;
use transport::{ChannelConfig, Command, Role, SharedMemoryChannel, WorldPayload};
use world::{AgentId, DecisionBuffer, ObservationShape, WorldSpec};
use world_codec::{
    decode_actions, BlockHeader, CodecError, WorldBlock, WorldBlockReader, WorldChannelExt,
};

fn continuous_buffer(capacity: usize) -> DecisionBuffer {
    DecisionBuffer::new(
        WorldSpec::builder(capacity)
            .observation(ObservationShape::vector(3))
            .continuous_actions(2)
            .build()
            .expect("spec"),
    )
}

fn pair(dir: &tempfile::TempDir) -> (SharedMemoryChannel, SharedMemoryChannel) {
    let path = dir.path().join("session");
    let mut trainer =
        SharedMemoryChannel::create(&path, 0, 64, Role::Trainer, ChannelConfig::default())
            .expect("create");
    let simulation =
        SharedMemoryChannel::open(&path, Role::Simulation, ChannelConfig::default()).expect("open");
    trainer.hand_over(Command::Default).expect("hand over");
    (trainer, simulation)
}

#[test]
fn ten_agent_rewards_reach_the_trainer() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (mut trainer, mut simulation) = pair(&dir);
    let mut buffer = continuous_buffer(10);

    for agent in 0..10 {
        buffer
            .request_decision(AgentId(agent))
            .expect("slot")
            .set_reward(agent as f32)
            .set_observation_from_slice(0, &[agent as f32, 0.5, -1.0])
            .expect("observation");
    }

    simulation.wait_for_turn().expect("turn");
    simulation.write_world("walker", &mut buffer).expect("write");
    simulation.hand_over(Command::Default).expect("hand over");

    trainer.wait_for_turn().expect("turn");
    let reader = trainer.read_world("walker").expect("read");
    assert_eq!(reader.agents_this_step(), 10);
    let rewards: Vec<f32> = reader.decisions().map(|decision| decision.reward).collect();
    assert_eq!(rewards, (0..10).map(|i| i as f32).collect::<Vec<_>>());
    let fourth = reader.decision(4).expect("slot 4");
    assert_eq!(fourth.agent, AgentId(4));
    assert_eq!(fourth.observations, vec![vec![4.0, 0.5, -1.0]]);
    assert!(fourth.mask.is_empty());
    assert!(reader.decision(10).is_none());
}

#[test]
fn actions_written_by_the_trainer_land_in_the_buffer() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (mut trainer, mut simulation) = pair(&dir);
    let mut buffer = continuous_buffer(4);
    buffer.request_decision(AgentId(21)).expect("slot");
    buffer
        .request_decision(AgentId(22))
        .expect("slot")
        .has_terminated(true, false);

    simulation.wait_for_turn().expect("turn");
    simulation.write_world("walker", &mut buffer).expect("write");
    simulation.hand_over(Command::Default).expect("hand over");

    trainer.wait_for_turn().expect("turn");
    {
        let mut section = trainer.actions_section("walker").expect("section");
        assert_eq!(section.width(), 2);
        section.write_continuous(0, &[0.25, -0.25]).expect("slot 0");
        section.write_continuous(1, &[1.0, 2.0]).expect("slot 1");
        assert!(matches!(
            section.write_discrete(0, &[1, 1]),
            Err(CodecError::SpecMismatch(_))
        ));
        assert!(matches!(
            section.write_continuous(4, &[0.0, 0.0]),
            Err(CodecError::Malformed(_))
        ));
    }
    trainer.hand_over(Command::Default).expect("hand over");

    assert_eq!(simulation.wait_for_turn().expect("turn"), Command::Default);
    assert_eq!(simulation.load_world("walker", &mut buffer).expect("load"), 2);
    buffer.mark_actions_ready();
    let actions: Vec<_> = buffer
        .ready_actions()
        .map(|action| {
            (
                action.agent(),
                action.is_terminated(),
                action.continuous().expect("continuous").to_vec(),
            )
        })
        .collect();
    assert_eq!(
        actions,
        vec![
            (AgentId(21), false, vec![0.25, -0.25]),
            (AgentId(22), true, vec![1.0, 2.0]),
        ]
    );
}

#[test]
fn rewriting_a_block_keeps_the_previous_actions() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (mut trainer, mut simulation) = pair(&dir);
    let mut buffer = continuous_buffer(2);
    buffer.request_decision(AgentId(1)).expect("slot");

    simulation.wait_for_turn().expect("turn");
    simulation.write_world("walker", &mut buffer).expect("write");
    simulation.hand_over(Command::Default).expect("hand over");
    trainer.wait_for_turn().expect("turn");
    trainer
        .actions_section("walker")
        .expect("section")
        .write_continuous(0, &[7.0, 8.0])
        .expect("write");
    trainer.hand_over(Command::Default).expect("hand over");

    simulation.wait_for_turn().expect("turn");
    simulation.load_world("walker", &mut buffer).expect("load");
    buffer.mark_actions_ready();
    buffer
        .request_decision(AgentId(1))
        .expect("slot")
        .set_reward(3.0);
    simulation.write_world("walker", &mut buffer).expect("rewrite");

    let reader = simulation.read_world("walker").expect("read");
    assert_eq!(reader.decision(0).expect("slot").reward, 3.0);
    assert_eq!(reader.continuous_actions(0), Some(vec![7.0, 8.0]));
}

#[test]
fn discrete_masks_travel_with_the_block() {
    let mut buffer = DecisionBuffer::new(
        WorldSpec::builder(2)
            .discrete_actions(&[3, 2])
            .build()
            .expect("spec"),
    );
    buffer
        .request_decision(AgentId(5))
        .expect("slot")
        .set_discrete_action_mask(0, 2)
        .expect("mask");

    let block = WorldBlock::new(buffer.decisions()).expect("block");
    let mut bytes = vec![0u8; block.encoded_len()];
    block.encode_into(&mut bytes);

    let reader = WorldBlockReader::parse(&bytes).expect("parse");
    assert_eq!(reader.header(), &BlockHeader::from_spec(buffer.spec()));
    assert_eq!(
        reader.decision(0).expect("slot").mask,
        vec![false, false, true, false, false]
    );
    assert_eq!(reader.discrete_actions(0), Some(vec![0, 0]));
    assert_eq!(reader.continuous_actions(0), None);
}

#[test]
fn actions_for_another_declaration_are_rejected() {
    let mut written = continuous_buffer(2);
    written.request_decision(AgentId(0)).expect("slot");
    let block = WorldBlock::new(written.decisions()).expect("block");
    let mut bytes = vec![0u8; block.encoded_len()];
    block.encode_into(&mut bytes);

    let mut other = continuous_buffer(3);
    other.request_decision(AgentId(0)).expect("slot");
    assert!(matches!(
        decode_actions(&bytes, &mut other),
        Err(CodecError::SpecMismatch(_))
    ));

    let mut unrequested = continuous_buffer(2);
    assert!(matches!(
        decode_actions(&bytes, &mut unrequested),
        Err(CodecError::Malformed(_))
    ));

    assert!(matches!(
        decode_actions(&bytes[..bytes.len() - 1], &mut written),
        Err(CodecError::Truncated { .. })
    ));
}

#[test]
fn unknown_world_names_are_reported() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (_trainer, mut simulation) = pair(&dir);
    let mut buffer = continuous_buffer(1);
    simulation.wait_for_turn().expect("turn");
    assert!(matches!(
        simulation.load_world("missing", &mut buffer),
        Err(CodecError::UnknownWorld { .. })
    ));
}

#[test]
fn oversized_observation_dimensions_are_malformed() {
    let mut block = Vec::new();
    block.extend_from_slice(&1i32.to_le_bytes());
    block.push(1);
    for field in [1i32, 1, i32::MAX, i32::MAX, i32::MAX, 0] {
        block.extend_from_slice(&field.to_le_bytes());
    }
    assert!(matches!(
        WorldBlockReader::parse(&block),
        Err(CodecError::Malformed(message)) if message == "block size overflows"
    ));
}

proptest! {
    #[test]
    fn arbitrary_bytes_never_panic_the_reader(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
        if let Ok(reader) = WorldBlockReader::parse(&bytes) {
            prop_assert!(reader.agents_this_step() <= reader.header().capacity);
            prop_assert!(reader.layout().len <= bytes.len());
            let _ = reader.decisions().count();
        }
    }
}
