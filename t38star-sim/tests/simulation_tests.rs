//! Integration tests for the T38star deterministic simulator.
//!
//! Runs end-to-end sessions through clean, lossy and disordered channels and
//! checks the generator and the reassembly outcomes.

use t38star::protocol_types::DataType;
use t38star_sim::{FaxSessionGenerator, FaxSimulator, SimConfig};

#[test]
fn generator_produces_consecutive_sequence_numbers() {
    let config = SimConfig {
        num_units: 3,
        start_seq: 100,
        min_unit_len: 10,
        max_unit_len: 10,
        max_fragment_len: 4,
        ..Default::default()
    };
    let mut generator = FaxSessionGenerator::new(&config);

    let mut next = 100u16;
    for _ in 0..3 {
        let unit = generator.next_unit().unwrap().unwrap();
        assert_eq!(unit.data_type, DataType::Hdlc);
        assert_eq!(unit.datagrams.len(), 3);
        for datagram in &unit.datagrams {
            assert_eq!(datagram.seq.value(), next);
            next = next.wrapping_add(1);
        }
        let carried: Vec<u8> = unit
            .datagrams
            .iter()
            .flat_map(|d| d.payload.iter().copied())
            .collect();
        assert_eq!(carried, unit.data);
    }
    assert!(generator.next_unit().unwrap().is_none());
}

#[test]
fn clean_channel_reassembles_every_unit() {
    let config = SimConfig {
        seed: 42,
        num_units: 30,
        t4_page_probability: 0.3,
        redundancy: 2,
        ..Default::default()
    };
    let stats = FaxSimulator::new(config).run().unwrap();
    assert_eq!(stats.units_generated, 30);
    assert_eq!(stats.units_reassembled, 30);
    assert_eq!(stats.datagrams_sent, stats.datagrams_delivered);
    assert_eq!(stats.packets_lost, 0);
}

#[test]
fn clean_channel_across_sequence_wraparound() {
    let config = SimConfig {
        seed: 7,
        num_units: 10,
        start_seq: 65530,
        ..Default::default()
    };
    let stats = FaxSimulator::new(config).run().unwrap();
    assert_eq!(stats.units_reassembled, 10);
}

#[test]
fn lossy_channel_matches_expectation_model() {
    let config = SimConfig {
        seed: 888,
        num_units: 60,
        t4_page_probability: 0.2,
        channel_packet_loss_probability: 0.25,
        ..Default::default()
    };
    let stats = FaxSimulator::new(config).run().unwrap();
    assert!(stats.datagrams_delivered < stats.datagrams_sent);
    assert!(stats.units_reassembled <= stats.units_generated);
}

#[test]
fn disordered_channel_keeps_invariants() {
    let config = SimConfig {
        seed: 1234,
        num_units: 40,
        channel_packet_loss_probability: 0.1,
        channel_reorder_probability: 0.2,
        channel_duplicate_probability: 0.1,
        ..Default::default()
    };
    let stats = match FaxSimulator::new(config).run() {
        Ok(stats) => stats,
        Err(error) => panic!("Disordered simulation failed: {:?}", error),
    };
    assert!(stats.units_reassembled <= stats.units_generated);
}

#[test]
fn duplicate_only_channel_matches_expectation_model() {
    let config = SimConfig {
        seed: 77,
        num_units: 40,
        t4_page_probability: 0.3,
        channel_duplicate_probability: 0.3,
        ..Default::default()
    };
    let stats = FaxSimulator::new(config).run().unwrap();
    assert!(stats.datagrams_delivered > stats.datagrams_sent);
    assert_eq!(stats.units_reassembled, 40);
    assert_eq!(stats.packets_lost, 0);
}
