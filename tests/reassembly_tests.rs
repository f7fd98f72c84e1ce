//! Loss-tolerant reassembly: offset ordering, gap accounting, overlaps and
//! the end-to-end fax data scenarios.

mod common;

use common::{Session, fill_store, hdlc_datagram, key};
use t38star::protocol_types::FieldType;
use t38star::{FragmentStore, FrameNumber, LossStats, OverlapStatus, ReassemblyConfig, Reassembler};

#[test]
fn gap_free_input_reassembles_without_loss() {
    let mut store = FragmentStore::new();
    fill_store(
        &mut store,
        key(1),
        &[(0, b"ab", false), (1, b"cd", false), (2, b"ef", false), (3, b"g", true)],
    );
    let unit = Reassembler::default()
        .reassemble(&mut store, &key(1), FrameNumber::new(4))
        .unwrap();
    assert_eq!(&unit.data[..], b"abcdefg");
    assert_eq!(unit.len(), 7);
    assert_eq!(unit.loss, LossStats::default());
}

#[test]
fn single_gap_is_one_lost_packet() {
    let mut store = FragmentStore::new();
    fill_store(
        &mut store,
        key(1),
        &[(0, b"a", false), (1, b"b", false), (3, b"d", false), (4, b"e", true)],
    );
    let unit = Reassembler::default()
        .reassemble(&mut store, &key(1), FrameNumber::new(4))
        .unwrap();
    assert_eq!(&unit.data[..], b"abde");
    assert_eq!(
        unit.loss,
        LossStats {
            packet_lost: 1,
            burst_lost: 1
        }
    );
}

#[test]
fn wide_gap_is_one_burst() {
    let mut store = FragmentStore::new();
    fill_store(&mut store, key(1), &[(0, b"a", false), (5, b"f", true)]);
    let unit = Reassembler::default()
        .reassemble(&mut store, &key(1), FrameNumber::new(2))
        .unwrap();
    assert_eq!(
        unit.loss,
        LossStats {
            packet_lost: 4,
            burst_lost: 4
        }
    );
}

#[test]
fn reassembly_is_idempotent() {
    let mut store = FragmentStore::new();
    fill_store(&mut store, key(1), &[(0, b"a", false), (2, b"c", true)]);
    let reassembler = Reassembler::default();
    let first = reassembler.reassemble(&mut store, &key(1), FrameNumber::new(2));
    let second = reassembler.reassemble(&mut store, &key(1), FrameNumber::new(2));
    assert!(first.is_some());
    assert_eq!(first, second);
}

#[test]
fn identical_overlap_is_benign() {
    let mut store = FragmentStore::new();
    fill_store(&mut store, key(1), &[(2, b"AA", false), (2, b"AA", true)]);
    let unit = Reassembler::default()
        .reassemble(&mut store, &key(1), FrameNumber::new(2))
        .unwrap();
    assert_eq!(unit.overlap, OverlapStatus::Overlap);
    assert_eq!(&unit.data[..], b"AA");
}

#[test]
fn conflicting_overlap_keeps_first_arrival() {
    let mut store = FragmentStore::new();
    fill_store(&mut store, key(1), &[(2, b"AA", false), (2, b"BB", true)]);
    let unit = Reassembler::default()
        .reassemble(&mut store, &key(1), FrameNumber::new(2))
        .unwrap();
    assert_eq!(unit.overlap, OverlapStatus::Conflict);
    assert_eq!(&unit.data[..], b"AA");
    let fragments = store.lookup(&key(1)).unwrap().fragments();
    assert!(fragments[1].flags.overlap_conflict);
}

#[test]
fn output_follows_offsets_not_arrival() {
    let mut store = FragmentStore::new();
    fill_store(&mut store, key(1), &[(1, b"B", true), (0, b"A", false)]);
    let unit = Reassembler::default()
        .reassemble(&mut store, &key(1), FrameNumber::new(2))
        .unwrap();
    assert_eq!(&unit.data[..], b"AB");
}

#[test]
fn single_final_fragment_is_trivial_unit() {
    let mut store = FragmentStore::new();
    fill_store(&mut store, key(1), &[(0, b"only", true)]);
    let unit = Reassembler::default()
        .reassemble(&mut store, &key(1), FrameNumber::new(1))
        .unwrap();
    assert_eq!(&unit.data[..], b"only");
    assert_eq!(unit.loss.packet_lost, 0);
    assert!(unit.complete);
}

#[test]
fn leading_gap_counting_follows_configuration() {
    let fragments: &[(u32, &[u8], bool)] = &[(3, b"d", false), (4, b"e", true)];

    let mut store = FragmentStore::new();
    fill_store(&mut store, key(1), fragments);
    let relative = Reassembler::new(false)
        .reassemble(&mut store, &key(1), FrameNumber::new(2))
        .unwrap();
    assert_eq!(relative.loss.packet_lost, 0);

    let mut store = FragmentStore::new();
    fill_store(&mut store, key(1), fragments);
    let absolute = Reassembler::new(true)
        .reassemble(&mut store, &key(1), FrameNumber::new(2))
        .unwrap();
    assert_eq!(
        absolute.loss,
        LossStats {
            packet_lost: 3,
            burst_lost: 3
        }
    );
}

#[test]
fn fax_data_end_to_end() {
    let mut session = Session::new();
    let results = session.send_all(&[
        hdlc_datagram(10, b"fax", None),
        hdlc_datagram(11, b"-da", None),
        hdlc_datagram(12, b"ta!", Some(FieldType::HdlcFcsOk)),
    ]);

    assert!(results[0].reassembled.is_none());
    assert!(results[1].reassembled.is_none());
    let unit = results[2].reassembled.as_ref().unwrap();
    assert_eq!(&unit.data[..], b"fax-data!");
    assert_eq!(unit.loss.packet_lost, 0);
    assert!(unit.complete);
    assert_eq!(unit.reassembled_in, 3);
    assert_eq!(results[2].loss, LossStats::default());
}

#[test]
fn fax_data_end_to_end_with_loss() {
    let mut session = Session::new();
    let results = session.send_all(&[
        hdlc_datagram(20, b"fax", None),
        hdlc_datagram(22, b"ta!", Some(FieldType::HdlcFcsOk)),
    ]);

    let unit = results[1].reassembled.as_ref().unwrap();
    assert_eq!(&unit.data[..], b"faxta!");
    assert_eq!(
        unit.loss,
        LossStats {
            packet_lost: 1,
            burst_lost: 1
        }
    );
    assert_eq!(results[1].loss, unit.loss);
}

#[test]
fn out_of_order_datagrams_reassemble_in_sequence_order() {
    let mut session = Session::new();
    let results = session.send_all(&[
        hdlc_datagram(30, b"A", None),
        hdlc_datagram(32, b"C", None),
        hdlc_datagram(31, b"B", None),
        hdlc_datagram(33, b"", Some(FieldType::HdlcFcsOk)),
    ]);
    let unit = results[3].reassembled.as_ref().unwrap();
    assert_eq!(&unit.data[..], b"ABC");
    assert_eq!(unit.loss, LossStats::default());
}

#[test]
fn retransmitted_datagram_is_plain_overlap() {
    let mut session = Session::new();
    let first = hdlc_datagram(40, b"AB", None);
    let results = session.send_all(&[
        first.clone(),
        first,
        hdlc_datagram(41, b"CD", Some(FieldType::HdlcFcsOk)),
    ]);
    let unit = results[2].reassembled.as_ref().unwrap();
    assert_eq!(&unit.data[..], b"ABCD");
    assert_eq!(unit.overlap, OverlapStatus::Overlap);
}

#[test]
fn configured_leading_gap_reaches_dispatch() {
    let config = ReassemblyConfig {
        count_leading_gap: true,
        ..Default::default()
    };
    let mut session = Session::with_config(config);
    let results = session.send_all(&[
        hdlc_datagram(50, b"A", None),
        hdlc_datagram(51, b"B", Some(FieldType::HdlcFcsOk)),
    ]);
    // Units always start at offset zero in dispatch, so nothing leads.
    assert_eq!(
        results[1].reassembled.as_ref().unwrap().loss,
        LossStats::default()
    );
}
