//! Fuzz testing harnesses for t38star components.
//!
//! Each harness takes arbitrary bytes and must never panic. The property
//! tests drive them with random input.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use crate::config::ReassemblyConfig;
use crate::dispatch::{PacketInfo, ReassemblyContext};
use crate::protocol_types::UdptlPacket;
use crate::serialization::{deserialize_udptl, serialize_udptl};
use crate::types::FrameNumber;

const HARNESS_BUF_SIZE: usize = 4096;

/// Fuzz tests the UDPTL decoder and its serializer.
///
/// Whatever decodes must serialize again and decode to the same packet.
///
/// # Parameters
/// - `data`: Fuzzer-generated input treated as a UDP payload
pub fn udptl_decoder_harness(data: &[u8]) {
    for pre_corrigendum in [false, true] {
        let Ok(packet) = deserialize_udptl(data, pre_corrigendum) else {
            continue;
        };
        let mut buf = vec![0u8; HARNESS_BUF_SIZE.max(data.len() * 2)];
        if let Ok(len) = serialize_udptl(&packet, pre_corrigendum, &mut buf) {
            let reparsed: Result<UdptlPacket, _> = deserialize_udptl(&buf[..len], pre_corrigendum);
            assert_eq!(
                reparsed.as_ref(),
                Ok(&packet),
                "Harness: reserialized UDPTL packet decoded differently"
            );
        }
    }
}

/// Fuzz tests a whole [`ReassemblyContext`].
///
/// The input is split into datagrams on a length prefix byte and replayed
/// twice; the second pass must reproduce the first.
///
/// # Parameters
/// - `data`: Fuzzer-generated input holding length-prefixed datagrams
pub fn reassembly_context_harness(data: &[u8]) {
    let a = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)), 4000);
    let b = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)), 5000);

    let mut datagrams = Vec::new();
    let mut rest = data;
    while let Some((&len, tail)) = rest.split_first() {
        let take = usize::from(len).min(tail.len());
        datagrams.push(&tail[..take]);
        rest = &tail[take..];
    }

    let mut context = ReassemblyContext::new(ReassemblyConfig::default());
    let mut first_pass = Vec::with_capacity(datagrams.len());
    for (i, datagram) in datagrams.iter().enumerate() {
        let (src, dst) = if i % 3 == 2 { (b, a) } else { (a, b) };
        let info = PacketInfo::udp(FrameNumber::new(i as u32), src, dst);
        first_pass.push(context.process_packet(&info, datagram).ok());
    }

    for (i, datagram) in datagrams.iter().enumerate() {
        let (src, dst) = if i % 3 == 2 { (b, a) } else { (a, b) };
        let info = PacketInfo::udp(FrameNumber::new(i as u32), src, dst);
        let replay = context.process_packet(&info, datagram).ok();
        if let (Some(first), Some(replay)) = (&first_pass[i], &replay) {
            assert!(replay.replayed, "Harness: second pass was not served from cache");
            assert_eq!(first.reassembled, replay.reassembled);
            assert_eq!(first.loss, replay.loss);
        }
    }

    for unit in context.incomplete_units() {
        assert!(!unit.complete);
    }
}
