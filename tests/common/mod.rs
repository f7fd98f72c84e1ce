//! Common test utilities for t38star integration tests.
//!
//! Builders for UDPTL datagrams and a small driver that feeds them through a
//! [`ReassemblyContext`] with consecutive frame numbers.

#![allow(dead_code)]

use std::net::SocketAddr;

use bytes::Bytes;
use t38star::protocol_types::{
    DataField, ErrorRecovery, FieldType, IfpPacket, T30Data, T30Indicator, UdptlPacket,
};
use t38star::serialization::{serialize_ifp, serialize_tpkt, serialize_udptl};
use t38star::{
    DissectionResult, FragmentKey, FragmentStore, FrameNumber, PacketInfo, ReassemblyConfig,
    ReassemblyContext, SequenceNumber, UnitId,
};

pub const BUF_SIZE: usize = 2048;

/// Calling gateway of the test session.
pub fn gateway() -> SocketAddr {
    "192.0.2.10:6000".parse().unwrap()
}

/// Answering terminal of the test session.
pub fn terminal() -> SocketAddr {
    "192.0.2.20:6002".parse().unwrap()
}

pub fn key(unit: u32) -> FragmentKey {
    FragmentKey::new(gateway(), terminal(), UnitId::new(unit))
}

/// Adds `(offset, payload, is_final)` fragments in the given order, one frame each.
pub fn fill_store(store: &mut FragmentStore, key: FragmentKey, fragments: &[(u32, &[u8], bool)]) {
    for (i, (offset, payload, is_final)) in fragments.iter().enumerate() {
        store.add_fragment(
            key,
            *offset,
            Bytes::copy_from_slice(payload),
            *is_final,
            FrameNumber::new(i as u32 + 1),
        );
    }
}

pub fn udptl(seq: u16, primary: IfpPacket) -> UdptlPacket {
    UdptlPacket {
        seq: SequenceNumber::new(seq),
        primary,
        error_recovery: ErrorRecovery::Secondary(Vec::new()),
    }
}

/// Serializes a UDPTL datagram with post-corrigendum field types.
pub fn encode(packet: &UdptlPacket) -> Vec<u8> {
    let mut buf = vec![0u8; BUF_SIZE];
    let len = serialize_udptl(packet, false, &mut buf).expect("test datagram fits");
    buf.truncate(len);
    buf
}

/// V.21 HDLC data packet, optionally closed by `terminal`.
pub fn hdlc_datagram(seq: u16, data: &[u8], terminal: Option<FieldType>) -> Vec<u8> {
    let mut fields = Vec::new();
    if !data.is_empty() {
        fields.push(DataField::with_data(FieldType::HdlcData, data.to_vec()));
    }
    if let Some(field_type) = terminal {
        fields.push(DataField::new(field_type));
    }
    encode(&udptl(seq, IfpPacket::data(T30Data::V21, fields)))
}

/// Non-ECM image data packet, optionally closed by `t4-non-ecm-sig-end`.
pub fn t4_datagram(seq: u16, data: &[u8], sig_end: bool) -> Vec<u8> {
    let mut fields = vec![DataField::with_data(FieldType::T4NonEcmData, data.to_vec())];
    if sig_end {
        fields.push(DataField::new(FieldType::T4NonEcmSigEnd));
    }
    encode(&udptl(seq, IfpPacket::data(T30Data::V17_14400, fields)))
}

pub fn indicator_datagram(seq: u16, indicator: T30Indicator) -> Vec<u8> {
    encode(&udptl(seq, IfpPacket::indicator(indicator)))
}

/// Bare IFP encoding, optionally behind a TPKT header.
pub fn ifp_pdu(packet: &IfpPacket, tpkt: bool) -> Vec<u8> {
    let mut ifp = vec![0u8; BUF_SIZE];
    let len = serialize_ifp(packet, false, &mut ifp).expect("test IFP fits");
    ifp.truncate(len);
    if !tpkt {
        return ifp;
    }
    let mut framed = vec![0u8; BUF_SIZE];
    let len = serialize_tpkt(&ifp, &mut framed).expect("test TPKT fits");
    framed.truncate(len);
    framed
}

/// Feeds datagrams from the gateway to the terminal as consecutive UDP frames.
pub struct Session {
    pub context: ReassemblyContext,
    next_frame: u32,
}

impl Session {
    pub fn new() -> Self {
        Self::with_config(ReassemblyConfig::default())
    }

    pub fn with_config(config: ReassemblyConfig) -> Self {
        Self {
            context: ReassemblyContext::new(config),
            next_frame: 1,
        }
    }

    pub fn send(&mut self, datagram: &[u8]) -> DissectionResult {
        self.send_from(gateway(), terminal(), datagram)
    }

    pub fn send_from(
        &mut self,
        source: SocketAddr,
        destination: SocketAddr,
        datagram: &[u8],
    ) -> DissectionResult {
        let info = PacketInfo::udp(FrameNumber::new(self.next_frame), source, destination);
        self.next_frame += 1;
        self.context
            .process_packet(&info, datagram)
            .expect("test datagram decodes")
    }

    /// Sends every datagram and returns the results in order.
    pub fn send_all(&mut self, datagrams: &[Vec<u8>]) -> Vec<DissectionResult> {
        datagrams.iter().map(|datagram| self.send(datagram)).collect()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
