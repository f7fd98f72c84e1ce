//! Dispatch layer.
//!
//! [`ReassemblyContext`] owns all per-capture state and routes each transport
//! packet through decoding, conversation lookup, sequence analysis, fragment
//! accumulation and, on a terminal field, reassembly.

use std::net::SocketAddr;

use bytes::{Bytes, BytesMut};
use serde::Serialize;

use crate::annotations::PacketAnnotations;
use crate::config::ReassemblyConfig;
use crate::constants::SEQUENCE_FORWARD_WINDOW;
use crate::conversation::{
    Conversation, ConversationTracker, DirectionState, SetupInfo, SetupMethod, Transport,
};
use crate::error::T38Error;
use crate::fragment_store::{FragmentKey, FragmentStore};
use crate::protocol_types::{DataType, FieldRole, FieldType, FrameCheck, IfpPacket, MessageType};
use crate::reassembler::{LossStats, ReassembledUnit, Reassembler};
use crate::serialization::strip_tpkt;
use crate::traits::{FieldDecoder, PerFieldDecoder};
use crate::types::{FrameNumber, SequenceNumber};

/// Transport-level identity of an arriving packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PacketInfo {
    /// Capture frame number; identifies the packet across analysis passes.
    pub frame: FrameNumber,
    pub source: SocketAddr,
    pub destination: SocketAddr,
    pub transport: Transport,
}

impl PacketInfo {
    /// A UDP datagram carrying UDPTL.
    pub fn udp(frame: FrameNumber, source: SocketAddr, destination: SocketAddr) -> Self {
        Self {
            frame,
            source,
            destination,
            transport: Transport::Udp,
        }
    }

    /// A desegmented TCP PDU carrying IFP.
    pub fn tcp(frame: FrameNumber, source: SocketAddr, destination: SocketAddr) -> Self {
        Self {
            frame,
            source,
            destination,
            transport: Transport::Tcp,
        }
    }
}

/// Position of a packet's sequence number relative to its direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SequenceStatus {
    /// First packet seen in this direction.
    First,
    /// Exactly one past the previous packet.
    InOrder,
    /// Ahead of the previous packet with `missing` sequence numbers skipped.
    Gap { missing: u16 },
    /// Same sequence number as the previous packet.
    Duplicate,
    /// Behind the highest sequence number seen.
    Reordered { behind: u16 },
}

/// One IFP data field as seen in a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FieldSummary {
    pub field_type: FieldType,
    pub data_len: usize,
}

/// What [`ReassemblyContext::process_packet`] learned from one packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DissectionResult {
    pub frame: FrameNumber,
    /// Octets of the input this PDU occupied.
    pub bytes_consumed: usize,
    /// UDPTL sequence number, or the synthetic one on TCP.
    pub seq: SequenceNumber,
    pub message: MessageType,
    pub fields: Vec<FieldSummary>,
    /// Redundant IFP packets carried for error recovery.
    pub secondary_packets: usize,
    pub sequence_status: SequenceStatus,
    /// Unit the packet's payload was stored under, if any.
    pub fragment_key: Option<FragmentKey>,
    /// Unit completed by this packet.
    pub reassembled: Option<ReassembledUnit>,
    /// Frame check status signalled by a terminal field.
    pub frame_check: Option<FrameCheck>,
    /// Loss of the last completed unit in the packet's direction.
    pub loss: LossStats,
    pub setup: Option<SetupInfo>,
    /// True when served from the annotation store.
    pub replayed: bool,
}

/// Payload and terminal marker collected from the fields of one IFP packet.
#[derive(Debug, Default)]
struct PacketPayload {
    data: BytesMut,
    data_type: Option<DataType>,
    terminal: Option<(DataType, FrameCheck)>,
}

impl PacketPayload {
    fn collect(ifp: &IfpPacket) -> (Self, Vec<FieldSummary>) {
        let mut payload = Self::default();
        let mut summaries = Vec::with_capacity(ifp.fields.len());
        for field in &ifp.fields {
            let data = field.data.as_ref();
            summaries.push(FieldSummary {
                field_type: field.field_type,
                data_len: data.map_or(0, Bytes::len),
            });
            let data_type = match field.field_type.role() {
                FieldRole::Data(data_type) => data_type,
                FieldRole::Terminal(data_type, check) => {
                    payload.terminal = Some((data_type, check));
                    data_type
                }
                FieldRole::Control => continue,
            };
            if let Some(data) = data.filter(|data| !data.is_empty()) {
                payload.data_type.get_or_insert(data_type);
                payload.data.extend_from_slice(data);
            }
        }
        (payload, summaries)
    }
}

/// Classifies `seq` against the direction's history and records it.
fn analyze_sequence(direction: &mut DirectionState, seq: SequenceNumber) -> SequenceStatus {
    let Some(last) = direction.last_seq else {
        direction.last_seq = Some(seq);
        return SequenceStatus::First;
    };
    let ahead = seq.wrapping_sub(last);
    let status = match ahead {
        0 => SequenceStatus::Duplicate,
        1 => SequenceStatus::InOrder,
        n if n <= SEQUENCE_FORWARD_WINDOW => SequenceStatus::Gap { missing: n - 1 },
        _ => SequenceStatus::Reordered {
            behind: last.wrapping_sub(seq),
        },
    };
    match status {
        SequenceStatus::InOrder => direction.last_seq = Some(seq),
        SequenceStatus::Gap { missing } => {
            direction.sequence_lost = direction.sequence_lost.saturating_add(u32::from(missing));
            direction.last_seq = Some(seq);
        }
        _ => {}
    }
    status
}

/// Reassembly state for one analysis session.
///
/// Owns the fragment store, the conversation table and the per-packet
/// annotations. Construct one per capture and feed it every T.38 packet in
/// capture order with [`process_packet`](Self::process_packet). Feeding the
/// same frames again (a second analysis pass) returns the cached results and
/// leaves all state untouched.
#[derive(Debug)]
pub struct ReassemblyContext {
    config: ReassemblyConfig,
    store: FragmentStore,
    reassembler: Reassembler,
    conversations: ConversationTracker,
    annotations: PacketAnnotations<DissectionResult>,
    decoder: Box<dyn FieldDecoder>,
}

impl ReassemblyContext {
    /// Creates a context using the built-in aligned-PER decoder.
    ///
    /// # Parameters
    /// - `config`: Decoder and reassembly settings.
    ///
    /// # Returns
    /// An empty context.
    pub fn new(config: ReassemblyConfig) -> Self {
        let decoder = PerFieldDecoder::new(config.use_pre_corrigendum_asn1);
        Self::with_decoder(config, Box::new(decoder))
    }

    /// Creates a context with a caller-supplied field decoder.
    pub fn with_decoder(config: ReassemblyConfig, decoder: Box<dyn FieldDecoder>) -> Self {
        Self {
            reassembler: Reassembler::new(config.count_leading_gap),
            config,
            store: FragmentStore::new(),
            conversations: ConversationTracker::new(),
            annotations: PacketAnnotations::new(),
            decoder,
        }
    }

    pub fn config(&self) -> &ReassemblyConfig {
        &self.config
    }

    pub fn store(&self) -> &FragmentStore {
        &self.store
    }

    pub fn conversations(&self) -> &ConversationTracker {
        &self.conversations
    }

    /// Looks up the conversation between two endpoints.
    pub fn conversation(
        &self,
        transport: Transport,
        a: SocketAddr,
        b: SocketAddr,
    ) -> Option<&Conversation> {
        self.conversations.get(transport, a, b)
    }

    /// Announces a stream from signalling. See
    /// [`ConversationTracker::register_stream`].
    pub fn register_stream(
        &mut self,
        transport: Transport,
        address: SocketAddr,
        other_port: Option<u16>,
        method: SetupMethod,
        frame: FrameNumber,
    ) {
        self.conversations
            .register_stream(transport, address, other_port, method, frame);
    }

    /// Processes one transport packet.
    ///
    /// # Parameters
    /// - `info`: Frame number, endpoints and transport of the packet.
    /// - `raw`: UDP payload, or one desegmented TCP PDU.
    ///
    /// # Returns
    /// The [`DissectionResult`] for the packet. A frame processed before is
    /// answered from the annotation store with `replayed` set.
    ///
    /// # Errors
    /// - [`T38Error::Parsing`] - The packet could not be decoded; no state changed
    pub fn process_packet(
        &mut self,
        info: &PacketInfo,
        raw: &[u8],
    ) -> Result<DissectionResult, T38Error> {
        if let Some(cached) = self.annotations.get(info.frame) {
            log::trace!("Frame {} already visited", info.frame);
            let mut result = cached.clone();
            result.replayed = true;
            return Ok(result);
        }

        let (wire_seq, ifp, secondary_packets, bytes_consumed) = match info.transport {
            Transport::Udp => {
                let packet = self.decoder.decode_udptl(raw)?;
                let secondary = packet.secondary_count();
                (Some(packet.seq), packet.primary, secondary, raw.len())
            }
            Transport::Tcp => {
                let (pdu, consumed) = strip_tpkt(raw, self.config.tpkt)?;
                (None, self.decoder.decode_ifp(pdu)?, 0, consumed)
            }
        };

        let conversation = self.conversations.find_or_create(
            info.transport,
            info.source,
            info.destination,
            info.frame,
        );
        let setup = conversation.setup;
        let direction = conversation.direction_mut(info.source);
        let seq = wire_seq.unwrap_or_else(|| direction.next_tcp_seq());
        let sequence_status = analyze_sequence(direction, seq);
        direction.last_frame = Some(info.frame);

        let (payload, fields) = PacketPayload::collect(&ifp);
        let mut fragment_key = None;
        let mut reassembled = None;

        let opens_unit = payload
            .data_type
            .is_some_and(|data_type| direction.reassembly_data_type != Some(data_type));
        let late = matches!(
            sequence_status,
            SequenceStatus::Duplicate | SequenceStatus::Reordered { .. }
        ) || direction.precedes_last_close(seq);

        if opens_unit && late {
            // A straggler from a closed unit never opens the next one.
            log::debug!(
                "Ignoring late data at {} ({:?}) from {} in frame {}",
                seq,
                sequence_status,
                info.source,
                info.frame
            );
        } else if let Some(data_type) = payload.data_type.filter(|_| opens_unit) {
            if let Some(previous) = direction.reassembly_data_type {
                log::debug!(
                    "{:?} unit {:?} from {} left open by {:?} data in frame {}",
                    previous,
                    direction.unit_id,
                    info.source,
                    data_type,
                    info.frame
                );
            }
            let unit_id = direction.start_unit(seq, data_type);
            log::debug!(
                "Starting {:?} {} from {} at {} in frame {}",
                data_type,
                unit_id,
                info.source,
                seq,
                info.frame
            );
        }

        let carries_fragment = !payload.data.is_empty() || payload.terminal.is_some();
        let active = direction
            .reassembly_start_seq
            .zip(direction.unit_id)
            .filter(|_| carries_fragment && !(opens_unit && late));
        if let Some((start_seq, unit_id)) = active {
            let key = FragmentKey::new(info.source, info.destination, unit_id);
            let offset = seq.offset_from(start_seq);
            if offset > self.config.max_fragment_offset {
                log::warn!(
                    "Dropping fragment at offset {} ({} from {}) in frame {}",
                    offset,
                    seq,
                    start_seq,
                    info.frame
                );
            } else {
                self.store.add_fragment(
                    key,
                    offset,
                    payload.data.freeze(),
                    payload.terminal.is_some(),
                    info.frame,
                );
                fragment_key = Some(key);

                if payload.terminal.is_some() {
                    reassembled = self.reassembler.reassemble(&mut self.store, &key, info.frame);
                    direction.close_unit(seq);
                    match &reassembled {
                        Some(unit) => {
                            direction.packet_lost = unit.loss.packet_lost;
                            direction.burst_lost = unit.loss.burst_lost;
                            direction.units_completed += 1;
                        }
                        None => log::debug!(
                            "Terminal field in frame {} closed {} with no fragments",
                            info.frame,
                            unit_id
                        ),
                    }
                }
            }
        }

        let result = DissectionResult {
            frame: info.frame,
            bytes_consumed,
            seq,
            message: ifp.message,
            fields,
            secondary_packets,
            sequence_status,
            fragment_key,
            reassembled,
            frame_check: payload.terminal.map(|(_, check)| check),
            loss: LossStats {
                packet_lost: direction.packet_lost,
                burst_lost: direction.burst_lost,
            },
            setup,
            replayed: false,
        };
        Ok(self.annotations.insert(info.frame, result).clone())
    }

    /// Previews every unit that never saw its terminal field.
    ///
    /// Meant for end-of-capture reporting; every returned unit has
    /// `complete == false`.
    pub fn incomplete_units(&self) -> Vec<ReassembledUnit> {
        self.store
            .pending_keys()
            .iter()
            .filter_map(|key| self.reassembler.preview(&self.store, key))
            .collect()
    }

    /// Drops all state, as when a new capture is loaded.
    pub fn reset(&mut self) {
        log::debug!(
            "Resetting context: {} fragment lists, {} conversations, {} frames",
            self.store.len(),
            self.conversations.len(),
            self.annotations.len()
        );
        self.store.clear();
        self.conversations.clear();
        self.annotations.clear();
    }
}
