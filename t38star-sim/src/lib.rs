//! Core library for the T38star deterministic simulator.
//!
//! Generates synthetic fax sessions (HDLC control frames and non-ECM T.4
//! pages), encodes them as UDPTL datagrams, pushes them through a seeded
//! lossy channel and checks what the `t38star` reassembly context produces
//! against the ground truth of what was sent and delivered.

use std::collections::{BTreeMap, VecDeque};
use std::net::SocketAddr;

use rand::prelude::*;
use rand::rngs::StdRng;
use t38star::protocol_types::{
    DataField, DataType, ErrorRecovery, FieldType, IfpPacket, T30Data, UdptlPacket,
};
use t38star::constants::SEQUENCE_FORWARD_WINDOW;
use t38star::serialization::serialize_udptl;
use t38star::{
    BuildingError, DissectionResult, FrameNumber, LossStats, PacketInfo, ReassemblyConfig,
    ReassemblyContext, SequenceNumber, T38Error,
};

const DATAGRAM_BUF_SIZE: usize = 4096;

/// Configuration for a simulation scenario.
#[derive(Debug, Clone)]
pub struct SimConfig {
    pub seed: u64,
    /// Number of units (HDLC frames or T.4 pages) to generate.
    pub num_units: usize,
    pub start_seq: u16,
    pub min_unit_len: usize,
    pub max_unit_len: usize,
    /// Largest payload carried by one datagram.
    pub max_fragment_len: usize,
    /// Probability that a unit is a non-ECM page rather than an HDLC frame.
    pub t4_page_probability: f64,
    /// Previous primaries repeated as secondaries in each datagram.
    pub redundancy: usize,
    pub channel_packet_loss_probability: f64,
    pub channel_reorder_probability: f64,
    pub channel_duplicate_probability: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            num_units: 20,
            start_seq: 0,
            min_unit_len: 3,
            max_unit_len: 256,
            max_fragment_len: 32,
            t4_page_probability: 0.0,
            redundancy: 0,
            channel_packet_loss_probability: 0.0,
            channel_reorder_probability: 0.0,
            channel_duplicate_probability: 0.0,
        }
    }
}

impl SimConfig {
    /// True when the channel can deliver datagrams out of order or twice.
    pub fn has_disorder(&self) -> bool {
        self.channel_reorder_probability > 0.0 || self.channel_duplicate_probability > 0.0
    }
}

/// One UDPTL datagram together with what it carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimDatagram {
    pub seq: SequenceNumber,
    pub data_type: DataType,
    pub payload: Vec<u8>,
    /// Carries the field that closes its unit.
    pub terminal: bool,
    pub bytes: Vec<u8>,
}

/// A unit as sent by the calling side.
#[derive(Debug, Clone)]
pub struct GeneratedUnit {
    pub data_type: DataType,
    pub data: Vec<u8>,
    pub datagrams: Vec<SimDatagram>,
}

/// Generates a stream of fax units deterministically.
pub struct FaxSessionGenerator {
    rng: StdRng,
    config: SimConfig,
    next_seq: SequenceNumber,
    recent_primaries: VecDeque<IfpPacket>,
    units_generated: usize,
}

impl FaxSessionGenerator {
    /// Creates a new generator.
    ///
    /// # Parameters
    /// - `config`: Simulation configuration containing unit and datagram parameters
    ///
    /// # Returns
    /// A new `FaxSessionGenerator` starting at `config.start_seq`.
    pub fn new(config: &SimConfig) -> Self {
        Self {
            rng: StdRng::seed_from_u64(config.seed),
            config: config.clone(),
            next_seq: SequenceNumber::new(config.start_seq),
            recent_primaries: VecDeque::with_capacity(config.redundancy),
            units_generated: 0,
        }
    }

    /// Generates the next unit and the datagrams that carry it.
    ///
    /// Returns `Ok(None)` once the configured number of units has been
    /// generated.
    ///
    /// # Errors
    /// - [`BuildingError`] - A datagram did not fit the encode buffer
    pub fn next_unit(&mut self) -> Result<Option<GeneratedUnit>, BuildingError> {
        if self.units_generated >= self.config.num_units {
            return Ok(None);
        }

        let data_type = if self.config.t4_page_probability > 0.0
            && self.rng.random_bool(self.config.t4_page_probability)
        {
            DataType::T4NonEcm
        } else {
            DataType::Hdlc
        };
        let min_len = self.config.min_unit_len.max(1);
        let len = self
            .rng
            .random_range(min_len..=self.config.max_unit_len.max(min_len));
        let data: Vec<u8> = (0..len).map(|_| self.rng.random()).collect();

        let chunk_len = self.config.max_fragment_len.max(1);
        let chunk_count = data.len().div_ceil(chunk_len);
        let mut datagrams = Vec::with_capacity(chunk_count);
        for (i, chunk) in data.chunks(chunk_len).enumerate() {
            let terminal = i + 1 == chunk_count;
            datagrams.push(self.encode_datagram(data_type, chunk, terminal)?);
        }

        self.units_generated += 1;
        Ok(Some(GeneratedUnit {
            data_type,
            data,
            datagrams,
        }))
    }

    fn encode_datagram(
        &mut self,
        data_type: DataType,
        chunk: &[u8],
        terminal: bool,
    ) -> Result<SimDatagram, BuildingError> {
        let (modulation, data_field, terminal_field) = match data_type {
            DataType::Hdlc => (T30Data::V21, FieldType::HdlcData, FieldType::HdlcFcsOk),
            DataType::T4NonEcm => (
                T30Data::V17_14400,
                FieldType::T4NonEcmData,
                FieldType::T4NonEcmSigEnd,
            ),
        };
        let mut fields = vec![DataField::with_data(data_field, chunk.to_vec())];
        if terminal {
            fields.push(DataField::new(terminal_field));
        }
        let primary = IfpPacket::data(modulation, fields);

        let seq = self.next_seq;
        let packet = UdptlPacket {
            seq,
            primary: primary.clone(),
            error_recovery: ErrorRecovery::Secondary(
                self.recent_primaries.iter().rev().cloned().collect(),
            ),
        };
        let mut buf = vec![0u8; DATAGRAM_BUF_SIZE];
        let len = serialize_udptl(&packet, false, &mut buf)?;
        buf.truncate(len);

        if self.config.redundancy > 0 {
            if self.recent_primaries.len() == self.config.redundancy {
                self.recent_primaries.pop_front();
            }
            self.recent_primaries.push_back(primary);
        }
        self.next_seq = seq + 1;

        Ok(SimDatagram {
            seq,
            data_type,
            payload: chunk.to_vec(),
            terminal,
            bytes: buf,
        })
    }
}

/// Represents the simulated network channel.
///
/// Drops, duplicates and swaps datagrams with seeded probabilities.
pub struct LossyChannel {
    rng: StdRng,
    packet_loss_probability: f64,
    reorder_probability: f64,
    duplicate_probability: f64,
    held: Option<SimDatagram>,
}

impl LossyChannel {
    /// Creates a new simulated channel.
    ///
    /// # Parameters
    /// - `seed`: Random seed for reproducible impairment patterns
    /// - `config`: Source of the loss, reorder and duplicate probabilities
    pub fn new(seed: u64, config: &SimConfig) -> Self {
        debug_assert!((0.0..=1.0).contains(&config.channel_packet_loss_probability));
        Self {
            rng: StdRng::seed_from_u64(seed),
            packet_loss_probability: config.channel_packet_loss_probability,
            reorder_probability: config.channel_reorder_probability,
            duplicate_probability: config.channel_duplicate_probability,
            held: None,
        }
    }

    /// Simulates transmitting one datagram.
    ///
    /// # Returns
    /// The datagrams that come out of the channel as a result, in delivery
    /// order. A datagram held back for reordering is released behind the
    /// next one that gets through.
    pub fn transmit(&mut self, datagram: SimDatagram) -> Vec<SimDatagram> {
        if self.packet_loss_probability > 0.0 && self.rng.random_bool(self.packet_loss_probability)
        {
            return Vec::new();
        }

        let mut delivered = Vec::with_capacity(3);
        let duplicate = self.duplicate_probability > 0.0
            && self.rng.random_bool(self.duplicate_probability);
        if self.held.is_none()
            && self.reorder_probability > 0.0
            && self.rng.random_bool(self.reorder_probability)
        {
            self.held = Some(datagram);
            return delivered;
        }

        if duplicate {
            delivered.push(datagram.clone());
        }
        delivered.push(datagram);
        delivered.extend(self.held.take());
        delivered
    }

    /// Releases a datagram still held for reordering.
    pub fn flush(&mut self) -> Option<SimDatagram> {
        self.held.take()
    }
}

/// A unit the model predicts the context will complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedUnit {
    pub data: Vec<u8>,
    pub loss: LossStats,
}

#[derive(Debug)]
struct OpenUnit {
    start: SequenceNumber,
    data_type: DataType,
    /// First payload seen at each offset.
    fragments: BTreeMap<u32, Vec<u8>>,
}

impl OpenUnit {
    fn finish(self) -> ExpectedUnit {
        let mut loss = LossStats::default();
        let mut next = 0u32;
        for &offset in self.fragments.keys() {
            let gap = offset - next;
            loss.packet_lost += gap;
            loss.burst_lost = loss.burst_lost.max(gap);
            next = offset + 1;
        }
        ExpectedUnit {
            data: self.fragments.into_values().flatten().collect(),
            loss,
        }
    }
}

/// Ground-truth reassembly model of what a receiver should rebuild.
///
/// Follows the delivered datagrams the way a receiver sees them: only a
/// datagram ahead of everything seen so far may open a unit, a datagram
/// behind the unit start is dropped and the first copy of each offset wins.
#[derive(Debug)]
pub struct ExpectationModel {
    max_fragment_offset: u32,
    highest_seq: Option<SequenceNumber>,
    last_close: Option<SequenceNumber>,
    open: Option<OpenUnit>,
}

impl ExpectationModel {
    pub fn new(config: &ReassemblyConfig) -> Self {
        Self {
            max_fragment_offset: config.max_fragment_offset,
            highest_seq: None,
            last_close: None,
            open: None,
        }
    }

    fn is_ahead(seq: SequenceNumber, of: SequenceNumber) -> bool {
        (1..=SEQUENCE_FORWARD_WINDOW).contains(&seq.wrapping_sub(of))
    }

    /// Records one delivered datagram.
    ///
    /// # Returns
    /// The unit this datagram completes, if any.
    pub fn deliver(&mut self, datagram: &SimDatagram) -> Option<ExpectedUnit> {
        let seq = datagram.seq;
        let fresh = self
            .highest_seq
            .is_none_or(|highest| Self::is_ahead(seq, highest));
        if fresh {
            self.highest_seq = Some(seq);
        }
        let behind_close = self
            .last_close
            .is_some_and(|closed| !Self::is_ahead(seq, closed));

        let needs_unit = self
            .open
            .as_ref()
            .is_none_or(|open| open.data_type != datagram.data_type);
        if needs_unit {
            if !fresh || behind_close {
                return None;
            }
            self.open = Some(OpenUnit {
                start: seq,
                data_type: datagram.data_type,
                fragments: BTreeMap::new(),
            });
        }
        let open = self.open.as_mut()?;

        let offset = seq.offset_from(open.start);
        if offset > self.max_fragment_offset {
            return None;
        }
        open.fragments
            .entry(offset)
            .or_insert_with(|| datagram.payload.clone());

        if !datagram.terminal {
            return None;
        }
        self.last_close = Some(seq);
        self.open.take().map(OpenUnit::finish)
    }
}

/// Counters collected over one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimStats {
    pub units_generated: usize,
    pub datagrams_sent: usize,
    pub datagrams_delivered: usize,
    pub units_reassembled: usize,
    pub packets_lost: u64,
}

/// Errors that can occur during a simulation run.
#[derive(Debug)]
pub enum SimError {
    GenerationError { unit: usize, error: BuildingError },
    DispatchError { seq: u16, error: T38Error },
    VerificationError { seq: u16, message: String },
    InvariantViolation { seq: u16, message: String },
}

/// Orchestrates a single deterministic simulation run.
pub struct FaxSimulator {
    config: SimConfig,
    generator: FaxSessionGenerator,
    channel: LossyChannel,
    context: ReassemblyContext,
    model: ExpectationModel,
    gateway: SocketAddr,
    terminal: SocketAddr,
    next_frame: u32,
    delivered: Vec<(PacketInfo, SimDatagram, DissectionResult)>,
    stats: SimStats,
}

impl FaxSimulator {
    /// Creates a new fax simulation instance.
    ///
    /// # Parameters
    /// - `config`: Complete simulation configuration
    ///
    /// # Returns
    /// A new `FaxSimulator` ready to run the simulation.
    pub fn new(config: SimConfig) -> Self {
        let reassembly_config = ReassemblyConfig::default();
        let generator = FaxSessionGenerator::new(&config);
        let channel = LossyChannel::new(config.seed.wrapping_add(1), &config);
        Self {
            model: ExpectationModel::new(&reassembly_config),
            context: ReassemblyContext::new(reassembly_config),
            config,
            generator,
            channel,
            gateway: SocketAddr::from(([192, 168, 0, 1], 6000)),
            terminal: SocketAddr::from(([192, 168, 0, 2], 6002)),
            next_frame: 1,
            delivered: Vec::new(),
            stats: SimStats::default(),
        }
    }

    /// Runs the simulation and verifies every reassembled unit.
    ///
    /// Generates units, transmits their datagrams through the channel,
    /// feeds what arrives to the reassembly context, then replays every
    /// delivered frame and checks that the results are served unchanged.
    ///
    /// # Returns
    /// The [`SimStats`] of the run.
    ///
    /// # Errors
    /// - [`SimError::GenerationError`] - A datagram could not be encoded
    /// - [`SimError::DispatchError`] - The context rejected a delivered datagram
    /// - [`SimError::VerificationError`] - A unit differs from the ground truth
    /// - [`SimError::InvariantViolation`] - A result breaks a reassembly invariant
    pub fn run(&mut self) -> Result<SimStats, SimError> {
        let mut sent_bytes = 0usize;
        let mut generated = Vec::new();

        while let Some(unit) = self
            .generator
            .next_unit()
            .map_err(|error| SimError::GenerationError {
                unit: self.stats.units_generated,
                error,
            })?
        {
            self.stats.units_generated += 1;
            sent_bytes += unit.data.len();
            for datagram in &unit.datagrams {
                self.stats.datagrams_sent += 1;
                for arrived in self.channel.transmit(datagram.clone()) {
                    self.deliver(arrived)?;
                }
            }
            generated.push(unit);
        }
        if let Some(held) = self.channel.flush() {
            self.deliver(held)?;
        }

        if self.config.channel_packet_loss_probability == 0.0 && !self.config.has_disorder() {
            self.verify_against_sent(&generated)?;
        }
        self.verify_incomplete(sent_bytes)?;
        self.verify_replay()?;

        log::debug!(
            "Simulation seed {} finished: {:?}",
            self.config.seed,
            self.stats
        );
        Ok(self.stats)
    }

    fn deliver(&mut self, datagram: SimDatagram) -> Result<(), SimError> {
        let seq = datagram.seq.value();
        let info = PacketInfo::udp(
            FrameNumber::new(self.next_frame),
            self.gateway,
            self.terminal,
        );
        self.next_frame += 1;
        self.stats.datagrams_delivered += 1;

        let result = self
            .context
            .process_packet(&info, &datagram.bytes)
            .map_err(|error| SimError::DispatchError { seq, error })?;

        if let Some(unit) = &result.reassembled {
            if !unit.complete {
                return Err(SimError::InvariantViolation {
                    seq,
                    message: "Reassembled unit not marked complete".to_string(),
                });
            }
            if unit.loss.burst_lost > unit.loss.packet_lost {
                return Err(SimError::InvariantViolation {
                    seq,
                    message: format!(
                        "Burst loss {} exceeds packet loss {}",
                        unit.loss.burst_lost, unit.loss.packet_lost
                    ),
                });
            }
            if unit.reassembled_in != info.frame {
                return Err(SimError::InvariantViolation {
                    seq,
                    message: format!(
                        "Unit reassembled in {} reported as {}",
                        info.frame, unit.reassembled_in
                    ),
                });
            }
            self.stats.units_reassembled += 1;
            self.stats.packets_lost += u64::from(unit.loss.packet_lost);
        }

        let expected = self.model.deliver(&datagram);
        let actual = result.reassembled.as_ref().map(|unit| ExpectedUnit {
            data: unit.data.to_vec(),
            loss: unit.loss,
        });
        if expected != actual {
            return Err(SimError::VerificationError {
                seq,
                message: format!(
                    "Unit mismatch: expected {} bytes {:?}, got {} bytes {:?}",
                    expected.as_ref().map_or(0, |unit| unit.data.len()),
                    expected.as_ref().map(|unit| unit.loss),
                    actual.as_ref().map_or(0, |unit| unit.data.len()),
                    actual.as_ref().map(|unit| unit.loss)
                ),
            });
        }

        self.delivered.push((info, datagram, result));
        Ok(())
    }

    /// On a clean channel every generated unit comes back byte for byte.
    fn verify_against_sent(&self, generated: &[GeneratedUnit]) -> Result<(), SimError> {
        let units: Vec<_> = self
            .delivered
            .iter()
            .filter_map(|(_, datagram, result)| {
                result.reassembled.as_ref().map(|unit| (datagram.seq, unit))
            })
            .collect();
        if units.len() != generated.len() {
            return Err(SimError::VerificationError {
                seq: self.config.start_seq,
                message: format!(
                    "Unit count mismatch: sent {}, reassembled {}",
                    generated.len(),
                    units.len()
                ),
            });
        }
        for ((seq, unit), sent) in units.into_iter().zip(generated) {
            if unit.data[..] != sent.data[..] {
                return Err(SimError::VerificationError {
                    seq: seq.value(),
                    message: format!(
                        "Data mismatch: sent {} bytes, reassembled {} bytes",
                        sent.data.len(),
                        unit.len()
                    ),
                });
            }
            if unit.hdlc_fcs() != t38star::crc::calculate_hdlc_fcs(&sent.data) {
                return Err(SimError::VerificationError {
                    seq: seq.value(),
                    message: "FCS mismatch".to_string(),
                });
            }
        }
        Ok(())
    }

    fn verify_incomplete(&self, sent_bytes: usize) -> Result<(), SimError> {
        for unit in self.context.incomplete_units() {
            if unit.complete || unit.len() > sent_bytes {
                return Err(SimError::InvariantViolation {
                    seq: self.config.start_seq,
                    message: format!(
                        "Pending unit {} is complete={} with {} bytes",
                        unit.key.unit_id,
                        unit.complete,
                        unit.len()
                    ),
                });
            }
        }
        Ok(())
    }

    /// A second pass over the same frames must be answered from the cache.
    fn verify_replay(&mut self) -> Result<(), SimError> {
        for (info, datagram, first) in &self.delivered {
            let seq = datagram.seq.value();
            let replayed = self
                .context
                .process_packet(info, &datagram.bytes)
                .map_err(|error| SimError::DispatchError { seq, error })?;
            if !replayed.replayed || replayed.reassembled != first.reassembled {
                return Err(SimError::InvariantViolation {
                    seq,
                    message: format!("Replay of frame {} changed its result", info.frame),
                });
            }
        }
        Ok(())
    }
}
