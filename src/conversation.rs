//! Conversation tracking.
//!
//! A [`Conversation`] is the bidirectional session between two transport
//! endpoints. It holds one [`DirectionState`] per direction and remembers how
//! the stream was discovered. Signalling code may announce a stream before any
//! of its packets arrive through [`ConversationTracker::register_stream`]; the
//! registration is bound to a concrete endpoint pair by the first packet that
//! matches it.

use std::collections::HashMap;
use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use crate::constants::SEQUENCE_FORWARD_WINDOW;
use crate::protocol_types::DataType;
use crate::types::{FrameNumber, SequenceNumber, UnitId};

/// Transport carrying the T.38 stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Transport {
    /// UDPTL over UDP.
    Udp,
    /// IFP over TCP, optionally TPKT framed.
    Tcp,
}

/// Signalling that announced a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SetupMethod {
    Sdp,
    H245,
    /// Registered by the caller without a signalling trace.
    Manual,
}

/// Provenance of a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SetupInfo {
    pub method: SetupMethod,
    /// Frame carrying the signalling that set the stream up.
    pub frame: FrameNumber,
}

/// Reassembly and loss bookkeeping for one direction of a conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectionState {
    /// Current unit, or the last one if none is active.
    pub unit_id: Option<UnitId>,
    /// Sequence number at which the active unit started.
    pub reassembly_start_seq: Option<SequenceNumber>,
    /// Payload kind of the active unit.
    pub reassembly_data_type: Option<DataType>,
    /// Highest sequence number seen in this direction.
    pub last_seq: Option<SequenceNumber>,
    pub last_frame: Option<FrameNumber>,
    /// Loss of the most recently completed unit.
    pub packet_lost: u32,
    /// Burst loss of the most recently completed unit.
    pub burst_lost: u32,
    /// Sequence numbers skipped over the whole direction.
    pub sequence_lost: u32,
    pub units_completed: u32,
    /// Sequence number of the packet that closed the last unit.
    pub last_closed_seq: Option<SequenceNumber>,
    next_tcp_seq: SequenceNumber,
}

impl DirectionState {
    /// True while a unit is accumulating fragments.
    pub fn has_active_unit(&self) -> bool {
        self.reassembly_start_seq.is_some()
    }

    /// Opens a new unit starting at `seq` and returns its identifier.
    pub fn start_unit(&mut self, seq: SequenceNumber, data_type: DataType) -> UnitId {
        let unit_id = self.unit_id.map_or(UnitId::FIRST, |id| id + 1);
        self.unit_id = Some(unit_id);
        self.reassembly_start_seq = Some(seq);
        self.reassembly_data_type = Some(data_type);
        unit_id
    }

    /// Closes the active unit at `seq`. The identifier is kept for display.
    pub fn close_unit(&mut self, seq: SequenceNumber) {
        self.reassembly_start_seq = None;
        self.reassembly_data_type = None;
        self.last_closed_seq = Some(seq);
    }

    /// True when `seq` is not ahead of the packet that closed the last unit.
    pub fn precedes_last_close(&self, seq: SequenceNumber) -> bool {
        self.last_closed_seq.is_some_and(|closed| {
            !(1..=SEQUENCE_FORWARD_WINDOW).contains(&seq.wrapping_sub(closed))
        })
    }

    /// Hands out the next synthetic sequence number for a TCP stream.
    pub fn next_tcp_seq(&mut self) -> SequenceNumber {
        let seq = self.next_tcp_seq;
        self.next_tcp_seq = seq + 1;
        seq
    }
}

/// A tracked bidirectional session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    pub transport: Transport,
    /// Source of the first packet; defines the `src` direction permanently.
    pub first_source: SocketAddr,
    pub created_in: FrameNumber,
    pub setup: Option<SetupInfo>,
    pub src_direction: DirectionState,
    pub dst_direction: DirectionState,
}

impl Conversation {
    fn new(
        transport: Transport,
        first_source: SocketAddr,
        created_in: FrameNumber,
        setup: Option<SetupInfo>,
    ) -> Self {
        Self {
            transport,
            first_source,
            created_in,
            setup,
            src_direction: DirectionState::default(),
            dst_direction: DirectionState::default(),
        }
    }

    /// State of the direction whose packets come from `src`.
    pub fn direction_mut(&mut self, src: SocketAddr) -> &mut DirectionState {
        if src == self.first_source {
            &mut self.src_direction
        } else {
            &mut self.dst_direction
        }
    }

    pub fn direction(&self, src: SocketAddr) -> &DirectionState {
        if src == self.first_source {
            &self.src_direction
        } else {
            &self.dst_direction
        }
    }

    /// Records the signalling provenance if none is set yet.
    ///
    /// # Returns
    /// `true` if the provenance was recorded, `false` if one was already set.
    pub fn record_setup(&mut self, method: SetupMethod, frame: FrameNumber) -> bool {
        if self.setup.is_some() {
            return false;
        }
        self.setup = Some(SetupInfo { method, frame });
        true
    }
}

/// Unordered endpoint pair plus transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ConversationKey {
    transport: Transport,
    low: SocketAddr,
    high: SocketAddr,
}

impl ConversationKey {
    fn new(transport: Transport, a: SocketAddr, b: SocketAddr) -> Self {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        Self {
            transport,
            low,
            high,
        }
    }
}

/// A stream announced by signalling but not yet seen on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StreamRegistration {
    transport: Transport,
    address: SocketAddr,
    /// Port of the far end, `None` for any.
    other_port: Option<u16>,
    setup: SetupInfo,
}

impl StreamRegistration {
    fn matches(&self, transport: Transport, a: SocketAddr, b: SocketAddr) -> bool {
        let one_way = |local: SocketAddr, remote: SocketAddr| {
            local == self.address && self.other_port.is_none_or(|port| port == remote.port())
        };
        self.transport == transport && (one_way(a, b) || one_way(b, a))
    }

    fn same_stream(&self, other: &StreamRegistration) -> bool {
        self.transport == other.transport
            && self.address == other.address
            && self.other_port == other.other_port
    }
}

/// Conversation table keyed by unordered endpoint pair.
#[derive(Debug, Default)]
pub struct ConversationTracker {
    conversations: HashMap<ConversationKey, Conversation>,
    registrations: Vec<StreamRegistration>,
}

impl ConversationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Finds the conversation between `src` and `dst`, creating it if absent.
    ///
    /// A new conversation takes over the provenance of a matching
    /// [`register_stream`](Self::register_stream) call and starts with both
    /// directions zeroed; `src` becomes its first source.
    ///
    /// # Parameters
    /// - `transport`: Transport of the packet.
    /// - `src`, `dst`: Endpoints of the packet.
    /// - `frame`: Frame creating the conversation, if it is created.
    ///
    /// # Returns
    /// The existing or newly created conversation.
    pub fn find_or_create(
        &mut self,
        transport: Transport,
        src: SocketAddr,
        dst: SocketAddr,
        frame: FrameNumber,
    ) -> &mut Conversation {
        let key = ConversationKey::new(transport, src, dst);
        if !self.conversations.contains_key(&key) {
            let setup = self
                .registrations
                .iter()
                .position(|reg| reg.matches(transport, src, dst))
                .map(|index| self.registrations.remove(index).setup);
            log::debug!(
                "New {:?} conversation {} <-> {} in frame {} (setup {:?})",
                transport,
                src,
                dst,
                frame,
                setup
            );
            self.conversations
                .insert(key, Conversation::new(transport, src, frame, setup));
        }
        self.conversations
            .entry(key)
            .or_insert_with(|| Conversation::new(transport, src, frame, None))
    }

    /// Looks up the conversation between `a` and `b` without creating it.
    pub fn get(&self, transport: Transport, a: SocketAddr, b: SocketAddr) -> Option<&Conversation> {
        self.conversations.get(&ConversationKey::new(transport, a, b))
    }

    /// Announces a stream before its packets arrive.
    ///
    /// Repeating a registration from the same setup frame is a no-op. A
    /// registration from a different setup frame starts a new session: any
    /// conversation already bound to the stream is dropped, and the next
    /// matching packet creates fresh state.
    ///
    /// # Parameters
    /// - `transport`: Transport the stream will use.
    /// - `address`: Announced endpoint address and port.
    /// - `other_port`: Port of the far end, `None` to accept any.
    /// - `method`: Signalling protocol that announced the stream.
    /// - `frame`: Frame carrying the announcement.
    pub fn register_stream(
        &mut self,
        transport: Transport,
        address: SocketAddr,
        other_port: Option<u16>,
        method: SetupMethod,
        frame: FrameNumber,
    ) {
        let registration = StreamRegistration {
            transport,
            address,
            other_port,
            setup: SetupInfo { method, frame },
        };

        let bound: Vec<ConversationKey> = self
            .conversations
            .iter()
            .filter(|(key, _)| registration.matches(key.transport, key.low, key.high))
            .map(|(key, _)| *key)
            .collect();
        for key in bound {
            let same_setup = self
                .conversations
                .get(&key)
                .and_then(|conversation| conversation.setup)
                .is_some_and(|setup| setup.frame == frame);
            if same_setup {
                return;
            }
            log::debug!(
                "Setup in frame {} replaces conversation {} <-> {}",
                frame,
                key.low,
                key.high
            );
            self.conversations.remove(&key);
        }

        match self
            .registrations
            .iter_mut()
            .find(|existing| existing.same_stream(&registration))
        {
            Some(existing) if existing.setup.frame == frame => {}
            Some(existing) => *existing = registration,
            None => self.registrations.push(registration),
        }
    }

    /// Number of bound conversations.
    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    /// Number of registrations not yet bound to a conversation.
    pub fn pending_registrations(&self) -> usize {
        self.registrations.len()
    }

    /// Drops all conversations and registrations.
    pub fn clear(&mut self) {
        self.conversations.clear();
        self.registrations.clear();
    }
}
