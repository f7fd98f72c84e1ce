//! `t38star`: a loss-tolerant T.38 fax-over-IP reassembly engine.
//!
//! UDPTL datagrams arrive out of order, duplicated or not at all. This library
//! correlates them per conversation and direction, stitches the HDLC and
//! T.4 payload they carry back into units in sequence order and reports the
//! packet and burst loss of each unit. The entry point is the
//! [`ReassemblyContext`].
//!
//! ## Core Concepts
//!
//! - **[`ReassemblyContext`]**: owns all state of one analysis session and
//!   processes packets one at a time, in capture order.
//! - **Fragments**: each data-carrying packet contributes one fragment to the
//!   active unit of its direction, at an offset derived from its sequence number.
//!   Managed by the [`FragmentStore`].
//! - **Units**: a terminal field (`hdlc-fcs-OK`, `t4-non-ecm-sig-end`, ...)
//!   triggers the [`Reassembler`], which merges the fragments into a
//!   [`ReassembledUnit`] exactly once.
//! - **Conversations**: per endpoint pair, two [`DirectionState`]s plus the
//!   signalling provenance, held by the [`ConversationTracker`].
//!
//! ## Quick Start
//!
//! ```rust
//! use t38star::protocol_types::{DataField, ErrorRecovery, FieldType, IfpPacket, T30Data, UdptlPacket};
//! use t38star::serialization::serialize_udptl;
//! use t38star::{FrameNumber, PacketInfo, ReassemblyConfig, ReassemblyContext, SequenceNumber};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut context = ReassemblyContext::new(ReassemblyConfig::default());
//!     let gateway = "192.0.2.1:6000".parse()?;
//!     let terminal = "192.0.2.2:6002".parse()?;
//!
//!     let chunks: [&[u8]; 3] = [b"fax", b"-da", b"ta!"];
//!     let mut unit = None;
//!     for (i, chunk) in chunks.iter().enumerate() {
//!         let mut fields = vec![DataField::with_data(FieldType::HdlcData, chunk.to_vec())];
//!         if i == chunks.len() - 1 {
//!             fields.push(DataField::new(FieldType::HdlcFcsOk));
//!         }
//!         let packet = UdptlPacket {
//!             seq: SequenceNumber::new(100 + i as u16),
//!             primary: IfpPacket::data(T30Data::V21, fields),
//!             error_recovery: ErrorRecovery::Secondary(Vec::new()),
//!         };
//!         let mut buf = [0u8; 64];
//!         let len = serialize_udptl(&packet, false, &mut buf)?;
//!
//!         let info = PacketInfo::udp(FrameNumber::new(i as u32 + 1), gateway, terminal);
//!         let result = context.process_packet(&info, &buf[..len])?;
//!         unit = unit.or(result.reassembled);
//!     }
//!
//!     let unit = unit.expect("terminal field completes the unit");
//!     assert_eq!(&unit.data[..], b"fax-data!");
//!     assert_eq!(unit.loss.packet_lost, 0);
//!     assert!(unit.complete);
//!     Ok(())
//! }
//! ```
//!
//! ## Wire Formats
//!
//! The built-in [`PerFieldDecoder`] decodes aligned-PER UDPTL and IFP (ITU-T
//! T.38), with or without the corrigendum extension bit on `field-type`, and
//! optional TPKT framing on TCP. Other decoders plug in through
//! [`FieldDecoder`].

pub mod annotations;
pub mod config;
pub mod constants;
pub mod conversation;
pub mod crc;
pub mod dispatch;
pub mod encodings;
pub mod error;
pub mod fragment_store;
pub mod protocol_types;
pub mod reassembler;
pub mod serialization;
pub mod traits;
pub mod types;

pub use config::{ReassemblyConfig, TpktUsage};
pub use conversation::{
    Conversation, ConversationTracker, DirectionState, SetupInfo, SetupMethod, Transport,
};
pub use dispatch::{DissectionResult, FieldSummary, PacketInfo, ReassemblyContext, SequenceStatus};
pub use error::{BuildingError, Field, ParseContext, ParsingError, T38Error};
pub use fragment_store::{Fragment, FragmentFlags, FragmentKey, FragmentList, FragmentStore};
pub use reassembler::{LossStats, OverlapStatus, ReassembledUnit, Reassembler, compute_loss};
pub use traits::{FieldDecoder, PerFieldDecoder};
pub use types::{FrameNumber, SequenceNumber, UnitId};
pub mod fuzz_harnesses;
