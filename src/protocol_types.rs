//! T.38 IFP and UDPTL message types.
//!
//! The enumerations mirror the ASN.1 of ITU-T T.38: each has a root list and
//! an extension list, which is how aligned PER distinguishes them on the wire.
//! [`FieldRole`] classifies a `field-type` for the dispatch layer so that the
//! decision "append data", "close the unit" or "ignore" is a single exhaustive
//! match.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::types::SequenceNumber;

/// Position of an enumerated value in its ASN.1 type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumIndex {
    /// Index into the root list.
    Root(u32),
    /// Index into the extension additions.
    Extension(u32),
}

/// An ASN.1 ENUMERATED type with an extension marker.
pub trait PerEnumerated: Sized + Copy + PartialEq + 'static {
    /// Values of the root, in ASN.1 order.
    const ROOT: &'static [Self];
    /// Extension additions, in ASN.1 order.
    const EXTENSIONS: &'static [Self];

    /// Looks up a value from its encoded index.
    fn from_index(index: EnumIndex) -> Option<Self> {
        match index {
            EnumIndex::Root(i) => Self::ROOT.get(i as usize).copied(),
            EnumIndex::Extension(i) => Self::EXTENSIONS.get(i as usize).copied(),
        }
    }

    /// Returns the encoded index of this value.
    fn index(self) -> EnumIndex {
        if let Some(i) = Self::ROOT.iter().position(|v| *v == self) {
            return EnumIndex::Root(i as u32);
        }
        let i = Self::EXTENSIONS
            .iter()
            .position(|v| *v == self)
            .unwrap_or_default();
        EnumIndex::Extension(i as u32)
    }
}

/// `T30-indicator`: tones and training signals without payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum T30Indicator {
    NoSignal,
    Cng,
    Ced,
    V21Preamble,
    V27_2400Training,
    V27_4800Training,
    V29_7200Training,
    V29_9600Training,
    V17_7200ShortTraining,
    V17_7200LongTraining,
    V17_9600ShortTraining,
    V17_9600LongTraining,
    V17_12000ShortTraining,
    V17_12000LongTraining,
    V17_14400ShortTraining,
    V17_14400LongTraining,
    V8Ansam,
    V8Signal,
    V34CntlChannel1200,
    V34PriChannel,
    V34CcRetrain,
    V33_12000Training,
    V33_14400Training,
}

impl PerEnumerated for T30Indicator {
    const ROOT: &'static [Self] = &[
        Self::NoSignal,
        Self::Cng,
        Self::Ced,
        Self::V21Preamble,
        Self::V27_2400Training,
        Self::V27_4800Training,
        Self::V29_7200Training,
        Self::V29_9600Training,
        Self::V17_7200ShortTraining,
        Self::V17_7200LongTraining,
        Self::V17_9600ShortTraining,
        Self::V17_9600LongTraining,
        Self::V17_12000ShortTraining,
        Self::V17_12000LongTraining,
        Self::V17_14400ShortTraining,
        Self::V17_14400LongTraining,
    ];
    const EXTENSIONS: &'static [Self] = &[
        Self::V8Ansam,
        Self::V8Signal,
        Self::V34CntlChannel1200,
        Self::V34PriChannel,
        Self::V34CcRetrain,
        Self::V33_12000Training,
        Self::V33_14400Training,
    ];
}

/// `t30-data`: the modulation carrying the payload of a data message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum T30Data {
    V21,
    V27_2400,
    V27_4800,
    V29_7200,
    V29_9600,
    V17_7200,
    V17_9600,
    V17_12000,
    V17_14400,
    V8,
    V34PriRate,
    V34Cc1200,
    V34PriCh,
    V33_12000,
    V33_14400,
}

impl PerEnumerated for T30Data {
    const ROOT: &'static [Self] = &[
        Self::V21,
        Self::V27_2400,
        Self::V27_4800,
        Self::V29_7200,
        Self::V29_9600,
        Self::V17_7200,
        Self::V17_9600,
        Self::V17_12000,
        Self::V17_14400,
    ];
    const EXTENSIONS: &'static [Self] = &[
        Self::V8,
        Self::V34PriRate,
        Self::V34Cc1200,
        Self::V34PriCh,
        Self::V33_12000,
        Self::V33_14400,
    ];
}

/// `field-type` of one element of an IFP `data-field`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    HdlcData,
    HdlcSigEnd,
    HdlcFcsOk,
    HdlcFcsBad,
    HdlcFcsOkSigEnd,
    HdlcFcsBadSigEnd,
    T4NonEcmData,
    T4NonEcmSigEnd,
    CmMessage,
    JmMessage,
    CiMessage,
    V34Rate,
}

impl PerEnumerated for FieldType {
    const ROOT: &'static [Self] = &[
        Self::HdlcData,
        Self::HdlcSigEnd,
        Self::HdlcFcsOk,
        Self::HdlcFcsBad,
        Self::HdlcFcsOkSigEnd,
        Self::HdlcFcsBadSigEnd,
        Self::T4NonEcmData,
        Self::T4NonEcmSigEnd,
    ];
    const EXTENSIONS: &'static [Self] = &[
        Self::CmMessage,
        Self::JmMessage,
        Self::CiMessage,
        Self::V34Rate,
    ];
}

/// Kind of higher-layer payload being reassembled.
///
/// A change of kind within one direction closes the current unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// HDLC frames (T.30 control and ECM image data).
    Hdlc,
    /// Non-ECM T.4 image data.
    T4NonEcm,
}

/// Frame check status signalled by the terminal field of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FrameCheck {
    /// `hdlc-fcs-OK` or `hdlc-fcs-OK-sig-end`.
    Ok,
    /// `hdlc-fcs-BAD` or `hdlc-fcs-BAD-sig-end`.
    Bad,
    /// The signal ended without an FCS indication.
    Unchecked,
}

/// What the dispatch layer does with a data field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRole {
    /// Payload appended to the current unit.
    Data(DataType),
    /// Closes the current unit and triggers reassembly.
    Terminal(DataType, FrameCheck),
    /// Signalling that takes no part in reassembly.
    Control,
}

impl FieldType {
    /// Classifies this field type for reassembly.
    pub fn role(self) -> FieldRole {
        match self {
            Self::HdlcData => FieldRole::Data(DataType::Hdlc),
            Self::T4NonEcmData => FieldRole::Data(DataType::T4NonEcm),
            Self::HdlcFcsOk | Self::HdlcFcsOkSigEnd => {
                FieldRole::Terminal(DataType::Hdlc, FrameCheck::Ok)
            }
            Self::HdlcFcsBad | Self::HdlcFcsBadSigEnd => {
                FieldRole::Terminal(DataType::Hdlc, FrameCheck::Bad)
            }
            Self::HdlcSigEnd => FieldRole::Terminal(DataType::Hdlc, FrameCheck::Unchecked),
            Self::T4NonEcmSigEnd => FieldRole::Terminal(DataType::T4NonEcm, FrameCheck::Unchecked),
            Self::CmMessage | Self::JmMessage | Self::CiMessage | Self::V34Rate => {
                FieldRole::Control
            }
        }
    }
}

/// `type-of-msg` of an IFP packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    Indicator(T30Indicator),
    Data(T30Data),
}

/// One element of an IFP `data-field`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataField {
    pub field_type: FieldType,
    pub data: Option<Bytes>,
}

impl DataField {
    /// A field without `field-data`.
    pub fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            data: None,
        }
    }

    /// A field carrying `data`.
    pub fn with_data(field_type: FieldType, data: impl Into<Bytes>) -> Self {
        Self {
            field_type,
            data: Some(data.into()),
        }
    }
}

/// A decoded IFP packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IfpPacket {
    pub message: MessageType,
    pub fields: Vec<DataField>,
}

impl IfpPacket {
    /// An indicator packet.
    pub fn indicator(indicator: T30Indicator) -> Self {
        Self {
            message: MessageType::Indicator(indicator),
            fields: Vec::new(),
        }
    }

    /// A data packet with the given fields.
    pub fn data(modulation: T30Data, fields: Vec<DataField>) -> Self {
        Self {
            message: MessageType::Data(modulation),
            fields,
        }
    }
}

/// UDPTL `error-recovery` choice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorRecovery {
    /// Redundant copies of earlier primary IFP packets, newest first.
    Secondary(Vec<IfpPacket>),
    /// Forward error correction data.
    Fec { npackets: u32, data: Vec<Bytes> },
}

/// A decoded UDPTL datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdptlPacket {
    pub seq: SequenceNumber,
    pub primary: IfpPacket,
    pub error_recovery: ErrorRecovery,
}

impl UdptlPacket {
    /// Number of redundant IFP packets carried for error recovery.
    pub fn secondary_count(&self) -> usize {
        match &self.error_recovery {
            ErrorRecovery::Secondary(packets) => packets.len(),
            ErrorRecovery::Fec { .. } => 0,
        }
    }
}
