//! T.38 error types.
//!
//! Reassembly never fails: overlaps, conflicts, missing fragment lists and
//! replays are reported as values. The errors in this module cover the wire
//! codec, which can meet truncated or malformed UDPTL/IFP encodings, and the
//! serializer used to build packets. The `thiserror` crate is used for
//! ergonomic error definitions.

use std::fmt;

use thiserror::Error;

/// Location inside a packet where a parsing or building step failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseContext {
    UdptlHeader,
    PrimaryIfp,
    ErrorRecovery,
    SecondaryIfp,
    FecInfo,
    IfpTypeOfMsg,
    IfpDataField,
    IfpFieldData,
    LengthDeterminant,
    TpktHeader,
}

impl fmt::Display for ParseContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::UdptlHeader => "UDPTL header",
            Self::PrimaryIfp => "primary IFP packet",
            Self::ErrorRecovery => "UDPTL error recovery",
            Self::SecondaryIfp => "secondary IFP packet",
            Self::FecInfo => "FEC info",
            Self::IfpTypeOfMsg => "IFP type-of-msg",
            Self::IfpDataField => "IFP data-field",
            Self::IfpFieldData => "IFP field-data",
            Self::LengthDeterminant => "PER length determinant",
            Self::TpktHeader => "TPKT header",
        };
        f.write_str(name)
    }
}

/// Named wire field, used in error reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    SeqNumber,
    T30Indicator,
    T30Data,
    FieldType,
    FieldDataLength,
    OpenTypeLength,
    SequenceOfCount,
    ExtensionIndex,
    FecPackets,
    TpktVersion,
    TpktLength,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::SeqNumber => "seq-number",
            Self::T30Indicator => "t30-indicator",
            Self::T30Data => "t30-data",
            Self::FieldType => "field-type",
            Self::FieldDataLength => "field-data length",
            Self::OpenTypeLength => "open type length",
            Self::SequenceOfCount => "sequence-of count",
            Self::ExtensionIndex => "extension index",
            Self::FecPackets => "fec-npackets",
            Self::TpktVersion => "TPKT version",
            Self::TpktLength => "TPKT length",
        };
        f.write_str(name)
    }
}

/// Errors that can occur while decoding UDPTL, IFP or TPKT encodings.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParsingError {
    /// Insufficient data to parse a complete field or structure.
    #[error("Incomplete packet data: needed {needed} bytes, got {got} for {context}")]
    NotEnoughData {
        needed: usize,
        got: usize,
        context: ParseContext,
    },

    /// An enumerated or constrained field held a value outside its range.
    #[error("Invalid value {value} for {field} in {context}")]
    InvalidFieldValue {
        field: Field,
        value: u32,
        context: ParseContext,
    },

    /// A PER length determinant used the fragmented (>= 16K) form.
    #[error("Unsupported fragmented length determinant in {context}")]
    FragmentedLength { context: ParseContext },
}

/// Errors that can occur while serializing UDPTL, IFP or TPKT encodings.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildingError {
    /// Provided buffer was too small for the packet being built.
    #[error("Buffer too small: needed {needed} bytes, have {available} for {context}")]
    BufferTooSmall {
        needed: usize,
        available: usize,
        context: ParseContext,
    },

    /// A value does not fit the field's encoding.
    #[error("Value {value} for {field} exceeds maximum {max}")]
    InvalidFieldValueForBuild { field: Field, value: u32, max: u32 },
}

/// Main error type for the crate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum T38Error {
    /// Error during packet decoding.
    #[error("Parsing error: {0}")]
    Parsing(#[from] ParsingError),

    /// Error during packet building.
    #[error("Building error: {0}")]
    Building(#[from] BuildingError),
}
