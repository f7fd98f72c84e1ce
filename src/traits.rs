//! Behavioral traits at the seam between wire decoding and reassembly.
//!
//! The dispatch layer only needs decoded UDPTL and IFP packets. Decoding goes
//! through [`FieldDecoder`] so that callers can plug in an alternative ASN.1
//! implementation, or a canned decoder in tests.

use std::fmt::Debug;

use crate::error::ParsingError;
use crate::protocol_types::{IfpPacket, UdptlPacket};
use crate::serialization::{deserialize_ifp, deserialize_udptl};

/// Decodes T.38 PDUs into their field-level representation.
pub trait FieldDecoder: Send + Sync + Debug {
    /// Decodes a UDPTL datagram (the UDP payload).
    ///
    /// # Errors
    /// - [`ParsingError`] - The datagram is truncated or malformed
    fn decode_udptl(&self, data: &[u8]) -> Result<UdptlPacket, ParsingError>;

    /// Decodes a bare IFP packet, as carried over TCP.
    ///
    /// # Errors
    /// - [`ParsingError`] - The packet is truncated or malformed
    fn decode_ifp(&self, data: &[u8]) -> Result<IfpPacket, ParsingError>;
}

/// Aligned-PER decoder for the T.38 ASN.1.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PerFieldDecoder {
    /// Decode `field-type` without the corrigendum extension bit.
    pub pre_corrigendum: bool,
}

impl PerFieldDecoder {
    pub fn new(pre_corrigendum: bool) -> Self {
        Self { pre_corrigendum }
    }
}

impl FieldDecoder for PerFieldDecoder {
    fn decode_udptl(&self, data: &[u8]) -> Result<UdptlPacket, ParsingError> {
        deserialize_udptl(data, self.pre_corrigendum)
    }

    fn decode_ifp(&self, data: &[u8]) -> Result<IfpPacket, ParsingError> {
        deserialize_ifp(data, self.pre_corrigendum)
    }
}
