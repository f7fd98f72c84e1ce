//! UDPTL datagram serialization and deserialization.
//!
//! ```text
//! UDPTLPacket ::= SEQUENCE {
//!     seq-number          INTEGER (0..65535),
//!     primary-ifp-packet  TYPE-IDENTIFIER.&Type(IFPPacket),
//!     error-recovery      CHOICE {
//!         secondary-ifp-packets  SEQUENCE OF TYPE-IDENTIFIER.&Type(IFPPacket),
//!         fec-info               SEQUENCE {
//!             fec-npackets  INTEGER,
//!             fec-data      SEQUENCE OF OCTET STRING
//!         }
//!     }
//! }
//! ```

use bytes::Bytes;

use crate::constants::UDPTL_SEQ_NUMBER_LENGTH_BYTES;
use crate::encodings::{BitReader, BitWriter};
use crate::error::{BuildingError, Field, ParseContext, ParsingError};
use crate::protocol_types::{ErrorRecovery, IfpPacket, UdptlPacket};
use crate::serialization::ifp::{deserialize_ifp, ifp_encoded_len_upper_bound, serialize_ifp};
use crate::types::SequenceNumber;

/// Widest `fec-npackets` encoding accepted: a u32 plus a sign octet.
const FEC_NPACKETS_MAX_OCTETS: usize = 5;

fn read_open_type_ifp(
    reader: &mut BitReader<'_>,
    pre_corrigendum: bool,
    context: ParseContext,
) -> Result<IfpPacket, ParsingError> {
    let len = reader.read_length_determinant(context)?;
    let octets = reader.read_octets(len, context)?;
    deserialize_ifp(octets, pre_corrigendum)
}

fn read_fec_npackets(reader: &mut BitReader<'_>) -> Result<u32, ParsingError> {
    let context = ParseContext::FecInfo;
    let len = reader.read_length_determinant(context)?;
    if len == 0 || len > FEC_NPACKETS_MAX_OCTETS {
        return Err(ParsingError::InvalidFieldValue {
            field: Field::FecPackets,
            value: len as u32,
            context,
        });
    }
    let octets = reader.read_octets(len, context)?;
    let value = octets
        .iter()
        .fold(0u64, |acc, &octet| (acc << 8) | u64::from(octet));
    // Negative values and values past u32 are not meaningful packet counts.
    if octets[0] & 0x80 != 0 || value > u64::from(u32::MAX) {
        return Err(ParsingError::InvalidFieldValue {
            field: Field::FecPackets,
            value: u32::try_from(value).unwrap_or(u32::MAX),
            context,
        });
    }
    Ok(value as u32)
}

/// Minimal two's complement octets of a non-negative value.
fn fec_npackets_octets(value: u32) -> ([u8; FEC_NPACKETS_MAX_OCTETS], usize) {
    let wide = u64::from(value).to_be_bytes();
    let mut octets = [0u8; FEC_NPACKETS_MAX_OCTETS];
    octets.copy_from_slice(&wide[8 - FEC_NPACKETS_MAX_OCTETS..]);
    let mut start = 0;
    while start < FEC_NPACKETS_MAX_OCTETS - 1
        && octets[start] == 0
        && octets[start + 1] & 0x80 == 0
    {
        start += 1;
    }
    (octets, start)
}

/// Deserializes a UDPTL datagram.
///
/// A datagram that ends right after the primary IFP packet is accepted and
/// reported with an empty secondary list. Octets after the error recovery
/// section are ignored.
///
/// # Parameters
/// - `data`: UDP payload.
/// - `pre_corrigendum`: Decode IFP `field-type` without its extension bit.
///
/// # Returns
/// The decoded [`UdptlPacket`].
///
/// # Errors
/// - [`ParsingError::NotEnoughData`] - Truncated datagram
/// - [`ParsingError::InvalidFieldValue`] - Malformed enumeration or FEC count
/// - [`ParsingError::FragmentedLength`] - Open type in fragmented form
pub fn deserialize_udptl(data: &[u8], pre_corrigendum: bool) -> Result<UdptlPacket, ParsingError> {
    let mut reader = BitReader::new(data);
    let seq = SequenceNumber::new(reader.read_u16(ParseContext::UdptlHeader)?);
    let primary = read_open_type_ifp(&mut reader, pre_corrigendum, ParseContext::PrimaryIfp)?;

    if reader.remaining_bytes() == 0 {
        return Ok(UdptlPacket {
            seq,
            primary,
            error_recovery: ErrorRecovery::Secondary(Vec::new()),
        });
    }

    let error_recovery = if reader.read_bit(ParseContext::ErrorRecovery)? {
        let npackets = read_fec_npackets(&mut reader)?;
        let count = reader.read_length_determinant(ParseContext::FecInfo)?;
        let mut fec = Vec::with_capacity(count);
        for _ in 0..count {
            let len = reader.read_length_determinant(ParseContext::FecInfo)?;
            fec.push(Bytes::copy_from_slice(
                reader.read_octets(len, ParseContext::FecInfo)?,
            ));
        }
        ErrorRecovery::Fec {
            npackets,
            data: fec,
        }
    } else {
        let count = reader.read_length_determinant(ParseContext::SecondaryIfp)?;
        let mut secondary = Vec::with_capacity(count);
        for _ in 0..count {
            secondary.push(read_open_type_ifp(
                &mut reader,
                pre_corrigendum,
                ParseContext::SecondaryIfp,
            )?);
        }
        ErrorRecovery::Secondary(secondary)
    };

    Ok(UdptlPacket {
        seq,
        primary,
        error_recovery,
    })
}

fn write_open_type_ifp(
    writer: &mut BitWriter<'_>,
    packet: &IfpPacket,
    pre_corrigendum: bool,
    context: ParseContext,
) -> Result<(), BuildingError> {
    let mut scratch = vec![0u8; ifp_encoded_len_upper_bound(packet)];
    let len = serialize_ifp(packet, pre_corrigendum, &mut scratch)?;
    writer.write_length_determinant(len, Field::OpenTypeLength, context)?;
    writer.write_octets(&scratch[..len], context)
}

/// Serializes a UDPTL datagram into the provided buffer.
///
/// # Parameters
/// - `packet`: The datagram to encode.
/// - `pre_corrigendum`: Encode IFP `field-type` without its extension bit.
/// - `out`: Output buffer.
///
/// # Returns
/// The number of bytes written to `out`.
///
/// # Errors
/// - [`BuildingError::BufferTooSmall`] - `out` cannot hold the datagram
/// - [`BuildingError::InvalidFieldValueForBuild`] - A length or value does not
///   fit its encoding
pub fn serialize_udptl(
    packet: &UdptlPacket,
    pre_corrigendum: bool,
    out: &mut [u8],
) -> Result<usize, BuildingError> {
    if out.len() < UDPTL_SEQ_NUMBER_LENGTH_BYTES {
        return Err(BuildingError::BufferTooSmall {
            needed: UDPTL_SEQ_NUMBER_LENGTH_BYTES,
            available: out.len(),
            context: ParseContext::UdptlHeader,
        });
    }
    let mut writer = BitWriter::new(out);
    writer.write_octets(&packet.seq.to_be_bytes(), ParseContext::UdptlHeader)?;
    write_open_type_ifp(
        &mut writer,
        &packet.primary,
        pre_corrigendum,
        ParseContext::PrimaryIfp,
    )?;

    match &packet.error_recovery {
        ErrorRecovery::Secondary(secondary) => {
            writer.write_bit(false, ParseContext::ErrorRecovery)?;
            writer.write_length_determinant(
                secondary.len(),
                Field::SequenceOfCount,
                ParseContext::SecondaryIfp,
            )?;
            for ifp in secondary {
                write_open_type_ifp(&mut writer, ifp, pre_corrigendum, ParseContext::SecondaryIfp)?;
            }
        }
        ErrorRecovery::Fec { npackets, data } => {
            let context = ParseContext::FecInfo;
            writer.write_bit(true, ParseContext::ErrorRecovery)?;
            let (octets, start) = fec_npackets_octets(*npackets);
            writer.write_length_determinant(octets.len() - start, Field::FecPackets, context)?;
            writer.write_octets(&octets[start..], context)?;
            writer.write_length_determinant(data.len(), Field::SequenceOfCount, context)?;
            for entry in data {
                writer.write_length_determinant(entry.len(), Field::OpenTypeLength, context)?;
                writer.write_octets(entry, context)?;
            }
        }
    }

    writer.align();
    Ok(writer.bytes_written())
}
