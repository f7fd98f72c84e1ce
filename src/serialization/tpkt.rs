//! TPKT (RFC 1006) framing for IFP packets carried over TCP.
//!
//! Header layout: version (3), reserved (0), and a 16-bit big-endian length
//! that includes the four header octets.

use crate::config::TpktUsage;
use crate::constants::{TPKT_HEADER_LENGTH_BYTES, TPKT_VERSION};
use crate::error::{BuildingError, Field, ParseContext, ParsingError};

fn looks_like_tpkt(data: &[u8]) -> bool {
    data.len() >= TPKT_HEADER_LENGTH_BYTES && data[0] == TPKT_VERSION && data[1] == 0
}

/// Removes the TPKT header from the front of a TCP segment.
///
/// # Parameters
/// - `data`: Segment payload starting at a PDU boundary.
/// - `usage`: Whether a header is required, absent, or optional.
///
/// # Returns
/// The IFP octets and the number of octets of `data` the PDU occupies.
/// Without a header the whole segment is one PDU.
///
/// # Errors
/// - [`ParsingError::NotEnoughData`] - Header or announced length exceeds `data`
/// - [`ParsingError::InvalidFieldValue`] - Bad version, or length below the header size
pub fn strip_tpkt(data: &[u8], usage: TpktUsage) -> Result<(&[u8], usize), ParsingError> {
    let context = ParseContext::TpktHeader;
    match usage {
        TpktUsage::Never => return Ok((data, data.len())),
        TpktUsage::Maybe if !looks_like_tpkt(data) => return Ok((data, data.len())),
        TpktUsage::Always | TpktUsage::Maybe => {}
    }

    if data.len() < TPKT_HEADER_LENGTH_BYTES {
        return Err(ParsingError::NotEnoughData {
            needed: TPKT_HEADER_LENGTH_BYTES,
            got: data.len(),
            context,
        });
    }
    if data[0] != TPKT_VERSION {
        return Err(ParsingError::InvalidFieldValue {
            field: Field::TpktVersion,
            value: u32::from(data[0]),
            context,
        });
    }
    let length = usize::from(u16::from_be_bytes([data[2], data[3]]));
    if length < TPKT_HEADER_LENGTH_BYTES {
        return Err(ParsingError::InvalidFieldValue {
            field: Field::TpktLength,
            value: length as u32,
            context,
        });
    }
    if length > data.len() {
        return Err(ParsingError::NotEnoughData {
            needed: length,
            got: data.len(),
            context,
        });
    }
    Ok((&data[TPKT_HEADER_LENGTH_BYTES..length], length))
}

/// Writes `payload` behind a TPKT header.
///
/// # Errors
/// - [`BuildingError::InvalidFieldValueForBuild`] - PDU longer than 65535 octets
/// - [`BuildingError::BufferTooSmall`] - `out` cannot hold header and payload
pub fn serialize_tpkt(payload: &[u8], out: &mut [u8]) -> Result<usize, BuildingError> {
    let total = payload.len() + TPKT_HEADER_LENGTH_BYTES;
    let length = u16::try_from(total).map_err(|_| BuildingError::InvalidFieldValueForBuild {
        field: Field::TpktLength,
        value: total as u32,
        max: u32::from(u16::MAX),
    })?;
    if out.len() < total {
        return Err(BuildingError::BufferTooSmall {
            needed: total,
            available: out.len(),
            context: ParseContext::TpktHeader,
        });
    }
    let [hi, lo] = length.to_be_bytes();
    out[..TPKT_HEADER_LENGTH_BYTES].copy_from_slice(&[TPKT_VERSION, 0, hi, lo]);
    out[TPKT_HEADER_LENGTH_BYTES..total].copy_from_slice(payload);
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_passes_segment_through() {
        let data = [0x03, 0x00, 0x00, 0x05, 0x02];
        assert_eq!(strip_tpkt(&data, TpktUsage::Never).unwrap(), (&data[..], 5));
    }

    #[test]
    fn always_strips_header() {
        let data = [0x03, 0x00, 0x00, 0x05, 0x02, 0xAA];
        let (ifp, consumed) = strip_tpkt(&data, TpktUsage::Always).unwrap();
        assert_eq!(ifp, &[0x02]);
        assert_eq!(consumed, 5);
    }

    #[test]
    fn maybe_detects_header() {
        let framed = [0x03, 0x00, 0x00, 0x05, 0x02];
        assert_eq!(strip_tpkt(&framed, TpktUsage::Maybe).unwrap().0, &[0x02]);

        let bare = [0x02];
        assert_eq!(strip_tpkt(&bare, TpktUsage::Maybe).unwrap(), (&bare[..], 1));
    }

    #[test]
    fn always_rejects_bad_headers() {
        assert!(matches!(
            strip_tpkt(&[0x02, 0x00, 0x00, 0x05, 0x02], TpktUsage::Always),
            Err(ParsingError::InvalidFieldValue {
                field: Field::TpktVersion,
                ..
            })
        ));
        assert!(matches!(
            strip_tpkt(&[0x03, 0x00, 0x00, 0x02], TpktUsage::Always),
            Err(ParsingError::InvalidFieldValue {
                field: Field::TpktLength,
                ..
            })
        ));
        assert!(matches!(
            strip_tpkt(&[0x03, 0x00, 0x00, 0x09, 0x02], TpktUsage::Always),
            Err(ParsingError::NotEnoughData { needed: 9, .. })
        ));
        assert!(matches!(
            strip_tpkt(&[0x03, 0x00], TpktUsage::Always),
            Err(ParsingError::NotEnoughData { .. })
        ));
    }

    #[test]
    fn serialize_writes_header() {
        let mut buf = [0u8; 8];
        let len = serialize_tpkt(&[0x02, 0x10], &mut buf).unwrap();
        assert_eq!(&buf[..len], &[0x03, 0x00, 0x00, 0x06, 0x02, 0x10]);

        let mut small = [0u8; 4];
        assert!(serialize_tpkt(&[0x02], &mut small).is_err());
    }
}
