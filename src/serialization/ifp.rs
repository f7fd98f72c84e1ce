//! IFP packet serialization and deserialization.
//!
//! IFPPacket ::= SEQUENCE { type-of-msg, data-field OPTIONAL } in aligned PER:
//! one presence bit, one CHOICE bit, the extensible enumeration of the chosen
//! alternative, then (octet aligned) the SEQUENCE OF data fields. Each data
//! field is a presence bit for `field-data`, the `field-type` enumeration and,
//! when present, a 16-bit `length - 1` followed by the octets.

use bytes::Bytes;

use crate::constants::{
    IFP_FIELD_DATA_MAX_LENGTH, IFP_FIELD_DATA_MIN_LENGTH, IFP_FIELD_TYPE_ROOT_BITS,
    IFP_T30_DATA_ROOT_BITS, IFP_T30_INDICATOR_ROOT_BITS,
};
use crate::encodings::{BitReader, BitWriter};
use crate::error::{BuildingError, Field, ParseContext, ParsingError};
use crate::protocol_types::{
    DataField, EnumIndex, FieldType, IfpPacket, MessageType, PerEnumerated, T30Data, T30Indicator,
};

/// Reads an extensible ENUMERATED value.
fn read_enumerated<T: PerEnumerated>(
    reader: &mut BitReader<'_>,
    root_bits: u8,
    field: Field,
    context: ParseContext,
) -> Result<T, ParsingError> {
    let index = if reader.read_bit(context)? {
        EnumIndex::Extension(reader.read_normally_small(context)?)
    } else {
        EnumIndex::Root(reader.read_bits(root_bits, context)?)
    };
    T::from_index(index).ok_or_else(|| {
        let value = match index {
            EnumIndex::Root(i) | EnumIndex::Extension(i) => i,
        };
        ParsingError::InvalidFieldValue {
            field,
            value,
            context,
        }
    })
}

/// Writes an extensible ENUMERATED value.
fn write_enumerated<T: PerEnumerated>(
    writer: &mut BitWriter<'_>,
    value: T,
    root_bits: u8,
    context: ParseContext,
) -> Result<(), BuildingError> {
    match value.index() {
        EnumIndex::Root(i) => {
            writer.write_bit(false, context)?;
            writer.write_bits(i, root_bits, context)
        }
        EnumIndex::Extension(i) => {
            writer.write_bit(true, context)?;
            writer.write_normally_small(i, context)
        }
    }
}

fn read_field_type(
    reader: &mut BitReader<'_>,
    pre_corrigendum: bool,
) -> Result<FieldType, ParsingError> {
    let context = ParseContext::IfpDataField;
    if pre_corrigendum {
        let raw = reader.read_bits(IFP_FIELD_TYPE_ROOT_BITS, context)?;
        return FieldType::from_index(EnumIndex::Root(raw)).ok_or(
            ParsingError::InvalidFieldValue {
                field: Field::FieldType,
                value: raw,
                context,
            },
        );
    }
    read_enumerated(reader, IFP_FIELD_TYPE_ROOT_BITS, Field::FieldType, context)
}

/// Decodes an IFP packet from a bit reader positioned at its first bit.
pub(crate) fn read_ifp(
    reader: &mut BitReader<'_>,
    pre_corrigendum: bool,
) -> Result<IfpPacket, ParsingError> {
    let has_data_field = reader.read_bit(ParseContext::IfpTypeOfMsg)?;
    let is_data = reader.read_bit(ParseContext::IfpTypeOfMsg)?;
    let message = if is_data {
        MessageType::Data(read_enumerated::<T30Data>(
            reader,
            IFP_T30_DATA_ROOT_BITS,
            Field::T30Data,
            ParseContext::IfpTypeOfMsg,
        )?)
    } else {
        MessageType::Indicator(read_enumerated::<T30Indicator>(
            reader,
            IFP_T30_INDICATOR_ROOT_BITS,
            Field::T30Indicator,
            ParseContext::IfpTypeOfMsg,
        )?)
    };

    let mut fields = Vec::new();
    if has_data_field {
        let count = reader.read_length_determinant(ParseContext::IfpDataField)?;
        fields.reserve(count);
        for _ in 0..count {
            let has_field_data = reader.read_bit(ParseContext::IfpDataField)?;
            let field_type = read_field_type(reader, pre_corrigendum)?;
            let data = if has_field_data {
                let len = usize::from(reader.read_u16(ParseContext::IfpFieldData)?)
                    + IFP_FIELD_DATA_MIN_LENGTH;
                let octets = reader.read_octets(len, ParseContext::IfpFieldData)?;
                Some(Bytes::copy_from_slice(octets))
            } else {
                None
            };
            fields.push(DataField { field_type, data });
        }
    }

    Ok(IfpPacket { message, fields })
}

/// Deserializes an IFP packet.
///
/// # Parameters
/// - `data`: The IFP encoding, e.g. the contents of a UDPTL open type.
/// - `pre_corrigendum`: Decode `field-type` without its extension bit.
///
/// # Returns
/// The decoded [`IfpPacket`]. Padding after the last field is ignored.
///
/// # Errors
/// - [`ParsingError::NotEnoughData`] - Truncated encoding
/// - [`ParsingError::InvalidFieldValue`] - Unknown enumeration value
/// - [`ParsingError::FragmentedLength`] - Data field count in fragmented form
pub fn deserialize_ifp(data: &[u8], pre_corrigendum: bool) -> Result<IfpPacket, ParsingError> {
    let mut reader = BitReader::new(data);
    read_ifp(&mut reader, pre_corrigendum)
}

/// Upper bound of the encoded size of `packet`, for sizing scratch buffers.
pub fn ifp_encoded_len_upper_bound(packet: &IfpPacket) -> usize {
    // Type octet plus room for an extension index, and a long count.
    let header = 2 + 2;
    packet.fields.iter().fold(header, |acc, field| {
        acc + 2 + 2 + field.data.as_ref().map_or(0, |data| data.len())
    })
}

/// Serializes an IFP packet into the provided buffer.
///
/// A data field whose `data` is `Some` but empty is written without
/// `field-data`, since the OCTET STRING has a minimum size of one.
///
/// # Parameters
/// - `packet`: The IFP packet to encode.
/// - `pre_corrigendum`: Encode `field-type` without its extension bit.
/// - `out`: Output buffer.
///
/// # Returns
/// The number of bytes written to `out`.
///
/// # Errors
/// - [`BuildingError::BufferTooSmall`] - `out` cannot hold the encoding
/// - [`BuildingError::InvalidFieldValueForBuild`] - Oversized field data, or an
///   extension field type in pre-corrigendum mode
pub fn serialize_ifp(
    packet: &IfpPacket,
    pre_corrigendum: bool,
    out: &mut [u8],
) -> Result<usize, BuildingError> {
    let mut writer = BitWriter::new(out);
    let context = ParseContext::IfpTypeOfMsg;
    writer.write_bit(!packet.fields.is_empty(), context)?;
    match packet.message {
        MessageType::Indicator(indicator) => {
            writer.write_bit(false, context)?;
            write_enumerated(&mut writer, indicator, IFP_T30_INDICATOR_ROOT_BITS, context)?;
        }
        MessageType::Data(modulation) => {
            writer.write_bit(true, context)?;
            write_enumerated(&mut writer, modulation, IFP_T30_DATA_ROOT_BITS, context)?;
        }
    }

    if !packet.fields.is_empty() {
        let context = ParseContext::IfpDataField;
        writer.write_length_determinant(packet.fields.len(), Field::SequenceOfCount, context)?;
        for field in &packet.fields {
            let data = field.data.as_ref().filter(|data| !data.is_empty());
            writer.write_bit(data.is_some(), context)?;
            if pre_corrigendum {
                match field.field_type.index() {
                    EnumIndex::Root(i) => {
                        writer.write_bits(i, IFP_FIELD_TYPE_ROOT_BITS, context)?
                    }
                    EnumIndex::Extension(i) => {
                        return Err(BuildingError::InvalidFieldValueForBuild {
                            field: Field::FieldType,
                            value: FieldType::ROOT.len() as u32 + i,
                            max: FieldType::ROOT.len() as u32 - 1,
                        });
                    }
                }
            } else {
                write_enumerated(&mut writer, field.field_type, IFP_FIELD_TYPE_ROOT_BITS, context)?;
            }
            if let Some(data) = data {
                if data.len() > IFP_FIELD_DATA_MAX_LENGTH {
                    return Err(BuildingError::InvalidFieldValueForBuild {
                        field: Field::FieldDataLength,
                        value: data.len() as u32,
                        max: IFP_FIELD_DATA_MAX_LENGTH as u32,
                    });
                }
                let encoded_len = (data.len() - IFP_FIELD_DATA_MIN_LENGTH) as u16;
                writer.write_octets(&encoded_len.to_be_bytes(), ParseContext::IfpFieldData)?;
                writer.write_octets(data, ParseContext::IfpFieldData)?;
            }
        }
    }

    writer.align();
    Ok(writer.bytes_written())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cng_indicator_is_single_octet() {
        let mut buf = [0u8; 8];
        let len = serialize_ifp(&IfpPacket::indicator(T30Indicator::Cng), false, &mut buf).unwrap();
        assert_eq!(&buf[..len], &[0x02]);
        assert_eq!(
            deserialize_ifp(&[0x02], false).unwrap(),
            IfpPacket::indicator(T30Indicator::Cng)
        );
    }

    #[test]
    fn decodes_known_hdlc_data_encoding() {
        // data-field present, t30-data v21, one hdlc-data field with 3 octets.
        let wire = [0xC0, 0x01, 0x80, 0x00, 0x02, 0xFF, 0x13, 0x80];
        let packet = deserialize_ifp(&wire, false).unwrap();
        assert_eq!(packet.message, MessageType::Data(T30Data::V21));
        assert_eq!(
            packet.fields,
            vec![DataField::with_data(
                FieldType::HdlcData,
                vec![0xFF, 0x13, 0x80]
            )]
        );
    }

    #[test]
    fn fcs_ok_without_data_depends_on_corrigendum() {
        let packet = IfpPacket::data(T30Data::V21, vec![DataField::new(FieldType::HdlcFcsOk)]);
        let mut buf = [0u8; 8];

        let len = serialize_ifp(&packet, false, &mut buf).unwrap();
        assert_eq!(&buf[..len], &[0xC0, 0x01, 0x10]);

        let len = serialize_ifp(&packet, true, &mut buf).unwrap();
        assert_eq!(&buf[..len], &[0xC0, 0x01, 0x20]);
        assert_eq!(deserialize_ifp(&buf[..len], true).unwrap(), packet);
    }

    #[test]
    fn fields_without_data_are_not_aligned() {
        let packet = IfpPacket::data(
            T30Data::V17_14400,
            vec![
                DataField::new(FieldType::HdlcFcsOk),
                DataField::new(FieldType::HdlcSigEnd),
            ],
        );
        let mut buf = [0u8; 8];
        let len = serialize_ifp(&packet, false, &mut buf).unwrap();
        // Two 5-bit elements fit in two octets after the count.
        assert_eq!(&buf[..len], &[0xD0, 0x02, 0x10, 0x40]);
        assert_eq!(deserialize_ifp(&buf[..len], false).unwrap(), packet);
    }

    #[test]
    fn extension_values_roundtrip() {
        let packet = IfpPacket::data(
            T30Data::V34PriRate,
            vec![DataField::with_data(FieldType::CiMessage, vec![0x01, 0x02])],
        );
        let mut buf = [0u8; 16];
        let len = serialize_ifp(&packet, false, &mut buf).unwrap();
        assert_eq!(deserialize_ifp(&buf[..len], false).unwrap(), packet);

        let indicator = IfpPacket::indicator(T30Indicator::V8Ansam);
        let len = serialize_ifp(&indicator, false, &mut buf).unwrap();
        assert_eq!(deserialize_ifp(&buf[..len], false).unwrap(), indicator);
    }

    #[test]
    fn pre_corrigendum_rejects_extension_field_types() {
        let packet = IfpPacket::data(T30Data::V21, vec![DataField::new(FieldType::V34Rate)]);
        let mut buf = [0u8; 8];
        assert!(matches!(
            serialize_ifp(&packet, true, &mut buf),
            Err(BuildingError::InvalidFieldValueForBuild {
                field: Field::FieldType,
                ..
            })
        ));
    }

    #[test]
    fn truncated_field_data_is_reported() {
        let wire = [0xC0, 0x01, 0x80, 0x00, 0x05, 0xFF];
        assert!(matches!(
            deserialize_ifp(&wire, false),
            Err(ParsingError::NotEnoughData {
                context: ParseContext::IfpFieldData,
                ..
            })
        ));
    }

    #[test]
    fn unknown_root_value_is_rejected() {
        // t30-data root index 15 does not exist.
        let wire = [0b0101_1110];
        assert_eq!(
            deserialize_ifp(&wire, false),
            Err(ParsingError::InvalidFieldValue {
                field: Field::T30Data,
                value: 15,
                context: ParseContext::IfpTypeOfMsg,
            })
        );
    }

    #[test]
    fn upper_bound_covers_encoding() {
        let packet = IfpPacket::data(
            T30Data::V29_9600,
            vec![
                DataField::with_data(FieldType::HdlcData, vec![0xAA; 200]),
                DataField::new(FieldType::HdlcFcsOk),
            ],
        );
        let mut buf = vec![0u8; ifp_encoded_len_upper_bound(&packet)];
        let len = serialize_ifp(&packet, false, &mut buf).unwrap();
        assert!(len <= buf.len());
    }
}
