//! Aligned PER (ITU-T X.691) primitives used by the UDPTL and IFP codecs.
//!
//! Only the subset T.38 needs is implemented: single bits, fixed-width
//! constrained integers, octet alignment, unconstrained length determinants
//! (short and long forms, no fragmentation) and normally-small non-negative
//! whole numbers for enumeration extensions.

use crate::constants::{
    PER_FRAGMENTED_LENGTH_FLAG, PER_LONG_LENGTH_FLAG, PER_LONG_LENGTH_LIMIT, PER_NSNNWN_BITS,
    PER_SHORT_LENGTH_LIMIT,
};
use crate::error::{BuildingError, Field, ParseContext, ParsingError};

/// Bit-level reader over an aligned-PER encoding.
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    bit_pos: usize,
}

impl<'a> BitReader<'a> {
    /// Creates a reader positioned at the first bit of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, bit_pos: 0 }
    }

    /// Octet position, rounded up to the next octet boundary.
    pub fn byte_position(&self) -> usize {
        self.bit_pos.div_ceil(8)
    }

    /// Number of whole octets left after aligning.
    pub fn remaining_bytes(&self) -> usize {
        self.data.len().saturating_sub(self.byte_position())
    }

    /// Reads one bit.
    ///
    /// # Errors
    /// - [`ParsingError::NotEnoughData`] - No bits left
    pub fn read_bit(&mut self, context: ParseContext) -> Result<bool, ParsingError> {
        let byte_index = self.bit_pos / 8;
        let byte = *self
            .data
            .get(byte_index)
            .ok_or(ParsingError::NotEnoughData {
                needed: byte_index + 1,
                got: self.data.len(),
                context,
            })?;
        let bit = (byte >> (7 - (self.bit_pos % 8))) & 0x01 == 1;
        self.bit_pos += 1;
        Ok(bit)
    }

    /// Reads `width` bits (at most 32) as a big-endian unsigned value.
    ///
    /// # Errors
    /// - [`ParsingError::NotEnoughData`] - Fewer than `width` bits left
    pub fn read_bits(&mut self, width: u8, context: ParseContext) -> Result<u32, ParsingError> {
        debug_assert!(width <= 32, "read_bits width {} exceeds 32", width);
        let mut value = 0u32;
        for _ in 0..width {
            value = (value << 1) | u32::from(self.read_bit(context)?);
        }
        Ok(value)
    }

    /// Skips to the next octet boundary.
    pub fn align(&mut self) {
        self.bit_pos = self.byte_position() * 8;
    }

    /// Aligns and returns the next `len` octets.
    ///
    /// # Errors
    /// - [`ParsingError::NotEnoughData`] - Fewer than `len` octets left
    pub fn read_octets(
        &mut self,
        len: usize,
        context: ParseContext,
    ) -> Result<&'a [u8], ParsingError> {
        self.align();
        let start = self.bit_pos / 8;
        let end = start + len;
        if end > self.data.len() {
            return Err(ParsingError::NotEnoughData {
                needed: end,
                got: self.data.len(),
                context,
            });
        }
        self.bit_pos = end * 8;
        Ok(&self.data[start..end])
    }

    /// Aligns and reads a 16-bit big-endian value.
    ///
    /// # Errors
    /// - [`ParsingError::NotEnoughData`] - Fewer than two octets left
    pub fn read_u16(&mut self, context: ParseContext) -> Result<u16, ParsingError> {
        let octets = self.read_octets(2, context)?;
        Ok(u16::from_be_bytes([octets[0], octets[1]]))
    }

    /// Aligns and reads an unconstrained length determinant.
    ///
    /// # Errors
    /// - [`ParsingError::NotEnoughData`] - Truncated determinant
    /// - [`ParsingError::FragmentedLength`] - Fragmented form (16K and above)
    pub fn read_length_determinant(
        &mut self,
        context: ParseContext,
    ) -> Result<usize, ParsingError> {
        let first = self.read_octets(1, context)?[0];
        if first & PER_LONG_LENGTH_FLAG == 0 {
            return Ok(usize::from(first));
        }
        if first & PER_FRAGMENTED_LENGTH_FLAG == PER_FRAGMENTED_LENGTH_FLAG {
            return Err(ParsingError::FragmentedLength { context });
        }
        let second = self.read_octets(1, context)?[0];
        Ok((usize::from(first & !PER_LONG_LENGTH_FLAG) << 8) | usize::from(second))
    }

    /// Reads a normally-small non-negative whole number.
    ///
    /// # Errors
    /// - [`ParsingError::NotEnoughData`] - Truncated encoding
    /// - [`ParsingError::InvalidFieldValue`] - Long form wider than 32 bits
    pub fn read_normally_small(&mut self, context: ParseContext) -> Result<u32, ParsingError> {
        if !self.read_bit(context)? {
            return self.read_bits(PER_NSNNWN_BITS, context);
        }
        let len = self.read_length_determinant(context)?;
        if len > 4 {
            return Err(ParsingError::InvalidFieldValue {
                field: Field::ExtensionIndex,
                value: len as u32,
                context,
            });
        }
        let octets = self.read_octets(len, context)?;
        Ok(octets
            .iter()
            .fold(0u32, |acc, &octet| (acc << 8) | u32::from(octet)))
    }
}

/// Bit-level writer producing an aligned-PER encoding into a caller buffer.
#[derive(Debug)]
pub struct BitWriter<'a> {
    out: &'a mut [u8],
    bit_pos: usize,
}

impl<'a> BitWriter<'a> {
    /// Creates a writer positioned at the start of `out`.
    pub fn new(out: &'a mut [u8]) -> Self {
        Self { out, bit_pos: 0 }
    }

    /// Number of octets written so far, counting a partial trailing octet.
    pub fn bytes_written(&self) -> usize {
        self.bit_pos.div_ceil(8)
    }

    fn ensure_capacity(&self, bits: usize, context: ParseContext) -> Result<(), BuildingError> {
        let needed = (self.bit_pos + bits).div_ceil(8);
        if needed > self.out.len() {
            return Err(BuildingError::BufferTooSmall {
                needed,
                available: self.out.len(),
                context,
            });
        }
        Ok(())
    }

    /// Writes one bit.
    ///
    /// # Errors
    /// - [`BuildingError::BufferTooSmall`] - Output buffer full
    pub fn write_bit(&mut self, bit: bool, context: ParseContext) -> Result<(), BuildingError> {
        self.ensure_capacity(1, context)?;
        let byte_index = self.bit_pos / 8;
        let shift = 7 - (self.bit_pos % 8);
        if shift == 7 {
            self.out[byte_index] = 0;
        }
        if bit {
            self.out[byte_index] |= 1 << shift;
        }
        self.bit_pos += 1;
        Ok(())
    }

    /// Writes the low `width` bits of `value`, most significant first.
    ///
    /// # Errors
    /// - [`BuildingError::BufferTooSmall`] - Output buffer full
    pub fn write_bits(
        &mut self,
        value: u32,
        width: u8,
        context: ParseContext,
    ) -> Result<(), BuildingError> {
        debug_assert!(width <= 32, "write_bits width {} exceeds 32", width);
        self.ensure_capacity(usize::from(width), context)?;
        for i in (0..width).rev() {
            self.write_bit((value >> i) & 0x01 == 1, context)?;
        }
        Ok(())
    }

    /// Pads with zero bits up to the next octet boundary.
    pub fn align(&mut self) {
        self.bit_pos = self.bytes_written() * 8;
    }

    /// Aligns and copies `octets` into the output.
    ///
    /// # Errors
    /// - [`BuildingError::BufferTooSmall`] - Output buffer full
    pub fn write_octets(
        &mut self,
        octets: &[u8],
        context: ParseContext,
    ) -> Result<(), BuildingError> {
        self.align();
        self.ensure_capacity(octets.len() * 8, context)?;
        let start = self.bit_pos / 8;
        self.out[start..start + octets.len()].copy_from_slice(octets);
        self.bit_pos += octets.len() * 8;
        Ok(())
    }

    /// Aligns and writes an unconstrained length determinant.
    ///
    /// # Errors
    /// - [`BuildingError::InvalidFieldValueForBuild`] - `len` needs the fragmented form
    /// - [`BuildingError::BufferTooSmall`] - Output buffer full
    pub fn write_length_determinant(
        &mut self,
        len: usize,
        field: Field,
        context: ParseContext,
    ) -> Result<(), BuildingError> {
        if len < PER_SHORT_LENGTH_LIMIT {
            return self.write_octets(&[len as u8], context);
        }
        if len >= PER_LONG_LENGTH_LIMIT {
            return Err(BuildingError::InvalidFieldValueForBuild {
                field,
                value: len as u32,
                max: (PER_LONG_LENGTH_LIMIT - 1) as u32,
            });
        }
        let encoded = (len as u16) | (u16::from(PER_LONG_LENGTH_FLAG) << 8);
        self.write_octets(&encoded.to_be_bytes(), context)
    }

    /// Writes a normally-small non-negative whole number below 64.
    ///
    /// # Errors
    /// - [`BuildingError::InvalidFieldValueForBuild`] - `value` needs the long form
    /// - [`BuildingError::BufferTooSmall`] - Output buffer full
    pub fn write_normally_small(
        &mut self,
        value: u32,
        context: ParseContext,
    ) -> Result<(), BuildingError> {
        let max = (1u32 << PER_NSNNWN_BITS) - 1;
        if value > max {
            return Err(BuildingError::InvalidFieldValueForBuild {
                field: Field::ExtensionIndex,
                value,
                max,
            });
        }
        self.write_bit(false, context)?;
        self.write_bits(value, PER_NSNNWN_BITS, context)
    }
}
