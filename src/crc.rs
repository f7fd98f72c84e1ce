//! HDLC frame check sequence (FCS) calculation.
//!
//! T.38 gateways strip the HDLC FCS from T.30 frames and only signal
//! `hdlc-fcs-OK` or `hdlc-fcs-BAD`. A reassembled HDLC unit therefore carries
//! no FCS; this module recomputes it with the CRC-16/IBM-SDLC (ITU-T X.25)
//! algorithm from the `crc` crate so complete on-the-wire frames can be handed
//! to a T.30 decoder.

use crc::{CRC_16_IBM_SDLC, Crc};
use std::fmt;

/// Length of the HDLC FCS in bytes.
pub const HDLC_FCS_LENGTH_BYTES: usize = 2;

/// Pre-initialized HDLC FCS algorithm instance, for reuse across frames.
pub struct FcsCalculator {
    fcs16: Crc<u16>,
}

impl fmt::Debug for FcsCalculator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FcsCalculator")
            .field("fcs16", &format_args!("Crc<u16>(IBM_SDLC)"))
            .finish()
    }
}

impl FcsCalculator {
    /// Creates a new `FcsCalculator`.
    pub fn new() -> Self {
        Self {
            fcs16: Crc::<u16>::new(&CRC_16_IBM_SDLC),
        }
    }

    /// Calculates the 16-bit FCS over `input`.
    #[inline]
    pub fn fcs16(&self, input: &[u8]) -> u16 {
        self.fcs16.checksum(input)
    }

    /// Returns `input` followed by its FCS in transmission order (low byte first).
    pub fn append_fcs(&self, input: &[u8]) -> Vec<u8> {
        let mut frame = Vec::with_capacity(input.len() + HDLC_FCS_LENGTH_BYTES);
        frame.extend_from_slice(input);
        frame.extend_from_slice(&self.fcs16(input).to_le_bytes());
        frame
    }
}

impl Default for FcsCalculator {
    fn default() -> Self {
        Self::new()
    }
}

/// Calculates the HDLC FCS directly.
///
/// Creates a new `Crc<u16>` instance on each call; prefer [`FcsCalculator`]
/// when checking many frames.
///
/// The CRC-16/IBM-SDLC parameters are:
/// - Polynomial: `0x1021`
/// - Initial Value: `0xFFFF`
/// - Reflect Input/Output: `true`
/// - XOR Output: `0xFFFF`
pub fn calculate_hdlc_fcs(input: &[u8]) -> u16 {
    let crc_calc: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_SDLC);
    crc_calc.checksum(input)
}
