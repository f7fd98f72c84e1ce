//! Protocol constants for UDPTL, T.38 IFP encoding and TPKT framing.
//!
//! Values are taken from ITU-T T.38 (UDPTL and IFP ASN.1 in aligned PER)
//! and RFC 1006 (TPKT). Engine defaults live here as well so that
//! [`crate::config::ReassemblyConfig`] has a single source for them.

// --- UDPTL (T.38 Annex, aligned PER) ---

/// Length of the UDPTL `seq-number` field in bytes.
pub const UDPTL_SEQ_NUMBER_LENGTH_BYTES: usize = 2;
/// Number of distinct UDPTL sequence numbers (16-bit wrap).
pub const UDPTL_SEQUENCE_SPACE: u32 = 1 << 16;

/// PER length determinant: values below this fit a single octet.
pub const PER_SHORT_LENGTH_LIMIT: usize = 128;
/// PER length determinant: values below this fit two octets (`10xxxxxx xxxxxxxx`).
pub const PER_LONG_LENGTH_LIMIT: usize = 16384;
/// Prefix bit marking a two-octet PER length determinant.
pub const PER_LONG_LENGTH_FLAG: u8 = 0b1000_0000;
/// Prefix bits marking a fragmented PER length determinant (unsupported).
pub const PER_FRAGMENTED_LENGTH_FLAG: u8 = 0b1100_0000;

/// Minimum `field-data` OCTET STRING length (SIZE(1..65535)).
pub const IFP_FIELD_DATA_MIN_LENGTH: usize = 1;
/// Maximum `field-data` OCTET STRING length (SIZE(1..65535)).
pub const IFP_FIELD_DATA_MAX_LENGTH: usize = 65535;

/// Bits of the `t30-indicator` enumeration root.
pub const IFP_T30_INDICATOR_ROOT_BITS: u8 = 4;
/// Bits of the `t30-data` enumeration root.
pub const IFP_T30_DATA_ROOT_BITS: u8 = 4;
/// Bits of the `field-type` enumeration root.
pub const IFP_FIELD_TYPE_ROOT_BITS: u8 = 3;
/// Bits of a normally-small non-negative whole number (extension index).
pub const PER_NSNNWN_BITS: u8 = 6;

// --- TPKT (RFC 1006) ---

/// TPKT version octet.
pub const TPKT_VERSION: u8 = 3;
/// TPKT header length in bytes (version, reserved, 16-bit length).
pub const TPKT_HEADER_LENGTH_BYTES: usize = 4;

// --- Engine defaults ---

/// Default largest accepted fragment offset within one reassembly unit.
///
/// Half the sequence space: a larger offset means the sequence number
/// lies behind the unit's start and the fragment cannot belong to it.
pub const DEFAULT_MAX_FRAGMENT_OFFSET: u32 = 0x7FFF;

/// Largest forward sequence jump still treated as loss rather than reordering.
pub const SEQUENCE_FORWARD_WINDOW: u16 = 0x7FFF;
