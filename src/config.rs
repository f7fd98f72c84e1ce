//! Engine configuration.

use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_MAX_FRAGMENT_OFFSET;

/// How IFP PDUs are framed on a TCP stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TpktUsage {
    /// PDUs are bare IFP packets.
    Never,
    /// Every PDU starts with a TPKT header.
    Always,
    /// A TPKT header is used when one is present.
    #[default]
    Maybe,
}

/// Tunables for a [`crate::ReassemblyContext`].
///
/// Deserializable so front ends can load it with their own preferences,
/// missing fields fall back to [`ReassemblyConfig::default`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReassemblyConfig {
    /// Decode `field-type` without the extension bit added by the T.38
    /// corrigendum. Needed for traffic from older gateways.
    pub use_pre_corrigendum_asn1: bool,
    /// TPKT framing on the TCP path.
    pub tpkt: TpktUsage,
    /// Count missing offsets below the lowest received one as loss.
    pub count_leading_gap: bool,
    /// Fragments whose offset exceeds this value are dropped.
    pub max_fragment_offset: u32,
}

impl Default for ReassemblyConfig {
    fn default() -> Self {
        Self {
            use_pre_corrigendum_asn1: false,
            tpkt: TpktUsage::default(),
            count_leading_gap: false,
            max_fragment_offset: DEFAULT_MAX_FRAGMENT_OFFSET,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ReassemblyConfig::default();
        assert!(!config.use_pre_corrigendum_asn1);
        assert_eq!(config.tpkt, TpktUsage::Maybe);
        assert!(!config.count_leading_gap);
        assert_eq!(config.max_fragment_offset, 0x7FFF);
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: ReassemblyConfig =
            serde_json::from_str(r#"{ "tpkt": "always", "count_leading_gap": true }"#).unwrap();
        assert_eq!(config.tpkt, TpktUsage::Always);
        assert!(config.count_leading_gap);
        assert_eq!(config.max_fragment_offset, DEFAULT_MAX_FRAGMENT_OFFSET);
    }

    #[test]
    fn serde_roundtrip() {
        let original = ReassemblyConfig {
            use_pre_corrigendum_asn1: true,
            tpkt: TpktUsage::Never,
            count_leading_gap: true,
            max_fragment_offset: 100,
        };
        let json = serde_json::to_string_pretty(&original).unwrap();
        let back: ReassemblyConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, original);
    }
}
