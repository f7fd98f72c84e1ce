//! Loss-tolerant reassembler.
//!
//! Turns the arrival-ordered fragment list of a key into one contiguous unit.
//! Missing offsets are tolerated and counted rather than waited for: UDPTL
//! runs over an unreliable transport and a lost fragment is never resent.
//!
//! Merge rules:
//! - Fragments are visited in ascending offset order. The sort is stable, so
//!   among fragments sharing an offset the earliest arrival comes first and
//!   its payload is canonical.
//! - A later fragment at an already-seen offset is an overlap. It is a
//!   conflict when its length or bytes differ from the canonical payload.
//! - Each missing offset between two received ones is one lost packet; the
//!   longest such run is the burst loss.

use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::crc::{FcsCalculator, calculate_hdlc_fcs};
use crate::fragment_store::{Fragment, FragmentKey, FragmentStore};
use crate::types::FrameNumber;

/// Packet loss detected within one unit, in fragment-offset units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LossStats {
    /// Sum of all gaps between received offsets.
    pub packet_lost: u32,
    /// Largest single gap.
    pub burst_lost: u32,
}

/// Worst overlap seen while merging a unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverlapStatus {
    #[default]
    None,
    /// Repeated offsets carried identical bytes.
    Overlap,
    /// A repeated offset carried different bytes; the first arrival was kept.
    Conflict,
}

/// Result of reassembling one [`FragmentKey`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReassembledUnit {
    pub key: FragmentKey,
    /// Payloads concatenated in offset order, duplicates collapsed.
    pub data: Bytes,
    /// False only for [`Reassembler::preview`] results.
    pub complete: bool,
    pub loss: LossStats,
    pub overlap: OverlapStatus,
    /// Frame whose terminal fragment triggered reassembly.
    pub reassembled_in: FrameNumber,
    /// Frames that contributed fragments, in arrival order.
    pub frames: Vec<FrameNumber>,
    pub fragment_count: usize,
}

impl ReassembledUnit {
    /// Total byte length of the unit.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// HDLC frame check sequence of the unit's bytes.
    pub fn hdlc_fcs(&self) -> u16 {
        calculate_hdlc_fcs(&self.data)
    }

    /// The unit followed by its FCS, as it would appear on the HDLC link.
    pub fn frame_with_fcs(&self) -> Vec<u8> {
        FcsCalculator::new().append_fcs(&self.data)
    }
}

/// Computes packet and burst loss over a set of received offsets.
///
/// # Parameters
/// - `offsets`: Received fragment offsets, in any order, duplicates allowed.
/// - `count_leading_gap`: Count missing offsets below the lowest received one.
///
/// # Returns
/// The [`LossStats`] for the set. An empty set has no loss.
pub fn compute_loss(offsets: impl IntoIterator<Item = u32>, count_leading_gap: bool) -> LossStats {
    let mut sorted: Vec<u32> = offsets.into_iter().collect();
    sorted.sort_unstable();

    let mut stats = LossStats::default();
    let Some(&lowest) = sorted.first() else {
        return stats;
    };
    let mut expected = if count_leading_gap { 0 } else { lowest };
    for offset in sorted {
        if offset > expected {
            let gap = offset - expected;
            stats.packet_lost = stats.packet_lost.saturating_add(gap);
            stats.burst_lost = stats.burst_lost.max(gap);
        }
        if offset >= expected {
            expected = offset.saturating_add(1);
        }
    }
    stats
}

struct Merged {
    data: Bytes,
    loss: LossStats,
    overlap: OverlapStatus,
    frames: Vec<FrameNumber>,
}

/// Merges loss-tolerant reassembly units out of a [`FragmentStore`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Reassembler {
    count_leading_gap: bool,
}

impl Reassembler {
    /// Creates a reassembler.
    ///
    /// # Parameters
    /// - `count_leading_gap`: Count offsets below the lowest received one as loss.
    pub fn new(count_leading_gap: bool) -> Self {
        Self { count_leading_gap }
    }

    fn merge(&self, fragments: &mut [Fragment]) -> Merged {
        let mut order: Vec<usize> = (0..fragments.len()).collect();
        order.sort_by_key(|&i| fragments[i].offset);

        let loss = compute_loss(fragments.iter().map(|f| f.offset), self.count_leading_gap);

        let total: usize = fragments.iter().map(|f| f.payload.len()).sum();
        let mut data = BytesMut::with_capacity(total);
        let mut overlap = OverlapStatus::None;
        let mut canonical: Option<usize> = None;

        for &i in &order {
            if let Some(c) = canonical.filter(|&c| fragments[c].offset == fragments[i].offset) {
                let conflict = fragments[c].len != fragments[i].len
                    || fragments[c].payload != fragments[i].payload;
                fragments[i].flags.overlap = true;
                fragments[i].flags.overlap_conflict = conflict;
                if conflict {
                    log::warn!(
                        "Overlap conflict at offset {} (frames {} and {})",
                        fragments[i].offset,
                        fragments[c].frame,
                        fragments[i].frame
                    );
                    overlap = OverlapStatus::Conflict;
                } else if overlap == OverlapStatus::None {
                    overlap = OverlapStatus::Overlap;
                }
                continue;
            }
            data.extend_from_slice(&fragments[i].payload);
            canonical = Some(i);
        }

        let mut frames: Vec<FrameNumber> = Vec::new();
        for fragment in fragments.iter() {
            if !frames.contains(&fragment.frame) {
                frames.push(fragment.frame);
            }
        }

        Merged {
            data: data.freeze(),
            loss,
            overlap,
            frames,
        }
    }

    /// Reassembles the unit for `key`, exactly once.
    ///
    /// The first call merges the fragment list, caches the unit on it, marks
    /// it complete and drops the per-fragment payloads. Later calls return
    /// the cached unit, whatever `trigger` they pass.
    ///
    /// # Parameters
    /// - `store`: Store holding the fragment list.
    /// - `key`: Unit to reassemble.
    /// - `trigger`: Frame carrying the fragment that completed the unit.
    ///
    /// # Returns
    /// The unit, or `None` if no fragment was ever stored for `key`.
    pub fn reassemble(
        &self,
        store: &mut FragmentStore,
        key: &FragmentKey,
        trigger: FrameNumber,
    ) -> Option<ReassembledUnit> {
        let list = store.lookup_mut(key)?;
        if let Some(unit) = &list.unit {
            return Some(unit.clone());
        }

        let merged = self.merge(&mut list.fragments);
        for fragment in &mut list.fragments {
            fragment.payload = Bytes::new();
        }

        let unit = ReassembledUnit {
            key: *key,
            data: merged.data,
            complete: true,
            loss: merged.loss,
            overlap: merged.overlap,
            reassembled_in: trigger,
            frames: merged.frames,
            fragment_count: list.fragments.len(),
        };
        log::debug!(
            "Reassembled {} {}->{}: {} bytes from {} fragments in frame {} (lost {}, burst {})",
            key.unit_id,
            key.source,
            key.destination,
            unit.len(),
            unit.fragment_count,
            trigger,
            unit.loss.packet_lost,
            unit.loss.burst_lost
        );
        list.unit = Some(unit.clone());
        Some(unit)
    }

    /// Merges the fragments of `key` without completing the unit.
    ///
    /// Complete units are returned from the cache. For pending units the
    /// result has `complete == false` and `reassembled_in` set to the most
    /// recent contributing frame; the store is left untouched.
    pub fn preview(&self, store: &FragmentStore, key: &FragmentKey) -> Option<ReassembledUnit> {
        let list = store.lookup(key)?;
        if let Some(unit) = list.unit() {
            return Some(unit.clone());
        }

        let mut fragments = list.fragments().to_vec();
        let merged = self.merge(&mut fragments);
        let latest = fragments
            .iter()
            .map(|fragment| fragment.frame)
            .max()
            .unwrap_or_default();
        Some(ReassembledUnit {
            key: *key,
            data: merged.data,
            complete: false,
            loss: merged.loss,
            overlap: merged.overlap,
            reassembled_in: latest,
            frames: merged.frames,
            fragment_count: fragments.len(),
        })
    }
}
