//! Fragment store and accumulator.
//!
//! Holds one arrival-ordered fragment list per [`FragmentKey`]. Lists are only
//! ever appended to; ordering by offset happens in the
//! [`Reassembler`](crate::reassembler::Reassembler). Once a list has been
//! reassembled it keeps the resulting unit and is frozen.

use std::collections::HashMap;
use std::net::SocketAddr;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};

use crate::reassembler::ReassembledUnit;
use crate::types::{FrameNumber, UnitId};

/// Identifies one reassembly unit: one direction of one logical transfer.
#[serde_as]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FragmentKey {
    #[serde_as(as = "DisplayFromStr")]
    pub source: SocketAddr,
    #[serde_as(as = "DisplayFromStr")]
    pub destination: SocketAddr,
    pub unit_id: UnitId,
}

impl FragmentKey {
    pub fn new(source: SocketAddr, destination: SocketAddr, unit_id: UnitId) -> Self {
        Self {
            source,
            destination,
            unit_id,
        }
    }
}

/// Overlap markers set on a fragment during reassembly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentFlags {
    /// Another fragment was already accepted at this offset.
    pub overlap: bool,
    /// The earlier fragment at this offset had different contents.
    pub overlap_conflict: bool,
}

/// One arrived wire unit of a reassembly unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    /// Fragment index within the unit, derived from the sequence number.
    pub offset: u32,
    /// Payload, emptied once the unit has been reassembled.
    pub payload: Bytes,
    /// Payload length at arrival.
    pub len: usize,
    pub is_final: bool,
    /// Capture frame that carried this fragment.
    pub frame: FrameNumber,
    pub flags: FragmentFlags,
}

/// Arrival-ordered fragments of one key, plus the unit once reassembled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FragmentList {
    pub(crate) fragments: Vec<Fragment>,
    pub(crate) unit: Option<ReassembledUnit>,
}

impl FragmentList {
    /// Fragments in arrival order.
    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    /// True once reassembly has run for this list.
    pub fn is_complete(&self) -> bool {
        self.unit.is_some()
    }

    /// The cached unit of a complete list.
    pub fn unit(&self) -> Option<&ReassembledUnit> {
        self.unit.as_ref()
    }

    /// True if any fragment carries the final flag.
    pub fn has_final(&self) -> bool {
        self.fragments.iter().any(|fragment| fragment.is_final)
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }
}

/// Keyed collection of fragment lists.
#[derive(Debug, Default)]
pub struct FragmentStore {
    lists: HashMap<FragmentKey, FragmentList>,
}

impl FragmentStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the fragment list for `key` without side effects.
    pub fn lookup(&self, key: &FragmentKey) -> Option<&FragmentList> {
        self.lists.get(key)
    }

    pub(crate) fn lookup_mut(&mut self, key: &FragmentKey) -> Option<&mut FragmentList> {
        self.lists.get_mut(key)
    }

    /// Appends a fragment to the list for `key`, creating the list if absent.
    ///
    /// Fragments are kept in call order whatever their offset. A list that is
    /// already complete is frozen: the fragment is ignored and the list is
    /// returned unchanged.
    ///
    /// # Parameters
    /// - `key`: Reassembly unit the fragment belongs to.
    /// - `offset`: Fragment index within the unit.
    /// - `payload`: Fragment bytes, possibly empty.
    /// - `is_final`: Whether higher-layer framing marks this as the last fragment.
    /// - `frame`: Capture frame carrying the fragment.
    ///
    /// # Returns
    /// The (possibly newly created) list for `key`.
    pub fn add_fragment(
        &mut self,
        key: FragmentKey,
        offset: u32,
        payload: Bytes,
        is_final: bool,
        frame: FrameNumber,
    ) -> &FragmentList {
        let list = self.lists.entry(key).or_default();
        if list.is_complete() {
            log::trace!(
                "Ignoring fragment {} of completed {} in frame {}",
                offset,
                key.unit_id,
                frame
            );
            return list;
        }
        log::trace!(
            "Fragment {} ({} bytes, final={}) for {} {}->{} in frame {}",
            offset,
            payload.len(),
            is_final,
            key.unit_id,
            key.source,
            key.destination,
            frame
        );
        list.fragments.push(Fragment {
            offset,
            len: payload.len(),
            payload,
            is_final,
            frame,
            flags: FragmentFlags::default(),
        });
        list
    }

    /// Keys of lists that have not been reassembled yet.
    pub fn pending_keys(&self) -> Vec<FragmentKey> {
        let mut keys: Vec<FragmentKey> = self
            .lists
            .iter()
            .filter(|(_, list)| !list.is_complete())
            .map(|(key, _)| *key)
            .collect();
        keys.sort_by_key(|key| (key.source, key.destination, key.unit_id));
        keys
    }

    /// Drops every list, as when the capture is reloaded.
    pub fn clear(&mut self) {
        self.lists.clear();
    }

    /// Number of keys held.
    pub fn len(&self) -> usize {
        self.lists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(unit: u32) -> FragmentKey {
        FragmentKey::new(
            "10.0.0.1:4000".parse().unwrap(),
            "10.0.0.2:5000".parse().unwrap(),
            UnitId::new(unit),
        )
    }

    #[test]
    fn lookup_of_unknown_key_is_none() {
        let store = FragmentStore::new();
        assert!(store.lookup(&key(1)).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn add_fragment_creates_list_and_keeps_arrival_order() {
        let mut store = FragmentStore::new();
        store.add_fragment(key(1), 2, Bytes::from_static(b"C"), false, FrameNumber::new(1));
        store.add_fragment(key(1), 0, Bytes::from_static(b"A"), false, FrameNumber::new(2));
        let list = store.add_fragment(key(1), 1, Bytes::from_static(b"B"), true, FrameNumber::new(3));

        let offsets: Vec<u32> = list.fragments().iter().map(|f| f.offset).collect();
        assert_eq!(offsets, vec![2, 0, 1]);
        assert!(list.has_final());
        assert!(!list.is_complete());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn lookup_has_no_side_effects() {
        let mut store = FragmentStore::new();
        store.add_fragment(key(1), 0, Bytes::from_static(b"A"), false, FrameNumber::new(1));
        let before = store.lookup(&key(1)).cloned();
        let _ = store.lookup(&key(2));
        assert_eq!(store.lookup(&key(1)).cloned(), before);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn duplicate_offsets_are_tolerated() {
        let mut store = FragmentStore::new();
        store.add_fragment(key(1), 0, Bytes::from_static(b"A"), false, FrameNumber::new(1));
        let list = store.add_fragment(key(1), 0, Bytes::from_static(b"X"), false, FrameNumber::new(2));
        assert_eq!(list.len(), 2);
        assert_eq!(list.fragments()[1].len, 1);
    }

    #[test]
    fn pending_keys_are_sorted_and_clear_empties_store() {
        let mut store = FragmentStore::new();
        store.add_fragment(key(3), 0, Bytes::new(), false, FrameNumber::new(1));
        store.add_fragment(key(1), 0, Bytes::new(), false, FrameNumber::new(2));
        assert_eq!(store.pending_keys(), vec![key(1), key(3)]);

        store.clear();
        assert!(store.is_empty());
        assert!(store.pending_keys().is_empty());
    }

    #[test]
    fn fragment_key_serializes_addresses_as_strings() {
        let json = serde_json::to_string(&key(7)).unwrap();
        assert_eq!(
            json,
            r#"{"source":"10.0.0.1:4000","destination":"10.0.0.2:5000","unit_id":7}"#
        );
        let back: FragmentKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key(7));
    }
}
