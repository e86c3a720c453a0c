//! Peer registry: the roster of nearby devices, rebuilt from each platform snapshot.

use std::collections::HashSet;

use crate::address::MacAddress;
use crate::types::Peer;

#[derive(Debug, Default)]
pub struct PeerRegistry {
    roster: Vec<Peer>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the roster with the deduplicated contents of a platform snapshot.
    /// Returns the new roster if it differs (as a set) from the previous one, `None` otherwise.
    /// When unchanged, the previous ordering is kept.
    pub fn update_from_platform_list(&mut self, raw: Vec<Peer>) -> Option<&[Peer]> {
        let mut seen = HashSet::with_capacity(raw.len());
        let next: Vec<Peer> = raw
            .into_iter()
            .filter(|p| seen.insert(p.address))
            .collect();
        if same_set(&self.roster, &next) {
            return None;
        }
        self.roster = next;
        Some(&self.roster)
    }

    pub fn roster(&self) -> &[Peer] {
        &self.roster
    }

    pub fn get(&self, address: &MacAddress) -> Option<&Peer> {
        self.roster.iter().find(|p| p.address == *address)
    }

    pub fn len(&self) -> usize {
        self.roster.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roster.is_empty()
    }

    pub fn clear(&mut self) {
        self.roster.clear();
    }
}

/// Both sides are already deduplicated by address.
fn same_set(a: &[Peer], b: &[Peer]) -> bool {
    a.len() == b.len() && a.iter().all(|p| b.contains(p))
}
