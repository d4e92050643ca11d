//! Epoch-keyed history map
//!
//! Parent pointers change over time, so each node keeps a map from the epoch
//! a pointer was set to the pointer itself. The lookup that matters is
//! "value as of epoch `e`": the entry at the deepest epoch that is an
//! ancestor-or-equal of `e`. Entries are bucketed by epoch depth and buckets
//! are kept sorted, so a lookup probes one candidate ancestor per bucket,
//! deepest first.

use super::{EpochId, EpochTree};
use std::collections::BTreeMap;

/// Map from epochs to values with "lowest ancestor" lookup
#[derive(Debug, Clone)]
pub struct EpochMap<V> {
    /// `(depth, entries)` sorted by depth
    buckets: Vec<(u32, BTreeMap<EpochId, V>)>,
}

impl<V> Default for EpochMap<V> {
    fn default() -> Self {
        Self {
            buckets: Vec::new(),
        }
    }
}

impl<V> EpochMap<V> {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    fn bucket(&self, depth: u32) -> Result<usize, usize> {
        self.buckets.binary_search_by_key(&depth, |(d, _)| *d)
    }

    /// Insert or overwrite the entry at `epoch`, returning the previous value
    pub fn insert(&mut self, epochs: &EpochTree, epoch: EpochId, value: V) -> Option<V> {
        let depth = epochs.depth(epoch);
        match self.bucket(depth) {
            Ok(index) => self.buckets[index].1.insert(epoch, value),
            Err(index) => {
                self.buckets
                    .insert(index, (depth, BTreeMap::from([(epoch, value)])));
                None
            }
        }
    }

    /// Value stored at exactly `epoch`
    pub fn get(&self, epochs: &EpochTree, epoch: EpochId) -> Option<&V> {
        let index = self.bucket(epochs.depth(epoch)).ok()?;
        self.buckets[index].1.get(&epoch)
    }

    /// Whether an entry exists at exactly `epoch`
    pub fn contains(&self, epochs: &EpochTree, epoch: EpochId) -> bool {
        self.get(epochs, epoch).is_some()
    }

    /// Remove the entry at exactly `epoch`
    pub fn remove(&mut self, epochs: &EpochTree, epoch: EpochId) -> Option<V> {
        let index = self.bucket(epochs.depth(epoch)).ok()?;
        let removed = self.buckets[index].1.remove(&epoch);
        if self.buckets[index].1.is_empty() {
            self.buckets.remove(index);
        }
        removed
    }

    /// Entry at the deepest epoch that is an ancestor of, or equal to, `epoch`
    pub fn lowest_ancestor(&self, epochs: &EpochTree, epoch: EpochId) -> Option<(EpochId, &V)> {
        let depth = epochs.depth(epoch);
        let end = self.buckets.partition_point(|(d, _)| *d <= depth);
        self.buckets[..end].iter().rev().find_map(|(d, entries)| {
            let candidate = epochs.ancestor(epoch, *d);
            entries.get(&candidate).map(|value| (candidate, value))
        })
    }

    /// Drop entries that can no longer answer a lookup at or after `epoch`
    ///
    /// Everything strictly older than the current lowest ancestor along the
    /// ancestor chain of `epoch` is shadowed. Entries on other forks are kept.
    pub fn prune_shadowed(&mut self, epochs: &EpochTree, epoch: EpochId) -> usize {
        let Some((anchor, _)) = self.lowest_ancestor(epochs, epoch) else {
            return 0;
        };
        let anchor_depth = epochs.depth(anchor);
        let mut pruned = 0;
        for (depth, entries) in self.buckets.iter_mut() {
            if *depth >= anchor_depth {
                break;
            }
            let shadowed = epochs.ancestor(anchor, *depth);
            if entries.remove(&shadowed).is_some() {
                pruned += 1;
            }
        }
        self.buckets.retain(|(_, entries)| !entries.is_empty());
        pruned
    }

    /// Remove every entry
    pub fn clear(&mut self) {
        self.buckets.clear();
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.buckets.iter().map(|(_, entries)| entries.len()).sum()
    }

    /// Whether no entry is stored
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// All entries, shallowest depth first
    pub fn iter(&self) -> impl Iterator<Item = (EpochId, &V)> {
        self.buckets
            .iter()
            .flat_map(|(_, entries)| entries.iter().map(|(epoch, value)| (*epoch, value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// genesis - e1 - e2 - e3 with a fork e2 - f3 - f4
    fn forked() -> (EpochTree, [EpochId; 6]) {
        let mut epochs = EpochTree::new();
        let e0 = epochs.genesis();
        let e1 = epochs.step(e0);
        let e2 = epochs.step(e1);
        let e3 = epochs.step(e2);
        let f3 = epochs.step(e2);
        let f4 = epochs.step(f3);
        (epochs, [e0, e1, e2, e3, f3, f4])
    }

    #[test]
    fn test_lowest_ancestor_follows_fork() {
        let (epochs, [e0, e1, e2, e3, f3, f4]) = forked();
        let mut map = EpochMap::new();
        map.insert(&epochs, e0, "genesis");
        map.insert(&epochs, e3, "main");
        map.insert(&epochs, f3, "fork");

        assert_eq!(map.lowest_ancestor(&epochs, e1), Some((e0, &"genesis")));
        assert_eq!(map.lowest_ancestor(&epochs, e2), Some((e0, &"genesis")));
        assert_eq!(map.lowest_ancestor(&epochs, e3), Some((e3, &"main")));
        assert_eq!(map.lowest_ancestor(&epochs, f4), Some((f3, &"fork")));
        assert_eq!(map.len(), 3);
    }

    #[test]
    fn test_overwrite_and_remove() {
        let (epochs, [e0, e1, ..]) = forked();
        let mut map = EpochMap::new();
        assert_eq!(map.insert(&epochs, e1, 1), None);
        assert_eq!(map.insert(&epochs, e1, 2), Some(1));
        assert_eq!(map.get(&epochs, e1), Some(&2));
        assert_eq!(map.lowest_ancestor(&epochs, e0), None);
        assert_eq!(map.remove(&epochs, e1), Some(2));
        assert!(map.is_empty());
    }

    #[test]
    fn test_prune_keeps_other_forks() {
        let (epochs, [e0, e1, e2, e3, f3, f4]) = forked();
        let mut map = EpochMap::new();
        for (epoch, value) in [(e0, 0), (e1, 1), (e2, 2), (e3, 3), (f3, 30)] {
            map.insert(&epochs, epoch, value);
        }

        assert_eq!(map.prune_shadowed(&epochs, f4), 3);
        assert_eq!(map.lowest_ancestor(&epochs, f4), Some((f3, &30)));
        assert_eq!(map.lowest_ancestor(&epochs, e3), Some((e3, &3)));
        assert!(!map.contains(&epochs, e1));
    }
}
