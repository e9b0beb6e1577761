//! Generic property-level link registry.
//!
//! A property key `P` is whatever the caller uses to identify one property slot
//! (typically `(NodeId, PropertyPath)`). This registry only tracks the *structural*
//! relation - at most one incoming link per target, an unordered outgoing set per
//! source - and leaves type/direction/same-node validation to the caller, who has the
//! property metadata needed to check it.

use fxhash::FxHashMap;
use std::{
    collections::BTreeSet,
    fmt::Debug,
    hash::Hash,
};

/// Errors raised purely by the structural bookkeeping in [`LinkRegistry`].
/// Direction/type/same-node checks belong to the caller and are reported through the
/// caller's own error type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkError<P> {
    /// The target already has an active incoming link from a different source.
    AlreadyLinked(P),
    /// `unlink` was called for a pair that is not currently an active link.
    NotCurrentlyLinked,
}

/// Tracks the active source -> target property edges.
#[derive(Debug, Clone)]
pub struct LinkRegistry<P>
where
    P: Copy + Eq + Hash + Ord + Debug,
{
    incoming: FxHashMap<P, P>,
    outgoing: FxHashMap<P, BTreeSet<P>>,
}

impl<P> Default for LinkRegistry<P>
where
    P: Copy + Eq + Hash + Ord + Debug,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<P> LinkRegistry<P>
where
    P: Copy + Eq + Hash + Ord + Debug,
{
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            incoming: FxHashMap::default(),
            outgoing: FxHashMap::default(),
        }
    }

    /// Registers `src -> dst`. Fails with [`LinkError::AlreadyLinked`] carrying the
    /// current source if `dst` already has an active incoming link.
    pub fn link(&mut self, src: P, dst: P) -> Result<(), LinkError<P>> {
        if let Some(&existing) = self.incoming.get(&dst) {
            return Err(LinkError::AlreadyLinked(existing));
        }
        self.incoming.insert(dst, src);
        self.outgoing.entry(src).or_default().insert(dst);
        Ok(())
    }

    /// Removes the `src -> dst` edge. Fails with [`LinkError::NotCurrentlyLinked`] if
    /// that exact pair is not currently linked.
    pub fn unlink(&mut self, src: P, dst: P) -> Result<(), LinkError<P>> {
        match self.incoming.get(&dst) {
            Some(&current) if current == src => {
                self.incoming.remove(&dst);
                if let Some(set) = self.outgoing.get_mut(&src) {
                    set.remove(&dst);
                    if set.is_empty() {
                        self.outgoing.remove(&src);
                    }
                }
                Ok(())
            }
            _ => Err(LinkError::NotCurrentlyLinked),
        }
    }

    /// Removes every edge touching `property`, whether as source or target. Used when
    /// a node (and therefore all of its properties) is destroyed.
    pub fn remove_all_touching(&mut self, property: P) {
        if let Some(src) = self.incoming.remove(&property) {
            if let Some(set) = self.outgoing.get_mut(&src) {
                set.remove(&property);
            }
        }
        if let Some(targets) = self.outgoing.remove(&property) {
            for target in targets {
                self.incoming.remove(&target);
            }
        }
    }

    /// The source linked into `target`, if any.
    pub fn incoming_of(&self, target: P) -> Option<P> {
        self.incoming.get(&target).copied()
    }

    /// True if `property` has an active incoming link.
    pub fn has_incoming(&self, property: P) -> bool {
        self.incoming.contains_key(&property)
    }

    /// Targets currently fed by `source`, in a deterministic (sorted) order.
    pub fn outgoing_of(&self, source: P) -> impl Iterator<Item = P> + '_ {
        self.outgoing
            .get(&source)
            .into_iter()
            .flat_map(|set| set.iter().copied())
    }

    /// True if `property` participates in any link, as either endpoint.
    pub fn touches(&self, property: P) -> bool {
        self.incoming.contains_key(&property)
            || self
                .outgoing
                .get(&property)
                .is_some_and(|set| !set.is_empty())
    }

    /// Iterates every active `(src, dst)` edge, in a deterministic order.
    pub fn iter(&self) -> impl Iterator<Item = (P, P)> + '_ {
        let mut sources: Vec<_> = self.outgoing.keys().copied().collect();
        sources.sort();
        sources.into_iter().flat_map(move |src| {
            self.outgoing[&src]
                .iter()
                .copied()
                .map(move |dst| (src, dst))
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn link_then_unlink_roundtrip() {
        let mut reg = LinkRegistry::new();
        reg.link(1, 2).unwrap();
        assert_eq!(reg.incoming_of(2), Some(1));
        assert!(reg.touches(1));
        assert!(reg.touches(2));
        reg.unlink(1, 2).unwrap();
        assert_eq!(reg.incoming_of(2), None);
        assert!(!reg.touches(1));
    }

    #[test]
    fn double_link_to_same_target_is_rejected() {
        let mut reg = LinkRegistry::new();
        reg.link(1, 3).unwrap();
        let err = reg.link(2, 3).unwrap_err();
        assert_eq!(err, LinkError::AlreadyLinked(1));
    }

    #[test]
    fn unlink_wrong_pair_is_rejected() {
        let mut reg = LinkRegistry::new();
        reg.link(1, 2).unwrap();
        assert_eq!(reg.unlink(9, 2).unwrap_err(), LinkError::NotCurrentlyLinked);
    }

    #[test]
    fn remove_all_touching_clears_both_directions() {
        let mut reg = LinkRegistry::new();
        reg.link(1, 2).unwrap();
        reg.link(2, 3).unwrap();
        reg.remove_all_touching(2);
        assert!(!reg.touches(2));
        assert_eq!(reg.incoming_of(3), None);
    }

    #[test]
    fn iter_is_deterministic() {
        let mut reg = LinkRegistry::new();
        reg.link(5, 1).unwrap();
        reg.link(2, 9).unwrap();
        reg.link(2, 4).unwrap();
        let edges: Vec<_> = reg.iter().collect();
        assert_eq!(edges, vec![(2, 4), (2, 9), (5, 1)]);
    }
}
