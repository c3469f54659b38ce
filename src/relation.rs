//! # Causality Relation
//!
//! Key → causality-group mapping split into generations. A new generation is
//! opened at every flush and tagged with that flush's sequence, so the keys of
//! one generation are exactly those first seen between two flushes. Once a
//! later flush is durable, whole generations can be dropped in bulk.
//!
//! Invariant: there is always at least one generation, and the newest one is
//! the only one written to.

use crate::model::FlushSeq;
use rustc_hash::FxHashMap;

/// One generation of key relations.
#[derive(Debug, Clone)]
pub struct RelationGroup {
    data: FxHashMap<String, String>,
    /// Sequence of the last flush before any key of this group was added
    prev_flush_seq: FlushSeq,
}

impl RelationGroup {
    fn new(prev_flush_seq: FlushSeq) -> Self {
        Self {
            data: FxHashMap::default(),
            prev_flush_seq,
        }
    }

    pub fn prev_flush_seq(&self) -> FlushSeq {
        self.prev_flush_seq
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Generational key → group store owned by the causality engine.
#[derive(Debug, Clone)]
pub struct CausalityRelation {
    groups: Vec<RelationGroup>,
}

impl CausalityRelation {
    /// Create a relation with a single open generation tagged [`FlushSeq::NONE`].
    pub fn new() -> Self {
        let mut relation = Self { groups: Vec::new() };
        relation.rotate(FlushSeq::NONE);
        relation
    }

    /// Resolve a key, newest generation first.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.groups
            .iter()
            .rev()
            .find_map(|group| group.data.get(key))
            .map(String::as_str)
    }

    /// Assign `key` to `group` in the current generation.
    pub fn set(&mut self, key: impl Into<String>, group: impl Into<String>) {
        if let Some(current) = self.groups.last_mut() {
            current.data.insert(key.into(), group.into());
        }
    }

    /// Total number of entries across all generations.
    pub fn len(&self) -> usize {
        self.groups.iter().map(RelationGroup::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.iter().all(RelationGroup::is_empty)
    }

    pub fn generation_count(&self) -> usize {
        self.groups.len()
    }

    /// Tags of all generations, oldest first.
    pub fn generation_tags(&self) -> Vec<FlushSeq> {
        self.groups.iter().map(|g| g.prev_flush_seq).collect()
    }

    pub fn groups(&self) -> &[RelationGroup] {
        &self.groups
    }

    /// Open a new empty generation tagged `flush_seq` and make it current.
    pub fn rotate(&mut self, flush_seq: FlushSeq) {
        self.groups.push(RelationGroup::new(flush_seq));
    }

    /// Drop every relation and start over with one empty generation.
    pub fn clear(&mut self) {
        self.gc(FlushSeq::MAX);
    }

    /// Reclaim generations made obsolete by the durable flush `flush_seq`.
    ///
    /// Every generation older than the newest one tagged `<= flush_seq` is
    /// removed; that newest covered generation stays, since its keys were
    /// added after the flush. [`FlushSeq::MAX`] removes everything and opens a
    /// fresh generation.
    pub fn gc(&mut self, flush_seq: FlushSeq) {
        if flush_seq == FlushSeq::MAX {
            self.groups.clear();
            self.rotate(FlushSeq::NONE);
            return;
        }

        let mut idx = 0;
        for (i, group) in self.groups.iter().enumerate() {
            if group.prev_flush_seq <= flush_seq {
                idx = i;
            } else {
                break;
            }
        }

        self.groups.drain(..idx);
    }
}

impl Default for CausalityRelation {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_relation_has_one_generation() {
        let relation = CausalityRelation::new();
        assert_eq!(relation.generation_tags(), vec![FlushSeq::NONE]);
        assert!(relation.is_empty());
        assert_eq!(relation.get("a"), None);
    }

    #[test]
    fn test_set_writes_only_current_generation() {
        let mut relation = CausalityRelation::new();
        relation.set("a", "a");
        relation.rotate(FlushSeq(1));
        relation.set("b", "a");

        assert_eq!(relation.groups()[0].len(), 1);
        assert_eq!(relation.groups()[1].len(), 1);
        assert_eq!(relation.get("a"), Some("a"));
        assert_eq!(relation.get("b"), Some("a"));
        assert_eq!(relation.len(), 2);
    }

    #[test]
    fn test_newest_generation_shadows_older() {
        let mut relation = CausalityRelation::new();
        relation.set("a", "old");
        relation.rotate(FlushSeq(1));
        relation.set("a", "new");
        assert_eq!(relation.get("a"), Some("new"));
    }

    #[test]
    fn test_gc_keeps_newest_covered_generation() {
        let mut relation = CausalityRelation::new();
        relation.set("k0", "k0");
        relation.rotate(FlushSeq(10));
        relation.set("k1", "k1");
        relation.rotate(FlushSeq(20));
        relation.set("k2", "k2");

        relation.gc(FlushSeq(10));

        assert_eq!(relation.generation_tags(), vec![FlushSeq(10), FlushSeq(20)]);
        assert_eq!(relation.get("k0"), None);
        assert_eq!(relation.get("k1"), Some("k1"));
        assert_eq!(relation.get("k2"), Some("k2"));
    }

    #[test]
    fn test_gc_between_tags() {
        let mut relation = CausalityRelation::new();
        relation.rotate(FlushSeq(10));
        relation.rotate(FlushSeq(20));
        relation.rotate(FlushSeq(30));

        relation.gc(FlushSeq(25));
        assert_eq!(relation.generation_tags(), vec![FlushSeq(20), FlushSeq(30)]);
    }

    #[test]
    fn test_gc_below_all_tags_is_noop() {
        let mut relation = CausalityRelation::new();
        relation.rotate(FlushSeq(10));
        relation.gc(FlushSeq(-5));
        assert_eq!(relation.generation_count(), 2);
    }

    #[test]
    fn test_gc_never_removes_last_generation() {
        let mut relation = CausalityRelation::new();
        relation.rotate(FlushSeq(10));
        relation.set("k", "k");
        relation.gc(FlushSeq(1_000));
        assert_eq!(relation.generation_tags(), vec![FlushSeq(10)]);
        assert_eq!(relation.get("k"), Some("k"));
    }

    #[test]
    fn test_clear_leaves_single_empty_generation() {
        let mut relation = CausalityRelation::new();
        relation.set("a", "a");
        relation.rotate(FlushSeq(5));
        relation.set("b", "b");

        relation.clear();

        assert_eq!(relation.generation_tags(), vec![FlushSeq::NONE]);
        assert!(relation.is_empty());
        assert_eq!(relation.get("a"), None);
        assert_eq!(relation.get("b"), None);
    }
}
