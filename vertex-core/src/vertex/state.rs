//! Calculation State
//!
//! A [`CalculationState`] maps bindings to their memoized values. Each entry
//! carries the binding version that was current when evaluation started; an
//! entry whose stamp no longer matches the binding's version is stale and is
//! never served.
//!
//! A state also carries the fixed values written while a scope was open.
//! They live and die with the state, so closing the scope discards them.
//!
//! States are plain values. The active context owns one base state per
//! thread plus one per open scope.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use crate::graph::BindingId;

/// A type-erased vertex value, shared between states without copying.
pub type StoredValue = Arc<dyn Any + Send + Sync>;

#[derive(Debug, Clone)]
struct Entry {
    value: StoredValue,
    version: u64,
}

/// A fixed value written inside a scope, or a clear that hides the
/// value fixed further out.
#[derive(Debug, Clone)]
pub(crate) enum Fixing {
    Set(StoredValue),
    Cleared,
}

/// Memoized values and scope-local fixed values for one frame of the
/// active context.
#[derive(Debug, Clone, Default)]
pub struct CalculationState {
    entries: HashMap<BindingId, Entry>,
    fixed: HashMap<BindingId, Fixing>,
}

impl CalculationState {
    /// Create an empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of memoized bindings, stale ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check whether the state holds neither memoized values nor fixed
    /// values.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.fixed.is_empty()
    }

    /// Check whether the state holds an entry for the binding.
    pub fn contains(&self, binding: &BindingId) -> bool {
        self.entries.contains_key(binding)
    }

    /// Iterate over the memoized bindings.
    pub fn bindings(&self) -> impl Iterator<Item = &BindingId> {
        self.entries.keys()
    }

    /// Get a memoized value if it was computed at `version`.
    pub fn fresh(&self, binding: &BindingId, version: u64) -> Option<StoredValue> {
        self.entries
            .get(binding)
            .filter(|entry| entry.version == version)
            .map(|entry| Arc::clone(&entry.value))
    }

    /// Memoize a value computed at `version`.
    pub fn insert(&mut self, binding: BindingId, value: StoredValue, version: u64) {
        self.entries.insert(binding, Entry { value, version });
    }

    /// Forget the memoized value of one binding.
    pub fn remove(&mut self, binding: &BindingId) -> bool {
        self.entries.remove(binding).is_some()
    }

    /// Forget every binding in `bindings`.
    pub fn evict<'a>(&mut self, bindings: impl IntoIterator<Item = &'a BindingId>) -> usize {
        bindings
            .into_iter()
            .filter(|binding| self.entries.remove(*binding).is_some())
            .count()
    }

    /// Forget everything, fixed values included.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.fixed.clear();
    }

    /// Forget the memoized values but keep the fixed ones.
    pub fn clear_memoized(&mut self) {
        self.entries.clear();
    }

    /// Check whether this state fixes the binding.
    pub fn is_fixed(&self, binding: &BindingId) -> bool {
        matches!(self.fixed.get(binding), Some(Fixing::Set(_)))
    }

    /// Iterate over the bindings this state fixes.
    pub fn fixed_bindings(&self) -> impl Iterator<Item = &BindingId> {
        self.fixed
            .iter()
            .filter(|(_, fixing)| matches!(fixing, Fixing::Set(_)))
            .map(|(binding, _)| binding)
    }

    pub(crate) fn fixing(&self, binding: &BindingId) -> Option<&Fixing> {
        self.fixed.get(binding)
    }

    /// Record a fixed value (or a clear) and drop the binding's memoized
    /// value. Returns what was recorded before.
    pub(crate) fn set_fixing(&mut self, binding: BindingId, fixing: Fixing) -> Option<Fixing> {
        self.entries.remove(&binding);
        self.fixed.insert(binding, fixing)
    }

    /// Copy every entry into `target`, replacing its contents.
    ///
    /// Values are shared, not cloned.
    pub fn copy_into(&self, target: &mut CalculationState) {
        target.entries.clone_from(&self.entries);
        target.fixed.clone_from(&self.fixed);
    }

    /// Keep only the entries whose binding matches `keep`.
    pub(crate) fn retain(&mut self, keep: impl Fn(&BindingId) -> bool) {
        self.entries.retain(|binding, _| keep(binding));
        self.fixed.retain(|binding, _| keep(binding));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{ObjectId, VertexKey};

    fn binding(method: &'static str) -> BindingId {
        BindingId::new(ObjectId::new(), VertexKey::new("State", method))
    }

    #[test]
    fn fresh_respects_version_stamp() {
        let mut state = CalculationState::new();
        let b = binding("a");
        state.insert(b, Arc::new(5_i64), 3);

        let hit = state.fresh(&b, 3).expect("entry at version 3");
        assert_eq!(hit.downcast_ref::<i64>(), Some(&5));
        assert!(state.fresh(&b, 4).is_none());
        assert!(state.contains(&b));
    }

    #[test]
    fn copy_is_independent() {
        let mut original = CalculationState::new();
        let a = binding("a");
        let b = binding("b");
        original.insert(a, Arc::new(1_i64), 0);

        let mut copy = CalculationState::new();
        copy.insert(b, Arc::new(2_i64), 0);
        original.copy_into(&mut copy);

        assert_eq!(copy.len(), original.len());
        assert!(copy.contains(&a));
        assert!(!copy.contains(&b));

        copy.clear();
        assert!(copy.is_empty());
        assert_eq!(original.len(), 1);
    }

    #[test]
    fn evict_counts_removed_entries() {
        let mut state = CalculationState::new();
        let a = binding("a");
        let b = binding("b");
        let c = binding("c");
        state.insert(a, Arc::new(1_i64), 0);
        state.insert(b, Arc::new(2_i64), 0);

        assert_eq!(state.evict([&a, &c]), 1);
        assert!(!state.contains(&a));
        assert!(state.remove(&b));
        assert!(!state.remove(&b));
    }

    #[test]
    fn fixing_replaces_memoized_value() {
        let mut state = CalculationState::new();
        let a = binding("a");
        state.insert(a, Arc::new(1_i64), 0);

        assert!(state.set_fixing(a, Fixing::Set(Arc::new(9_i64))).is_none());
        assert!(!state.contains(&a));
        assert!(state.is_fixed(&a));
        assert_eq!(state.fixed_bindings().count(), 1);

        let previous = state.set_fixing(a, Fixing::Cleared);
        assert!(matches!(previous, Some(Fixing::Set(_))));
        assert!(!state.is_fixed(&a));
        assert!(matches!(state.fixing(&a), Some(Fixing::Cleared)));
        assert!(!state.is_empty());

        state.clear_memoized();
        assert!(state.fixing(&a).is_some());
        state.clear();
        assert!(state.is_empty());
    }
}
