//! Active Context
//!
//! The active context decides what a vertex read observes on the current
//! thread. It holds:
//!
//! - a base [`CalculationState`] with the thread's memoized values,
//! - a stack of frames layered on top of it, one per open scope or pushed
//!   state; each frame has its own state and, for diddle/set scopes, a map
//!   of override values. Fixed values written while a scope is open land in
//!   the innermost frame's state and never reach the shared graph,
//! - the evaluation call stack, used for cycle detection and for recording
//!   dependency edges.
//!
//! # Implementation
//!
//! Everything lives in a thread-local `RefCell`, so no synchronization is
//! needed and nothing one thread does inside a scope can leak into another.
//! Borrows never span user code: a vertex body runs with the cell released,
//! which lets it read other vertices and open nested scopes freely.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

use super::state::{CalculationState, Fixing, StoredValue};
use crate::graph::{BindingId, ObjectId};

thread_local! {
    static ACTIVE: RefCell<ActiveContext> = RefCell::new(ActiveContext::default());
}

/// Identifies one frame so that its guard pops exactly that frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FrameToken(u64);

/// What opened a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FrameKind {
    /// A bare state pushed through [`ActiveContext::push_state`].
    State,
    /// A [`DiddleScope`](super::DiddleScope).
    Diddle,
    /// A [`SetScope`](super::SetScope).
    Set,
}

#[derive(Debug)]
struct Frame {
    token: FrameToken,
    kind: FrameKind,
    overrides: HashMap<BindingId, StoredValue>,
    state: CalculationState,
    debug: bool,
    /// Evaluation depth when the frame was entered. Calculations that were
    /// already running at that point must not see its overrides change.
    eval_depth: usize,
}

/// Per-thread calculation state, override frames, and evaluation stack.
#[derive(Debug, Default)]
pub struct ActiveContext {
    base: CalculationState,
    frames: Vec<Frame>,
    evaluating: Vec<BindingId>,
    next_token: u64,
}

/// Outcome of writing into the innermost override frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OverrideWrite {
    /// The write landed; carries whether the binding had an override there.
    Applied(bool),
    /// No diddle or set scope is innermost on this thread.
    NoScope,
    /// A calculation that started before the scope is still running.
    Calculating,
}

impl ActiveContext {
    fn with<R>(f: impl FnOnce(&mut ActiveContext) -> R) -> R {
        ACTIVE.with(|cell| f(&mut cell.borrow_mut()))
    }

    fn active_state_mut(&mut self) -> &mut CalculationState {
        match self.frames.last_mut() {
            Some(frame) => &mut frame.state,
            None => &mut self.base,
        }
    }

    fn active_state(&self) -> &CalculationState {
        self.frames.last().map_or(&self.base, |frame| &frame.state)
    }

    fn push_frame(
        &mut self,
        kind: FrameKind,
        state: CalculationState,
        overrides: HashMap<BindingId, StoredValue>,
        debug: bool,
    ) -> FrameToken {
        let token = FrameToken(self.next_token);
        self.next_token += 1;
        let eval_depth = self.evaluating.len();
        self.frames.push(Frame {
            token,
            kind,
            overrides,
            state,
            debug,
            eval_depth,
        });
        token
    }

    // ------------------------------------------------------------------
    // Public introspection
    // ------------------------------------------------------------------

    /// Check whether a vertex is being evaluated on this thread.
    pub fn is_calculating() -> bool {
        Self::with(|ctx| !ctx.evaluating.is_empty())
    }

    /// Number of vertex evaluations in progress on this thread.
    pub fn calculation_depth() -> usize {
        Self::with(|ctx| ctx.evaluating.len())
    }

    /// Number of frames layered over the base state.
    pub fn frame_depth() -> usize {
        Self::with(|ctx| ctx.frames.len())
    }

    /// Number of entries in the innermost calculation state.
    pub fn active_state_len() -> usize {
        Self::with(|ctx| ctx.active_state().len())
    }

    /// Shallow copy of the innermost calculation state.
    pub fn snapshot_active_state() -> CalculationState {
        Self::with(|ctx| {
            let mut copy = CalculationState::new();
            ctx.active_state().copy_into(&mut copy);
            copy
        })
    }

    /// Make `state` the innermost calculation state.
    ///
    /// Reads memoize into it until it is popped again. Overrides from
    /// enclosing scopes stay visible.
    pub fn push_state(state: CalculationState) {
        Self::with(|ctx| {
            ctx.push_frame(FrameKind::State, state, HashMap::new(), false);
        });
    }

    /// Pop the innermost state pushed with [`ActiveContext::push_state`].
    ///
    /// Returns `None` if the innermost frame belongs to a scope (or there
    /// is none); scopes are only ever closed by their guard.
    pub fn pop_state() -> Option<CalculationState> {
        Self::with(|ctx| {
            if ctx.frames.last()?.kind != FrameKind::State {
                return None;
            }
            ctx.frames.pop().map(|frame| frame.state)
        })
    }

    /// Check whether an open scope asked for debug tracing.
    pub fn is_debugging() -> bool {
        Self::with(|ctx| ctx.frames.iter().any(|frame| frame.debug))
    }

    // ------------------------------------------------------------------
    // Evaluation stack
    // ------------------------------------------------------------------

    /// The binding currently being evaluated, if any.
    pub(crate) fn current_caller() -> Option<BindingId> {
        Self::with(|ctx| ctx.evaluating.last().copied())
    }

    /// If `binding` is already being evaluated, the chain that leads back to
    /// it, outermost first.
    pub(crate) fn reentry_path(binding: BindingId) -> Option<Vec<BindingId>> {
        Self::with(|ctx| {
            let start = ctx.evaluating.iter().position(|b| *b == binding)?;
            let mut path = ctx.evaluating[start..].to_vec();
            path.push(binding);
            Some(path)
        })
    }

    /// Push `binding` onto the evaluation stack until the guard drops.
    pub(crate) fn enter_evaluation(binding: BindingId) -> EvaluationGuard {
        Self::with(|ctx| ctx.evaluating.push(binding));
        EvaluationGuard { binding }
    }

    // ------------------------------------------------------------------
    // Values
    // ------------------------------------------------------------------

    /// Innermost override for the binding across all open frames.
    pub(crate) fn lookup_override(binding: &BindingId) -> Option<StoredValue> {
        Self::with(|ctx| {
            ctx.frames
                .iter()
                .rev()
                .find_map(|frame| frame.overrides.get(binding).map(Arc::clone))
        })
    }

    /// Check whether any open frame overrides the binding.
    pub(crate) fn is_overridden(binding: &BindingId) -> bool {
        Self::with(|ctx| {
            ctx.frames
                .iter()
                .any(|frame| frame.overrides.contains_key(binding))
        })
    }

    /// Innermost scope-local fixed value (or clear) for the binding.
    pub(crate) fn lookup_fixed(binding: &BindingId) -> Option<Fixing> {
        Self::with(|ctx| {
            ctx.frames
                .iter()
                .rev()
                .find_map(|frame| frame.state.fixing(binding).cloned())
        })
    }

    /// Check whether a diddle or set scope is open on this thread.
    pub(crate) fn has_override_scope() -> bool {
        Self::with(|ctx| ctx.frames.iter().any(|frame| frame.kind != FrameKind::State))
    }

    /// Record a scope-local fixed value (or clear) in the innermost frame
    /// and evict `binding` and its `dependents` from that frame's state.
    pub(crate) fn write_fixed(binding: BindingId, fixing: Fixing, dependents: &[BindingId]) {
        let previous = Self::with(|ctx| {
            let frame = ctx.frames.last_mut()?;
            let previous = frame.state.set_fixing(binding, fixing);
            frame.state.evict(dependents);
            previous
        });
        drop(previous);
    }

    /// Memoized value in the innermost state, if computed at `version`.
    pub(crate) fn lookup_cached(binding: &BindingId, version: u64) -> Option<StoredValue> {
        Self::with(|ctx| ctx.active_state().fresh(binding, version))
    }

    /// Memoize into the innermost state.
    pub(crate) fn store_cached(binding: BindingId, value: StoredValue, version: u64) {
        Self::with(|ctx| ctx.active_state_mut().insert(binding, value, version));
    }

    /// Write (or with `None`, remove) an override in the innermost frame and
    /// evict `binding` and its `dependents` from that frame's state.
    pub(crate) fn write_override(
        binding: BindingId,
        value: Option<StoredValue>,
        dependents: &[BindingId],
    ) -> OverrideWrite {
        let evicted = Self::with(|ctx| {
            let depth = ctx.evaluating.len();
            let Some(frame) = ctx.frames.last_mut() else {
                return Err(OverrideWrite::NoScope);
            };
            if frame.kind == FrameKind::State {
                return Err(OverrideWrite::NoScope);
            }
            if depth > frame.eval_depth {
                return Err(OverrideWrite::Calculating);
            }

            let previous = match value {
                Some(value) => frame.overrides.insert(binding, value),
                None => frame.overrides.remove(&binding),
            };
            frame.state.remove(&binding);
            frame.state.evict(dependents);
            Ok(previous)
        });

        match evicted {
            // Dropped outside the borrow: the old value may own graph objects.
            Ok(previous) => OverrideWrite::Applied(previous.is_some()),
            Err(outcome) => outcome,
        }
    }

    // ------------------------------------------------------------------
    // Scopes
    // ------------------------------------------------------------------

    /// Open a scope frame holding `overrides`.
    ///
    /// The frame starts with a copy of the enclosing state minus the
    /// entries in `evict`, which are stale under the new overrides.
    pub(crate) fn enter_scope(
        kind: FrameKind,
        overrides: HashMap<BindingId, StoredValue>,
        evict: &[BindingId],
        debug: bool,
    ) -> FrameToken {
        Self::with(|ctx| {
            let mut state = CalculationState::new();
            ctx.active_state().copy_into(&mut state);
            state.evict(evict);
            ctx.push_frame(kind, state, overrides, debug)
        })
    }

    /// Close the scope frame opened with `token`.
    ///
    /// Frames still layered above it stay open, but their memoized values
    /// may have been computed under the closed frame's overrides and are
    /// dropped.
    pub(crate) fn exit_scope(token: FrameToken) {
        let popped = Self::with(|ctx| {
            let position = ctx.frames.iter().rposition(|frame| frame.token == token)?;
            let frame = ctx.frames.remove(position);
            if position < ctx.frames.len() {
                tracing::warn!(
                    inner = ctx.frames.len() - position,
                    "scope closed while inner frames were still open"
                );
                for inner in &mut ctx.frames[position..] {
                    inner.state.clear_memoized();
                }
            }
            Some(frame)
        });
        // The frame drops here, after the borrow is released.
        drop(popped);
    }

    /// Drop this thread's memoized values and overrides for a dead instance.
    ///
    /// Silently skipped when the context is busy or already torn down; the
    /// leftover entries can never be read again because object IDs are not
    /// reused.
    pub(crate) fn forget_object(object: ObjectId) {
        let _ = ACTIVE.try_with(|cell| {
            let Ok(mut ctx) = cell.try_borrow_mut() else {
                return;
            };
            let keep = |binding: &BindingId| binding.object() != object;
            ctx.base.retain(keep);
            for frame in &mut ctx.frames {
                frame.state.retain(keep);
                frame.overrides.retain(|binding, _| keep(binding));
            }
        });
    }
}

/// Pops a binding off the evaluation stack when dropped.
///
/// This keeps the stack balanced even if the vertex body fails or panics.
#[derive(Debug)]
pub(crate) struct EvaluationGuard {
    binding: BindingId,
}

impl Drop for EvaluationGuard {
    fn drop(&mut self) {
        let _ = ACTIVE.try_with(|cell| {
            let popped = cell.borrow_mut().evaluating.pop();

            // Verify we're popping the right binding.
            if let Some(binding) = popped {
                debug_assert_eq!(
                    binding, self.binding,
                    "evaluation stack mismatch: expected {}, got {}",
                    self.binding, binding
                );
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::VertexKey;

    fn binding(method: &'static str) -> BindingId {
        BindingId::new(ObjectId::new(), VertexKey::new("Context", method))
    }

    #[test]
    fn evaluation_stack_tracks_bindings() {
        let outer = binding("outer");
        let inner = binding("inner");

        assert!(!ActiveContext::is_calculating());
        {
            let _outer = ActiveContext::enter_evaluation(outer);
            assert_eq!(ActiveContext::current_caller(), Some(outer));
            {
                let _inner = ActiveContext::enter_evaluation(inner);
                assert_eq!(ActiveContext::calculation_depth(), 2);
                assert_eq!(
                    ActiveContext::reentry_path(outer),
                    Some(vec![outer, inner, outer])
                );
            }
            assert_eq!(ActiveContext::current_caller(), Some(outer));
        }

        // Stack should be cleaned up after drop
        assert!(!ActiveContext::is_calculating());
        assert!(ActiveContext::reentry_path(outer).is_none());
    }

    #[test]
    fn push_and_pop_state() {
        let b = binding("value");
        ActiveContext::store_cached(b, Arc::new(1_i64), 0);
        let before = ActiveContext::active_state_len();

        ActiveContext::push_state(CalculationState::new());
        assert_eq!(ActiveContext::active_state_len(), 0);
        assert!(ActiveContext::lookup_cached(&b, 0).is_none());

        ActiveContext::store_cached(b, Arc::new(2_i64), 0);
        let popped = ActiveContext::pop_state().expect("pushed state");
        assert!(popped.contains(&b));

        assert_eq!(ActiveContext::active_state_len(), before);
        let base = ActiveContext::lookup_cached(&b, 0).expect("base entry");
        assert_eq!(base.downcast_ref::<i64>(), Some(&1));
        assert!(ActiveContext::pop_state().is_none());
    }

    #[test]
    fn overrides_need_a_scope() {
        let b = binding("value");
        assert_eq!(
            ActiveContext::write_override(b, Some(Arc::new(1_i64)), &[]),
            OverrideWrite::NoScope
        );

        let token = ActiveContext::enter_scope(FrameKind::Diddle, HashMap::new(), &[], false);
        assert_eq!(
            ActiveContext::write_override(b, Some(Arc::new(1_i64)), &[]),
            OverrideWrite::Applied(false)
        );
        assert!(ActiveContext::is_overridden(&b));
        ActiveContext::exit_scope(token);

        assert!(!ActiveContext::is_overridden(&b));
        assert_eq!(ActiveContext::frame_depth(), 0);
    }

    #[test]
    fn scope_frames_copy_and_evict() {
        let a = binding("a");
        let b = binding("b");
        ActiveContext::store_cached(a, Arc::new(1_i64), 0);
        ActiveContext::store_cached(b, Arc::new(2_i64), 0);

        let token = ActiveContext::enter_scope(FrameKind::Set, HashMap::new(), &[b], true);
        assert!(ActiveContext::is_debugging());
        assert!(ActiveContext::lookup_cached(&a, 0).is_some());
        assert!(ActiveContext::lookup_cached(&b, 0).is_none());
        ActiveContext::exit_scope(token);

        assert!(!ActiveContext::is_debugging());
        assert!(ActiveContext::lookup_cached(&b, 0).is_some());
    }

    #[test]
    fn overrides_frozen_for_running_calculations() {
        let running = binding("running");
        let target = binding("target");

        let token = ActiveContext::enter_scope(FrameKind::Diddle, HashMap::new(), &[], false);
        {
            let _guard = ActiveContext::enter_evaluation(running);
            assert_eq!(
                ActiveContext::write_override(target, Some(Arc::new(1_i64)), &[]),
                OverrideWrite::Calculating
            );
        }
        ActiveContext::exit_scope(token);
    }

    #[test]
    fn scoped_fixed_values_vanish_with_their_frame() {
        let a = binding("a");
        let b = binding("b");
        ActiveContext::store_cached(b, Arc::new(2_i64), 0);
        assert!(!ActiveContext::has_override_scope());

        let token = ActiveContext::enter_scope(FrameKind::Diddle, HashMap::new(), &[], false);
        assert!(ActiveContext::has_override_scope());
        ActiveContext::write_fixed(a, Fixing::Set(Arc::new(7_i64)), &[b]);
        assert!(matches!(ActiveContext::lookup_fixed(&a), Some(Fixing::Set(_))));
        assert!(ActiveContext::lookup_cached(&b, 0).is_none());

        // A pushed state above the scope still sees the scope's fixings.
        ActiveContext::push_state(CalculationState::new());
        assert!(ActiveContext::lookup_fixed(&a).is_some());
        assert!(ActiveContext::pop_state().is_some());

        ActiveContext::exit_scope(token);
        assert!(ActiveContext::lookup_fixed(&a).is_none());
        assert!(ActiveContext::lookup_cached(&b, 0).is_some());
    }

    #[test]
    fn closing_an_outer_scope_keeps_inner_frames() {
        let a = binding("a");
        let b = binding("b");
        let outer = ActiveContext::enter_scope(FrameKind::Diddle, HashMap::new(), &[], false);
        ActiveContext::write_override(a, Some(Arc::new(1_i64)), &[]);
        let inner = ActiveContext::enter_scope(FrameKind::Diddle, HashMap::new(), &[], false);
        ActiveContext::write_override(b, Some(Arc::new(2_i64)), &[]);
        ActiveContext::store_cached(a, Arc::new(1_i64), 0);

        ActiveContext::exit_scope(outer);
        assert_eq!(ActiveContext::frame_depth(), 1);
        assert!(!ActiveContext::is_overridden(&a));
        assert!(ActiveContext::is_overridden(&b));
        assert!(ActiveContext::lookup_cached(&a, 0).is_none());

        ActiveContext::exit_scope(inner);
        assert_eq!(ActiveContext::frame_depth(), 0);
    }
}
