//! Target scopes for `break`/`continue`/labeled jumps and scoped cleanups.
//!
//! Every loop, switch, labeled statement, try-finally, synchronized and
//! volatile statement pushes a [`TargetScope`] for the duration of its
//! body. Non-local transfers resolve their destination against this stack
//! and the cleanup runner walks it to emit finalizers.

use delve_ir::StmtId;

use super::value_id::{BlockId, ValueId};

/// A finalizer owed when control leaves a scope.
///
/// Plain data: the cleanup runner matches on it and re-emits the
/// corresponding code at every exit site.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cleanup {
    /// Re-lower the finally body (by AST reference, never by cloning IR).
    TryFinally(StmtId),
    /// Release a monitor (`monitor == true`) or critical section.
    Synchro { monitor: bool, handle: ValueId },
    /// Emit a store-load barrier.
    Volatile,
}

/// One active lexical scope that jumps may target.
#[derive(Clone, Copy, Debug)]
pub struct TargetScope {
    /// Identity of the statement that opened the scope.
    pub stmt: StmtId,
    /// Finalizer owed on exit, if any.
    pub cleanup: Option<Cleanup>,
    /// Where `break` lands, if this scope accepts one.
    pub break_bb: Option<BlockId>,
    /// Where `continue` lands, if this scope accepts one.
    pub continue_bb: Option<BlockId>,
}

/// LIFO stack of active target scopes. Per-function state.
#[derive(Default)]
pub struct TargetScopeStack {
    scopes: Vec<TargetScope>,
}

impl TargetScopeStack {
    pub fn new() -> Self {
        TargetScopeStack { scopes: Vec::new() }
    }

    /// Enter a scope.
    pub fn push(&mut self, scope: TargetScope) {
        self.scopes.push(scope);
    }

    /// Leave the innermost scope.
    pub fn pop(&mut self) {
        let popped = self.scopes.pop();
        debug_assert!(popped.is_some(), "target scope stack underflow");
    }

    /// True when no scopes are active.
    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    /// Number of active scopes.
    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    /// Innermost scope with a `break` target.
    pub fn nearest_break(&self) -> Option<&TargetScope> {
        self.scopes.iter().rev().find(|s| s.break_bb.is_some())
    }

    /// Innermost scope with a `continue` target.
    pub fn nearest_continue(&self) -> Option<&TargetScope> {
        self.scopes.iter().rev().find(|s| s.continue_bb.is_some())
    }

    /// Innermost scope opened by `stmt`.
    pub fn find(&self, stmt: StmtId) -> Option<&TargetScope> {
        self.scopes.iter().rev().find(|s| s.stmt == stmt)
    }

    /// Scopes from innermost to outermost, paired with their stack index.
    pub fn iter_inner_to_outer(&self) -> impl Iterator<Item = (usize, &TargetScope)> {
        self.scopes.iter().enumerate().rev()
    }

    /// Detach every scope at `index` and above.
    ///
    /// The cleanup runner truncates the stack to the scopes *outside* a
    /// finally body while re-lowering it, so non-local exits inside the
    /// finally resolve against the outer scopes only; the detached tail is
    /// reattached afterwards with [`TargetScopeStack::restore`].
    pub fn split_off(&mut self, index: usize) -> Vec<TargetScope> {
        self.scopes.split_off(index)
    }

    /// Reattach scopes detached by [`TargetScopeStack::split_off`].
    pub fn restore(&mut self, tail: Vec<TargetScope>) {
        self.scopes.extend(tail);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
