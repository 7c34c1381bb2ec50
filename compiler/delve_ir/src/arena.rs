//! Arena allocation for statements.

use crate::{Loc, Stmt, StmtId, StmtKind};

/// Owns every statement of a compilation unit.
///
/// Statements are allocated once by the front-end and referenced through
/// `StmtId` everywhere else; nodes are never moved or freed individually.
#[derive(Default)]
pub struct StmtArena {
    stmts: Vec<Stmt>,
}

impl StmtArena {
    /// Create an empty arena.
    pub fn new() -> Self {
        StmtArena { stmts: Vec::new() }
    }

    /// Allocate a statement, returning its id.
    pub fn alloc(&mut self, kind: StmtKind, loc: Loc) -> StmtId {
        let id = StmtId::from_raw(self.stmts.len() as u32);
        self.stmts.push(Stmt { kind, loc });
        id
    }

    /// Fetch a statement.
    ///
    /// Panics if `id` was not produced by this arena.
    #[inline]
    pub fn get(&self, id: StmtId) -> &Stmt {
        &self.stmts[id.raw() as usize]
    }

    /// Replace a statement's kind in place.
    ///
    /// Semantic analysis back-patches resolved jumps (a label allocated
    /// before the loop it wraps, a `goto case` bound to a later case).
    pub fn replace_kind(&mut self, id: StmtId, kind: StmtKind) {
        self.stmts[id.raw() as usize].kind = kind;
    }

    /// Fetch a statement's kind.
    #[inline]
    pub fn kind(&self, id: StmtId) -> &StmtKind {
        &self.get(id).kind
    }

    /// Fetch a statement's location.
    #[inline]
    pub fn loc(&self, id: StmtId) -> Loc {
        self.get(id).loc
    }

    /// Number of allocated statements.
    pub fn len(&self) -> usize {
        self.stmts.len()
    }

    /// True when nothing has been allocated.
    pub fn is_empty(&self) -> bool {
        self.stmts.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
