//! Delve IR - statement-level intermediate representation.
//!
//! This crate contains the data structures shared between semantic analysis
//! and the LLVM statement lowerer:
//! - `Name` + `StringInterner` for interned identifiers
//! - `Loc` for source locations
//! - The statement AST (`Stmt`, `StmtKind`) with arena allocation
//! - Index newtypes for nodes owned by other compiler stages
//!   (`ExprId`, `VarId`, `TyId`)
//!
//! # Design Philosophy
//!
//! - **Intern everything**: identifiers are `Name(u32)`.
//! - **Flatten everything**: no `Box<Stmt>`; statements live in a
//!   `StmtArena` and reference each other through `StmtId(u32)`.
//! - Expressions, variable declarations and types are *opaque* here: the
//!   statement lowerer consumes them through collaborator interfaces, so
//!   this crate only defines their ids.
//!
//! Back-references produced by semantic analysis (a `break L`'s target
//! label, a `goto case`'s target case, a label's innermost enclosing
//! cleanup statement) are stored as `StmtId`s, never as pointers.

/// Compile-time assertion that a type has a specific size.
///
/// Used to prevent accidental size regressions in frequently-allocated types.
#[macro_export]
macro_rules! static_assert_size {
    ($ty:ty, $size:expr) => {
        const _: [(); $size] = [(); ::std::mem::size_of::<$ty>()];
    };
}

mod arena;
mod loc;
mod name;
mod stmt;

pub use arena::StmtArena;
pub use loc::Loc;
pub use name::{Name, StringInterner};
pub use stmt::{
    CatchClause, CharWidth, ExprId, ForeachOp, OnScopeKind, Stmt, StmtId, StmtKind, StringLit,
    SwitchKind, TyId, VarId,
};
