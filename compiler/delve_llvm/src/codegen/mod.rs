//! Statement-to-CFG lowering.
//!
//! # Module Organization
//!
//! ```text
//! codegen/
//! ├── value_id.rs      — opaque ID newtypes + ValueArena
//! ├── ir_builder.rs    — ID-based builder façade, emission cursor,
//! │                      call_or_invoke, globals, barriers
//! ├── traits.rs        — collaborator contracts (expr/type/decl/debug)
//! ├── target_scope.rs  — break/continue targets + Cleanup values
//! ├── landing_pad.rs   — exception-handler frame stack
//! ├── label_table.rs   — scoped label name → block
//! ├── stmt_lowerer.rs  — StmtLowerer: dispatch + simple statements
//! ├── lower_loops.rs   — while/do/for/unrolled/foreach/foreach-range
//! ├── lower_switch.rs  — switches, cases, goto case/default, string
//! │                      switch tables, switch error
//! ├── lower_eh.rs      — try-finally/try-catch/throw/synchronized/
//! │                      volatile/with, pad construction
//! ├── cleanup.rs       — finalizer replay on non-local exits
//! └── runtime_decl.rs  — ABI-frozen runtime symbol declarations
//! ```

pub mod ir_builder;
pub mod label_table;
pub mod landing_pad;
pub mod runtime_decl;
pub mod target_scope;
pub mod traits;
pub mod value_id;

pub mod stmt_lowerer;

mod cleanup;
mod lower_eh;
mod lower_loops;
mod lower_switch;

pub use ir_builder::IrBuilder;
pub use label_table::LabelTable;
pub use landing_pad::{CatchReg, LandingPadFrame, LandingPadStack};
pub use runtime_decl::declare_runtime;
pub use stmt_lowerer::{AsmBlockState, FuncInfo, RetStyle, StmtLowerer};
pub use target_scope::{Cleanup, TargetScope, TargetScopeStack};
pub use traits::{DebugSink, DeclLowering, ExprLowering, ExprVal, TypeLowering};
pub use value_id::{BlockId, FunctionId, LLVMTypeId, ValueId};
