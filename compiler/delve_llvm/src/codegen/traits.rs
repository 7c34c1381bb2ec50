//! Collaborator contracts.
//!
//! Statement lowering drives the rest of the compiler through these
//! traits: expression lowering, type lowering, variable declaration and
//! debug-info emission all live elsewhere. Every method receives the
//! [`IrBuilder`] so collaborators emit into the same cursor and observe
//! the same landing-pad stack (their calls become `invoke` inside a try).
//!
//! All ids are opaque `u32` newtypes, so the traits are object-safe and
//! lifetime-free.

use delve_ir::{ExprId, StringLit, TyId, VarId};

use super::ir_builder::IrBuilder;
use super::value_id::{LLVMTypeId, ValueId};

/// A lowered expression: SSA handle plus the front-end type it carries.
#[derive(Clone, Copy, Debug)]
pub struct ExprVal {
    pub value: ValueId,
    pub ty: TyId,
}

/// Expression lowering (`Expr → Value`).
pub trait ExprLowering {
    /// Lower an expression to a value.
    fn lower_expr(&mut self, b: &mut IrBuilder<'_, '_>, expr: ExprId) -> ExprVal;

    /// Lower a constant expression to an integer constant (case selectors).
    fn lower_const(&mut self, b: &mut IrBuilder<'_, '_>, expr: ExprId) -> ValueId;

    /// Coerce a value to `i1`.
    fn cast_to_bool(&mut self, b: &mut IrBuilder<'_, '_>, val: ExprVal) -> ValueId;

    /// Cast a value to another front-end type.
    fn cast_to(&mut self, b: &mut IrBuilder<'_, '_>, val: ExprVal, ty: TyId) -> ExprVal;

    /// When `expr` is `cast(void) e`, return `e`: expression statements
    /// lower the operand for side effects only.
    fn as_void_cast(&self, expr: ExprId) -> Option<ExprId>;

    /// The code units of a string literal (string-switch cases).
    fn string_literal(&self, expr: ExprId) -> StringLit;

    /// Length of an array/slice aggregate.
    fn array_len(&mut self, b: &mut IrBuilder<'_, '_>, aggr: ExprVal) -> ValueId;

    /// Data pointer of an array/slice aggregate.
    fn array_ptr(&mut self, b: &mut IrBuilder<'_, '_>, aggr: ExprVal) -> ValueId;

    /// ABI adjustment applied to a return value before `ret`.
    ///
    /// The default is the identity; targets with return-value rewrites
    /// override it.
    fn put_ret(&mut self, _b: &mut IrBuilder<'_, '_>, val: ExprVal) -> ValueId {
        val.value
    }
}

/// Type lowering (`Type → IRType`).
pub trait TypeLowering {
    /// Lower a front-end type.
    fn lower_type(&mut self, b: &mut IrBuilder<'_, '_>, ty: TyId) -> LLVMTypeId;

    /// The target's `size_t`.
    fn size_t_type(&mut self, b: &mut IrBuilder<'_, '_>) -> LLVMTypeId;

    /// Whether an integral type is unsigned (selects ULT/UGT vs SLT/SGT).
    fn is_unsigned(&self, ty: TyId) -> bool;

    /// Module-scope descriptor for a type's runtime identity; used as a
    /// landing pad catch filter.
    fn type_info_global(&mut self, b: &mut IrBuilder<'_, '_>, ty: TyId) -> ValueId;
}

/// Variable declaration and assignment.
pub trait DeclLowering {
    /// Declare a local variable with raw (uninitialized) storage; returns
    /// the slot pointer and binds the variable to it.
    fn declare_raw(&mut self, b: &mut IrBuilder<'_, '_>, var: VarId) -> ValueId;

    /// Rebind a variable's storage to an existing pointer (`foreach` over
    /// `ref` elements aliases the aggregate slot).
    fn bind(&mut self, var: VarId, storage: ValueId);

    /// Assign a value into a slot, with full assignment semantics for the
    /// value's type.
    fn assign(&mut self, b: &mut IrBuilder<'_, '_>, dest_ptr: ValueId, src: ExprVal);

    /// The declared type of a variable.
    fn var_type(&self, var: VarId) -> TyId;
}

/// Debug-info sink. Installed only when debug info is enabled.
pub trait DebugSink {
    /// Statement boundary at a source line.
    fn stop_point(&mut self, b: &mut IrBuilder<'_, '_>, line: u32);

    /// Function epilogue marker, emitted before each `ret`.
    fn func_end(&mut self, b: &mut IrBuilder<'_, '_>);
}
