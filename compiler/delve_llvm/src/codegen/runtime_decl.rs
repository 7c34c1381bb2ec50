//! Runtime symbol declarations.
//!
//! Declares the ABI-frozen entry points of the Delve runtime that lowered
//! statements call. Resolved at link time; names and signatures must not
//! drift. Call once per module before lowering; re-declaration is a no-op.

use inkwell::module::Linkage;

use super::ir_builder::IrBuilder;

/// Declare the runtime symbols the statement lowerer emits calls to.
pub fn declare_runtime(b: &mut IrBuilder<'_, '_>) {
    let ptr = b.ptr_type();
    let i32_ty = b.i32_type();
    let slice = b.slice_type();

    // -- Exceptions --
    b.declare_extern_function("_d_throw_exception", &[ptr], None);

    // Itanium-style personality; the unwinder calls it with its own ABI.
    if b.scx().llmod.get_function("_d_eh_personality").is_none() {
        let fn_ty = b.scx().type_i32().fn_type(&[], true);
        b.scx()
            .llmod
            .add_function("_d_eh_personality", fn_ty, Some(Linkage::External));
    }

    // -- String switch: sorted-table search, returns index or -1 --
    b.declare_extern_function("_d_switch_string", &[slice, slice], Some(i32_ty));
    b.declare_extern_function("_d_switch_ustring", &[slice, slice], Some(i32_ty));
    b.declare_extern_function("_d_switch_dstring", &[slice, slice], Some(i32_ty));

    // -- Switch fall-off trap --
    b.declare_extern_function("_d_switch_error", &[slice, i32_ty], None);

    // -- Monitors and critical sections --
    b.declare_extern_function("enter_monitor", &[ptr], None);
    let leave_monitor = b.declare_extern_function("leave_monitor", &[ptr], None);
    b.declare_extern_function("enter_critical", &[ptr], None);
    let leave_critical = b.declare_extern_function("leave_critical", &[ptr], None);

    // Release paths run inside cleanup code; they must not unwind into
    // the pad being cleaned up.
    b.add_nounwind_attribute(leave_monitor);
    b.add_nounwind_attribute(leave_critical);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
