//! ID-based LLVM instruction builder.
//!
//! `IrBuilder` wraps inkwell's `Builder`, stores all LLVM entities in a
//! `ValueArena`, and exposes only opaque ID types to callers. This hides
//! the `'ctx` lifetime from the lowering pipeline.
//!
//! Beyond plain instruction emission it owns the two pieces of state every
//! statement lowering step consults:
//!
//! - the **emission cursor**: the pair `(cur, end)` of the block currently
//!   receiving instructions and the anchor block new blocks are inserted
//!   *before*, so textual block order follows statement order;
//! - the **landing-pad stack**: while non-empty, unwind-capable calls are
//!   emitted as `invoke` with the top frame's pad as unwind destination
//!   (see [`IrBuilder::call_or_invoke`]).
//!
//! # Method Organization
//!
//! | Category | Methods |
//! |----------|---------|
//! | Constants | `const_int`, `const_i32`, `const_u32`, `const_usize`, `const_bool`, `const_null_ptr`, `const_zero` |
//! | Memory | `alloca`, `create_entry_alloca`, `load`, `store`, `gep1` |
//! | Arithmetic | `add`, `sub` |
//! | Comparisons | `icmp`, `icmp_eq`, `icmp_ne` |
//! | Conversions | `zext`, `trunc`, `bitcast` |
//! | Control flow | `br`, `cond_br`, `switch`, `ret`, `ret_void`, `unreachable` |
//! | Calls | `call`, `invoke`, `call_or_invoke` |
//! | EH | `landingpad`, `resume`, `set_personality`, `eh_typeid_for` |
//! | Barriers | `memory_barrier` |
//! | Globals | `add_internal_constant`, `add_internal_zeroed_global`, `unique_global_name`, `file_name_global` |
//! | Cursor/blocks | `append_block`, `new_block`, `new_block_before`, `set_cursor`, `scope_returned`, `move_block_before` |
//! | Functions | `declare_function`, `declare_extern_function`, `runtime_function`, attributes |

use std::cell::Cell;

use inkwell::attributes::{Attribute, AttributeLoc};
use inkwell::basic_block::BasicBlock;
use inkwell::builder::Builder as InkwellBuilder;
use inkwell::intrinsics::Intrinsic;
use inkwell::module::Linkage;
use inkwell::types::{BasicMetadataTypeEnum, BasicType, BasicTypeEnum};
use inkwell::values::{BasicValue, BasicValueEnum, FunctionValue, IntValue};
use inkwell::{AtomicOrdering, IntPredicate};

use crate::context::SimpleCx;

use super::landing_pad::LandingPadStack;
use super::value_id::{BlockId, FunctionId, LLVMTypeId, ValueArena, ValueId};

/// ID-based LLVM IR builder with emission cursor and landing-pad stack.
///
/// Two lifetimes: `'ctx` is the LLVM context lifetime, `'scx` the borrow
/// of the [`SimpleCx`]. They are kept separate so the builder and the
/// context can be locals in the same scope.
pub struct IrBuilder<'scx, 'ctx> {
    /// The underlying inkwell builder.
    builder: InkwellBuilder<'ctx>,
    /// Shared LLVM context for type creation.
    scx: &'scx SimpleCx<'ctx>,
    /// Arena storing all LLVM entities behind IDs.
    arena: ValueArena<'ctx>,
    /// Currently-active function.
    current_function: Option<FunctionId>,
    /// Block currently receiving instructions.
    current_block: Option<BlockId>,
    /// Anchor block; `new_block` inserts immediately before it.
    cursor_end: Option<BlockId>,
    /// Active exception-handler frames; unwind destination for calls.
    pub pads: LandingPadStack,
    /// Module-scoped counter for synthesized global names. Deterministic
    /// so builds are reproducible.
    unique_counter: Cell<u32>,
}

impl<'scx, 'ctx> IrBuilder<'scx, 'ctx> {
    /// Create a new `IrBuilder`.
    pub fn new(scx: &'scx SimpleCx<'ctx>) -> Self {
        let builder = scx.llcx.create_builder();
        Self {
            builder,
            scx,
            arena: ValueArena::new(),
            current_function: None,
            current_block: None,
            cursor_end: None,
            pads: LandingPadStack::new(),
            unique_counter: Cell::new(0),
        }
    }

    /// Access the underlying `SimpleCx` for direct LLVM type operations.
    #[inline]
    pub fn scx(&self) -> &'scx SimpleCx<'ctx> {
        self.scx
    }

    // -----------------------------------------------------------------------
    // Constants
    // -----------------------------------------------------------------------

    /// An integer constant of an arbitrary integer type.
    pub fn const_int(&mut self, ty: LLVMTypeId, value: u64, sign_extend: bool) -> ValueId {
        let int_ty = self.arena.get_type(ty).into_int_type();
        self.arena
            .push_value(int_ty.const_int(value, sign_extend).into())
    }

    /// An `i32` constant.
    #[inline]
    pub fn const_i32(&mut self, val: i32) -> ValueId {
        let v = self.scx.type_i32().const_int(val as u64, val < 0);
        self.arena.push_value(v.into())
    }

    /// A `u32` constant (as `i32`).
    #[inline]
    pub fn const_u32(&mut self, val: u32) -> ValueId {
        let v = self.scx.type_i32().const_int(u64::from(val), false);
        self.arena.push_value(v.into())
    }

    /// A machine-word (`size_t`) constant.
    #[inline]
    pub fn const_usize(&mut self, val: u64) -> ValueId {
        let v = self.scx.isize_ty.const_int(val, false);
        self.arena.push_value(v.into())
    }

    /// An `i1` constant.
    #[inline]
    pub fn const_bool(&mut self, val: bool) -> ValueId {
        let v = self.scx.type_i1().const_int(u64::from(val), false);
        self.arena.push_value(v.into())
    }

    /// A null pointer constant.
    #[inline]
    pub fn const_null_ptr(&mut self) -> ValueId {
        self.arena.push_value(self.scx.type_ptr().const_null().into())
    }

    /// A zero/null constant of any LLVM basic type.
    pub fn const_zero(&mut self, ty: LLVMTypeId) -> ValueId {
        let v: BasicValueEnum<'ctx> = match self.arena.get_type(ty) {
            BasicTypeEnum::IntType(t) => t.const_int(0, false).into(),
            BasicTypeEnum::FloatType(t) => t.const_float(0.0).into(),
            BasicTypeEnum::StructType(t) => t.const_zero().into(),
            BasicTypeEnum::PointerType(t) => t.const_null().into(),
            BasicTypeEnum::ArrayType(t) => t.const_zero().into(),
            BasicTypeEnum::VectorType(t) => t.const_zero().into(),
            BasicTypeEnum::ScalableVectorType(t) => t.const_zero().into(),
        };
        self.arena.push_value(v)
    }

    // -----------------------------------------------------------------------
    // Memory
    // -----------------------------------------------------------------------

    /// Stack allocation at the current position.
    pub fn alloca(&mut self, ty: LLVMTypeId, name: &str) -> ValueId {
        let llvm_ty = self.arena.get_type(ty);
        let ptr = self.builder.build_alloca(llvm_ty, name).expect("alloca");
        self.arena.push_value(ptr.into())
    }

    /// Stack allocation in the function entry block.
    ///
    /// Entry-block allocas are what LLVM's `mem2reg` promotes; the cursor
    /// is saved and restored around the insertion.
    pub fn create_entry_alloca(
        &mut self,
        function: FunctionId,
        name: &str,
        ty: LLVMTypeId,
    ) -> ValueId {
        let func_val = self.arena.get_function(function);
        let llvm_ty = self.arena.get_type(ty);

        let entry = func_val
            .get_first_basic_block()
            .expect("function has entry block");

        let saved = self.current_block;
        if let Some(first_instr) = entry.get_first_instruction() {
            self.builder.position_before(&first_instr);
        } else {
            self.builder.position_at_end(entry);
        }

        let ptr = self.builder.build_alloca(llvm_ty, name).expect("alloca");

        if let Some(block_id) = saved {
            let bb = self.arena.get_block(block_id);
            self.builder.position_at_end(bb);
        }

        self.arena.push_value(ptr.into())
    }

    /// Load from a pointer.
    pub fn load(&mut self, ty: LLVMTypeId, ptr: ValueId, name: &str) -> ValueId {
        let llvm_ty = self.arena.get_type(ty);
        let raw = self.arena.get_value(ptr);
        let v = self
            .builder
            .build_load(llvm_ty, raw.into_pointer_value(), name)
            .expect("load");
        self.arena.push_value(v)
    }

    /// Store to a pointer.
    pub fn store(&mut self, val: ValueId, ptr: ValueId) {
        let v = self.arena.get_value(val);
        let p = self.arena.get_value(ptr);
        self.builder
            .build_store(p.into_pointer_value(), v)
            .expect("store");
    }

    /// One-dimensional GEP: `&ptr[index]` over elements of `elem_ty`.
    #[allow(unsafe_code, reason = "LLVM C API requires unsafe for GEP")]
    pub fn gep1(&mut self, elem_ty: LLVMTypeId, ptr: ValueId, index: ValueId, name: &str) -> ValueId {
        let llvm_ty = self.arena.get_type(elem_ty);
        let raw_ptr = self.arena.get_value(ptr).into_pointer_value();
        let idx = self.arena.get_value(index).into_int_value();
        // SAFETY: lowering only indexes aggregates whose length it has
        // itself compared the index against.
        let v = unsafe {
            self.builder
                .build_in_bounds_gep(llvm_ty, raw_ptr, &[idx], name)
                .expect("gep")
        };
        self.arena.push_value(v.into())
    }

    /// Extract a field from an aggregate value.
    pub fn extract_value(&mut self, agg: ValueId, index: u32, name: &str) -> ValueId {
        let raw = self.arena.get_value(agg).into_struct_value();
        let v = self
            .builder
            .build_extract_value(raw, index, name)
            .expect("extract_value");
        self.arena.push_value(v)
    }

    // -----------------------------------------------------------------------
    // Arithmetic
    // -----------------------------------------------------------------------

    /// Integer addition.
    pub fn add(&mut self, lhs: ValueId, rhs: ValueId, name: &str) -> ValueId {
        let l = self.arena.get_value(lhs).into_int_value();
        let r = self.arena.get_value(rhs).into_int_value();
        let v = self.builder.build_int_add(l, r, name).expect("add");
        self.arena.push_value(v.into())
    }

    /// Integer subtraction.
    pub fn sub(&mut self, lhs: ValueId, rhs: ValueId, name: &str) -> ValueId {
        let l = self.arena.get_value(lhs).into_int_value();
        let r = self.arena.get_value(rhs).into_int_value();
        let v = self.builder.build_int_sub(l, r, name).expect("sub");
        self.arena.push_value(v.into())
    }

    // -----------------------------------------------------------------------
    // Comparisons
    // -----------------------------------------------------------------------

    /// Integer comparison with an explicit predicate.
    ///
    /// Loop lowering picks the predicate from the key type's signedness,
    /// so the generic form is the primary interface.
    pub fn icmp(&mut self, pred: IntPredicate, lhs: ValueId, rhs: ValueId, name: &str) -> ValueId {
        let l = self.arena.get_value(lhs).into_int_value();
        let r = self.arena.get_value(rhs).into_int_value();
        let v = self
            .builder
            .build_int_compare(pred, l, r, name)
            .expect("icmp");
        self.arena.push_value(v.into())
    }

    /// Integer equal.
    pub fn icmp_eq(&mut self, lhs: ValueId, rhs: ValueId, name: &str) -> ValueId {
        self.icmp(IntPredicate::EQ, lhs, rhs, name)
    }

    /// Integer not equal.
    pub fn icmp_ne(&mut self, lhs: ValueId, rhs: ValueId, name: &str) -> ValueId {
        self.icmp(IntPredicate::NE, lhs, rhs, name)
    }

    /// True when a value is a 1-bit integer.
    pub fn value_is_i1(&self, val: ValueId) -> bool {
        match self.arena.get_value(val) {
            BasicValueEnum::IntValue(v) => v.get_type().get_bit_width() == 1,
            _ => false,
        }
    }

    /// Bit width of an integer value's type.
    pub fn int_bit_width(&self, val: ValueId) -> u32 {
        self.arena
            .get_value(val)
            .into_int_value()
            .get_type()
            .get_bit_width()
    }

    // -----------------------------------------------------------------------
    // Conversions
    // -----------------------------------------------------------------------

    /// Zero extension.
    pub fn zext(&mut self, val: ValueId, ty: LLVMTypeId, name: &str) -> ValueId {
        let v = self.arena.get_value(val).into_int_value();
        let target = self.arena.get_type(ty).into_int_type();
        let r = self.builder.build_int_z_extend(v, target, name).expect("zext");
        self.arena.push_value(r.into())
    }

    /// Integer truncation.
    pub fn trunc(&mut self, val: ValueId, ty: LLVMTypeId, name: &str) -> ValueId {
        let v = self.arena.get_value(val).into_int_value();
        let target = self.arena.get_type(ty).into_int_type();
        let r = self.builder.build_int_truncate(v, target, name).expect("trunc");
        self.arena.push_value(r.into())
    }

    /// Bitcast.
    pub fn bitcast(&mut self, val: ValueId, ty: LLVMTypeId, name: &str) -> ValueId {
        let v = self.arena.get_value(val);
        let target = self.arena.get_type(ty);
        let r = self.builder.build_bit_cast(v, target, name).expect("bitcast");
        self.arena.push_value(r)
    }

    // -----------------------------------------------------------------------
    // Control flow
    // -----------------------------------------------------------------------

    /// Unconditional branch.
    pub fn br(&mut self, dest: BlockId) {
        let bb = self.arena.get_block(dest);
        self.builder.build_unconditional_branch(bb).expect("br");
    }

    /// Append an unconditional branch to a block other than the cursor's.
    ///
    /// Used to chain a forward-created case stub into the real case body;
    /// the cursor is left where it was.
    pub fn br_from(&mut self, from: BlockId, dest: BlockId) {
        let from_bb = self.arena.get_block(from);
        let dest_bb = self.arena.get_block(dest);
        self.builder.position_at_end(from_bb);
        self.builder.build_unconditional_branch(dest_bb).expect("br");
        if let Some(cur) = self.current_block {
            let bb = self.arena.get_block(cur);
            self.builder.position_at_end(bb);
        }
    }

    /// Conditional branch.
    pub fn cond_br(&mut self, cond: ValueId, then_bb: BlockId, else_bb: BlockId) {
        let raw = self.arena.get_value(cond).into_int_value();
        let then_block = self.arena.get_block(then_bb);
        let else_block = self.arena.get_block(else_bb);
        self.builder
            .build_conditional_branch(raw, then_block, else_block)
            .expect("cond_br");
    }

    /// Switch terminator.
    pub fn switch(&mut self, val: ValueId, default: BlockId, cases: &[(ValueId, BlockId)]) {
        let raw = self.arena.get_value(val).into_int_value();
        let default_bb = self.arena.get_block(default);
        let resolved: Vec<(IntValue<'ctx>, BasicBlock<'ctx>)> = cases
            .iter()
            .map(|&(case_val, case_bb)| {
                (
                    self.arena.get_value(case_val).into_int_value(),
                    self.arena.get_block(case_bb),
                )
            })
            .collect();
        self.builder
            .build_switch(raw, default_bb, &resolved)
            .expect("switch");
    }

    /// Return with a value.
    pub fn ret(&mut self, val: ValueId) {
        let v = self.arena.get_value(val);
        self.builder.build_return(Some(&v)).expect("ret");
    }

    /// Void return.
    pub fn ret_void(&mut self) {
        self.builder.build_return(None).expect("ret");
    }

    /// Unreachable terminator.
    pub fn unreachable(&mut self) {
        self.builder.build_unreachable().expect("unreachable");
    }

    // -----------------------------------------------------------------------
    // Calls
    // -----------------------------------------------------------------------

    /// Direct call. Returns `None` for void callees.
    pub fn call(&mut self, callee: FunctionId, args: &[ValueId], name: &str) -> Option<ValueId> {
        let func = self.arena.get_function(callee);
        let arg_vals: Vec<inkwell::values::BasicMetadataValueEnum<'ctx>> = args
            .iter()
            .map(|&id| self.arena.get_value(id).into())
            .collect();
        let call_val = self.builder.build_call(func, &arg_vals, name).expect("call");
        call_val
            .try_as_basic_value()
            .basic()
            .map(|v| self.arena.push_value(v))
    }

    /// Direct invoke: continue at `then_block`, unwind to `catch_block`.
    pub fn invoke(
        &mut self,
        callee: FunctionId,
        args: &[ValueId],
        then_block: BlockId,
        catch_block: BlockId,
        name: &str,
    ) -> Option<ValueId> {
        let func = self.arena.get_function(callee);
        let arg_vals: Vec<BasicValueEnum<'ctx>> =
            args.iter().map(|&id| self.arena.get_value(id)).collect();
        let then_bb = self.arena.get_block(then_block);
        let catch_bb = self.arena.get_block(catch_block);
        let call_val = self
            .builder
            .build_invoke(func, &arg_vals, then_bb, catch_bb, name)
            .expect("invoke");
        // inkwell's build_invoke does not copy the calling convention from
        // the callee, unlike build_call.
        call_val.set_call_convention(func.get_call_conventions());
        call_val
            .try_as_basic_value()
            .basic()
            .map(|v| self.arena.push_value(v))
    }

    /// Call that honors the landing-pad stack.
    ///
    /// While a handler frame is active and the callee may unwind, emits
    /// `invoke` with `unwind_dest` = the top frame's pad and moves the
    /// cursor into a fresh `postinvoke` continuation block. Otherwise a
    /// plain `call`.
    pub fn call_or_invoke(
        &mut self,
        callee: FunctionId,
        args: &[ValueId],
        name: &str,
    ) -> Option<ValueId> {
        match self.pads.top_pad() {
            Some(pad) if !self.fn_is_nounwind(callee) => {
                let cont = self.new_block("postinvoke");
                let result = self.invoke(callee, args, cont, pad, name);
                let end = self.cursor_end();
                self.set_cursor(cont, end);
                result
            }
            _ => self.call(callee, args, name),
        }
    }

    // -----------------------------------------------------------------------
    // Exception handling
    // -----------------------------------------------------------------------

    /// `landingpad` instruction with the Itanium `{ ptr, i32 }` result.
    ///
    /// `clauses` are catch type filters in registration order; pass
    /// `is_cleanup` for pads that must run finalizers regardless of type.
    pub fn landingpad(
        &mut self,
        personality: FunctionId,
        clauses: &[ValueId],
        is_cleanup: bool,
        name: &str,
    ) -> ValueId {
        let personality_fn = self.arena.get_function(personality);
        let lp_ty = self.scx.type_struct(
            &[self.scx.type_ptr().into(), self.scx.type_i32().into()],
            false,
        );
        let clause_vals: Vec<BasicValueEnum<'ctx>> =
            clauses.iter().map(|&id| self.arena.get_value(id)).collect();
        let lp_val = self
            .builder
            .build_landing_pad(lp_ty, personality_fn, &clause_vals, is_cleanup, name)
            .expect("landingpad");
        self.arena.push_value(lp_val)
    }

    /// `resume`: continue unwinding with a previously caught `{ptr, i32}`.
    pub fn resume(&mut self, value: ValueId) {
        let v = self.arena.get_value(value);
        self.builder.build_resume(v).expect("resume");
    }

    /// Rebuild an Itanium `{ ptr, i32 }` pair from spilled components,
    /// for `resume`.
    pub fn eh_pair(&mut self, exn_ptr: ValueId, selector: ValueId, name: &str) -> ValueId {
        let lp_ty = self.scx.type_struct(
            &[self.scx.type_ptr().into(), self.scx.type_i32().into()],
            false,
        );
        let p = self.arena.get_value(exn_ptr);
        let s = self.arena.get_value(selector);
        let with_ptr = self
            .builder
            .build_insert_value(lp_ty.get_undef(), p, 0, name)
            .expect("insert_value")
            .into_struct_value();
        let pair = self
            .builder
            .build_insert_value(with_ptr, s, 1, name)
            .expect("insert_value")
            .into_struct_value();
        self.arena.push_value(pair.into())
    }

    /// Set a function's personality routine.
    pub fn set_personality(&mut self, func: FunctionId, personality: FunctionId) {
        let func_val = self.arena.get_function(func);
        let personality_fn = self.arena.get_function(personality);
        func_val.set_personality_function(personality_fn);
    }

    /// `llvm.eh.typeid.for`: the selector value a landing pad produces
    /// for the given type filter.
    pub fn eh_typeid_for(&mut self, type_info: ValueId, name: &str) -> ValueId {
        let intrinsic = Intrinsic::find("llvm.eh.typeid.for").expect("llvm.eh.typeid.for");
        let decl = intrinsic
            .get_declaration(&self.scx.llmod, &[])
            .expect("eh.typeid.for declaration");
        let func = self.arena.push_function(decl);
        self.call(func, &[type_info], name)
            .expect("eh.typeid.for returns i32")
    }

    // -----------------------------------------------------------------------
    // Memory barriers
    // -----------------------------------------------------------------------

    /// Fence covering the requested reorder barriers.
    ///
    /// A store-load barrier needs the full fence; the weaker flag
    /// combinations map onto acquire/release orderings.
    pub fn memory_barrier(
        &mut self,
        load_load: bool,
        load_store: bool,
        store_load: bool,
        store_store: bool,
    ) {
        let ordering = if store_load {
            AtomicOrdering::SequentiallyConsistent
        } else if (load_load || load_store) && store_store {
            AtomicOrdering::AcquireRelease
        } else if store_store {
            AtomicOrdering::Release
        } else {
            AtomicOrdering::Acquire
        };
        self.builder.build_fence(ordering, 0, "").expect("fence");
    }

    // -----------------------------------------------------------------------
    // Globals
    // -----------------------------------------------------------------------

    /// Next deterministic name for a synthesized module-scope global.
    pub fn unique_global_name(&self, prefix: &str) -> String {
        let n = self.unique_counter.get();
        self.unique_counter.set(n + 1);
        format!("{prefix}.{n}")
    }

    /// Internal-linkage constant global holding `init`; returns its address.
    pub fn add_internal_constant(&mut self, init: BasicValueEnum<'ctx>, name: &str) -> ValueId {
        let global = self.scx.llmod.add_global(init.get_type(), None, name);
        global.set_linkage(Linkage::Internal);
        global.set_constant(true);
        global.set_initializer(&init);
        self.arena.push_value(global.as_pointer_value().into())
    }

    /// Internal-linkage zero-initialized mutable global; returns its address.
    ///
    /// Used for synthesized critical-section slots.
    pub fn add_internal_zeroed_global(&mut self, ty: LLVMTypeId, name: &str) -> ValueId {
        let llvm_ty = self.arena.get_type(ty);
        let global = self.scx.llmod.add_global(llvm_ty, None, name);
        global.set_linkage(Linkage::Internal);
        let zero = self.const_zero(ty);
        let init = self.arena.get_value(zero);
        global.set_initializer(&init);
        self.arena.push_value(global.as_pointer_value().into())
    }

    /// The module's file-name slice global, created on first use.
    ///
    /// Holds a constant `{ size_t len, ptr }` pointing at the file path
    /// bytes; `_d_switch_error` loads it for its `file` argument.
    pub fn file_name_global(&mut self, file: &str) -> ValueId {
        if let Some(global) = self.scx.llmod.get_global(".file_name") {
            return self.arena.push_value(global.as_pointer_value().into());
        }
        let data = self.scx.llcx.const_string(file.as_bytes(), false);
        let data_ptr = self.add_internal_constant(data.into(), ".file_name_data");
        let len = self.scx.isize_ty.const_int(file.len() as u64, false);
        let init = self.scx.llcx.const_struct(
            &[len.into(), self.arena.get_value(data_ptr)],
            false,
        );
        self.add_internal_constant(init.into(), ".file_name")
    }

    // -----------------------------------------------------------------------
    // Cursor and block management
    // -----------------------------------------------------------------------

    /// Append a block at the end of a function.
    pub fn append_block(&mut self, function: FunctionId, name: &str) -> BlockId {
        let func = self.arena.get_function(function);
        let bb = self.scx.llcx.append_basic_block(func, name);
        self.arena.push_block(bb)
    }

    /// Create a block immediately before `anchor`.
    pub fn new_block_before(&mut self, name: &str, anchor: BlockId) -> BlockId {
        let before = self.arena.get_block(anchor);
        let bb = self.scx.llcx.prepend_basic_block(before, name);
        self.arena.push_block(bb)
    }

    /// Create a block immediately before the cursor's end anchor.
    pub fn new_block(&mut self, name: &str) -> BlockId {
        let end = self.cursor_end();
        self.new_block_before(name, end)
    }

    /// Reposition an existing block immediately before `anchor`.
    ///
    /// Used when a forward-referenced label block is finally defined.
    pub fn move_block_before(&mut self, block: BlockId, anchor: BlockId) {
        let bb = self.arena.get_block(block);
        let before = self.arena.get_block(anchor);
        bb.move_before(before).expect("move_before");
    }

    /// Replace the emission cursor: `cur` receives instructions, `end`
    /// anchors new-block insertion.
    pub fn set_cursor(&mut self, cur: BlockId, end: BlockId) {
        let bb = self.arena.get_block(cur);
        self.builder.position_at_end(bb);
        self.current_block = Some(cur);
        self.cursor_end = Some(end);
    }

    /// The block currently receiving instructions.
    #[inline]
    pub fn cursor_block(&self) -> BlockId {
        self.current_block.expect("cursor not set")
    }

    /// The cursor's end anchor.
    #[inline]
    pub fn cursor_end(&self) -> BlockId {
        self.cursor_end.expect("cursor not set")
    }

    /// True when the current block already has a terminator.
    pub fn scope_returned(&self) -> bool {
        self.current_block
            .is_some_and(|id| self.arena.get_block(id).get_terminator().is_some())
    }

    /// True when a specific block has a terminator.
    pub fn block_has_terminator(&self, block: BlockId) -> bool {
        self.arena.get_block(block).get_terminator().is_some()
    }

    // -----------------------------------------------------------------------
    // Functions
    // -----------------------------------------------------------------------

    /// Set the currently-active function.
    pub fn set_current_function(&mut self, func: FunctionId) {
        self.current_function = Some(func);
    }

    /// The currently-active function.
    #[inline]
    pub fn current_function(&self) -> FunctionId {
        self.current_function.expect("no active function")
    }

    /// Declare a function in the module. `return_type` of `None` is void.
    pub fn declare_function(
        &mut self,
        name: &str,
        param_types: &[LLVMTypeId],
        return_type: Option<LLVMTypeId>,
    ) -> FunctionId {
        let param_tys: Vec<BasicMetadataTypeEnum<'ctx>> = param_types
            .iter()
            .map(|&id| self.arena.get_type(id).into())
            .collect();
        let fn_type = match return_type {
            Some(ret_id) => self.arena.get_type(ret_id).fn_type(&param_tys, false),
            None => self.scx.type_void_func(&param_tys),
        };
        let func = self.scx.llmod.add_function(name, fn_type, None);
        self.arena.push_function(func)
    }

    /// Declare an external function, reusing any existing declaration.
    pub fn declare_extern_function(
        &mut self,
        name: &str,
        param_types: &[LLVMTypeId],
        return_type: Option<LLVMTypeId>,
    ) -> FunctionId {
        if let Some(func) = self.scx.llmod.get_function(name) {
            return self.arena.push_function(func);
        }
        let param_tys: Vec<BasicMetadataTypeEnum<'ctx>> = param_types
            .iter()
            .map(|&id| self.arena.get_type(id).into())
            .collect();
        let fn_type = match return_type {
            Some(ret_id) => self.arena.get_type(ret_id).fn_type(&param_tys, false),
            None => self.scx.type_void_func(&param_tys),
        };
        let func = self
            .scx
            .llmod
            .add_function(name, fn_type, Some(Linkage::External));
        self.arena.push_function(func)
    }

    /// Look up a previously declared runtime symbol.
    ///
    /// Panics when the symbol is missing: `declare_runtime` must run once
    /// per module before lowering.
    pub fn runtime_function(&mut self, name: &str) -> FunctionId {
        let func = self
            .scx
            .llmod
            .get_function(name)
            .unwrap_or_else(|| panic!("runtime function '{name}' not declared"));
        self.arena.push_function(func)
    }

    /// Fetch a function parameter.
    pub fn get_param(&mut self, func: FunctionId, param_index: u32) -> ValueId {
        let func_val = self.arena.get_function(func);
        let param = func_val
            .get_nth_param(param_index)
            .expect("parameter index in bounds");
        self.arena.push_value(param)
    }

    /// Mark a function `nounwind`.
    pub fn add_nounwind_attribute(&mut self, func: FunctionId) {
        let f = self.arena.get_function(func);
        let kind = Attribute::get_named_enum_kind_id("nounwind");
        let attr = self.scx.llcx.create_enum_attribute(kind, 0);
        f.add_attribute(AttributeLoc::Function, attr);
    }

    /// Mark a function `noinline`.
    pub fn add_noinline_attribute(&mut self, func: FunctionId) {
        let f = self.arena.get_function(func);
        let kind = Attribute::get_named_enum_kind_id("noinline");
        let attr = self.scx.llcx.create_enum_attribute(kind, 0);
        f.add_attribute(AttributeLoc::Function, attr);
    }

    /// True when a callee is declared `nounwind`.
    pub fn fn_is_nounwind(&self, func: FunctionId) -> bool {
        let f = self.arena.get_function(func);
        let kind = Attribute::get_named_enum_kind_id("nounwind");
        f.get_enum_attribute(AttributeLoc::Function, kind).is_some()
    }

    // -----------------------------------------------------------------------
    // Raw interop
    // -----------------------------------------------------------------------

    /// The raw `BasicValueEnum` for a `ValueId`.
    pub fn raw_value(&self, id: ValueId) -> BasicValueEnum<'ctx> {
        self.arena.get_value(id)
    }

    /// The raw `BasicTypeEnum` for an `LLVMTypeId`.
    pub fn raw_type(&self, id: LLVMTypeId) -> BasicTypeEnum<'ctx> {
        self.arena.get_type(id)
    }

    /// The raw `BasicBlock` for a `BlockId`.
    pub fn raw_block(&self, id: BlockId) -> BasicBlock<'ctx> {
        self.arena.get_block(id)
    }

    /// The raw `FunctionValue` for a `FunctionId`.
    pub fn raw_function(&self, id: FunctionId) -> FunctionValue<'ctx> {
        self.arena.get_function(id)
    }

    /// Intern a raw value.
    pub fn intern_value(&mut self, val: BasicValueEnum<'ctx>) -> ValueId {
        self.arena.push_value(val)
    }

    /// Intern a raw type.
    pub fn register_type(&mut self, ty: BasicTypeEnum<'ctx>) -> LLVMTypeId {
        self.arena.push_type(ty)
    }

    // -----------------------------------------------------------------------
    // Common type ids
    // -----------------------------------------------------------------------

    /// The `i1` type id.
    #[inline]
    pub fn bool_type(&mut self) -> LLVMTypeId {
        self.arena.push_type(self.scx.type_i1().into())
    }

    /// The `i32` type id.
    #[inline]
    pub fn i32_type(&mut self) -> LLVMTypeId {
        self.arena.push_type(self.scx.type_i32().into())
    }

    /// The machine-word type id.
    #[inline]
    pub fn isize_type(&mut self) -> LLVMTypeId {
        self.arena.push_type(self.scx.isize_ty.into())
    }

    /// The opaque pointer type id.
    #[inline]
    pub fn ptr_type(&mut self) -> LLVMTypeId {
        self.arena.push_type(self.scx.type_ptr().into())
    }

    /// The `{ size_t, ptr }` slice type id.
    #[inline]
    pub fn slice_type(&mut self) -> LLVMTypeId {
        self.arena.push_type(self.scx.type_slice().into())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
