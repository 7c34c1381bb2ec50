//! Opaque ID newtypes and the value arena behind [`crate::IrBuilder`].
//!
//! All LLVM values, types, blocks and functions are stored in a
//! `ValueArena` and referenced by `Copy` ID handles, so the `'ctx`
//! lifetime never escapes the builder. Each ID is a `u32` index into the
//! corresponding arena `Vec`; `u32::MAX` is the `NONE` sentinel.

use inkwell::basic_block::BasicBlock;
use inkwell::types::BasicTypeEnum;
use inkwell::values::{BasicValueEnum, FunctionValue};

// ---------------------------------------------------------------------------
// ID newtypes
// ---------------------------------------------------------------------------

macro_rules! define_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        pub struct $name(u32);

        impl $name {
            /// Sentinel for "absent".
            pub const NONE: Self = Self(u32::MAX);

            /// True if this is the `NONE` sentinel.
            #[inline]
            pub fn is_none(self) -> bool {
                self.0 == u32::MAX
            }

            /// The raw index.
            #[inline]
            pub fn raw(self) -> u32 {
                self.0
            }
        }
    };
}

define_id! {
    /// Opaque handle to an LLVM value.
    ValueId
}
define_id! {
    /// Opaque handle to an LLVM type.
    LLVMTypeId
}
define_id! {
    /// Opaque handle to an LLVM basic block.
    BlockId
}
define_id! {
    /// Opaque handle to an LLVM function.
    FunctionId
}

// ---------------------------------------------------------------------------
// ValueArena
// ---------------------------------------------------------------------------

/// Stores LLVM entities behind opaque IDs, hiding the `'ctx` lifetime.
///
/// Internal to `IrBuilder`; callers interact only with ID types.
pub(crate) struct ValueArena<'ctx> {
    values: Vec<BasicValueEnum<'ctx>>,
    types: Vec<BasicTypeEnum<'ctx>>,
    blocks: Vec<BasicBlock<'ctx>>,
    functions: Vec<FunctionValue<'ctx>>,
}

impl<'ctx> ValueArena<'ctx> {
    pub(crate) fn new() -> Self {
        Self {
            values: Vec::new(),
            types: Vec::new(),
            blocks: Vec::new(),
            functions: Vec::new(),
        }
    }

    #[inline]
    pub(crate) fn push_value(&mut self, val: BasicValueEnum<'ctx>) -> ValueId {
        let id = self.values.len() as u32;
        self.values.push(val);
        ValueId(id)
    }

    #[inline]
    pub(crate) fn get_value(&self, id: ValueId) -> BasicValueEnum<'ctx> {
        debug_assert!(
            (id.0 as usize) < self.values.len(),
            "ValueId {} out of bounds (arena has {} values)",
            id.0,
            self.values.len()
        );
        self.values[id.0 as usize]
    }

    #[inline]
    pub(crate) fn push_type(&mut self, ty: BasicTypeEnum<'ctx>) -> LLVMTypeId {
        let id = self.types.len() as u32;
        self.types.push(ty);
        LLVMTypeId(id)
    }

    #[inline]
    pub(crate) fn get_type(&self, id: LLVMTypeId) -> BasicTypeEnum<'ctx> {
        debug_assert!(
            (id.0 as usize) < self.types.len(),
            "LLVMTypeId {} out of bounds (arena has {} types)",
            id.0,
            self.types.len()
        );
        self.types[id.0 as usize]
    }

    #[inline]
    pub(crate) fn push_block(&mut self, bb: BasicBlock<'ctx>) -> BlockId {
        let id = self.blocks.len() as u32;
        self.blocks.push(bb);
        BlockId(id)
    }

    #[inline]
    pub(crate) fn get_block(&self, id: BlockId) -> BasicBlock<'ctx> {
        debug_assert!(
            (id.0 as usize) < self.blocks.len(),
            "BlockId {} out of bounds (arena has {} blocks)",
            id.0,
            self.blocks.len()
        );
        self.blocks[id.0 as usize]
    }

    #[inline]
    pub(crate) fn push_function(&mut self, func: FunctionValue<'ctx>) -> FunctionId {
        let id = self.functions.len() as u32;
        self.functions.push(func);
        FunctionId(id)
    }

    #[inline]
    pub(crate) fn get_function(&self, id: FunctionId) -> FunctionValue<'ctx> {
        debug_assert!(
            (id.0 as usize) < self.functions.len(),
            "FunctionId {} out of bounds (arena has {} functions)",
            id.0,
            self.functions.len()
        );
        self.functions[id.0 as usize]
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use inkwell::context::Context;

    #[test]
    fn none_sentinels() {
        assert!(ValueId::NONE.is_none());
        assert!(LLVMTypeId::NONE.is_none());
        assert!(BlockId::NONE.is_none());
        assert!(FunctionId::NONE.is_none());
        assert!(!ValueId(0).is_none());
        assert!(!BlockId(0).is_none());
    }

    #[test]
    fn push_get_roundtrip() {
        let ctx = Context::create();
        let mut arena = ValueArena::new();

        let int_val = ctx.i64_type().const_int(7, false);
        let vid = arena.push_value(int_val.into());
        assert_eq!(arena.get_value(vid).into_int_value(), int_val);

        let ty = ctx.i32_type();
        let tid = arena.push_type(ty.into());
        assert_eq!(arena.get_type(tid), ty.into());

        let module = ctx.create_module("test");
        let func = module.add_function("f", ctx.void_type().fn_type(&[], false), None);
        let bb = ctx.append_basic_block(func, "entry");
        let bid = arena.push_block(bb);
        assert_eq!(arena.get_block(bid), bb);

        let fid = arena.push_function(func);
        assert_eq!(arena.get_function(fid), func);
    }

    #[test]
    fn distinct_pushes_get_distinct_ids() {
        let ctx = Context::create();
        let mut arena = ValueArena::new();
        let a = arena.push_value(ctx.i64_type().const_int(1, false).into());
        let b = arena.push_value(ctx.i64_type().const_int(2, false).into());
        assert_ne!(a, b);
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn out_of_bounds_panics_in_debug() {
        let arena = ValueArena::new();
        let _ = arena.get_value(ValueId(0));
    }
}
