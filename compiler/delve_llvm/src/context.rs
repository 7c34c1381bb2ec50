//! Minimal LLVM context wrapper.
//!
//! `SimpleCx` bundles the LLVM context, the module under construction and
//! the handful of types the lowerer reaches for constantly. Everything
//! stateful about lowering lives in [`crate::IrBuilder`]; this type stays
//! cheap to borrow shared.

use inkwell::context::Context;
use inkwell::module::Module;
use inkwell::types::{
    BasicMetadataTypeEnum, BasicTypeEnum, FloatType, FunctionType, IntType, PointerType, StructType,
};
use inkwell::AddressSpace;

/// Simple LLVM context with minimal state.
pub struct SimpleCx<'ll> {
    /// The LLVM context (owns all LLVM types and values).
    pub llcx: &'ll Context,
    /// The LLVM module being compiled.
    pub llmod: Module<'ll>,
    /// Commonly used opaque pointer type.
    pub ptr_type: PointerType<'ll>,
    /// Machine word size type (i64 on 64-bit targets).
    pub isize_ty: IntType<'ll>,
}

impl<'ll> SimpleCx<'ll> {
    /// Create a new simple context.
    #[must_use]
    pub fn new(context: &'ll Context, module_name: &str) -> Self {
        let llmod = context.create_module(module_name);
        let ptr_type = context.ptr_type(AddressSpace::default());
        let isize_ty = context.i64_type(); // 64-bit target

        Self {
            llcx: context,
            llmod,
            ptr_type,
            isize_ty,
        }
    }

    // -- Type constructors --

    /// The `i1` type.
    #[inline]
    pub fn type_i1(&self) -> IntType<'ll> {
        self.llcx.bool_type()
    }

    /// The `i8` type.
    #[inline]
    pub fn type_i8(&self) -> IntType<'ll> {
        self.llcx.i8_type()
    }

    /// The `i16` type.
    #[inline]
    pub fn type_i16(&self) -> IntType<'ll> {
        self.llcx.i16_type()
    }

    /// The `i32` type.
    #[inline]
    pub fn type_i32(&self) -> IntType<'ll> {
        self.llcx.i32_type()
    }

    /// The `i64` type.
    #[inline]
    pub fn type_i64(&self) -> IntType<'ll> {
        self.llcx.i64_type()
    }

    /// The `f64` type.
    #[inline]
    pub fn type_f64(&self) -> FloatType<'ll> {
        self.llcx.f64_type()
    }

    /// The opaque pointer type.
    #[inline]
    pub fn type_ptr(&self) -> PointerType<'ll> {
        self.ptr_type
    }

    /// An anonymous (literal) struct type.
    #[inline]
    pub fn type_struct(&self, fields: &[BasicTypeEnum<'ll>], packed: bool) -> StructType<'ll> {
        self.llcx.struct_type(fields, packed)
    }

    /// A slice type `{ size_t len, ptr }`: the ABI shape of Delve arrays
    /// and strings, and of string-switch tables.
    pub fn type_slice(&self) -> StructType<'ll> {
        self.type_struct(&[self.isize_ty.into(), self.ptr_type.into()], false)
    }

    /// A void function type.
    #[inline]
    pub fn type_void_func(&self, params: &[BasicMetadataTypeEnum<'ll>]) -> FunctionType<'ll> {
        self.llcx.void_type().fn_type(params, false)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slice_type_is_len_then_ptr() {
        let ctx = Context::create();
        let scx = SimpleCx::new(&ctx, "test_cx");
        let slice = scx.type_slice();
        assert_eq!(slice.count_fields(), 2);
        assert!(slice.get_field_type_at_index(0).unwrap().is_int_type());
        assert!(slice.get_field_type_at_index(1).unwrap().is_pointer_type());
    }

    #[test]
    fn module_carries_the_given_name() {
        let ctx = Context::create();
        let scx = SimpleCx::new(&ctx, "unit_a");
        assert_eq!(scx.llmod.get_name().to_str().unwrap(), "unit_a");
    }
}
