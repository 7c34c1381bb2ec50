//! Shared test infrastructure: a tiny expression language, mock
//! collaborators over it, and CFG introspection helpers.
//!
//! Tests hand-build statement trees over [`TestAst`], lower them with the
//! real `StmtLowerer` into a real LLVM module, and assert on the produced
//! blocks and instructions.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use inkwell::basic_block::BasicBlock;
use inkwell::context::Context;
use inkwell::values::{BasicValueEnum, FunctionValue, InstructionOpcode, InstructionValue};

use delve_ir::{
    CharWidth, ExprId, Loc, StmtArena, StmtId, StmtKind, StringInterner, StringLit, TyId, VarId,
};

use crate::codegen::traits::{DebugSink, DeclLowering, ExprLowering, ExprVal, TypeLowering};
use crate::codegen::{declare_runtime, FuncInfo, IrBuilder, LLVMTypeId, RetStyle, StmtLowerer, ValueId};
use crate::context::SimpleCx;

// ---------------------------------------------------------------------------
// Test types
// ---------------------------------------------------------------------------

pub const TY_I64: TyId = TyId::from_raw(1);
pub const TY_U64: TyId = TyId::from_raw(2);
pub const TY_BOOL: TyId = TyId::from_raw(3);
pub const TY_PTR: TyId = TyId::from_raw(4);
pub const TY_STR: TyId = TyId::from_raw(5);
pub const TY_I32: TyId = TyId::from_raw(6);

/// LLVM type for a test `TyId`.
pub fn lltype_of(b: &mut IrBuilder<'_, '_>, ty: TyId) -> LLVMTypeId {
    match ty {
        t if t == TY_BOOL => b.bool_type(),
        t if t == TY_PTR => b.ptr_type(),
        t if t == TY_STR => b.slice_type(),
        t if t == TY_I32 => b.i32_type(),
        _ => b.isize_type(),
    }
}

// ---------------------------------------------------------------------------
// Test expressions and AST container
// ---------------------------------------------------------------------------

/// The little expression language the mock collaborator understands.
#[derive(Clone, Debug)]
pub enum TestExpr {
    /// `i64` constant.
    Int(i64),
    /// `i1` constant.
    Bool(bool),
    /// UTF-8 string literal, lowered to a constant slice.
    Str(&'static str),
    /// Function parameter by index.
    Param(u32, TyId),
    /// Null object reference.
    NullPtr,
    /// `cast(void)` wrapper.
    VoidCast(ExprId),
    /// Load of a declared variable.
    VarRef(VarId),
    /// Call to a named external marker function; the workhorse for
    /// observing emission order in tests.
    CallMarker(&'static str),
}

/// Statements + expressions + variables for one test function.
#[derive(Default)]
pub struct TestAst {
    pub stmts: StmtArena,
    pub exprs: Vec<TestExpr>,
    pub var_types: HashMap<VarId, TyId>,
    pub interner: StringInterner,
    next_var: u32,
}

impl TestAst {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(&self, s: &str) -> delve_ir::Name {
        self.interner.intern(s)
    }

    pub fn expr(&mut self, e: TestExpr) -> ExprId {
        let id = ExprId::from_raw(self.exprs.len() as u32);
        self.exprs.push(e);
        id
    }

    pub fn var(&mut self, ty: TyId) -> VarId {
        let id = VarId::from_raw(self.next_var);
        self.next_var += 1;
        self.var_types.insert(id, ty);
        id
    }

    pub fn stmt(&mut self, kind: StmtKind) -> StmtId {
        self.stmts.alloc(kind, Loc::new(1))
    }

    pub fn stmt_at(&mut self, kind: StmtKind, line: u32) -> StmtId {
        self.stmts.alloc(kind, Loc::new(line))
    }

    /// Shorthand: a marker-call expression statement.
    pub fn marker(&mut self, name: &'static str) -> StmtId {
        let e = self.expr(TestExpr::CallMarker(name));
        self.stmt(StmtKind::Exp(e))
    }
}

// ---------------------------------------------------------------------------
// Mock collaborators
// ---------------------------------------------------------------------------

pub type VarStorage = Rc<RefCell<HashMap<VarId, ValueId>>>;

pub struct TestExprs<'t> {
    ast: &'t TestAst,
    storage: VarStorage,
}

impl<'t> TestExprs<'t> {
    pub fn new(ast: &'t TestAst, storage: VarStorage) -> Self {
        TestExprs { ast, storage }
    }

    fn get(&self, id: ExprId) -> &TestExpr {
        &self.ast.exprs[id.raw() as usize]
    }
}

impl ExprLowering for TestExprs<'_> {
    fn lower_expr(&mut self, b: &mut IrBuilder<'_, '_>, expr: ExprId) -> ExprVal {
        match *self.get(expr) {
            TestExpr::Int(v) => {
                let ty = b.isize_type();
                ExprVal {
                    value: b.const_int(ty, v as u64, v < 0),
                    ty: TY_I64,
                }
            }
            TestExpr::Bool(v) => ExprVal {
                value: b.const_bool(v),
                ty: TY_BOOL,
            },
            TestExpr::Str(s) => {
                let scx = b.scx();
                let data = scx.llcx.const_string(s.as_bytes(), false);
                let name = b.unique_global_name(".teststr");
                let data_ptr = b.add_internal_constant(data.into(), &name);
                let scx = b.scx();
                let len = scx.isize_ty.const_int(s.len() as u64, false);
                let slice = scx
                    .llcx
                    .const_struct(&[len.into(), b.raw_value(data_ptr)], false);
                ExprVal {
                    value: b.intern_value(slice.into()),
                    ty: TY_STR,
                }
            }
            TestExpr::Param(index, ty) => {
                let func = b.current_function();
                ExprVal {
                    value: b.get_param(func, index),
                    ty,
                }
            }
            TestExpr::NullPtr => ExprVal {
                value: b.const_null_ptr(),
                ty: TY_PTR,
            },
            TestExpr::VoidCast(inner) => self.lower_expr(b, inner),
            TestExpr::VarRef(var) => {
                let ty = self.ast.var_types[&var];
                let llty = lltype_of(b, ty);
                let slot = self.storage.borrow()[&var];
                ExprVal {
                    value: b.load(llty, slot, "tmp"),
                    ty,
                }
            }
            TestExpr::CallMarker(name) => {
                let func = b.declare_extern_function(name, &[], None);
                b.call_or_invoke(func, &[], "");
                let ty = b.isize_type();
                ExprVal {
                    value: b.const_int(ty, 0, false),
                    ty: TY_I64,
                }
            }
        }
    }

    fn lower_const(&mut self, b: &mut IrBuilder<'_, '_>, expr: ExprId) -> ValueId {
        match *self.get(expr) {
            TestExpr::Int(v) => {
                let ty = b.isize_type();
                b.const_int(ty, v as u64, v < 0)
            }
            ref other => panic!("not a constant test expression: {other:?}"),
        }
    }

    fn cast_to_bool(&mut self, b: &mut IrBuilder<'_, '_>, val: ExprVal) -> ValueId {
        if b.value_is_i1(val.value) {
            return val.value;
        }
        let int_ty = b.raw_value(val.value).into_int_value().get_type();
        let ty = b.register_type(int_ty.into());
        let zero = b.const_int(ty, 0, false);
        b.icmp_ne(val.value, zero, "tobool")
    }

    fn cast_to(&mut self, _b: &mut IrBuilder<'_, '_>, val: ExprVal, ty: TyId) -> ExprVal {
        ExprVal {
            value: val.value,
            ty,
        }
    }

    fn as_void_cast(&self, expr: ExprId) -> Option<ExprId> {
        match *self.get(expr) {
            TestExpr::VoidCast(inner) => Some(inner),
            _ => None,
        }
    }

    fn string_literal(&self, expr: ExprId) -> StringLit {
        match *self.get(expr) {
            TestExpr::Str(s) => StringLit {
                width: CharWidth::C8,
                units: s.bytes().map(u32::from).collect(),
            },
            ref other => panic!("not a string literal: {other:?}"),
        }
    }

    fn array_len(&mut self, b: &mut IrBuilder<'_, '_>, aggr: ExprVal) -> ValueId {
        b.extract_value(aggr.value, 0, "len")
    }

    fn array_ptr(&mut self, b: &mut IrBuilder<'_, '_>, aggr: ExprVal) -> ValueId {
        b.extract_value(aggr.value, 1, "ptr")
    }
}

pub struct TestTypes;

impl TypeLowering for TestTypes {
    fn lower_type(&mut self, b: &mut IrBuilder<'_, '_>, ty: TyId) -> LLVMTypeId {
        lltype_of(b, ty)
    }

    fn size_t_type(&mut self, b: &mut IrBuilder<'_, '_>) -> LLVMTypeId {
        b.isize_type()
    }

    fn is_unsigned(&self, ty: TyId) -> bool {
        ty == TY_U64
    }

    fn type_info_global(&mut self, b: &mut IrBuilder<'_, '_>, ty: TyId) -> ValueId {
        let name = format!(".typeinfo.{}", ty.raw());
        if let Some(global) = b.scx().llmod.get_global(&name) {
            return b.intern_value(global.as_pointer_value().into());
        }
        let init = b.scx().type_i8().const_int(0, false);
        b.add_internal_constant(init.into(), &name)
    }
}

pub struct TestDecls<'t> {
    ast: &'t TestAst,
    storage: VarStorage,
}

impl<'t> TestDecls<'t> {
    pub fn new(ast: &'t TestAst, storage: VarStorage) -> Self {
        TestDecls { ast, storage }
    }
}

impl DeclLowering for TestDecls<'_> {
    fn declare_raw(&mut self, b: &mut IrBuilder<'_, '_>, var: VarId) -> ValueId {
        let ty = self.var_type(var);
        let llty = lltype_of(b, ty);
        let func = b.current_function();
        let slot = b.create_entry_alloca(func, &format!("var{}", var.raw()), llty);
        self.storage.borrow_mut().insert(var, slot);
        slot
    }

    fn bind(&mut self, var: VarId, storage: ValueId) {
        self.storage.borrow_mut().insert(var, storage);
    }

    fn assign(&mut self, b: &mut IrBuilder<'_, '_>, dest_ptr: ValueId, src: ExprVal) {
        b.store(src.value, dest_ptr);
    }

    fn var_type(&self, var: VarId) -> TyId {
        self.ast.var_types.get(&var).copied().unwrap_or(TY_I64)
    }
}

/// Records debug callbacks so tests can check statement boundaries.
#[derive(Default)]
pub struct RecordingDebug {
    pub stops: Vec<u32>,
    pub func_ends: u32,
}

impl DebugSink for RecordingDebug {
    fn stop_point(&mut self, _b: &mut IrBuilder<'_, '_>, line: u32) {
        self.stops.push(line);
    }

    fn func_end(&mut self, _b: &mut IrBuilder<'_, '_>) {
        self.func_ends += 1;
    }
}

/// A `FuncInfo` for a test function.
pub fn func_info(func: crate::codegen::FunctionId, ret: RetStyle) -> FuncInfo {
    FuncInfo {
        func,
        mangle: "f".to_owned(),
        ret,
        source_file: "test.dlv".to_owned(),
    }
}

// ---------------------------------------------------------------------------
// Lowering harness
// ---------------------------------------------------------------------------

/// A lowered test function with its module kept alive.
pub struct Lowered<'ctx> {
    pub scx: SimpleCx<'ctx>,
    pub func: FunctionValue<'ctx>,
}

/// Lower `root` as the body of `fn f(params...) -> ret` and return the
/// function for CFG assertions. Panics on lowering errors.
pub fn lower_fn<'ctx>(
    ctx: &'ctx Context,
    ast: &TestAst,
    root: StmtId,
    param_tys: &[TyId],
    ret: Option<TyId>,
) -> Lowered<'ctx> {
    crate::init_tracing();
    let scx = SimpleCx::new(ctx, "t");
    let func_value;
    {
        let mut b = IrBuilder::new(&scx);
        declare_runtime(&mut b);

        let params: Vec<LLVMTypeId> = param_tys.iter().map(|&t| lltype_of(&mut b, t)).collect();
        let ret_ll = ret.map(|t| lltype_of(&mut b, t));
        let func = b.declare_function("f", &params, ret_ll);
        let ret_style = match ret_ll {
            Some(ty) => RetStyle::Direct(ty),
            None => RetStyle::Void,
        };

        let storage: VarStorage = Rc::new(RefCell::new(HashMap::new()));
        let mut exprs = TestExprs::new(ast, storage.clone());
        let mut types = TestTypes;
        let mut decls = TestDecls::new(ast, storage);

        let mut lower = StmtLowerer::new(
            &mut b,
            &ast.stmts,
            &ast.interner,
            &mut exprs,
            &mut types,
            &mut decls,
            None,
            func_info(func, ret_style),
        );
        lower.lower(root).expect("lowering succeeds");
        lower.finish();
        drop(lower);
        func_value = b.raw_function(func);
    }
    Lowered {
        scx,
        func: func_value,
    }
}

// ---------------------------------------------------------------------------
// CFG introspection
// ---------------------------------------------------------------------------

/// Block names in textual order.
pub fn block_names(func: FunctionValue<'_>) -> Vec<String> {
    func.get_basic_blocks()
        .iter()
        .map(|bb| bb.get_name().to_string_lossy().into_owned())
        .collect()
}

/// First block with the given name.
pub fn find_block<'ctx>(func: FunctionValue<'ctx>, name: &str) -> BasicBlock<'ctx> {
    func.get_basic_blocks()
        .into_iter()
        .find(|bb| bb.get_name().to_string_lossy() == name)
        .unwrap_or_else(|| panic!("no block named '{name}'"))
}

/// All instructions of a block, in order.
pub fn instructions(bb: BasicBlock<'_>) -> Vec<InstructionValue<'_>> {
    let mut out = Vec::new();
    let mut cur = bb.get_first_instruction();
    while let Some(instr) = cur {
        cur = instr.get_next_instruction();
        out.push(instr);
    }
    out
}

/// Names of the block operands of an instruction (branch/invoke targets).
pub fn successor_names(instr: InstructionValue<'_>) -> Vec<String> {
    let mut out = Vec::new();
    for i in 0..instr.get_num_operands() {
        if let Some(either) = instr.get_operand(i) {
            if let Some(bb) = either.right() {
                out.push(bb.get_name().to_string_lossy().into_owned());
            }
        }
    }
    out
}

/// Callee name of a call or invoke instruction.
pub fn callee_name(instr: InstructionValue<'_>) -> Option<String> {
    if !matches!(
        instr.get_opcode(),
        InstructionOpcode::Call | InstructionOpcode::Invoke
    ) {
        return None;
    }
    let last = instr.get_operand(instr.get_num_operands() - 1)?;
    let value: BasicValueEnum<'_> = last.left()?;
    if !value.is_pointer_value() {
        return None;
    }
    Some(
        value
            .into_pointer_value()
            .get_name()
            .to_string_lossy()
            .into_owned(),
    )
}

/// Callee names across the whole function, in block then instruction order.
pub fn call_sequence(func: FunctionValue<'_>) -> Vec<String> {
    let mut out = Vec::new();
    for bb in func.get_basic_blocks() {
        for instr in instructions(bb) {
            if let Some(name) = callee_name(instr) {
                out.push(name);
            }
        }
    }
    out
}

/// Count instructions with an opcode across the whole function.
pub fn count_opcode(func: FunctionValue<'_>, opcode: InstructionOpcode) -> usize {
    func.get_basic_blocks()
        .iter()
        .flat_map(|&bb| instructions(bb))
        .filter(|i| i.get_opcode() == opcode)
        .count()
}

/// The terminator opcode of a named block.
pub fn terminator_opcode(func: FunctionValue<'_>, block: &str) -> InstructionOpcode {
    find_block(func, block)
        .get_terminator()
        .unwrap_or_else(|| panic!("block '{block}' has no terminator"))
        .get_opcode()
}

/// `(selector, destination block)` pairs of a `switch` instruction.
pub fn switch_cases(instr: InstructionValue<'_>) -> Vec<(u64, BasicBlock<'_>)> {
    assert_eq!(instr.get_opcode(), InstructionOpcode::Switch);
    let mut out = Vec::new();
    let mut i = 2;
    while i + 1 < instr.get_num_operands() {
        let value = instr
            .get_operand(i)
            .and_then(|op| op.left())
            .expect("switch case value");
        let dest = instr
            .get_operand(i + 1)
            .and_then(|op| op.right())
            .expect("switch case destination");
        out.push((
            value
                .into_int_value()
                .get_zero_extended_constant()
                .expect("constant selector"),
            dest,
        ));
        i += 2;
    }
    out
}

/// Callee names of the calls/invokes inside one block, in order.
pub fn block_callees(bb: BasicBlock<'_>) -> Vec<String> {
    instructions(bb).into_iter().filter_map(callee_name).collect()
}
