//! Statement lowering: dispatch and the simple statement forms.
//!
//! `StmtLowerer` owns the per-function lowering state (target scopes,
//! label table, per-case side tables, EH slots) and drives the expression,
//! type, declaration and debug collaborators. Construct-specific lowering
//! lives in sibling modules (`lower_loops`, `lower_switch`, `lower_eh`,
//! `cleanup`); they are `impl` blocks on this struct.
//!
//! The cursor discipline: after a terminating statement (`return`,
//! `throw`, `break`, `continue`, `goto`) the lowerer opens a fresh dead
//! "after-X" block so the cursor always points at an open block and
//! subsequent statements need no special-casing; the back-end prunes
//! unreachable blocks.

use delve_ir::{Loc, Name, StmtArena, StmtId, StmtKind, StringInterner, VarId};
use rustc_hash::FxHashMap;
use tracing::trace;

use crate::error::{LowerError, LowerResult};

use super::ir_builder::IrBuilder;
use super::label_table::LabelTable;
use super::target_scope::{TargetScope, TargetScopeStack};
use super::traits::{DebugSink, DeclLowering, ExprLowering, TypeLowering};
use super::value_id::{BlockId, FunctionId, LLVMTypeId, ValueId};

// ---------------------------------------------------------------------------
// Function-level descriptors
// ---------------------------------------------------------------------------

/// How the function returns its result.
#[derive(Clone, Copy, Debug)]
pub enum RetStyle {
    /// `void` return.
    Void,
    /// Value return with the given declared LLVM return type.
    Direct(LLVMTypeId),
    /// Struct return through a hidden pointer argument.
    Sret(ValueId),
}

/// Per-function facts the lowerer needs from the declaration phase.
pub struct FuncInfo {
    /// The LLVM function being filled in.
    pub func: FunctionId,
    /// Mangled name; prefixes scoped label names.
    pub mangle: String,
    /// Return convention.
    pub ret: RetStyle,
    /// Source file of the module, for `_d_switch_error`.
    pub source_file: String,
}

/// Text collected while lowering inside an inline-asm block.
///
/// Asm statements themselves are not lowered here; an embedder that does
/// lower them installs this state so labels inside the block turn into
/// asm text instead of basic blocks.
#[derive(Default)]
pub struct AsmBlockState {
    /// Accumulated asm lines.
    pub lines: Vec<String>,
    /// Labels defined inside the block.
    pub internal_labels: Vec<Name>,
}

// ---------------------------------------------------------------------------
// StmtLowerer
// ---------------------------------------------------------------------------

/// Lowers one function's statements into the CFG.
pub struct StmtLowerer<'a, 'scx, 'ctx> {
    pub(crate) b: &'a mut IrBuilder<'scx, 'ctx>,
    pub(crate) arena: &'a StmtArena,
    pub(crate) interner: &'a StringInterner,
    pub(crate) exprs: &'a mut dyn ExprLowering,
    pub(crate) types: &'a mut dyn TypeLowering,
    pub(crate) decls: &'a mut dyn DeclLowering,
    pub(crate) debug: Option<&'a mut dyn DebugSink>,
    pub(crate) func: FuncInfo,
    pub(crate) scopes: TargetScopeStack,
    pub(crate) labels: LabelTable,
    /// Case statement → its current body block. A stub may be preset by
    /// the enclosing switch (default) or a forward `goto case`.
    pub(crate) case_bodies: FxHashMap<StmtId, BlockId>,
    /// Case statement → its switch selector constant.
    pub(crate) case_selectors: FxHashMap<StmtId, ValueId>,
    /// Lazily created `(exception ptr, selector)` spill slots.
    pub(crate) eh_slots: Option<(ValueId, ValueId)>,
    /// Active inline-asm block, if the embedder installed one.
    pub(crate) asm_block: Option<AsmBlockState>,
}

impl<'a, 'scx, 'ctx> StmtLowerer<'a, 'scx, 'ctx> {
    /// Begin lowering a function: creates the `entry`/`endentry` block pair
    /// and points the cursor at it.
    ///
    /// `endentry` is the initial end anchor; it stays behind as a dead
    /// block for the back-end to prune.
    pub fn new(
        b: &'a mut IrBuilder<'scx, 'ctx>,
        arena: &'a StmtArena,
        interner: &'a StringInterner,
        exprs: &'a mut dyn ExprLowering,
        types: &'a mut dyn TypeLowering,
        decls: &'a mut dyn DeclLowering,
        debug: Option<&'a mut dyn DebugSink>,
        func: FuncInfo,
    ) -> Self {
        debug_assert!(b.pads.is_empty(), "landing pads leaked from previous function");
        let entry = b.append_block(func.func, "entry");
        let endentry = b.append_block(func.func, "endentry");
        b.set_current_function(func.func);
        b.set_cursor(entry, endentry);
        StmtLowerer {
            b,
            arena,
            interner,
            exprs,
            types,
            decls,
            debug,
            func,
            scopes: TargetScopeStack::new(),
            labels: LabelTable::new(),
            case_bodies: FxHashMap::default(),
            case_selectors: FxHashMap::default(),
            eh_slots: None,
            asm_block: None,
        }
    }

    /// Install inline-asm block state; subsequent labels emit asm text.
    pub fn set_asm_block(&mut self, state: AsmBlockState) {
        self.asm_block = Some(state);
    }

    /// Remove and return the inline-asm block state.
    pub fn take_asm_block(&mut self) -> Option<AsmBlockState> {
        self.asm_block.take()
    }

    /// Close the function: a fall-through cursor gets the implicit return.
    pub fn finish(&mut self) {
        if !self.b.scope_returned() {
            self.func_end();
            match self.func.ret {
                RetStyle::Void | RetStyle::Sret(_) => self.b.ret_void(),
                RetStyle::Direct(ty) => {
                    let zero = self.b.const_zero(ty);
                    self.b.ret(zero);
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    /// Lower one statement.
    pub fn lower(&mut self, id: StmtId) -> LowerResult {
        let arena = self.arena;
        let stmt = arena.get(id);
        trace!(kind = stmt.kind.name(), line = stmt.loc.line(), "lower stmt");

        match &stmt.kind {
            StmtKind::Compound(children) => {
                for &child in children {
                    self.lower(child)?;
                }
                Ok(())
            }
            StmtKind::Scope(inner) => match inner {
                Some(inner) => self.lower(*inner),
                None => Ok(()),
            },
            StmtKind::Exp(exp) => {
                self.stop_point(stmt.loc);
                // a cast(void) around the expression only evaluates the
                // operand for side effects
                match self.exprs.as_void_cast(*exp) {
                    Some(inner) => {
                        self.exprs.lower_expr(self.b, inner);
                    }
                    None => {
                        self.exprs.lower_expr(self.b, *exp);
                    }
                }
                Ok(())
            }
            StmtKind::If {
                match_var,
                cond,
                then_body,
                else_body,
            } => self.lower_if(stmt.loc, *match_var, *cond, *then_body, *else_body),
            StmtKind::While { cond, body } => self.lower_while(id, stmt.loc, *cond, *body),
            StmtKind::DoWhile { body, cond } => self.lower_do_while(id, stmt.loc, *body, *cond),
            StmtKind::For {
                init,
                cond,
                increment,
                body,
            } => self.lower_for(id, stmt.loc, *init, *cond, *increment, *body),
            StmtKind::UnrolledLoop(children) => {
                self.lower_unrolled_loop(id, stmt.loc, children)
            }
            StmtKind::Foreach {
                op,
                key,
                value,
                value_by_ref,
                aggr,
                body,
            } => self.lower_foreach(id, stmt.loc, *op, *key, *value, *value_by_ref, *aggr, *body),
            StmtKind::ForeachRange {
                op,
                key,
                lower,
                upper,
                body,
            } => self.lower_foreach_range(id, stmt.loc, *op, *key, *lower, *upper, *body),
            StmtKind::Break { label } => self.lower_break(stmt.loc, *label),
            StmtKind::Continue { label } => self.lower_continue(stmt.loc, *label),
            StmtKind::Return { exp } => self.lower_return(stmt.loc, *exp),
            StmtKind::Switch {
                cond,
                kind,
                cases,
                default,
                body,
            } => self.lower_switch(id, stmt.loc, *cond, *kind, cases, *default, *body),
            StmtKind::Case { exp, body } => self.lower_case(id, *exp, *body),
            StmtKind::Default { body } => self.lower_default(id, *body),
            StmtKind::Goto {
                ident,
                enclosing_scope,
            } => self.lower_goto(stmt.loc, *ident, *enclosing_scope),
            StmtKind::GotoCase { switch, case } => {
                self.lower_goto_case(stmt.loc, *switch, *case)
            }
            StmtKind::GotoDefault { switch } => self.lower_goto_default(stmt.loc, *switch),
            StmtKind::Label { ident, stmt: inner } => self.lower_label(id, *ident, *inner),
            StmtKind::TryFinally { body, finalbody } => {
                self.lower_try_finally(id, stmt.loc, *body, *finalbody)
            }
            StmtKind::TryCatch { body, catches } => {
                self.lower_try_catch(stmt.loc, *body, catches)
            }
            StmtKind::Throw { exp } => self.lower_throw(stmt.loc, *exp),
            StmtKind::Synchronized { exp, body } => {
                self.lower_synchronized(id, stmt.loc, *exp, *body)
            }
            StmtKind::Volatile { stmt: inner } => self.lower_volatile(id, stmt.loc, *inner),
            StmtKind::With { exp, wthis, body } => {
                self.lower_with(stmt.loc, *exp, *wthis, *body)
            }
            StmtKind::SwitchError => self.lower_switch_error(stmt.loc),
            // scope-exit actions were already rewritten into try-finally
            // by the front-end
            StmtKind::OnScope { .. } => Ok(()),
            StmtKind::Asm | StmtKind::Pragma { .. } => Err(LowerError::Unsupported {
                kind: stmt.kind.name(),
                line: stmt.loc.line(),
            }),
        }
    }

    // -----------------------------------------------------------------------
    // If
    // -----------------------------------------------------------------------

    fn lower_if(
        &mut self,
        loc: Loc,
        match_var: Option<VarId>,
        cond: delve_ir::ExprId,
        then_body: StmtId,
        else_body: Option<StmtId>,
    ) -> LowerResult {
        self.stop_point(loc);

        if let Some(var) = match_var {
            self.decls.declare_raw(self.b, var);
        }

        let cond_e = self.exprs.lower_expr(self.b, cond);
        let cond_val = if self.b.value_is_i1(cond_e.value) {
            cond_e.value
        } else {
            self.exprs.cast_to_bool(self.b, cond_e)
        };

        let oldend = self.b.cursor_end();
        let ifbb = self.b.new_block_before("if", oldend);
        let endbb = self.b.new_block_before("endif", oldend);
        let elsebb = if else_body.is_some() {
            self.b.new_block_before("else", endbb)
        } else {
            endbb
        };

        self.b.cond_br(cond_val, ifbb, elsebb);

        self.b.set_cursor(ifbb, elsebb);
        self.lower(then_body)?;
        if !self.b.scope_returned() {
            self.b.br(endbb);
        }

        if let Some(else_body) = else_body {
            self.b.set_cursor(elsebb, endbb);
            self.lower(else_body)?;
            if !self.b.scope_returned() {
                self.b.br(endbb);
            }
        }

        self.b.set_cursor(endbb, oldend);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Return
    // -----------------------------------------------------------------------

    fn lower_return(&mut self, loc: Loc, exp: Option<delve_ir::ExprId>) -> LowerResult {
        match exp {
            Some(exp) => match self.func.ret {
                RetStyle::Sret(ret_ptr) => {
                    self.stop_point(loc);
                    // store through the hidden return pointer, then return void
                    let val = self.exprs.lower_expr(self.b, exp);
                    self.decls.assign(self.b, ret_ptr, val);
                    self.emit_cleanups(None)?;
                    self.func_end();
                    if !self.b.scope_returned() {
                        self.b.ret_void();
                    }
                }
                RetStyle::Direct(ret_ty) => {
                    self.stop_point(loc);
                    let val = self.exprs.lower_expr(self.b, exp);
                    let mut v = self.exprs.put_ret(self.b, val);
                    // can differ for covariant class returns; plain bitcast
                    if self.b.raw_value(v).get_type() != self.b.raw_type(ret_ty) {
                        v = self.b.bitcast(v, ret_ty, "tmp");
                    }
                    self.emit_cleanups(None)?;
                    self.func_end();
                    if !self.b.scope_returned() {
                        self.b.ret(v);
                    }
                }
                RetStyle::Void => unreachable!("value return in void function"),
            },
            None => {
                assert!(
                    matches!(self.func.ret, RetStyle::Void),
                    "bare return in non-void function"
                );
                self.emit_cleanups(None)?;
                self.func_end();
                if !self.b.scope_returned() {
                    self.b.ret_void();
                }
            }
        }

        // the return terminated this block, start a new one
        self.open_dead_block("afterreturn");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Break / Continue
    // -----------------------------------------------------------------------

    fn lower_break(&mut self, loc: Loc, label: Option<StmtId>) -> LowerResult {
        // don't emit two terminators in a row; happens just before sema-
        // generated default statements when the last case terminates
        if self.b.scope_returned() {
            return Ok(());
        }
        self.stop_point(loc);

        if let Some(label_id) = label {
            self.emit_cleanups(Some(label_id))?;
            if !self.b.scope_returned() {
                let loop_stmt = self.label_target_stmt(label_id);
                let scope = *self
                    .scopes
                    .find(loop_stmt)
                    .expect("labeled break target not on scope stack");
                let dest = scope.break_bb.expect("break target accepts break");
                self.b.br(dest);
            }
        } else {
            let scope = *self
                .scopes
                .nearest_break()
                .expect("break outside breakable scope");
            self.emit_cleanups(Some(scope.stmt))?;
            if !self.b.scope_returned() {
                self.b.br(scope.break_bb.expect("scope has break target"));
            }
        }

        self.open_dead_block("afterbreak");
        Ok(())
    }

    fn lower_continue(&mut self, loc: Loc, label: Option<StmtId>) -> LowerResult {
        if self.b.scope_returned() {
            return Ok(());
        }
        self.stop_point(loc);

        if let Some(label_id) = label {
            self.emit_cleanups(Some(label_id))?;
            if !self.b.scope_returned() {
                let loop_stmt = self.label_target_stmt(label_id);
                let scope = *self
                    .scopes
                    .find(loop_stmt)
                    .expect("labeled continue target not on scope stack");
                let dest = scope.continue_bb.expect("continue target accepts continue");
                self.b.br(dest);
            }
        } else {
            let scope = *self
                .scopes
                .nearest_continue()
                .expect("continue outside loop");
            self.emit_cleanups(Some(scope.stmt))?;
            if !self.b.scope_returned() {
                self.b.br(scope.continue_bb.expect("scope has continue target"));
            }
        }

        self.open_dead_block("aftercontinue");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Goto / Label
    // -----------------------------------------------------------------------

    fn lower_goto(
        &mut self,
        loc: Loc,
        ident: Name,
        enclosing_scope: Option<StmtId>,
    ) -> LowerResult {
        self.stop_point(loc);

        let oldend = self.b.cursor_end();
        let after = self.b.new_block_before("aftergoto", oldend);

        let scoped = self.scoped_label_name(ident);
        let name = format!("label_{scoped}");
        let b = &mut *self.b;
        let label_bb = self
            .labels
            .get_or_create(&scoped, || b.new_block_before(&name, oldend));

        // leaving cleanup scopes up to the label's owner runs their
        // finalizers; the label's own scope is not exited
        self.emit_cleanups(enclosing_scope)?;
        if !self.b.scope_returned() {
            self.b.br(label_bb);
        }

        self.b.set_cursor(after, oldend);
        Ok(())
    }

    fn lower_label(&mut self, id: StmtId, ident: Name, inner: Option<StmtId>) -> LowerResult {
        if let Some(asm) = self.asm_block.as_mut() {
            // inside an asm block the label becomes asm text, not a block
            let text = format!("{}_{}:", self.func.mangle, self.interner.resolve(ident));
            asm.lines.push(text);
            asm.internal_labels.push(ident);
            // asm labels make the function position-dependent
            self.b.add_noinline_attribute(self.func.func);
        } else {
            let scoped = self.scoped_label_name(ident);
            let oldend = self.b.cursor_end();
            let label_bb = match self.labels.get(&scoped) {
                Some(bb) => {
                    // a forward goto created the block; put it in order now
                    self.b.move_block_before(bb, oldend);
                    bb
                }
                None => {
                    let name = format!("label_{scoped}");
                    let bb = self.b.new_block_before(&name, oldend);
                    self.labels.get_or_create(&scoped, || bb)
                }
            };

            if !self.b.scope_returned() {
                self.b.br(label_bb);
            }
            self.b.set_cursor(label_bb, oldend);
        }

        if let Some(inner) = inner {
            // neutral scope: gives labeled break/continue and the cleanup
            // walk an identity to stop at
            self.scopes.push(TargetScope {
                stmt: id,
                cleanup: None,
                break_bb: None,
                continue_bb: None,
            });
            let result = self.lower(inner);
            self.scopes.pop();
            result?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Shared helpers
    // -----------------------------------------------------------------------

    /// Debug stop point at a statement boundary.
    pub(crate) fn stop_point(&mut self, loc: Loc) {
        if let Some(debug) = self.debug.as_mut() {
            debug.stop_point(self.b, loc.line());
        }
    }

    /// Debug function-end marker, emitted before each `ret`.
    pub(crate) fn func_end(&mut self) {
        if let Some(debug) = self.debug.as_mut() {
            debug.func_end(self.b);
        }
    }

    /// Open a fresh dead block after a terminator and move the cursor there.
    pub(crate) fn open_dead_block(&mut self, name: &str) {
        let end = self.b.cursor_end();
        let bb = self.b.new_block_before(name, end);
        self.b.set_cursor(bb, end);
    }

    /// Scoped label name: function mangle + label identifier.
    pub(crate) fn scoped_label_name(&self, ident: Name) -> String {
        format!("{}.{}", self.func.mangle, self.interner.resolve(ident))
    }

    /// The loop/switch statement a label ultimately names, unwrapping
    /// scope wrappers.
    fn label_target_stmt(&self, label_id: StmtId) -> StmtId {
        let StmtKind::Label { stmt, .. } = self.arena.kind(label_id) else {
            panic!("break/continue target is not a label statement");
        };
        let mut cur = stmt.expect("labeled jump targets a statement");
        loop {
            match self.arena.kind(cur) {
                StmtKind::Scope(Some(inner)) => cur = *inner,
                _ => return cur,
            }
        }
    }

    /// The per-function EH spill slots, created on first use.
    pub(crate) fn get_eh_slots(&mut self) -> (ValueId, ValueId) {
        if let Some(slots) = self.eh_slots {
            return slots;
        }
        let func = self.b.current_function();
        let ptr_ty = self.b.ptr_type();
        let i32_ty = self.b.i32_type();
        let exn = self.b.create_entry_alloca(func, "eh.ptr", ptr_ty);
        let sel = self.b.create_entry_alloca(func, "eh.selector", i32_ty);
        self.eh_slots = Some((exn, sel));
        (exn, sel)
    }
}
