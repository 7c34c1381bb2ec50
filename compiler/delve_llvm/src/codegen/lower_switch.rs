//! Switch lowering: integral and string switches, case/default labels,
//! `goto case`/`goto default`, and the no-match trap.
//!
//! String switches build a sorted constant table of the case literals and
//! dispatch through the runtime's binary search, which returns the sorted
//! index (or -1); each case's selector is its post-sort index.
//!
//! The `switch` terminator itself is emitted into the pre-body block only
//! after the body has been lowered, once every case's final body block is
//! known; the emitted IR is the same as terminator-first construction with
//! backpatched case edges.

use delve_ir::{CharWidth, ExprId, Loc, StmtId, StmtKind, StringLit, SwitchKind};
use inkwell::values::{BasicValueEnum, IntValue, StructValue};
use tracing::debug;

use crate::error::LowerResult;

use super::stmt_lowerer::StmtLowerer;
use super::target_scope::TargetScope;
use super::value_id::ValueId;

impl<'a, 'scx, 'ctx> StmtLowerer<'a, 'scx, 'ctx> {
    // -----------------------------------------------------------------------
    // Switch
    // -----------------------------------------------------------------------

    pub(crate) fn lower_switch(
        &mut self,
        id: StmtId,
        loc: Loc,
        cond: ExprId,
        kind: SwitchKind,
        cases: &[StmtId],
        default: Option<StmtId>,
        body: StmtId,
    ) -> LowerResult {
        self.stop_point(loc);

        // clear per-case state left by any previous lowering of this tree
        for &case in cases {
            self.case_bodies.remove(&case);
            self.case_selectors.remove(&case);
        }
        if let Some(default) = default {
            self.case_bodies.remove(&default);
        }

        // condition value; string switches dispatch on the runtime's index
        let cond_val = match kind {
            SwitchKind::Integral => self.exprs.lower_expr(self.b, cond).value,
            SwitchKind::Str(width) => {
                debug!("string switch");
                self.build_string_switch(cond, width, cases)?
            }
        };

        let oldend = self.b.cursor_end();
        let bodybb = self.b.new_block_before("switchbody", oldend);
        let defbb = default.map(|d| {
            let bb = self.b.new_block_before("default", oldend);
            self.case_bodies.insert(d, bb);
            bb
        });
        let endbb = self.b.new_block_before("switchend", oldend);

        // the switch terminator goes here once the case blocks exist
        let switchbb = self.b.cursor_block();

        self.b.set_cursor(bodybb, endbb);
        self.scopes.push(TargetScope {
            stmt: id,
            cleanup: None,
            break_bb: Some(endbb),
            continue_bb: None,
        });
        let result = self.lower(body);
        self.scopes.pop();
        result?;

        if !self.b.scope_returned() {
            self.b.br(endbb);
        }

        // backpatch: selector -> final case body block
        let mut edges = Vec::with_capacity(cases.len());
        for &case in cases {
            let selector = *self
                .case_selectors
                .get(&case)
                .expect("case selector assigned during switch body");
            let body_bb = *self
                .case_bodies
                .get(&case)
                .expect("case body lowered inside switch body");
            edges.push((selector, body_bb));
        }
        let fallback = defbb.unwrap_or(endbb);
        self.b.set_cursor(switchbb, endbb);
        self.b.switch(cond_val, fallback, &edges);

        self.b.set_cursor(endbb, oldend);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Case / Default
    // -----------------------------------------------------------------------

    pub(crate) fn lower_case(&mut self, id: StmtId, exp: ExprId, body: StmtId) -> LowerResult {
        let scopeend = self.b.cursor_end();
        let nbb = self.b.new_block_before("case", scopeend);

        // a forward `goto case` may have created a stub; chain it in
        if let Some(&stub) = self.case_bodies.get(&id) {
            if !self.b.block_has_terminator(stub) {
                self.b.br_from(stub, nbb);
            }
        }
        self.case_bodies.insert(id, nbb);

        if !self.case_selectors.contains_key(&id) {
            let selector = self.exprs.lower_const(self.b, exp);
            self.case_selectors.insert(id, selector);
        }

        // fall-through from the previous case body into this label
        if !self.b.scope_returned() {
            self.b.br(nbb);
        }

        self.b.set_cursor(nbb, scopeend);
        self.lower(body)
    }

    pub(crate) fn lower_default(&mut self, id: StmtId, body: StmtId) -> LowerResult {
        let scopeend = self.b.cursor_end();
        let nbb = self.b.new_block_before("default", scopeend);

        let stub = *self
            .case_bodies
            .get(&id)
            .expect("default registered by the enclosing switch");
        if !self.b.block_has_terminator(stub) {
            self.b.br_from(stub, nbb);
        }
        self.case_bodies.insert(id, nbb);

        if !self.b.scope_returned() {
            self.b.br(nbb);
        }

        self.b.set_cursor(nbb, scopeend);
        self.lower(body)
    }

    // -----------------------------------------------------------------------
    // Goto case / Goto default
    // -----------------------------------------------------------------------

    pub(crate) fn lower_goto_case(
        &mut self,
        loc: Loc,
        switch: StmtId,
        case: StmtId,
    ) -> LowerResult {
        self.stop_point(loc);

        let oldend = self.b.cursor_end();
        let after = self.b.new_block_before("aftergotocase", oldend);

        assert!(!self.b.scope_returned());
        if !self.case_bodies.contains_key(&case) {
            // jumping forward: park a stub the case will chain in later
            let stub = self.b.new_block_before("goto_case", oldend);
            self.case_bodies.insert(case, stub);
        }

        self.emit_cleanups(Some(switch))?;
        if !self.b.scope_returned() {
            let dest = self.case_bodies[&case];
            self.b.br(dest);
        }

        self.b.set_cursor(after, oldend);
        Ok(())
    }

    pub(crate) fn lower_goto_default(&mut self, loc: Loc, switch: StmtId) -> LowerResult {
        self.stop_point(loc);

        let oldend = self.b.cursor_end();
        let after = self.b.new_block_before("aftergotodefault", oldend);

        assert!(!self.b.scope_returned());
        let StmtKind::Switch { default, .. } = self.arena.kind(switch) else {
            panic!("goto default outside a switch");
        };
        let default = default.expect("goto default requires a default case");
        let dest = *self
            .case_bodies
            .get(&default)
            .expect("default block preassigned by the enclosing switch");

        self.emit_cleanups(Some(switch))?;
        if !self.b.scope_returned() {
            self.b.br(dest);
        }

        self.b.set_cursor(after, oldend);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // String switch table (runtime-assisted dispatch)
    // -----------------------------------------------------------------------

    /// Build the sorted literal table, assign each case its post-sort
    /// index as selector, and call the width-matched runtime search.
    /// Returns the runtime's result: the matched index, or -1.
    fn build_string_switch(
        &mut self,
        cond: ExprId,
        width: CharWidth,
        cases: &[StmtId],
    ) -> LowerResult<ValueId> {
        // collect (literal, original index) and sort by literal; keys are
        // unique by language rule, so sort stability is irrelevant
        let mut sorted: Vec<(StringLit, usize)> = cases
            .iter()
            .enumerate()
            .map(|(i, &case)| {
                let StmtKind::Case { exp, .. } = self.arena.kind(case) else {
                    panic!("switch case list holds a non-case statement");
                };
                (self.exprs.string_literal(*exp), i)
            })
            .collect();
        sorted.sort_by(|a, b| a.0.units.cmp(&b.0.units));

        let mut entries: Vec<StructValue<'ctx>> = Vec::with_capacity(sorted.len());
        for (sorted_index, (lit, original)) in sorted.iter().enumerate() {
            let selector = self.b.const_i32(sorted_index as i32);
            self.case_selectors.insert(cases[*original], selector);
            entries.push(self.string_slice_const(lit));
        }

        // module-scope data array of the sorted literal slices
        let slice_ty = self.b.scx().type_slice();
        let data = slice_ty.const_array(&entries);
        let data_name = self.b.unique_global_name(".string_switch_table_data");
        let data_ptr = self.b.add_internal_constant(data.into(), &data_name);

        // the table passed to the runtime: { size_t len, ptr data }
        let scx = self.b.scx();
        let len = scx.isize_ty.const_int(entries.len() as u64, false);
        let table = scx
            .llcx
            .const_struct(&[len.into(), self.b.raw_value(data_ptr)], false);
        let table_val = self.b.intern_value(table.into());

        let fname = match width {
            CharWidth::C8 => "_d_switch_string",
            CharWidth::C16 => "_d_switch_ustring",
            CharWidth::C32 => "_d_switch_dstring",
        };
        let func = self.b.runtime_function(fname);
        let cond_val = self.exprs.lower_expr(self.b, cond).value;
        let index = self
            .b
            .call_or_invoke(func, &[table_val, cond_val], "tmp")
            .expect("string switch runtime returns an index");
        Ok(index)
    }

    /// A constant `{ size_t len, ptr }` slice for one literal, with the
    /// code units parked in an internal global.
    fn string_slice_const(&mut self, lit: &StringLit) -> StructValue<'ctx> {
        let scx = self.b.scx();
        let data: BasicValueEnum<'ctx> = match lit.width {
            CharWidth::C8 => {
                let bytes: Vec<u8> = lit.units.iter().map(|&u| u as u8).collect();
                scx.llcx.const_string(&bytes, false).into()
            }
            CharWidth::C16 => {
                let units: Vec<IntValue<'ctx>> = lit
                    .units
                    .iter()
                    .map(|&u| scx.type_i16().const_int(u64::from(u), false))
                    .collect();
                scx.type_i16().const_array(&units).into()
            }
            CharWidth::C32 => {
                let units: Vec<IntValue<'ctx>> = lit
                    .units
                    .iter()
                    .map(|&u| scx.type_i32().const_int(u64::from(u), false))
                    .collect();
                scx.type_i32().const_array(&units).into()
            }
        };
        let name = self.b.unique_global_name(".str");
        let data_ptr = self.b.add_internal_constant(data, &name);

        let scx = self.b.scx();
        let len = scx.isize_ty.const_int(lit.units.len() as u64, false);
        scx.llcx
            .const_struct(&[len.into(), self.b.raw_value(data_ptr)], false)
    }

    // -----------------------------------------------------------------------
    // Switch error
    // -----------------------------------------------------------------------

    /// No-match trap for final switches: `_d_switch_error(file, line)`,
    /// then `unreachable`.
    pub(crate) fn lower_switch_error(&mut self, loc: Loc) -> LowerResult {
        let func = self.b.runtime_function("_d_switch_error");

        let file_global = self.b.file_name_global(&self.func.source_file);
        let slice_ty = self.b.slice_type();
        let file = self.b.load(slice_ty, file_global, "tmp");
        let line = self.b.const_u32(loc.line());

        self.b.call_or_invoke(func, &[file, line], "");
        self.b.unreachable();
        Ok(())
    }
}
