//! Loop lowering: while, do-while, for, unrolled loops, foreach and
//! foreach over integer ranges.
//!
//! Every loop pushes a target scope carrying its `continue`/`break`
//! blocks around the body; the body's own lowering resolves jumps against
//! that stack. Loop-carried state (the foreach key) lives in an alloca so
//! no phi plumbing is needed; `mem2reg` promotes it later.

use delve_ir::{ExprId, ForeachOp, Loc, StmtId, VarId};
use inkwell::IntPredicate;

use crate::error::LowerResult;

use super::stmt_lowerer::StmtLowerer;
use super::target_scope::TargetScope;
use super::traits::ExprVal;

impl StmtLowerer<'_, '_, '_> {
    // -----------------------------------------------------------------------
    // While
    // -----------------------------------------------------------------------

    pub(crate) fn lower_while(
        &mut self,
        id: StmtId,
        loc: Loc,
        cond: ExprId,
        body: StmtId,
    ) -> LowerResult {
        self.stop_point(loc);

        let oldend = self.b.cursor_end();
        let condbb = self.b.new_block_before("whilecond", oldend);
        let bodybb = self.b.new_block_before("whilebody", oldend);
        let endbb = self.b.new_block_before("endwhile", oldend);

        self.b.br(condbb);

        self.b.set_cursor(condbb, endbb);
        let cond_e = self.exprs.lower_expr(self.b, cond);
        let cond_val = self.exprs.cast_to_bool(self.b, cond_e);
        self.b.cond_br(cond_val, bodybb, endbb);

        self.b.set_cursor(bodybb, endbb);
        self.scopes.push(TargetScope {
            stmt: id,
            cleanup: None,
            break_bb: Some(endbb),
            continue_bb: Some(condbb),
        });
        let result = self.lower(body);
        self.scopes.pop();
        result?;

        if !self.b.scope_returned() {
            self.b.br(condbb);
        }

        self.b.set_cursor(endbb, oldend);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Do-while
    // -----------------------------------------------------------------------

    pub(crate) fn lower_do_while(
        &mut self,
        id: StmtId,
        loc: Loc,
        body: StmtId,
        cond: ExprId,
    ) -> LowerResult {
        self.stop_point(loc);

        let oldend = self.b.cursor_end();
        let bodybb = self.b.new_block_before("dowhile", oldend);
        let condbb = self.b.new_block_before("dowhilecond", oldend);
        let endbb = self.b.new_block_before("enddowhile", oldend);

        assert!(!self.b.scope_returned());
        self.b.br(bodybb);

        self.b.set_cursor(bodybb, condbb);
        self.scopes.push(TargetScope {
            stmt: id,
            cleanup: None,
            break_bb: Some(endbb),
            continue_bb: Some(condbb),
        });
        let result = self.lower(body);
        self.scopes.pop();
        result?;

        if !self.b.scope_returned() {
            self.b.br(condbb);
        }

        self.b.set_cursor(condbb, endbb);
        let cond_e = self.exprs.lower_expr(self.b, cond);
        let cond_val = self.exprs.cast_to_bool(self.b, cond_e);
        self.b.cond_br(cond_val, bodybb, endbb);

        self.b.set_cursor(endbb, oldend);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // For
    // -----------------------------------------------------------------------

    pub(crate) fn lower_for(
        &mut self,
        id: StmtId,
        loc: Loc,
        init: Option<StmtId>,
        cond: Option<ExprId>,
        increment: Option<ExprId>,
        body: StmtId,
    ) -> LowerResult {
        self.stop_point(loc);

        let oldend = self.b.cursor_end();
        let condbb = self.b.new_block_before("forcond", oldend);
        let bodybb = self.b.new_block_before("forbody", oldend);
        let incbb = self.b.new_block_before("forinc", oldend);
        let endbb = self.b.new_block_before("endfor", oldend);

        if let Some(init) = init {
            self.lower(init)?;
        }

        assert!(!self.b.scope_returned());
        self.b.br(condbb);

        self.scopes.push(TargetScope {
            stmt: id,
            cleanup: None,
            break_bb: Some(endbb),
            continue_bb: Some(incbb),
        });

        let result = (|| -> LowerResult {
            self.b.set_cursor(condbb, bodybb);
            let cond_val = match cond {
                Some(cond) => {
                    let cond_e = self.exprs.lower_expr(self.b, cond);
                    self.exprs.cast_to_bool(self.b, cond_e)
                }
                None => self.b.const_bool(true),
            };
            assert!(!self.b.scope_returned());
            self.b.cond_br(cond_val, bodybb, endbb);

            self.b.set_cursor(bodybb, incbb);
            self.lower(body)?;

            if !self.b.scope_returned() {
                self.b.br(incbb);
            }
            self.b.set_cursor(incbb, endbb);

            if let Some(increment) = increment {
                self.exprs.lower_expr(self.b, increment);
            }
            if !self.b.scope_returned() {
                self.b.br(condbb);
            }
            Ok(())
        })();
        self.scopes.pop();
        result?;

        self.b.set_cursor(endbb, oldend);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Unrolled loop
    // -----------------------------------------------------------------------

    /// One block per unrolled iteration: `continue` advances to the next
    /// iteration's block, `break` leaves the whole loop.
    pub(crate) fn lower_unrolled_loop(
        &mut self,
        id: StmtId,
        loc: Loc,
        children: &[StmtId],
    ) -> LowerResult {
        if children.is_empty() {
            return Ok(());
        }
        self.stop_point(loc);

        let oldend = self.b.cursor_end();
        let blocks: Vec<_> = children
            .iter()
            .map(|_| self.b.new_block_before("unrolledstmt", oldend))
            .collect();
        let endbb = self.b.new_block_before("unrolledend", oldend);

        if !self.b.scope_returned() {
            self.b.br(blocks[0]);
        }

        for (i, &child) in children.iter().enumerate() {
            let thisbb = blocks[i];
            let nextbb = blocks.get(i + 1).copied().unwrap_or(endbb);

            self.b.set_cursor(thisbb, nextbb);

            self.scopes.push(TargetScope {
                stmt: id,
                cleanup: None,
                break_bb: Some(endbb),
                continue_bb: Some(nextbb),
            });
            let result = self.lower(child);
            self.scopes.pop();
            result?;

            if !self.b.scope_returned() {
                self.b.br(nextbb);
            }
        }

        self.b.set_cursor(endbb, oldend);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Foreach over arrays/slices
    // -----------------------------------------------------------------------

    pub(crate) fn lower_foreach(
        &mut self,
        id: StmtId,
        loc: Loc,
        op: ForeachOp,
        key: Option<VarId>,
        value: VarId,
        value_by_ref: bool,
        aggr: ExprId,
        body: Option<StmtId>,
    ) -> LowerResult {
        self.stop_point(loc);

        // the iteration index: declared key variable or a raw size_t slot
        let key_ty = match key {
            Some(var) => {
                let ty = self.decls.var_type(var);
                self.types.lower_type(self.b, ty)
            }
            None => self.types.size_t_type(self.b),
        };
        let keyvar = match key {
            Some(var) => self.decls.declare_raw(self.b, var),
            None => self.b.alloca(key_ty, "foreachkey"),
        };
        let zerokey = self.b.const_int(key_ty, 0, false);

        // the element variable: by-value gets its own slot to copy into
        let value_ty = self.decls.var_type(value);
        let elem_ty = self.types.lower_type(self.b, value_ty);
        let valvar = if value_by_ref {
            None
        } else {
            Some(self.decls.declare_raw(self.b, value))
        };

        // the aggregate decomposes into (length, data pointer)
        let aggr_val = self.exprs.lower_expr(self.b, aggr);
        let mut niters = self.exprs.array_len(self.b, aggr_val);
        let data_ptr = self.exprs.array_ptr(self.b, aggr_val);

        // widen or narrow the length to the key's width
        let len_bits = self.b.int_bit_width(niters);
        let key_bits = self.b.raw_type(key_ty).into_int_type().get_bit_width();
        if len_bits < key_bits {
            niters = self.b.zext(niters, key_ty, "foreachtrunckey");
        } else if len_bits > key_bits {
            niters = self.b.trunc(niters, key_ty, "foreachtrunckey");
        }

        match op {
            ForeachOp::Forward => self.b.store(zerokey, keyvar),
            ForeachOp::Reverse => self.b.store(niters, keyvar),
        }

        let oldend = self.b.cursor_end();
        let condbb = self.b.new_block_before("foreachcond", oldend);
        let bodybb = self.b.new_block_before("foreachbody", oldend);
        let nextbb = self.b.new_block_before("foreachnext", oldend);
        let endbb = self.b.new_block_before("foreachend", oldend);

        self.b.br(condbb);

        // condition; reverse pre-decrements the key once in bounds
        self.b.set_cursor(condbb, bodybb);
        let keyload = self.b.load(key_ty, keyvar, "tmp");
        let done = match op {
            ForeachOp::Forward => self.b.icmp(IntPredicate::ULT, keyload, niters, "tmp"),
            ForeachOp::Reverse => {
                let done = self.b.icmp(IntPredicate::UGT, keyload, zerokey, "tmp");
                let one = self.b.const_int(key_ty, 1, false);
                let dec = self.b.sub(keyload, one, "tmp");
                self.b.store(dec, keyvar);
                done
            }
        };
        self.b.cond_br(done, bodybb, endbb);

        // body: bind the element for this iteration
        self.b.set_cursor(bodybb, nextbb);
        let cur_key = self.b.load(key_ty, keyvar, "tmp");
        let elem_ptr = self.b.gep1(elem_ty, data_ptr, cur_key, "tmp");
        match valvar {
            Some(slot) => {
                let elem = self.b.load(elem_ty, elem_ptr, "tmp");
                self.decls.assign(
                    self.b,
                    slot,
                    ExprVal {
                        value: elem,
                        ty: value_ty,
                    },
                );
                self.decls.bind(value, slot);
            }
            None => self.decls.bind(value, elem_ptr),
        }

        self.scopes.push(TargetScope {
            stmt: id,
            cleanup: None,
            break_bb: Some(endbb),
            continue_bb: Some(nextbb),
        });
        let result = match body {
            Some(body) => self.lower(body),
            None => Ok(()),
        };
        self.scopes.pop();
        result?;

        if !self.b.scope_returned() {
            self.b.br(nextbb);
        }

        // next: forward post-increments here
        self.b.set_cursor(nextbb, endbb);
        if op == ForeachOp::Forward {
            let keyload = self.b.load(key_ty, keyvar, "tmp");
            let one = self.b.const_int(key_ty, 1, false);
            let inc = self.b.add(keyload, one, "tmp");
            self.b.store(inc, keyvar);
        }
        self.b.br(condbb);

        self.b.set_cursor(endbb, oldend);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Foreach over an integer range
    // -----------------------------------------------------------------------

    pub(crate) fn lower_foreach_range(
        &mut self,
        id: StmtId,
        loc: Loc,
        op: ForeachOp,
        key: VarId,
        lower: ExprId,
        upper: ExprId,
        body: Option<StmtId>,
    ) -> LowerResult {
        self.stop_point(loc);

        let lower_val = self.exprs.lower_expr(self.b, lower).value;
        let upper_val = self.exprs.lower_expr(self.b, upper).value;

        let key_ty_fe = self.decls.var_type(key);
        let key_ty = self.types.lower_type(self.b, key_ty_fe);
        let keyvar = self.decls.declare_raw(self.b, key);

        match op {
            ForeachOp::Forward => self.b.store(lower_val, keyvar),
            ForeachOp::Reverse => self.b.store(upper_val, keyvar),
        }

        let oldend = self.b.cursor_end();
        let condbb = self.b.new_block_before("foreachrange_cond", oldend);
        let bodybb = self.b.new_block_before("foreachrange_body", oldend);
        let nextbb = self.b.new_block_before("foreachrange_next", oldend);
        let endbb = self.b.new_block_before("foreachrange_end", oldend);

        self.b.br(condbb);

        // compare the key against the opposite bound
        self.b.set_cursor(condbb, bodybb);
        let keyload = self.b.load(key_ty, keyvar, "tmp");
        let unsigned = self.types.is_unsigned(key_ty_fe);
        let pred = match (op, unsigned) {
            (ForeachOp::Forward, true) => IntPredicate::ULT,
            (ForeachOp::Forward, false) => IntPredicate::SLT,
            (ForeachOp::Reverse, true) => IntPredicate::UGT,
            (ForeachOp::Reverse, false) => IntPredicate::SGT,
        };
        let bound = match op {
            ForeachOp::Forward => upper_val,
            ForeachOp::Reverse => lower_val,
        };
        let cond = self.b.icmp(pred, keyload, bound, "tmp");
        self.b.cond_br(cond, bodybb, endbb);

        // body; reverse decrements before it runs
        self.b.set_cursor(bodybb, nextbb);
        if op == ForeachOp::Reverse {
            let v = self.b.load(key_ty, keyvar, "tmp");
            let one = self.b.const_int(key_ty, 1, false);
            let dec = self.b.sub(v, one, "tmp");
            self.b.store(dec, keyvar);
        }

        self.scopes.push(TargetScope {
            stmt: id,
            cleanup: None,
            break_bb: Some(endbb),
            continue_bb: Some(nextbb),
        });
        let result = match body {
            Some(body) => self.lower(body),
            None => Ok(()),
        };
        self.scopes.pop();
        result?;

        if !self.b.scope_returned() {
            self.b.br(nextbb);
        }

        // next; forward increments here
        self.b.set_cursor(nextbb, endbb);
        if op == ForeachOp::Forward {
            let v = self.b.load(key_ty, keyvar, "tmp");
            let one = self.b.const_int(key_ty, 1, false);
            let inc = self.b.add(v, one, "tmp");
            self.b.store(inc, keyvar);
        }
        self.b.br(condbb);

        self.b.set_cursor(endbb, oldend);
        Ok(())
    }
}
