//! Exception-adjacent lowering: try-finally, try-catch, throw,
//! synchronized, volatile and with.
//!
//! # Pad / dispatch protocol
//!
//! Registering a frame ([`StmtLowerer::push_pad_frame`]) builds the pad
//! block immediately: `landingpad`, spill of the exception pointer and
//! selector into the function's EH slots, branch to the frame's dispatch
//! block. Dispatch code is emitted when the frame is popped
//! ([`StmtLowerer::pop_pad_and_dispatch`]), after the pop, so calls made
//! by re-lowered finally bodies unwind to the *outer* frame. An unmatched
//! exception chains to the next outer frame's dispatch block through the
//! shared slots, or `resume`s out of the function.

use delve_ir::{CatchClause, ExprId, Loc, StmtId, VarId};

use crate::error::LowerResult;

use super::landing_pad::{CatchReg, LandingPadFrame};
use super::stmt_lowerer::StmtLowerer;
use super::target_scope::{Cleanup, TargetScope};
use super::value_id::BlockId;

impl StmtLowerer<'_, '_, '_> {
    // -----------------------------------------------------------------------
    // Try-finally
    // -----------------------------------------------------------------------

    pub(crate) fn lower_try_finally(
        &mut self,
        id: StmtId,
        loc: Loc,
        body: Option<StmtId>,
        finalbody: Option<StmtId>,
    ) -> LowerResult {
        self.stop_point(loc);

        // degenerate forms need no scaffolding
        let (body, finalbody) = match (body, finalbody) {
            (Some(body), Some(finalbody)) => (body, finalbody),
            (Some(body), None) => return self.lower(body),
            (None, Some(finalbody)) => return self.lower(finalbody),
            (None, None) => return Ok(()),
        };

        let oldend = self.b.cursor_end();
        let trybb = self.b.new_block_before("try", oldend);
        let finallybb = self.b.new_block_before("finally", oldend);
        let landingpadbb = self.b.new_block_before("landingpad", oldend);
        let dispatchbb = self.b.new_block_before("eh.dispatch", oldend);
        let endbb = self.b.new_block_before("endtryfinally", oldend);

        assert!(!self.b.scope_returned());
        self.b.br(trybb);

        self.push_pad_frame(landingpadbb, dispatchbb, Vec::new(), vec![finalbody]);

        // try body; non-local exits replay the finally through the scope
        self.b.set_cursor(trybb, finallybb);
        self.scopes.push(TargetScope {
            stmt: id,
            cleanup: Some(Cleanup::TryFinally(finalbody)),
            break_bb: None,
            continue_bb: None,
        });
        let result = self.lower(body);
        self.scopes.pop();
        result?;

        if !self.b.scope_returned() {
            self.b.br(finallybb);
        }

        // unwind path: finally runs, then the exception propagates
        self.pop_pad_and_dispatch(endbb)?;

        // fall-through path
        self.b.set_cursor(finallybb, landingpadbb);
        self.lower(finalbody)?;
        if !self.b.scope_returned() {
            self.b.br(endbb);
        }

        self.b.set_cursor(endbb, oldend);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Try-catch
    // -----------------------------------------------------------------------

    pub(crate) fn lower_try_catch(
        &mut self,
        loc: Loc,
        body: StmtId,
        catches: &[CatchClause],
    ) -> LowerResult {
        self.stop_point(loc);

        let oldend = self.b.cursor_end();
        let trybb = self.b.new_block_before("try", oldend);
        let landingpadbb = self.b.new_block_before("landingpad", oldend);
        let dispatchbb = self.b.new_block_before("eh.dispatch", oldend);
        let endbb = self.b.new_block_before("endtrycatch", oldend);

        assert!(!self.b.scope_returned());
        self.b.br(trybb);

        // register the catches, in source order
        let mut regs = Vec::with_capacity(catches.len());
        for clause in catches {
            let handler_bb = self.b.new_block_before("catch", endbb);
            let type_info = self.types.type_info_global(self.b, clause.ty);
            regs.push(CatchReg {
                ty: clause.ty,
                type_info,
                handler_bb,
                var: clause.var,
            });
        }
        let handler_blocks: Vec<BlockId> = regs.iter().map(|r| r.handler_bb).collect();

        self.push_pad_frame(landingpadbb, dispatchbb, regs, Vec::new());

        self.b.set_cursor(trybb, landingpadbb);
        self.lower(body)?;
        if !self.b.scope_returned() {
            self.b.br(endbb);
        }

        self.pop_pad_and_dispatch(endbb)?;

        // catch handler bodies, each entered from the dispatch chain
        for (clause, &handler_bb) in catches.iter().zip(&handler_blocks) {
            self.b.set_cursor(handler_bb, endbb);
            if let Some(var) = clause.var {
                let slot = self.decls.declare_raw(self.b, var);
                let (exn_slot, _) = self.get_eh_slots();
                let ptr_ty = self.b.ptr_type();
                let exn = self.b.load(ptr_ty, exn_slot, "eh.exn");
                self.b.store(exn, slot);
            }
            self.lower(clause.body)?;
            if !self.b.scope_returned() {
                self.b.br(endbb);
            }
        }

        self.b.set_cursor(endbb, oldend);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Pad helpers
    // -----------------------------------------------------------------------

    /// Register a handler frame and build its pad block.
    ///
    /// The pad holds only the `landingpad` and the spill to the EH slots;
    /// everything else waits for the pop.
    pub(crate) fn push_pad_frame(
        &mut self,
        pad_bb: BlockId,
        dispatch_bb: BlockId,
        catches: Vec<CatchReg>,
        finallys: Vec<StmtId>,
    ) {
        let func = self.b.current_function();
        let personality = self.b.runtime_function("_d_eh_personality");
        self.b.set_personality(func, personality);

        let (exn_slot, sel_slot) = self.get_eh_slots();

        let saved = (self.b.cursor_block(), self.b.cursor_end());
        self.b.set_cursor(pad_bb, dispatch_bb);

        let clauses: Vec<_> = catches.iter().map(|c| c.type_info).collect();
        let is_cleanup = !finallys.is_empty();
        let pad_val = self
            .b
            .landingpad(personality, &clauses, is_cleanup, "eh");
        let exn = self.b.extract_value(pad_val, 0, "eh.ptr.val");
        let sel = self.b.extract_value(pad_val, 1, "eh.sel.val");
        self.b.store(exn, exn_slot);
        self.b.store(sel, sel_slot);
        self.b.br(dispatch_bb);

        self.b.set_cursor(saved.0, saved.1);

        self.b.pads.push(LandingPadFrame {
            pad_bb,
            dispatch_bb,
            catches,
            finallys,
        });
    }

    /// Pop the innermost frame and emit its dispatch code: finallys, then
    /// catch type tests in registration order, then propagation.
    pub(crate) fn pop_pad_and_dispatch(&mut self, end: BlockId) -> LowerResult {
        let frame = self.b.pads.pop();
        let (exn_slot, sel_slot) = self.get_eh_slots();

        self.b.set_cursor(frame.dispatch_bb, end);

        for &finalbody in &frame.finallys {
            if self.b.scope_returned() {
                break;
            }
            self.lower(finalbody)?;
        }

        for catch in &frame.catches {
            if self.b.scope_returned() {
                break;
            }
            let i32_ty = self.b.i32_type();
            let type_id = self.b.eh_typeid_for(catch.type_info, "eh.typeid");
            let sel = self.b.load(i32_ty, sel_slot, "eh.sel");
            let matches = self.b.icmp_eq(sel, type_id, "eh.match");
            let next = self.b.new_block("eh.next");
            self.b.cond_br(matches, catch.handler_bb, next);
            self.b.set_cursor(next, end);
        }

        if !self.b.scope_returned() {
            match self.b.pads.top_dispatch() {
                // an enclosing frame in this function takes over; the EH
                // slots still hold the in-flight exception
                Some(outer) => self.b.br(outer),
                None => {
                    let ptr_ty = self.b.ptr_type();
                    let i32_ty = self.b.i32_type();
                    let exn = self.b.load(ptr_ty, exn_slot, "eh.ptr.load");
                    let sel = self.b.load(i32_ty, sel_slot, "eh.sel.load");
                    let pair = self.b.eh_pair(exn, sel, "eh.pair");
                    self.b.resume(pair);
                }
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Throw
    // -----------------------------------------------------------------------

    pub(crate) fn lower_throw(&mut self, loc: Loc, exp: ExprId) -> LowerResult {
        self.stop_point(loc);

        let val = self.exprs.lower_expr(self.b, exp);
        self.func_end();

        let func = self.b.runtime_function("_d_throw_exception");
        let ptr_ty = self.b.ptr_type();
        let arg = self.b.bitcast(val.value, ptr_ty, "tmp");
        self.b.call_or_invoke(func, &[arg], "");
        self.b.unreachable();

        self.open_dead_block("afterthrow");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Synchronized
    // -----------------------------------------------------------------------

    pub(crate) fn lower_synchronized(
        &mut self,
        id: StmtId,
        loc: Loc,
        exp: Option<ExprId>,
        body: StmtId,
    ) -> LowerResult {
        self.stop_point(loc);

        // acquire
        let (monitor, handle) = match exp {
            Some(exp) => {
                let obj = self.exprs.lower_expr(self.b, exp).value;
                let enter = self.b.runtime_function("enter_monitor");
                self.b.call_or_invoke(enter, &[obj], "");
                (true, obj)
            }
            None => {
                let ptr_ty = self.b.ptr_type();
                let name = self.b.unique_global_name(".uniqueCS");
                let slot = self.b.add_internal_zeroed_global(ptr_ty, &name);
                let enter = self.b.runtime_function("enter_critical");
                self.b.call_or_invoke(enter, &[slot], "");
                (false, slot)
            }
        };

        self.scopes.push(TargetScope {
            stmt: id,
            cleanup: Some(Cleanup::Synchro { monitor, handle }),
            break_bb: None,
            continue_bb: None,
        });
        let result = self.lower(body);
        self.scopes.pop();
        result?;

        // release; terminating statements already emitted their own
        if self.b.scope_returned() {
            return Ok(());
        }
        self.run_cleanup(Cleanup::Synchro { monitor, handle })
    }

    // -----------------------------------------------------------------------
    // Volatile
    // -----------------------------------------------------------------------

    pub(crate) fn lower_volatile(
        &mut self,
        id: StmtId,
        loc: Loc,
        stmt: Option<StmtId>,
    ) -> LowerResult {
        self.stop_point(loc);

        match stmt {
            Some(stmt) => {
                // load-store
                self.b.memory_barrier(false, true, false, false);

                self.scopes.push(TargetScope {
                    stmt: id,
                    cleanup: Some(Cleanup::Volatile),
                    break_bb: None,
                    continue_bb: None,
                });
                let result = self.lower(stmt);
                self.scopes.pop();
                result?;

                // no barrier after a body that cannot fall through;
                // terminating statements emitted theirs on the way out
                if !self.b.scope_returned() {
                    // store-load
                    self.b.memory_barrier(false, false, true, false);
                }
            }
            None => {
                // load-store & store-load
                self.b.memory_barrier(false, true, true, false);
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // With
    // -----------------------------------------------------------------------

    pub(crate) fn lower_with(
        &mut self,
        loc: Loc,
        exp: ExprId,
        wthis: Option<VarId>,
        body: StmtId,
    ) -> LowerResult {
        self.stop_point(loc);

        // the symbol form binds nothing at runtime
        if let Some(wthis) = wthis {
            let val = self.exprs.lower_expr(self.b, exp);
            let slot = self.decls.declare_raw(self.b, wthis);
            self.b.store(val.value, slot);
        }

        self.lower(body)
    }
}
