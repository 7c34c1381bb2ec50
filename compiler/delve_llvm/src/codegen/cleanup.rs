//! Cleanup emission for non-local control transfer.
//!
//! Any transfer that leaves cleanup-carrying scopes (`return`, `break`,
//! `continue`, `goto`, `goto case`/`default`) re-emits the pending
//! finalizers into the current block, innermost first, before the branch
//! that performs the exit. Finally bodies are re-lowered from their AST,
//! a deliberate duplication; SSA is never cloned.

use delve_ir::StmtId;
use tracing::debug;

use crate::error::LowerResult;

use super::stmt_lowerer::StmtLowerer;
use super::target_scope::Cleanup;

impl StmtLowerer<'_, '_, '_> {
    /// Emit the cleanups of every scope strictly between the cursor and
    /// `target` (`None` = all the way out of the function).
    ///
    /// The destination scope's own cleanup is not run: a jump to a scope
    /// stays inside it. If a re-lowered finally body itself transfers
    /// control, the cursor ends up terminated and the caller must abandon
    /// its exit branch.
    pub(crate) fn emit_cleanups(&mut self, target: Option<StmtId>) -> LowerResult {
        let mut to_run = Vec::new();
        let mut found_target = false;
        for (index, scope) in self.scopes.iter_inner_to_outer() {
            if Some(scope.stmt) == target {
                found_target = true;
                break;
            }
            if let Some(cleanup) = scope.cleanup {
                to_run.push((index, cleanup));
            }
        }
        assert!(
            target.is_none() || found_target,
            "cleanup target scope not on the stack"
        );

        for (index, cleanup) in to_run {
            if self.b.scope_returned() {
                // a finally body transferred control; the exit is abandoned
                debug!("cleanup chain cut short by control transfer in finally");
                break;
            }
            // While a cleanup runs, only the scopes outside it are in
            // effect: its own non-local exits must not re-enter it.
            let detached = self.scopes.split_off(index);
            let result = self.run_cleanup(cleanup);
            self.scopes.restore(detached);
            result?;
        }
        Ok(())
    }

    /// Emit one finalizer into the current block.
    pub(crate) fn run_cleanup(&mut self, cleanup: Cleanup) -> LowerResult {
        match cleanup {
            Cleanup::TryFinally(finalbody) => self.lower(finalbody),
            Cleanup::Synchro { monitor, handle } => {
                let name = if monitor { "leave_monitor" } else { "leave_critical" };
                let func = self.b.runtime_function(name);
                self.b.call_or_invoke(func, &[handle], "");
                Ok(())
            }
            Cleanup::Volatile => {
                self.b.memory_barrier(false, false, true, false);
                Ok(())
            }
        }
    }
}
