//! Exception paths: try-finally, try-catch, throw, synchronized,
//! volatile, and the cleanup composition rules for non-local exits.

use inkwell::context::Context;
use inkwell::values::InstructionOpcode;

use delve_ir::{CatchClause, StmtKind};

use super::helper::*;

#[test]
fn try_finally_runs_the_finally_on_the_return_path() {
    let ctx = Context::create();
    let mut ast = TestAst::new();
    let value = ast.expr(TestExpr::Int(1));
    let ret = ast.stmt(StmtKind::Return { exp: Some(value) });
    let finalbody = ast.marker("cleanup_fn");
    let root = ast.stmt(StmtKind::TryFinally {
        body: Some(ret),
        finalbody: Some(finalbody),
    });

    let l = lower_fn(&ctx, &ast, root, &[], Some(TY_I64));

    // the finally body appears three times: inlined on the return path,
    // on the fall-through path, and in the unwind dispatch
    let cleanups = call_sequence(l.func)
        .iter()
        .filter(|name| *name == "cleanup_fn")
        .count();
    assert_eq!(cleanups, 3);

    // on the return path the cleanup call precedes the ret; with the pad
    // active it is an invoke whose continuation holds the ret
    let try_bb = find_block(l.func, "try");
    let invoke = instructions(try_bb)
        .into_iter()
        .find(|i| i.get_opcode() == InstructionOpcode::Invoke)
        .expect("return-path cleanup is an invoke under the active pad");
    let succ = successor_names(invoke);
    assert!(succ.contains(&"landingpad".to_owned()));
    assert!(succ.contains(&"postinvoke".to_owned()));
    assert_eq!(
        terminator_opcode(l.func, "postinvoke"),
        InstructionOpcode::Return
    );

    // the pad spills and defers to the dispatch block, which re-runs the
    // finally and resumes unwinding
    let pad = find_block(l.func, "landingpad");
    assert_eq!(
        instructions(pad)[0].get_opcode(),
        InstructionOpcode::LandingPad
    );
    assert_eq!(
        successor_names(pad.get_terminator().unwrap()),
        ["eh.dispatch"]
    );
    assert!(block_callees(find_block(l.func, "eh.dispatch")).contains(&"cleanup_fn".to_owned()));
    assert_eq!(
        terminator_opcode(l.func, "eh.dispatch"),
        InstructionOpcode::Resume
    );

    // the fall-through copy branches on to the merge block
    assert!(block_callees(find_block(l.func, "finally")).contains(&"cleanup_fn".to_owned()));
    assert_eq!(
        successor_names(find_block(l.func, "finally").get_terminator().unwrap()),
        ["endtryfinally"]
    );
}

#[test]
fn missing_finally_or_body_lowers_the_other_without_scaffolding() {
    let ctx = Context::create();
    let mut ast = TestAst::new();
    let body = ast.marker("only_body");
    let root = ast.stmt(StmtKind::TryFinally {
        body: Some(body),
        finalbody: None,
    });

    let l = lower_fn(&ctx, &ast, root, &[], None);
    assert_eq!(call_sequence(l.func), ["only_body"]);
    assert_eq!(block_names(l.func), ["entry", "endentry"]);
}

#[test]
fn nested_finallys_run_innermost_first_on_return() {
    let ctx = Context::create();
    let mut ast = TestAst::new();
    let ret = ast.stmt(StmtKind::Return { exp: None });
    let inner_fin = ast.marker("inner_fin");
    let inner = ast.stmt(StmtKind::TryFinally {
        body: Some(ret),
        finalbody: Some(inner_fin),
    });
    let outer_fin = ast.marker("outer_fin");
    let root = ast.stmt(StmtKind::TryFinally {
        body: Some(inner),
        finalbody: Some(outer_fin),
    });

    let l = lower_fn(&ctx, &ast, root, &[], None);

    let seq = call_sequence(l.func);
    let first_inner = seq.iter().position(|n| n == "inner_fin").unwrap();
    let first_outer = seq.iter().position(|n| n == "outer_fin").unwrap();
    assert!(
        first_inner < first_outer,
        "inner finally must run before outer on the return path: {seq:?}"
    );
}

#[test]
fn try_catch_dispatches_by_type_and_binds_the_exception() {
    let ctx = Context::create();
    let mut ast = TestAst::new();
    let may_throw = ast.marker("may_throw");
    let var = ast.var(TY_PTR);
    let handler = ast.marker("handler");
    let root = ast.stmt(StmtKind::TryCatch {
        body: may_throw,
        catches: vec![CatchClause {
            ty: TY_PTR,
            var: Some(var),
            body: handler,
        }],
    });

    let l = lower_fn(&ctx, &ast, root, &[], None);

    // the call under the try became an invoke into the pad
    let try_bb = find_block(l.func, "try");
    let invoke = instructions(try_bb)
        .into_iter()
        .find(|i| i.get_opcode() == InstructionOpcode::Invoke)
        .expect("call under try must unwind to the pad");
    assert!(successor_names(invoke).contains(&"landingpad".to_owned()));

    // dispatch compares the selector against the catch's type id
    let dispatch = find_block(l.func, "eh.dispatch");
    assert!(block_callees(dispatch).contains(&"llvm.eh.typeid.for".to_owned()));
    assert!(instructions(dispatch)
        .iter()
        .any(|i| i.get_opcode() == InstructionOpcode::ICmp));
    let succ = successor_names(dispatch.get_terminator().unwrap());
    assert!(succ.contains(&"catch".to_owned()));
    assert!(succ.contains(&"eh.next".to_owned()));

    // no outer frame: the unmatched path resumes unwinding
    assert_eq!(
        terminator_opcode(l.func, "eh.next"),
        InstructionOpcode::Resume
    );

    // the handler binds the caught object, runs, and merges
    let catch_bb = find_block(l.func, "catch");
    assert!(instructions(catch_bb)
        .iter()
        .any(|i| i.get_opcode() == InstructionOpcode::Store));
    assert!(block_callees(catch_bb).contains(&"handler".to_owned()));
    assert_eq!(
        successor_names(catch_bb.get_terminator().unwrap()),
        ["endtrycatch"]
    );

    // the catch filter is the type's descriptor global
    assert!(l.scx.llmod.get_global(".typeinfo.4").is_some());
}

#[test]
fn throw_inside_try_invokes_the_runtime_and_is_unreachable_after() {
    let ctx = Context::create();
    let mut ast = TestAst::new();
    let exn = ast.expr(TestExpr::NullPtr);
    let thr = ast.stmt(StmtKind::Throw { exp: exn });
    let handler = ast.marker("handler");
    let root = ast.stmt(StmtKind::TryCatch {
        body: thr,
        catches: vec![CatchClause {
            ty: TY_PTR,
            var: None,
            body: handler,
        }],
    });

    let l = lower_fn(&ctx, &ast, root, &[], None);

    let try_bb = find_block(l.func, "try");
    let invoke = instructions(try_bb)
        .into_iter()
        .find(|i| i.get_opcode() == InstructionOpcode::Invoke)
        .expect("throw under a pad is an invoke");
    assert_eq!(callee_name(invoke).as_deref(), Some("_d_throw_exception"));
    assert_eq!(
        terminator_opcode(l.func, "postinvoke"),
        InstructionOpcode::Unreachable
    );
}

#[test]
fn throw_without_active_pad_is_a_plain_call() {
    let ctx = Context::create();
    let mut ast = TestAst::new();
    let exn = ast.expr(TestExpr::NullPtr);
    let root = ast.stmt(StmtKind::Throw { exp: exn });

    let l = lower_fn(&ctx, &ast, root, &[], None);
    assert_eq!(count_opcode(l.func, InstructionOpcode::Invoke), 0);
    assert_eq!(call_sequence(l.func), ["_d_throw_exception"]);
    assert_eq!(
        terminator_opcode(l.func, "entry"),
        InstructionOpcode::Unreachable
    );
    assert!(block_names(l.func).contains(&"afterthrow".to_owned()));
}

#[test]
fn synchronized_monitor_wraps_the_body() {
    let ctx = Context::create();
    let mut ast = TestAst::new();
    let obj = ast.expr(TestExpr::Param(0, TY_PTR));
    let body = ast.marker("guarded");
    let root = ast.stmt(StmtKind::Synchronized {
        exp: Some(obj),
        body,
    });

    let l = lower_fn(&ctx, &ast, root, &[TY_PTR], None);
    assert_eq!(
        call_sequence(l.func),
        ["enter_monitor", "guarded", "leave_monitor"]
    );
}

#[test]
fn synchronized_return_releases_on_the_exit_path() {
    let ctx = Context::create();
    let mut ast = TestAst::new();
    let obj = ast.expr(TestExpr::Param(0, TY_PTR));
    let ret = ast.stmt(StmtKind::Return { exp: None });
    let root = ast.stmt(StmtKind::Synchronized {
        exp: Some(obj),
        body: ret,
    });

    let l = lower_fn(&ctx, &ast, root, &[TY_PTR], None);

    // the live path pairs exactly one enter with one leave before ret
    let entry = find_block(l.func, "entry");
    assert_eq!(block_callees(entry), ["enter_monitor", "leave_monitor"]);
    assert_eq!(terminator_opcode(l.func, "entry"), InstructionOpcode::Return);
}

#[test]
fn synchronized_without_expression_uses_a_unique_critical_section() {
    let ctx = Context::create();
    let mut ast = TestAst::new();
    let body = ast.marker("guarded");
    let root = ast.stmt(StmtKind::Synchronized { exp: None, body });

    let l = lower_fn(&ctx, &ast, root, &[], None);
    assert_eq!(
        call_sequence(l.func),
        ["enter_critical", "guarded", "leave_critical"]
    );
    assert!(l.scx.llmod.get_global(".uniqueCS.0").is_some());
}

#[test]
fn volatile_with_body_fences_both_sides() {
    let ctx = Context::create();
    let mut ast = TestAst::new();
    let body = ast.marker("vol_body");
    let root = ast.stmt(StmtKind::Volatile { stmt: Some(body) });

    let l = lower_fn(&ctx, &ast, root, &[], None);
    let entry = find_block(l.func, "entry");
    let ops: Vec<_> = instructions(entry).iter().map(|i| i.get_opcode()).collect();
    assert_eq!(
        ops,
        [
            InstructionOpcode::Fence,
            InstructionOpcode::Call,
            InstructionOpcode::Fence,
            InstructionOpcode::Return
        ]
    );
}

#[test]
fn volatile_without_body_emits_one_combined_barrier() {
    let ctx = Context::create();
    let mut ast = TestAst::new();
    let root = ast.stmt(StmtKind::Volatile { stmt: None });

    let l = lower_fn(&ctx, &ast, root, &[], None);
    assert_eq!(count_opcode(l.func, InstructionOpcode::Fence), 1);
}

#[test]
fn break_replays_volatile_and_monitor_cleanups_in_order() {
    let ctx = Context::create();
    let mut ast = TestAst::new();
    let brk = ast.stmt(StmtKind::Break { label: None });
    let vol = ast.stmt(StmtKind::Volatile { stmt: Some(brk) });
    let obj = ast.expr(TestExpr::Param(0, TY_PTR));
    let sync = ast.stmt(StmtKind::Synchronized {
        exp: Some(obj),
        body: vol,
    });
    let cond = ast.expr(TestExpr::Int(1));
    let root = ast.stmt(StmtKind::While { cond, body: sync });

    let l = lower_fn(&ctx, &ast, root, &[TY_PTR], None);

    // the break exits volatile then synchronized: store-load fence first,
    // then the monitor release, then the jump to endwhile
    let body_bb = find_block(l.func, "whilebody");
    assert_eq!(block_callees(body_bb), ["enter_monitor", "leave_monitor"]);
    assert_eq!(count_opcode(l.func, InstructionOpcode::Fence), 3);

    let fence_pos = instructions(body_bb)
        .iter()
        .enumerate()
        .filter(|(_, i)| i.get_opcode() == InstructionOpcode::Fence)
        .map(|(pos, _)| pos)
        .collect::<Vec<_>>();
    let leave_pos = instructions(body_bb)
        .iter()
        .position(|i| callee_name(*i).as_deref() == Some("leave_monitor"))
        .unwrap();
    // the cleanup fence (second in the block) precedes the release
    assert!(fence_pos[1] < leave_pos);
    assert!(successor_names(body_bb.get_terminator().unwrap()).contains(&"endwhile".to_owned()));
}
