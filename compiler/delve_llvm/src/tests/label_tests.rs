//! Labels, gotos and labeled break/continue.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use inkwell::attributes::{Attribute, AttributeLoc};
use inkwell::context::Context;
use inkwell::values::InstructionOpcode;

use delve_ir::StmtKind;

use crate::codegen::{declare_runtime, AsmBlockState, IrBuilder, RetStyle, StmtLowerer};
use crate::context::SimpleCx;

use super::helper::*;

#[test]
fn labeled_break_targets_the_loops_end_block() {
    let ctx = Context::create();
    let mut ast = TestAst::new();
    let name = ast.name("L");

    // label allocated first so the break can reference it; the wrapped
    // loop is patched in afterwards
    let label = ast.stmt(StmtKind::Label {
        ident: name,
        stmt: None,
    });
    let brk = ast.stmt(StmtKind::Break { label: Some(label) });
    let cond = ast.expr(TestExpr::Int(1));
    let while_stmt = ast.stmt(StmtKind::While { cond, body: brk });
    ast.stmts.replace_kind(
        label,
        StmtKind::Label {
            ident: name,
            stmt: Some(while_stmt),
        },
    );

    let l = lower_fn(&ctx, &ast, label, &[], None);

    // the break lands on the loop's end, not on the label's own block
    assert_eq!(
        successor_names(find_block(l.func, "whilebody").get_terminator().unwrap()),
        ["endwhile"]
    );
    assert!(block_names(l.func).contains(&"label_f.L".to_owned()));
}

#[test]
fn labeled_continue_targets_the_loops_condition() {
    let ctx = Context::create();
    let mut ast = TestAst::new();
    let name = ast.name("L");

    let label = ast.stmt(StmtKind::Label {
        ident: name,
        stmt: None,
    });
    let cont = ast.stmt(StmtKind::Continue {
        label: Some(label),
    });
    let cond = ast.expr(TestExpr::Int(1));
    let while_stmt = ast.stmt(StmtKind::While { cond, body: cont });
    ast.stmts.replace_kind(
        label,
        StmtKind::Label {
            ident: name,
            stmt: Some(while_stmt),
        },
    );

    let l = lower_fn(&ctx, &ast, label, &[], None);
    assert_eq!(
        successor_names(find_block(l.func, "whilebody").get_terminator().unwrap()),
        ["whilecond"]
    );
}

#[test]
fn backward_goto_reuses_the_label_block() {
    let ctx = Context::create();
    let mut ast = TestAst::new();
    let name = ast.name("again");

    let at_label = ast.marker("at_label");
    let label = ast.stmt(StmtKind::Label {
        ident: name,
        stmt: Some(at_label),
    });
    let goto = ast.stmt(StmtKind::Goto {
        ident: name,
        enclosing_scope: None,
    });
    let root = ast.stmt(StmtKind::Compound(vec![label, goto]));

    let l = lower_fn(&ctx, &ast, root, &[], None);

    // the goto loops straight back to the label block
    let label_bb = find_block(l.func, "label_f.again");
    assert_eq!(
        successor_names(label_bb.get_terminator().unwrap()),
        ["label_f.again"]
    );
    assert!(block_callees(label_bb).contains(&"at_label".to_owned()));
}

#[test]
fn forward_goto_resolves_to_the_later_definition() {
    let ctx = Context::create();
    let mut ast = TestAst::new();
    let name = ast.name("done");

    let goto = ast.stmt(StmtKind::Goto {
        ident: name,
        enclosing_scope: None,
    });
    let skipped = ast.marker("skipped");
    let target = ast.marker("target_fn");
    let label = ast.stmt(StmtKind::Label {
        ident: name,
        stmt: Some(target),
    });
    let root = ast.stmt(StmtKind::Compound(vec![goto, skipped, label]));

    let l = lower_fn(&ctx, &ast, root, &[], None);

    // a single label block serves both the forward reference and the
    // definition
    let names = block_names(l.func);
    assert_eq!(names.iter().filter(|n| *n == "label_f.done").count(), 1);
    assert_eq!(
        successor_names(find_block(l.func, "entry").get_terminator().unwrap()),
        ["label_f.done"]
    );
    assert!(block_callees(find_block(l.func, "label_f.done")).contains(&"target_fn".to_owned()));

    // statements after the goto still lower, into the dead block
    assert!(block_callees(find_block(l.func, "aftergoto")).contains(&"skipped".to_owned()));
}

#[test]
fn goto_out_of_a_try_runs_the_finally() {
    let ctx = Context::create();
    let mut ast = TestAst::new();
    let name = ast.name("out");

    let goto = ast.stmt(StmtKind::Goto {
        ident: name,
        enclosing_scope: None,
    });
    let finalbody = ast.marker("fin");
    let try_stmt = ast.stmt(StmtKind::TryFinally {
        body: Some(goto),
        finalbody: Some(finalbody),
    });
    let after = ast.marker("after_label");
    let label = ast.stmt(StmtKind::Label {
        ident: name,
        stmt: Some(after),
    });
    let root = ast.stmt(StmtKind::Compound(vec![try_stmt, label]));

    let l = lower_fn(&ctx, &ast, root, &[], None);

    // the goto replays the finally (as an invoke, the pad is active)
    // before leaving the try
    let try_bb = find_block(l.func, "try");
    let invoke = instructions(try_bb)
        .into_iter()
        .find(|i| i.get_opcode() == InstructionOpcode::Invoke)
        .expect("finally replay under the active pad");
    assert_eq!(callee_name(invoke).as_deref(), Some("fin"));

    // the continuation then jumps to the label
    assert_eq!(
        successor_names(find_block(l.func, "postinvoke").get_terminator().unwrap()),
        ["label_f.out"]
    );
}

#[test]
fn asm_labels_become_text_and_disable_inlining() {
    let ctx = Context::create();
    let mut ast = TestAst::new();
    let name = ast.name("spin");
    let label = ast.stmt(StmtKind::Label {
        ident: name,
        stmt: None,
    });

    let scx = SimpleCx::new(&ctx, "t");
    let mut b = IrBuilder::new(&scx);
    declare_runtime(&mut b);
    let func = b.declare_function("f", &[], None);

    let storage: VarStorage = Rc::new(RefCell::new(HashMap::new()));
    let mut exprs = TestExprs::new(&ast, storage.clone());
    let mut types = TestTypes;
    let mut decls = TestDecls::new(&ast, storage);

    let mut lower = StmtLowerer::new(
        &mut b,
        &ast.stmts,
        &ast.interner,
        &mut exprs,
        &mut types,
        &mut decls,
        None,
        func_info(func, RetStyle::Void),
    );
    lower.set_asm_block(AsmBlockState::default());
    lower.lower(label).unwrap();
    let asm = lower.take_asm_block().unwrap();
    drop(lower);

    assert_eq!(asm.lines, ["f_spin:"]);
    assert_eq!(asm.internal_labels, [name]);

    // no block was created for the label
    assert!(!b
        .raw_function(func)
        .get_basic_blocks()
        .iter()
        .any(|bb| bb.get_name().to_string_lossy().starts_with("label_")));

    let noinline = Attribute::get_named_enum_kind_id("noinline");
    assert!(b
        .raw_function(func)
        .get_enum_attribute(AttributeLoc::Function, noinline)
        .is_some());
}
