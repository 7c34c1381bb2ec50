//! Lowering test suites.
//!
//! Each suite hand-builds statement trees (`helper::TestAst`), lowers them
//! through the real pipeline into a real LLVM module, and asserts on the
//! produced control-flow graph.

pub mod helper;

mod eh_tests;
mod label_tests;
