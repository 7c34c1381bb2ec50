//! LLVM statement lowering for Delve.
//!
//! This crate turns the analyzed statement AST (`delve_ir`) into a
//! control-flow graph of LLVM basic blocks. It owns:
//!
//! - the ID-based [`IrBuilder`](codegen::IrBuilder) façade over inkwell,
//!   including the emission cursor and the landing-pad stack;
//! - the per-function lowering state: target scopes, label table, per-case
//!   side tables;
//! - the [`StmtLowerer`](codegen::StmtLowerer) dispatch over every
//!   statement variant, plus the cleanup runner that re-emits finalizers
//!   at non-local exits;
//! - declarations of the runtime symbols the lowered code calls
//!   (`_d_throw_exception`, the string-switch family, monitor helpers).
//!
//! Expression lowering, type lowering, variable declaration and debug-info
//! emission are *collaborators*: the lowerer drives them through the traits
//! in [`codegen::traits`] and never inspects their nodes directly.
//!
//! # Debugging
//!
//! Enable tracing with `RUST_LOG=delve_llvm=debug` (per-statement dispatch)
//! or `RUST_LOG=delve_llvm=trace`.

// Crate-level lint configuration for codegen-specific patterns
#![allow(
    // LLVM uses u32 for indices and bit widths; conversions are intentional
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    // Lowering functions thread through builder, arena, collaborators, ...
    clippy::too_many_arguments,
    // Internal panics are invariant violations, not API concerns
    clippy::missing_panics_doc,
    clippy::missing_errors_doc,
)]

pub mod codegen;
pub mod context;
mod error;

pub use codegen::{
    declare_runtime, BlockId, Cleanup, ExprVal, FunctionId, IrBuilder, LLVMTypeId, StmtLowerer,
    ValueId,
};
pub use context::SimpleCx;
pub use error::{LowerError, LowerResult};

use std::sync::Once;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for debug output.
///
/// Call once at startup; safe to call multiple times. Only installs a
/// subscriber when `RUST_LOG` is set.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        if std::env::var("RUST_LOG").is_ok() {
            let filter = EnvFilter::from_default_env();
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_level(true))
                .with(filter)
                .init();
        }
    });
}

#[cfg(test)]
mod tests;
