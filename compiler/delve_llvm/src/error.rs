//! Lowering errors.
//!
//! Only unrecoverable front-facing conditions surface as errors; internal
//! invariant violations are asserts (a broken invariant means a compiler
//! bug, not bad input).

use std::error::Error;
use std::fmt;

/// Result alias for statement lowering.
pub type LowerResult<T = ()> = Result<T, LowerError>;

/// Fatal lowering failure. Terminates compilation of the unit.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum LowerError {
    /// A statement variant this backend does not lower.
    Unsupported { kind: &'static str, line: u32 },
}

impl fmt::Display for LowerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LowerError::Unsupported { kind, line } => {
                write!(f, "statement type {kind} not implemented (line {line})")
            }
        }
    }
}

impl Error for LowerError {}
