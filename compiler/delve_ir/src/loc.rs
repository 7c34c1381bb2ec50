//! Source locations.

use crate::static_assert_size;

/// Source location of a statement.
///
/// The lowerer only needs line numbers: they feed debug stop points and the
/// `_d_switch_error` runtime call.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Default)]
pub struct Loc {
    line: u32,
}

static_assert_size!(Loc, 4);

impl Loc {
    /// Location for compiler-synthesized statements.
    pub const SYNTHETIC: Loc = Loc { line: 0 };

    /// Create a location for a 1-based source line.
    #[inline]
    pub const fn new(line: u32) -> Self {
        Loc { line }
    }

    /// The 1-based source line (0 for synthesized statements).
    #[inline]
    pub const fn line(self) -> u32 {
        self.line
    }
}
