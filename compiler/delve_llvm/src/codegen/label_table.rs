//! Per-function label table.
//!
//! Maps scoped label names to blocks. Entries are created lazily on first
//! encounter, which may be a forward `goto` rather than the label
//! definition; the definition later repositions the block before the
//! current end anchor so textual order still follows statement order.

use rustc_hash::FxHashMap;

use super::value_id::BlockId;

/// Scoped label name → block. Per-function state.
#[derive(Default)]
pub struct LabelTable {
    labels: FxHashMap<String, BlockId>,
}

impl LabelTable {
    pub fn new() -> Self {
        LabelTable {
            labels: FxHashMap::default(),
        }
    }

    /// Look up a label's block, if already created.
    pub fn get(&self, scoped_name: &str) -> Option<BlockId> {
        self.labels.get(scoped_name).copied()
    }

    /// Fetch the label's block, creating it through `make` on first
    /// encounter. Forward gotos and the definition resolve to the same
    /// block.
    pub fn get_or_create(
        &mut self,
        scoped_name: &str,
        make: impl FnOnce() -> BlockId,
    ) -> BlockId {
        if let Some(&bb) = self.labels.get(scoped_name) {
            return bb;
        }
        let bb = make();
        self.labels.insert(scoped_name.to_owned(), bb);
        bb
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
