use spruce_tree::Tree;

use crate::stack::StackRef;
use crate::token::InputStream;

/// Keeps a piece of state alongside each parse stack, updated as tokens are shifted and
/// rules reduced. Contexts are plain `u32` handles; trackers that need richer state keep it
/// in a table of their own and hand out indices.
pub trait ContextTracker: Send + Sync {
    /// The context at the start of the document.
    fn start(&self) -> u32;

    fn shift(
        &self,
        context: u32,
        _term: u16,
        _stack: StackRef<'_>,
        _input: &InputStream<'_>,
    ) -> u32 {
        context
    }

    fn reduce(
        &self,
        context: u32,
        _term: u16,
        _stack: StackRef<'_>,
        _input: &InputStream<'_>,
    ) -> u32 {
        context
    }

    /// Called when a node from an earlier tree is reused.
    fn reuse(
        &self,
        context: u32,
        _node: &Tree,
        _stack: StackRef<'_>,
        _input: &InputStream<'_>,
    ) -> u32 {
        context
    }

    /// Reused nodes are only accepted when their recorded hash matches the hash of the
    /// current context. Zero means "no particular context".
    fn hash(&self, context: u32) -> u32 {
        context
    }

    /// When false, nodes may be reused regardless of the context they were parsed in.
    fn strict(&self) -> bool {
        true
    }
}
