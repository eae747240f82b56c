use text_size::TextRange;

/// Errors raised by tree construction and the parse seams.
///
/// These describe caller misuse or corrupt tables. Syntax errors in the parsed text never
/// show up here outside of strict parsers; they become error nodes in the tree instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// A strict parser found no way to continue.
    #[error("no parse at {pos}")]
    NoParse { pos: u32 },

    /// An inner parse was asked to cover an empty or inverted range.
    #[error("invalid inner parse ranges given: {0:?}")]
    InvalidRanges(Vec<TextRange>),

    /// `stop_at` was called with a position after an earlier stop position.
    #[error("can't move stopped_at forward (from {current} to {requested})")]
    StopAtForward { current: u32, requested: u32 },

    /// A node type sits at a different index than its id.
    #[error("node type {name:?} has id {id} but is at index {index}")]
    NodeSetOrder { name: String, id: u16, index: usize },
}
