//! Immutable, buffer-packed syntax trees and the seams incremental parsers plug into.
//!
//! Trees are built bottom-up once, shared by reference counting, and navigated through
//! short-lived views that carry their own parent chains. Small runs of sibling nodes are
//! packed into flat [`TreeBuffer`]s instead of individual tree nodes.

mod buffer;
mod build;
mod cursor;
mod error;
mod fragment;
mod input;
mod mix;
mod node;
mod node_type;
mod parse;
pub mod props;
mod tree;

/// Packed node storage.
pub use buffer::{BufferRecord, TreeBuffer};
/// Building trees from flat parser output.
pub use build::{
    BufferCursor, BuildData, BuildRecord, DEFAULT_BUFFER_LENGTH, FlatBufferCursor,
    MAX_BUFFER_LENGTH,
};
/// Allocation-light traversal.
pub use cursor::TreeCursor;
pub use error::Error;
/// Reuse bookkeeping for incremental parsing.
pub use fragment::{ChangedRange, TreeFragment};
pub use input::Input;
/// Nested parses for embedded languages.
pub use mix::{NestedParse, Overlay, OverlayMatch, OverlayPredicate, parse_mixed};
/// Node views and position lookup.
pub use node::{IterMode, SyntaxNode, SyntaxNodeRef};
/// Node metadata.
pub use node_type::{NodeFlags, NodeSet, NodeType, NodeTypeSpec};
/// Parser seams.
pub use parse::{ParseWrapper, Parser, PartialParse, WrapParse};
pub use props::{NodeProp, NodePropSource, PropId, PropValue};
pub use text_size::{TextRange, TextSize};
/// The syntax tree itself.
pub use tree::{MountedTree, Tree, TreeChild};
