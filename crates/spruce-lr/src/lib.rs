//! A table-driven GLR parser runtime.
//!
//! Parse tables are produced ahead of time and loaded through [`LrParser::deserialize`].
//! At parse time the runtime keeps several stacks alive when the grammar is ambiguous,
//! recovers from syntax errors by inserting or skipping tokens, and reuses nodes from
//! earlier trees when given fragments.

mod context;
mod error;
mod parse;
mod parser;
mod stack;
pub mod table;
mod token;

pub use context::ContextTracker;
pub use error::Error;
pub use parser::{
    Dialect, ExternalSpecializer, LrParser, NodePropSpec, ParserConfig, ParserSpec, PropKey,
    Recovery, Specializer, SpecializerSpec, Table, TokenizerSpec, TopRule,
};
pub use stack::StackRef;
pub use table::{FILE_VERSION, decode_array};
pub use token::{
    ExternalTokenizer, InputStream, LocalTokenGroup, TokenGroup, Tokenizer, TokenizerFlags,
};
