#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("parser version ({found}) doesn't match runtime version ({expected})")]
    Version { found: u32, expected: u32 },
    #[error("invalid top rule name {0}")]
    UnknownTop(String),
    #[error("unknown node prop {0}")]
    UnknownProp(String),
    #[error("invalid prop value {0:?}")]
    PropValue(String),
    #[error("buffer length {0} is larger than {max}", max = spruce_tree::MAX_BUFFER_LENGTH)]
    BufferLength(u32),
    #[error("token group {0} is out of range")]
    TokenGroup(u32),
    #[error("malformed parse table: {0}")]
    Table(&'static str),
    #[error(transparent)]
    Tree(#[from] spruce_tree::Error),
}
