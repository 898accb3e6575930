/// Errors raised while building or loading marker patterns.
#[derive(thiserror::Error, Debug)]
pub enum PatternError {
    #[error("pattern size {0} is not supported (expected 2..=64)")]
    UnsupportedSize(usize),
    #[error("template has {got} values, expected {expected}")]
    SizeMismatch { expected: usize, got: usize },
    #[error("template has no contrast")]
    FlatTemplate,
    #[error("malformed pattern file: {0}")]
    Malformed(String),
    #[error("marker id {id} out of range (max {max})")]
    IdOutOfRange { id: u32, max: u32 },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
