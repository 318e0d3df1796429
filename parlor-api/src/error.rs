#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("Comment is empty")]
    EmptyContent,

    #[error("Comment is too long: {len} characters, at most {max} allowed")]
    ContentTooLong { len: usize, max: usize },

    #[error("Null byte in string is not allowed {0:?}")]
    NullByteInString(String),
}
