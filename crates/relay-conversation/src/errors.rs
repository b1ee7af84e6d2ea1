use thiserror::Error;

pub type ConversationResult<T> = Result<T, ConversationError>;

#[derive(Error, Debug)]
pub enum ConversationError {
    #[error("not found: {0}")]
    NotFound(&'static str),

    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("store backend error: {0}")]
    Store(#[source] anyhow::Error),

    #[error("memory processing failed: {0}")]
    Processing(#[source] anyhow::Error),
}
