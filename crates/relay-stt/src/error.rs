use thiserror::Error;

pub type SttResult<T> = Result<T, SttError>;

#[derive(Error, Debug)]
pub enum SttError {
    #[error("upstream connect failed: {0}")]
    Connect(#[source] anyhow::Error),

    #[error("upstream websocket error: {0}")]
    Transport(#[source] anyhow::Error),

    #[error("malformed upstream event: {0}")]
    Protocol(#[source] anyhow::Error),

    #[error("upstream closed the stream")]
    Closed,
}
