use thiserror::Error;

pub type FanoutResult<T> = Result<T, FanoutError>;

#[derive(Error, Debug)]
pub enum FanoutError {
    #[error("broker connect failed: {0}")]
    Connect(#[source] anyhow::Error),

    #[error("broker send failed: {0}")]
    Send(#[source] anyhow::Error),
}
