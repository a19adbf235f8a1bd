use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("store operation `{op}` timed out after {after:?}")]
    Timeout { op: &'static str, after: Duration },

    #[error("value at key `{0}` is not an integer")]
    NotAnInteger(String),
}
