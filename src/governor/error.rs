use std::time::Duration;

use crate::common::ResourceKind;
use crate::store::StoreError;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// 请求治理过程中的错误
///
/// 只有 `RateLimited` 和上游失败会体现在请求结果里；缓存层的错误都在本地吸收。
#[derive(Debug, thiserror::Error)]
pub enum GovernError {
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("rate limiter unavailable: {0}")]
    LimiterUnavailable(#[source] StoreError),

    #[error("cache unavailable: {0}")]
    CacheUnavailable(#[source] StoreError),

    #[error("upstream failure: {0}")]
    UpstreamFailure(#[source] BoxError),

    #[error("upstream timed out after {0:?}")]
    UpstreamTimeout(Duration),

    #[error("failed to invalidate {resource} cache: {source}")]
    InvalidationFailure {
        resource: ResourceKind,
        #[source]
        source: StoreError,
    },

    #[error("failed to serialize response: {0}")]
    Serialize(#[from] serde_json::Error),
}
