use std::sync::Arc;
use std::time::Duration;

use crate::governor::GovernError;
use crate::store::KeyValueStore;

/// 列表缓存默认过期时间（秒）
pub const LIST_CACHE_EXPIRE: u64 = 60;

/// 缓存查询结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup {
    /// 命中，内容与写入时逐字节一致
    Hit(Vec<u8>),
    Miss,
}

/// 读穿缓存
///
/// 缓存只是优化：读写存储失败都只记录日志，读失败按未命中处理，
/// 调用方总能回退到数据库拿到正确结果。
#[derive(Clone)]
pub struct ReadThroughCache {
    store: Arc<dyn KeyValueStore>,
    ttl: Duration,
}

impl ReadThroughCache {
    pub fn new(store: Arc<dyn KeyValueStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub async fn get(&self, key: &str) -> CacheLookup {
        match self.store.get(key).await {
            Ok(Some(bytes)) => {
                tracing::debug!("Get list from cache: {}", key);
                CacheLookup::Hit(bytes)
            }
            Ok(None) => {
                tracing::debug!("Cache miss: {}", key);
                CacheLookup::Miss
            }
            Err(e) => {
                let err = GovernError::CacheUnavailable(e);
                tracing::warn!(key, error = %err, "Falling back to database");
                CacheLookup::Miss
            }
        }
    }

    /// 无条件覆盖已有条目并重设过期时间
    pub async fn populate(&self, key: &str, value: &[u8]) {
        match self.store.set_ex(key, value, self.ttl).await {
            Ok(()) => tracing::debug!("Set list to cache: {}", key),
            Err(e) => {
                let err = GovernError::CacheUnavailable(e);
                tracing::warn!(key, error = %err, "Result not cached");
            }
        }
    }
}
