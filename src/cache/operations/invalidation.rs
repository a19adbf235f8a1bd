use std::sync::Arc;

use crate::cache::keys::cache_pattern;
use crate::common::ResourceKind;
use crate::store::{KeyValueStore, SCAN_CURSOR_START, StoreError};

/// 每批扫描的默认键数量
pub const DEFAULT_SCAN_BATCH: usize = 100;

/// 缓存失效
///
/// 用游标 SCAN 按资源前缀分批找出缓存键并逐批删除，每次调用只做有限的工作，
/// 不会用 KEYS 阻塞共享存储。
///
/// 与并发的回填之间存在一个可接受的最终一致窗口：失效进行中完成的回填
/// 可能留下一条旧数据，直到下一次失效或过期时间到期。
#[derive(Clone)]
pub struct CacheInvalidator {
    store: Arc<dyn KeyValueStore>,
    batch_size: usize,
}

impl CacheInvalidator {
    pub fn new(store: Arc<dyn KeyValueStore>, batch_size: usize) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
        }
    }

    /// 删除该资源所有查询变体的缓存，返回删除的键数量
    pub async fn invalidate(&self, resource: ResourceKind) -> Result<usize, StoreError> {
        let pattern = cache_pattern(resource);
        let mut cursor = SCAN_CURSOR_START;
        let mut removed = 0;

        loop {
            let (next_cursor, keys) = self
                .store
                .scan(cursor, &pattern, self.batch_size)
                .await?;

            if !keys.is_empty() {
                removed += self.store.del(&keys).await?;
                tracing::debug!("Deleted cache keys: {:?}", keys);
            }

            cursor = next_cursor;
            if cursor == SCAN_CURSOR_START {
                break;
            }
        }

        Ok(removed)
    }
}
