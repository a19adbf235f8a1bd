// 键值存储模块
// 限流计数器与查询缓存共用同一个存储，按键前缀区分命名空间

pub mod error;
pub mod memory;
pub mod redis_store;
#[cfg(test)]
pub(crate) mod testing;

use std::time::Duration;

use async_trait::async_trait;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use redis_store::RedisStore;

/// 游标扫描的起止哨兵值
pub const SCAN_CURSOR_START: u64 = 0;

/// 共享键值存储
///
/// 所有操作都是单键原子操作，调用方之间不需要额外加锁。
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// 原子自增计数器，结果为 1（新建窗口）或键没有过期时间时设置 `window` 过期。
    ///
    /// 返回自增后的值。窗口内后续自增不会续期。
    async fn incr_with_expiry(&self, key: &str, window: Duration) -> Result<i64, StoreError>;

    /// 单独自增，不改变过期时间
    async fn incr(&self, key: &str) -> Result<i64, StoreError>;

    /// 设置过期时间，键不存在时返回 `false`
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError>;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// 无条件覆盖写入，并设置过期时间
    async fn set_ex(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), StoreError>;

    /// 按模式增量扫描，返回 `(下一个游标, 本批匹配的键)`；游标回到 0 表示扫描结束
    async fn scan(
        &self,
        cursor: u64,
        pattern: &str,
        count: usize,
    ) -> Result<(u64, Vec<String>), StoreError>;

    /// 删除多个键，返回实际删除的数量
    async fn del(&self, keys: &[String]) -> Result<usize, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

/// 过期时间换算成秒，至少 1 秒
pub(crate) fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

/// 按存储的秒级精度取整后的过期时间
pub(crate) fn effective_ttl(ttl: Duration) -> Duration {
    Duration::from_secs(ttl_secs(ttl))
}
