use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use super::{KeyValueStore, MemoryStore, StoreError};

fn injected(op: &'static str) -> StoreError {
    StoreError::Timeout {
        op,
        after: Duration::from_millis(0),
    }
}

/// 可以按操作类型注入故障的测试存储
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    fail_counter: AtomicBool,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    fail_scans: AtomicBool,
    scans: AtomicUsize,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_counter(&self, fail: bool) {
        self.fail_counter.store(fail, Ordering::SeqCst);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_scans(&self, fail: bool) {
        self.fail_scans.store(fail, Ordering::SeqCst);
    }

    /// 已执行的扫描批次数
    pub fn scans(&self) -> usize {
        self.scans.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeyValueStore for FlakyStore {
    async fn incr_with_expiry(&self, key: &str, window: Duration) -> Result<i64, StoreError> {
        if self.fail_counter.load(Ordering::SeqCst) {
            return Err(injected("incr_with_expiry"));
        }
        self.inner.incr_with_expiry(key, window).await
    }

    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        if self.fail_counter.load(Ordering::SeqCst) {
            return Err(injected("incr"));
        }
        self.inner.incr(key).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        if self.fail_counter.load(Ordering::SeqCst) {
            return Err(injected("expire"));
        }
        self.inner.expire(key, ttl).await
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(injected("get"));
        }
        self.inner.get(key).await
    }

    async fn set_ex(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(injected("set_ex"));
        }
        self.inner.set_ex(key, value, ttl).await
    }

    async fn scan(
        &self,
        cursor: u64,
        pattern: &str,
        count: usize,
    ) -> Result<(u64, Vec<String>), StoreError> {
        if self.fail_scans.load(Ordering::SeqCst) {
            return Err(injected("scan"));
        }
        self.scans.fetch_add(1, Ordering::SeqCst);
        self.inner.scan(cursor, pattern, count).await
    }

    async fn del(&self, keys: &[String]) -> Result<usize, StoreError> {
        if self.fail_scans.load(Ordering::SeqCst) {
            return Err(injected("del"));
        }
        self.inner.del(keys).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.inner.ping().await
    }
}
