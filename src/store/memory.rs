use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::{KeyValueStore, SCAN_CURSOR_START, StoreError, effective_ttl};

/// 进程内存储实现
///
/// 语义与 Redis 保持一致：过期键惰性清理；游标扫描保证扫描期间一直存在的键至少返回一次，
/// 扫描过程中删除已返回的键不会导致遗漏。用于测试和没有 Redis 的本地运行。
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    // 插入序号 -> 键，扫描游标就是序号
    order: BTreeMap<u64, String>,
    next_seq: u64,
}

struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
    seq: u64,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

impl Inner {
    /// 取出未过期的条目，已过期的顺手删掉
    fn live(&mut self, key: &str, now: Instant) -> Option<&mut Entry> {
        if self.entries.get(key).is_some_and(|e| e.is_expired(now)) {
            self.remove(key);
        }
        self.entries.get_mut(key)
    }

    fn remove(&mut self, key: &str) -> bool {
        match self.entries.remove(key) {
            Some(entry) => {
                self.order.remove(&entry.seq);
                true
            }
            None => false,
        }
    }

    /// 自增并保留原有过期时间，返回 `(新值, 过期时间)`
    fn incr(&mut self, key: &str, now: Instant) -> Result<(i64, Option<Instant>), StoreError> {
        let (current, expires_at) = match self.live(key, now) {
            Some(entry) => {
                let current = std::str::from_utf8(&entry.value)
                    .ok()
                    .and_then(|raw| raw.parse::<i64>().ok())
                    .ok_or_else(|| StoreError::NotAnInteger(key.to_string()))?;
                (current, entry.expires_at)
            }
            None => (0, None),
        };

        let next = current + 1;
        self.insert(key, next.to_string().into_bytes(), expires_at);
        Ok((next, expires_at))
    }

    fn insert(&mut self, key: &str, value: Vec<u8>, expires_at: Option<Instant>) {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.value = value;
            entry.expires_at = expires_at;
            return;
        }

        // 序号从 1 开始，0 留给扫描的起止哨兵
        self.next_seq += 1;
        let seq = self.next_seq;
        self.order.insert(seq, key.to_string());
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at,
                seq,
            },
        );
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 键的剩余存活时间；键不存在返回 `None`，没有过期时间返回 `Some(None)`
    pub async fn ttl(&self, key: &str) -> Option<Option<Duration>> {
        let now = Instant::now();
        let mut inner = self.inner.lock().await;
        inner
            .live(key, now)
            .map(|entry| entry.expires_at.map(|at| at.saturating_duration_since(now)))
    }

    pub async fn len(&self) -> usize {
        let now = Instant::now();
        let inner = self.inner.lock().await;
        inner
            .entries
            .values()
            .filter(|entry| !entry.is_expired(now))
            .count()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn incr_with_expiry(&self, key: &str, window: Duration) -> Result<i64, StoreError> {
        let now = Instant::now();
        let mut inner = self.inner.lock().await;

        let (next, expires_at) = inner.incr(key, now)?;
        // 新建窗口或计数器没有过期时间时才设置，窗口内不续期
        if next == 1 || expires_at.is_none() {
            if let Some(entry) = inner.live(key, now) {
                entry.expires_at = Some(now + effective_ttl(window));
            }
        }

        Ok(next)
    }

    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        let now = Instant::now();
        let mut inner = self.inner.lock().await;
        inner.incr(key, now).map(|(next, _)| next)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut inner = self.inner.lock().await;
        Ok(match inner.live(key, now) {
            Some(entry) => {
                entry.expires_at = Some(now + effective_ttl(ttl));
                true
            }
            None => false,
        })
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let now = Instant::now();
        let mut inner = self.inner.lock().await;
        Ok(inner.live(key, now).map(|entry| entry.value.clone()))
    }

    async fn set_ex(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), StoreError> {
        let now = Instant::now();
        let mut inner = self.inner.lock().await;
        // 覆盖写入时也要先丢掉过期条目，保证序号是新的
        inner.live(key, now);
        inner.insert(key, value.to_vec(), Some(now + effective_ttl(ttl)));
        Ok(())
    }

    async fn scan(
        &self,
        cursor: u64,
        pattern: &str,
        count: usize,
    ) -> Result<(u64, Vec<String>), StoreError> {
        let now = Instant::now();
        let mut inner = self.inner.lock().await;
        let count = count.max(1);

        let batch: Vec<(u64, String)> = inner
            .order
            .range(cursor.max(1)..)
            .take(count)
            .map(|(seq, key)| (*seq, key.clone()))
            .collect();

        let next_cursor = match batch.last() {
            Some((seq, _)) if inner.order.range(seq + 1..).next().is_some() => seq + 1,
            _ => SCAN_CURSOR_START,
        };

        let mut keys = Vec::new();
        for (_, key) in batch {
            if inner.live(&key, now).is_some() && glob_match(pattern, &key) {
                keys.push(key);
            }
        }

        Ok((next_cursor, keys))
    }

    async fn del(&self, keys: &[String]) -> Result<usize, StoreError> {
        let now = Instant::now();
        let mut inner = self.inner.lock().await;
        let mut removed = 0;
        for key in keys {
            if inner.live(key, now).is_some() && inner.remove(key) {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Redis 风格的通配匹配，支持 `*`、`?` 和 `\` 转义
fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    let (mut p, mut t) = (0, 0);
    // 最近一个 `*` 的位置，以及它当时对应的文本位置
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p).copied() {
            Some('*') => {
                backtrack = Some((p, t));
                p += 1;
                continue;
            }
            Some('?') => {
                p += 1;
                t += 1;
                continue;
            }
            Some('\\') if p + 1 < pattern.len() && pattern[p + 1] == text[t] => {
                p += 2;
                t += 1;
                continue;
            }
            Some(c) if c != '\\' && c == text[t] => {
                p += 1;
                t += 1;
                continue;
            }
            _ => {}
        }

        match backtrack {
            Some((star, matched)) => {
                p = star + 1;
                t = matched + 1;
                backtrack = Some((star, matched + 1));
            }
            None => return false,
        }
    }

    pattern[p..].iter().all(|&c| c == '*')
}
