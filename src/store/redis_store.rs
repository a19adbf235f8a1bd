use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use redis::{AsyncCommands, Client as RedisClient, RedisResult, Script, aio::MultiplexedConnection};

use super::{KeyValueStore, StoreError, ttl_secs};

// INCR 与首次 EXPIRE 在同一个脚本里执行，不存在只自增不过期的计数器。
// TTL 为 -1（键存在但没有过期时间）时补设过期，窗口内不会续期。
const INCR_WITH_EXPIRY_SCRIPT: &str = r#"
local current = redis.call('INCR', KEYS[1])
if current == 1 or redis.call('TTL', KEYS[1]) == -1 then
    redis.call('EXPIRE', KEYS[1], ARGV[1])
end
return current
"#;

/// Redis 存储实现
///
/// 进程启动时建立一条多路复用连接，所有请求克隆复用；每次调用都有超时上限。
#[derive(Clone)]
pub struct RedisStore {
    conn: MultiplexedConnection,
    incr_script: Script,
    timeout: Duration,
}

impl RedisStore {
    pub async fn connect(client: &RedisClient, timeout: Duration) -> Result<Self, StoreError> {
        let conn = tokio::time::timeout(timeout, client.get_multiplexed_async_connection())
            .await
            .map_err(|_| StoreError::Timeout {
                op: "connect",
                after: timeout,
            })??;

        Ok(Self {
            conn,
            incr_script: Script::new(INCR_WITH_EXPIRY_SCRIPT),
            timeout,
        })
    }

    async fn bounded<T>(
        &self,
        op: &'static str,
        fut: impl Future<Output = RedisResult<T>> + Send,
    ) -> Result<T, StoreError> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(StoreError::Timeout {
                op,
                after: self.timeout,
            }),
        }
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn incr_with_expiry(&self, key: &str, window: Duration) -> Result<i64, StoreError> {
        let mut conn = self.conn.clone();
        let mut invocation = self.incr_script.prepare_invoke();
        invocation.key(key).arg(ttl_secs(window));

        self.bounded("incr_with_expiry", invocation.invoke_async(&mut conn)).await
    }

    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        let mut conn = self.conn.clone();
        self.bounded("incr", conn.incr(key, 1)).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let secs = i64::try_from(ttl_secs(ttl)).unwrap_or(i64::MAX);
        self.bounded("expire", conn.expire(key, secs)).await
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let mut conn = self.conn.clone();
        self.bounded("get", conn.get(key)).await
    }

    async fn set_ex(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        self.bounded("set_ex", conn.set_ex(key, value.to_vec(), ttl_secs(ttl))).await
    }

    async fn scan(
        &self,
        cursor: u64,
        pattern: &str,
        count: usize,
    ) -> Result<(u64, Vec<String>), StoreError> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("SCAN");
        cmd.arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(count);

        self.bounded("scan", cmd.query_async(&mut conn)).await
    }

    async fn del(&self, keys: &[String]) -> Result<usize, StoreError> {
        if keys.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn.clone();
        self.bounded("del", conn.del(keys.to_vec())).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: String = self
            .bounded("ping", redis::cmd("PING").query_async(&mut conn))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 需要真实 Redis：REDIS_URL=redis://127.0.0.1/ cargo test -- --ignored
    async fn connect() -> Option<RedisStore> {
        let url = std::env::var("REDIS_URL").ok()?;
        let client = RedisClient::open(url).unwrap();
        Some(
            RedisStore::connect(&client, Duration::from_secs(2))
                .await
                .unwrap(),
        )
    }

    fn unique(prefix: &str) -> String {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        format!("{}:{}", prefix, nanos)
    }

    async fn ttl_of(store: &RedisStore, key: &str) -> i64 {
        let mut conn = store.conn.clone();
        redis::cmd("TTL").arg(key).query_async(&mut conn).await.unwrap()
    }

    #[tokio::test]
    #[ignore]
    async fn test_concurrent_first_increments_share_one_window() {
        let Some(store) = connect().await else {
            return;
        };
        let key = unique("rl:test");
        let window = Duration::from_secs(60);

        let (a, b) = tokio::join!(
            store.incr_with_expiry(&key, window),
            store.incr_with_expiry(&key, window),
        );
        let mut counts = [a.unwrap(), b.unwrap()];
        counts.sort();
        assert_eq!(counts, [1, 2]);

        let ttl = ttl_of(&store, &key).await;
        assert!(ttl > 0 && ttl <= 60, "unexpected ttl {ttl}");

        store.del(&[key]).await.unwrap();
    }

    #[tokio::test]
    #[ignore]
    async fn test_counter_without_expiry_gets_one() {
        let Some(store) = connect().await else {
            return;
        };
        let key = unique("rl:test");

        assert_eq!(store.incr(&key).await.unwrap(), 1);
        assert_eq!(ttl_of(&store, &key).await, -1);

        assert_eq!(
            store
                .incr_with_expiry(&key, Duration::from_secs(30))
                .await
                .unwrap(),
            2
        );
        let ttl = ttl_of(&store, &key).await;
        assert!(ttl > 0 && ttl <= 30, "unexpected ttl {ttl}");

        store.del(&[key]).await.unwrap();
    }

    #[tokio::test]
    #[ignore]
    async fn test_scan_reply_decodes_and_del_counts() {
        let Some(store) = connect().await else {
            return;
        };
        let prefix = unique("scantest");
        for i in 0..30 {
            store
                .set_ex(&format!("{prefix}:k{i}"), b"[]", Duration::from_secs(60))
                .await
                .unwrap();
        }
        assert_eq!(
            store.get(&format!("{prefix}:k0")).await.unwrap(),
            Some(b"[]".to_vec())
        );

        let pattern = format!("{prefix}:*");
        let mut cursor = crate::store::SCAN_CURSOR_START;
        let mut removed = 0;
        loop {
            let (next, keys) = store.scan(cursor, &pattern, 7).await.unwrap();
            removed += store.del(&keys).await.unwrap();
            cursor = next;
            if cursor == crate::store::SCAN_CURSOR_START {
                break;
            }
        }

        assert_eq!(removed, 30);
        assert_eq!(store.get(&format!("{prefix}:k0")).await.unwrap(), None);
        store.ping().await.unwrap();
    }
}
