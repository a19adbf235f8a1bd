// 请求治理
// 每个资源请求的处理顺序：限流 -> 读：查缓存/回源/回填；写：写库/失效缓存

pub mod error;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

pub use error::{BoxError, GovernError};

use crate::{
    cache::{
        CacheInvalidator, CacheLookup, ReadThroughCache,
        keys::{entity_cache_key, list_cache_key},
    },
    common::{ListQuery, ResourceKind},
    config::Config,
    middleware::{Admission, ClientIdentity, RateLimitPolicy, RateLimiter},
    store::KeyValueStore,
};

/// 对外的抽象状态，由路由层映射成具体的 HTTP 状态码
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GovernStatus {
    Ok,
    RateLimited,
    ServerError,
}

/// 一次受治理请求的最终结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Governed {
    /// 序列化好的 JSON 响应体；缓存命中时与写入缓存的内容逐字节一致
    Ok(Vec<u8>),
    RateLimited { retry_after: Duration },
    /// 不携带任何内部细节
    ServerError,
}

impl Governed {
    pub fn status(&self) -> GovernStatus {
        match self {
            Governed::Ok(_) => GovernStatus::Ok,
            Governed::RateLimited { .. } => GovernStatus::RateLimited,
            Governed::ServerError => GovernStatus::ServerError,
        }
    }
}

/// 所有资源共用的请求治理器，按 [`ResourceKind`] 区分键前缀与查询规范化
#[derive(Clone)]
pub struct RequestGovernor {
    limiter: RateLimiter,
    cache: ReadThroughCache,
    invalidator: CacheInvalidator,
    upstream_timeout: Duration,
}

impl RequestGovernor {
    pub fn new(
        limiter: RateLimiter,
        cache: ReadThroughCache,
        invalidator: CacheInvalidator,
        upstream_timeout: Duration,
    ) -> Self {
        Self {
            limiter,
            cache,
            invalidator,
            upstream_timeout,
        }
    }

    pub fn from_config(store: Arc<dyn KeyValueStore>, config: &Config) -> Self {
        Self::new(
            RateLimiter::new(store.clone(), RateLimitPolicy::from_config(config)),
            ReadThroughCache::new(store.clone(), config.cache_ttl()),
            CacheInvalidator::new(store, config.scan_batch_size),
            config.upstream_timeout(),
        )
    }

    /// 受治理的列表读取
    ///
    /// `fetch` 收到规范化后的查询，缓存键由同一份查询生成。
    pub async fn govern_read<T, E, F, Fut>(
        &self,
        resource: ResourceKind,
        client: &ClientIdentity,
        query: &ListQuery,
        fetch: F,
    ) -> Governed
    where
        T: Serialize,
        E: Into<BoxError>,
        F: FnOnce(ListQuery) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let result = self.read(resource, client, query, fetch).await;
        self.conclude(resource, result)
    }

    /// 受治理的按 id 读取，与列表共用缓存前缀
    ///
    /// 实体不存在时 `fetch` 返回 `None`，结果体为 `null`，同样会被缓存直到过期或失效。
    pub async fn govern_get<T, E, F, Fut>(
        &self,
        resource: ResourceKind,
        client: &ClientIdentity,
        id: i32,
        fetch: F,
    ) -> Governed
    where
        T: Serialize,
        E: Into<BoxError>,
        F: FnOnce(i32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let result = self.read_one(resource, client, id, fetch).await;
        self.conclude(resource, result)
    }

    /// 受治理的写入，成功后在返回前失效相关缓存
    pub async fn govern_write<T, E, F, Fut>(
        &self,
        resource: ResourceKind,
        client: &ClientIdentity,
        mutate: F,
    ) -> Governed
    where
        T: Serialize,
        E: Into<BoxError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let result = self.write(resource, client, mutate).await;
        self.conclude(resource, result)
    }

    async fn read<T, E, F, Fut>(
        &self,
        resource: ResourceKind,
        client: &ClientIdentity,
        query: &ListQuery,
        fetch: F,
    ) -> Result<Vec<u8>, GovernError>
    where
        T: Serialize,
        E: Into<BoxError>,
        F: FnOnce(ListQuery) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.check_rate(resource, client).await?;

        let query = resource.normalize(query);
        let key = list_cache_key(resource, &query);

        self.read_through(&key, fetch(query)).await
    }

    async fn read_one<T, E, F, Fut>(
        &self,
        resource: ResourceKind,
        client: &ClientIdentity,
        id: i32,
        fetch: F,
    ) -> Result<Vec<u8>, GovernError>
    where
        T: Serialize,
        E: Into<BoxError>,
        F: FnOnce(i32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.check_rate(resource, client).await?;
        self.read_through(&entity_cache_key(resource, id), fetch(id))
            .await
    }

    // 命中直接返回；未命中回源并回填，回源失败不写缓存
    async fn read_through<T, E>(
        &self,
        key: &str,
        fetch: impl Future<Output = Result<T, E>>,
    ) -> Result<Vec<u8>, GovernError>
    where
        T: Serialize,
        E: Into<BoxError>,
    {
        if let CacheLookup::Hit(body) = self.cache.get(key).await {
            return Ok(body);
        }

        let value = self.call_upstream(fetch).await?;
        let body = serde_json::to_vec(&value)?;
        self.cache.populate(key, &body).await;

        Ok(body)
    }

    async fn write<T, E, F, Fut>(
        &self,
        resource: ResourceKind,
        client: &ClientIdentity,
        mutate: F,
    ) -> Result<Vec<u8>, GovernError>
    where
        T: Serialize,
        E: Into<BoxError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.check_rate(resource, client).await?;

        let value = match self.call_upstream(mutate()).await {
            Ok(value) => value,
            Err(e @ GovernError::UpstreamTimeout(_)) => {
                // 超时的写入可能已经提交，保守地失效一次
                self.invalidate_scope(resource).await;
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        self.invalidate_scope(resource).await;

        Ok(serde_json::to_vec(&value)?)
    }

    async fn check_rate(
        &self,
        resource: ResourceKind,
        client: &ClientIdentity,
    ) -> Result<(), GovernError> {
        match self
            .limiter
            .admit(resource, client)
            .await
            .map_err(GovernError::LimiterUnavailable)?
        {
            Admission::Admitted { .. } => Ok(()),
            Admission::Denied { retry_after, .. } => Err(GovernError::RateLimited { retry_after }),
        }
    }

    async fn call_upstream<T, E>(
        &self,
        fut: impl Future<Output = Result<T, E>>,
    ) -> Result<T, GovernError>
    where
        E: Into<BoxError>,
    {
        match tokio::time::timeout(self.upstream_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(GovernError::UpstreamFailure(e.into())),
            Err(_) => Err(GovernError::UpstreamTimeout(self.upstream_timeout)),
        }
    }

    /// 失效失败只记录日志，不回滚已经成功的写入；残留的旧缓存会在过期后自愈
    async fn invalidate_scope(&self, resource: ResourceKind) {
        for &target in resource.invalidation_scope() {
            match self.invalidator.invalidate(target).await {
                Ok(removed) => tracing::debug!(
                    resource = resource.name(),
                    target = target.name(),
                    removed,
                    "Cache invalidated"
                ),
                Err(source) => {
                    let err = GovernError::InvalidationFailure {
                        resource: target,
                        source,
                    };
                    tracing::warn!(resource = resource.name(), error = %err, "Cache invalidation failed");
                }
            }
        }
    }

    fn conclude(&self, resource: ResourceKind, result: Result<Vec<u8>, GovernError>) -> Governed {
        match result {
            Ok(body) => Governed::Ok(body),
            Err(GovernError::RateLimited { retry_after }) => Governed::RateLimited { retry_after },
            Err(e) => {
                tracing::error!(resource = resource.name(), error = %e, "Governed request failed");
                Governed::ServerError
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde::Deserialize;

    use super::*;
    use crate::cache::operations::invalidation::DEFAULT_SCAN_BATCH;
    use crate::cache::operations::read_through::LIST_CACHE_EXPIRE;
    use crate::store::MemoryStore;
    use crate::store::testing::FlakyStore;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Professor {
        id: i32,
        name: String,
        department_id: i32,
    }

    /// 只记录调用次数的假数据库
    #[derive(Default)]
    struct FakeDb {
        professors: Mutex<Vec<Professor>>,
        reads: AtomicUsize,
    }

    impl FakeDb {
        async fn find_many(&self, query: ListQuery) -> Result<Vec<Professor>, std::io::Error> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            let professors = self.professors.lock().unwrap();
            let limit = query.limit.map(|l| l as usize).unwrap_or(usize::MAX);
            Ok(professors
                .iter()
                .filter(|p| query.department_id.is_none_or(|id| p.department_id == id))
                .take(limit)
                .cloned()
                .collect())
        }

        async fn create(&self, name: &str, department_id: i32) -> Result<Professor, std::io::Error> {
            let mut professors = self.professors.lock().unwrap();
            let professor = Professor {
                id: professors.len() as i32 + 1,
                name: name.to_string(),
                department_id,
            };
            professors.push(professor.clone());
            Ok(professor)
        }

        fn reads(&self) -> usize {
            self.reads.load(Ordering::SeqCst)
        }
    }

    fn governor(store: Arc<dyn KeyValueStore>, max_requests: u32) -> RequestGovernor {
        RequestGovernor::new(
            RateLimiter::new(
                store.clone(),
                RateLimitPolicy::new(max_requests, Duration::from_secs(60)),
            ),
            ReadThroughCache::new(store.clone(), Duration::from_secs(LIST_CACHE_EXPIRE)),
            CacheInvalidator::new(store, DEFAULT_SCAN_BATCH),
            Duration::from_secs(5),
        )
    }

    fn decode(governed: &Governed) -> Vec<Professor> {
        match governed {
            Governed::Ok(body) => serde_json::from_slice(body).unwrap(),
            other => panic!("expected ok, got {other:?}"),
        }
    }

    async fn list(
        governor: &RequestGovernor,
        db: &FakeDb,
        client: &ClientIdentity,
        query: &ListQuery,
    ) -> Governed {
        governor
            .govern_read(ResourceKind::Professor, client, query, |q| db.find_many(q))
            .await
    }

    #[tokio::test]
    async fn test_sixth_request_in_window_is_rate_limited() {
        let governor = governor(Arc::new(MemoryStore::new()), 5);
        let client = ClientIdentity::new("10.0.0.1");
        let fetch_count = AtomicUsize::new(0);
        let fetches = &fetch_count;

        for _ in 0..5 {
            let governed = governor
                .govern_read(
                    ResourceKind::Department,
                    &client,
                    &ListQuery::default(),
                    |_| async move {
                        fetches.fetch_add(1, Ordering::SeqCst);
                        Ok::<_, std::io::Error>(vec!["Information Technology"])
                    },
                )
                .await;
            assert_eq!(governed, Governed::Ok(br#"["Information Technology"]"#.to_vec()));
        }
        // 只有第一次回源，后面都命中缓存
        assert_eq!(fetch_count.load(Ordering::SeqCst), 1);

        let governed = governor
            .govern_read(
                ResourceKind::Department,
                &client,
                &ListQuery::default(),
                |_| async { Ok::<_, std::io::Error>(Vec::<String>::new()) },
            )
            .await;
        assert_eq!(governed.status(), GovernStatus::RateLimited);
        assert_eq!(
            governed,
            Governed::RateLimited {
                retry_after: Duration::from_secs(60)
            }
        );
    }

    #[tokio::test]
    async fn test_write_invalidates_cached_list() {
        let governor = governor(Arc::new(MemoryStore::new()), 100);
        let db = FakeDb::default();
        let client = ClientIdentity::new("10.0.0.1");
        let query = ListQuery {
            limit: None,
            department_id: Some(1),
        };

        db.create("Ada", 1).await.unwrap();
        assert_eq!(decode(&list(&governor, &db, &client, &query).await).len(), 1);
        assert_eq!(decode(&list(&governor, &db, &client, &query).await).len(), 1);
        assert_eq!(db.reads(), 1);

        let created = governor
            .govern_write(ResourceKind::Professor, &client, || db.create("Grace", 1))
            .await;
        assert_eq!(created.status(), GovernStatus::Ok);

        let professors = decode(&list(&governor, &db, &client, &query).await);
        assert_eq!(db.reads(), 2);
        assert_eq!(
            professors.iter().map(|p| p.name.as_str()).collect::<Vec<_>>(),
            ["Ada", "Grace"]
        );
    }

    #[tokio::test]
    async fn test_write_invalidates_related_resources() {
        let store = Arc::new(MemoryStore::new());
        let governor = governor(store.clone(), 100);
        let client = ClientIdentity::new("10.0.0.1");

        let department_key = list_cache_key(ResourceKind::Department, &ListQuery::default());
        store
            .set_ex(&department_key, b"[]", Duration::from_secs(60))
            .await
            .unwrap();

        let governed = governor
            .govern_write(ResourceKind::Student, &client, || async {
                Ok::<_, std::io::Error>(serde_json::json!({ "id": 1 }))
            })
            .await;

        assert_eq!(governed, Governed::Ok(br#"{"id":1}"#.to_vec()));
        assert_eq!(store.get(&department_key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_server_error_and_not_cached() {
        let store = Arc::new(MemoryStore::new());
        let governor = governor(store.clone(), 100);
        let client = ClientIdentity::new("10.0.0.1");

        let governed = governor
            .govern_read(
                ResourceKind::Student,
                &client,
                &ListQuery::default(),
                |_| async {
                    Err::<Vec<String>, _>(std::io::Error::other("connection refused"))
                },
            )
            .await;

        assert_eq!(governed, Governed::ServerError);
        let key = list_cache_key(ResourceKind::Student, &ListQuery::default());
        assert_eq!(store.get(&key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_failed_write_does_not_invalidate() {
        let store = Arc::new(MemoryStore::new());
        let governor = governor(store.clone(), 100);
        let client = ClientIdentity::new("10.0.0.1");
        let key = list_cache_key(ResourceKind::Professor, &ListQuery::default());
        store
            .set_ex(&key, b"[]", Duration::from_secs(60))
            .await
            .unwrap();

        let governed = governor
            .govern_write(ResourceKind::Professor, &client, || async {
                Err::<(), _>(std::io::Error::other("foreign key violation"))
            })
            .await;

        assert_eq!(governed.status(), GovernStatus::ServerError);
        assert_eq!(store.get(&key).await.unwrap(), Some(b"[]".to_vec()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_upstream_timeout_is_server_error() {
        let governor = governor(Arc::new(MemoryStore::new()), 100);
        let client = ClientIdentity::new("10.0.0.1");

        let governed = governor
            .govern_read(
                ResourceKind::Department,
                &client,
                &ListQuery::default(),
                |_| async {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok::<_, std::io::Error>(Vec::<String>::new())
                },
            )
            .await;

        assert_eq!(governed, Governed::ServerError);
    }

    #[tokio::test]
    async fn test_cache_outage_falls_back_to_database() {
        let store = Arc::new(FlakyStore::new());
        let governor = governor(store.clone(), 100);
        let db = FakeDb::default();
        let client = ClientIdentity::new("10.0.0.1");
        db.create("Ada", 1).await.unwrap();

        store.fail_reads(true);
        store.fail_writes(true);
        store.fail_scans(true);

        let professors = decode(&list(&governor, &db, &client, &ListQuery::default()).await);
        assert_eq!(professors.len(), 1);

        let created = governor
            .govern_write(ResourceKind::Professor, &client, || db.create("Grace", 2))
            .await;
        assert_eq!(created.status(), GovernStatus::Ok);

        let professors = decode(&list(&governor, &db, &client, &ListQuery::default()).await);
        assert_eq!(professors.len(), 2);
        assert_eq!(db.reads(), 2);
    }

    #[tokio::test]
    async fn test_limiter_outage_fails_closed() {
        let store = Arc::new(FlakyStore::new());
        let governor = governor(store.clone(), 100);
        let db = FakeDb::default();
        store.fail_counter(true);

        let governed = list(
            &governor,
            &db,
            &ClientIdentity::new("10.0.0.1"),
            &ListQuery::default(),
        )
        .await;

        assert_eq!(governed, Governed::ServerError);
        assert_eq!(db.reads(), 0);
    }

    #[tokio::test]
    async fn test_get_by_id_is_cached_and_invalidated_by_writes() {
        let store = Arc::new(MemoryStore::new());
        let governor = governor(store.clone(), 100);
        let db = FakeDb::default();
        let client = ClientIdentity::new("10.0.0.1");
        db.create("Ada", 1).await.unwrap();

        let find = |id: i32| {
            let db = &db;
            async move {
                db.reads.fetch_add(1, Ordering::SeqCst);
                let professors = db.professors.lock().unwrap();
                Ok::<_, std::io::Error>(professors.iter().find(|p| p.id == id).cloned())
            }
        };

        for _ in 0..2 {
            let governed = governor
                .govern_get(ResourceKind::Professor, &client, 1, find)
                .await;
            assert_eq!(governed.status(), GovernStatus::Ok);
        }
        assert_eq!(db.reads(), 1);

        let missing = governor
            .govern_get(ResourceKind::Professor, &client, 2, find)
            .await;
        assert_eq!(missing, Governed::Ok(b"null".to_vec()));

        governor
            .govern_write(ResourceKind::Professor, &client, || db.create("Grace", 1))
            .await;

        let found = governor
            .govern_get(ResourceKind::Professor, &client, 2, find)
            .await;
        match found {
            Governed::Ok(body) => {
                let professor: Professor = serde_json::from_slice(&body).unwrap();
                assert_eq!(professor.name, "Grace");
            }
            other => panic!("expected ok, got {other:?}"),
        }
        assert_eq!(
            store
                .get(&entity_cache_key(ResourceKind::Professor, 1))
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_filter_normalization_shares_cache_entry() {
        let governor = governor(Arc::new(MemoryStore::new()), 100);
        let client = ClientIdentity::new("10.0.0.1");
        let fetches = AtomicUsize::new(0);

        for department_id in [None, Some(4)] {
            let query = ListQuery {
                limit: Some(3),
                department_id,
            };
            let governed = governor
                .govern_read(ResourceKind::Department, &client, &query, |q| {
                    assert_eq!(q.department_id, None);
                    fetches.fetch_add(1, Ordering::SeqCst);
                    async { Ok::<_, std::io::Error>(vec![1, 2, 3]) }
                })
                .await;
            assert_eq!(governed.status(), GovernStatus::Ok);
        }

        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }
}
