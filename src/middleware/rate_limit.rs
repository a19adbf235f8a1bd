use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{HeaderMap, request::Parts},
};

use crate::{
    cache::keys::rate_limit_key,
    common::ResourceKind,
    config::Config,
    store::{KeyValueStore, StoreError},
};

/// 无法识别客户端时使用的标识
pub const UNKNOWN_CLIENT: &str = "unknown";

/// 客户端标识，优先取代理转发的地址，其次取连接对端地址
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity(String);

impl ClientIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        let id = id.trim();
        if id.is_empty() {
            Self(UNKNOWN_CLIENT.to_string())
        } else {
            Self(id.to_string())
        }
    }

    pub fn from_headers(headers: &HeaderMap, remote_addr: Option<SocketAddr>) -> Self {
        let remote_ip = remote_addr.map(|addr| addr.ip().to_string());

        let ip = headers
            .get("x-real-ip")
            .and_then(|h| h.to_str().ok())
            .filter(|ip| !ip.trim().is_empty())
            .or_else(|| {
                headers
                    .get("x-forwarded-for")
                    .and_then(|h| h.to_str().ok())
                    .and_then(|s| s.split(',').find(|ip| !ip.trim().is_empty()))
            })
            // 降级使用连接IP
            .or(remote_ip.as_deref())
            .unwrap_or(UNKNOWN_CLIENT);

        Self::new(ip)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<S: Send + Sync> FromRequestParts<S> for ClientIdentity {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let remote_addr = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0);

        Ok(Self::from_headers(&parts.headers, remote_addr))
    }
}

/// 限流策略：每个窗口内允许的最大请求数
#[derive(Debug, Clone, Copy)]
pub struct RateLimitPolicy {
    pub max_requests: u32,
    pub window: Duration,
}

impl RateLimitPolicy {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.rate_limit_requests, config.rate_limit_window())
    }
}

/// 限流判定结果，`count` 为本窗口内自增后的计数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted { count: i64 },
    Denied { count: i64, retry_after: Duration },
}

/// 固定窗口限流器
///
/// 计数器键为 `(资源, 客户端)`，窗口在第一次请求时确定，之后的请求不会续期。
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn KeyValueStore>,
    policy: RateLimitPolicy,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn KeyValueStore>, policy: RateLimitPolicy) -> Self {
        Self { store, policy }
    }

    pub async fn admit(
        &self,
        resource: ResourceKind,
        client: &ClientIdentity,
    ) -> Result<Admission, StoreError> {
        let key = rate_limit_key(resource, client.as_str());

        // 自增和首次设置过期时间是同一个原子操作
        let count = self
            .store
            .incr_with_expiry(&key, self.policy.window)
            .await?;

        if count > i64::from(self.policy.max_requests) {
            tracing::info!(
                resource = resource.name(),
                client = client.as_str(),
                count,
                "Rate limit exceeded"
            );
            return Ok(Admission::Denied {
                count,
                retry_after: self.policy.window,
            });
        }

        Ok(Admission::Admitted { count })
    }
}
