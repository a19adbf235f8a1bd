use std::env;
use std::str::FromStr;
use std::time::Duration;

/// 共享键值存储的实现
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Redis,
    /// 进程内存储，仅用于本地调试，多实例之间不共享
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "redis" => Ok(StoreBackend::Redis),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(format!("unknown store backend: {}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub store_backend: StoreBackend,
    pub server_host: String,
    pub server_port: u16,
    pub api_base_uri: String,
    pub rate_limit_window_secs: u64,
    pub rate_limit_requests: u32,
    pub cache_ttl_secs: u64,
    pub scan_batch_size: usize,
    pub store_timeout_ms: u64,
    pub upstream_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            redis_url: String::new(),
            store_backend: StoreBackend::Redis,
            server_host: "0.0.0.0".to_string(),
            server_port: 3000,
            api_base_uri: "/api".to_string(),
            rate_limit_window_secs: 60,
            rate_limit_requests: 5,
            cache_ttl_secs: 60,
            scan_batch_size: 100,
            store_timeout_ms: 2000,
            upstream_timeout_ms: 5000,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        dotenv::dotenv().ok();

        let defaults = Config::default();
        Ok(Config {
            database_url: env::var("DATABASE_URL")?,
            redis_url: env::var("REDIS_URL")?,
            store_backend: parse_or("STORE_BACKEND", defaults.store_backend),
            server_host: env::var("SERVER_HOST").unwrap_or(defaults.server_host),
            server_port: parse_or("SERVER_PORT", defaults.server_port),
            api_base_uri: env::var("API_BASE_URI").unwrap_or(defaults.api_base_uri),
            rate_limit_window_secs: parse_or("RATE_LIMIT_WINDOW", defaults.rate_limit_window_secs),
            rate_limit_requests: parse_or("RATE_LIMIT_REQUESTS", defaults.rate_limit_requests),
            cache_ttl_secs: parse_or("CACHE_TTL", defaults.cache_ttl_secs),
            scan_batch_size: parse_or("SCAN_BATCH_SIZE", defaults.scan_batch_size),
            store_timeout_ms: parse_or("STORE_TIMEOUT_MS", defaults.store_timeout_ms),
            upstream_timeout_ms: parse_or("UPSTREAM_TIMEOUT_MS", defaults.upstream_timeout_ms),
        })
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_millis(self.upstream_timeout_ms)
    }
}

// 可选变量：未设置用默认值，格式错误时告警后用默认值
fn parse_or<T: FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid value for {}: {:?}, using default", name, raw);
            default
        }),
        Err(_) => default,
    }
}
