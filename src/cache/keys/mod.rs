// 缓存键模块
// 限流计数器和列表缓存的键都在这里生成，保证同一查询总是得到同一个键

use std::collections::BTreeMap;

use crate::common::{ListQuery, ResourceKind};

/// 限流计数器键前缀
const RATE_LIMIT_PREFIX: &str = "rl";

/// 表示“不过滤/不限制”的哨兵值
pub const ALL_SENTINEL: &str = "all";

/// 生成限流计数器键
pub fn rate_limit_key(resource: ResourceKind, client: &str) -> String {
    format!("{}:{}:{}", RATE_LIMIT_PREFIX, resource.name(), client)
}

/// 生成列表缓存键
///
/// 参数先按资源规范化，再按参数名排序拼接，例如
/// `students:departmentId=3:limit=all`。
pub fn list_cache_key(resource: ResourceKind, query: &ListQuery) -> String {
    let normalized = resource.normalize(query);

    let mut params: BTreeMap<&'static str, String> = BTreeMap::new();
    params.insert("limit", param_value(normalized.limit));
    if resource.accepts_department_filter() {
        params.insert("departmentId", param_value(normalized.department_id));
    }

    let mut key = String::from(resource.cache_prefix());
    for (name, value) in params {
        key.push(':');
        key.push_str(name);
        key.push('=');
        key.push_str(&value);
    }
    key
}

/// 生成单个实体的缓存键，例如 `professors:id=7`；与列表键共用前缀，随资源一起失效
pub fn entity_cache_key(resource: ResourceKind, id: i32) -> String {
    format!("{}:id={}", resource.cache_prefix(), id)
}

/// 资源全部缓存键的扫描模式
pub fn cache_pattern(resource: ResourceKind) -> String {
    format!("{}:*", resource.cache_prefix())
}

fn param_value<T: ToString>(value: Option<T>) -> String {
    value
        .map(|v| v.to_string())
        .unwrap_or_else(|| ALL_SENTINEL.to_string())
}
