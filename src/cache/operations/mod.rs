/// 缓存操作

// 读穿缓存
pub mod read_through;

// 缓存失效
pub mod invalidation;

pub use invalidation::CacheInvalidator;
pub use read_through::{CacheLookup, ReadThroughCache};
