// 缓存模块
// 列表查询的读穿缓存，以及写入后的按前缀扫描失效

pub mod keys;
pub mod operations;

pub use operations::{CacheInvalidator, CacheLookup, ReadThroughCache};
