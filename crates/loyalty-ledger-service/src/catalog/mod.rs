//! 目录缓存模块

pub mod cache;

pub use cache::CatalogCache;
