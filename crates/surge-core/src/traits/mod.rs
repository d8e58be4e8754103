pub mod cache;
pub mod storage;

pub use cache::CacheBackend;
pub use storage::StorageBackend;
