use crate::error::Result;
use crate::types::{NewUser, UserId, UserPatch, UserRecord};
use async_trait::async_trait;

/// Relational store holding user rows
///
/// Implementations own their connection pooling and timeouts; the write
/// queue only sees success or failure.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Insert all rows in one statement.
    ///
    /// The returned records must be in the same order as `rows`: the Nth
    /// record is the row created from the Nth input. The insert is
    /// all-or-nothing.
    async fn bulk_insert(&self, rows: Vec<NewUser>) -> Result<Vec<UserRecord>>;

    /// Apply `patch` to the row, returning `None` if it does not exist.
    async fn update(&self, id: UserId, patch: UserPatch) -> Result<Option<UserRecord>>;

    /// Delete the row, returning whether it existed.
    async fn delete(&self, id: UserId) -> Result<bool>;

    /// Point read used by the cache-aside path.
    async fn get(&self, id: UserId) -> Result<Option<UserRecord>>;

    /// Backend name for logs
    fn name(&self) -> &str;
}
