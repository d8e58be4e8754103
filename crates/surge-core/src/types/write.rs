use crate::types::user::{NewUser, UserId, UserPatch, UserRecord};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of write carried by an intent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
}

impl OperationKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            OperationKind::Create => "create",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A write submitted to the queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum WriteRequest {
    Create(NewUser),
    Update { id: UserId, patch: UserPatch },
    Delete { id: UserId },
}

impl WriteRequest {
    pub fn create(name: impl Into<String>, email: impl Into<String>) -> Self {
        WriteRequest::Create(NewUser::new(name, email))
    }

    pub fn update(id: UserId, patch: UserPatch) -> Self {
        WriteRequest::Update { id, patch }
    }

    pub fn delete(id: UserId) -> Self {
        WriteRequest::Delete { id }
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            WriteRequest::Create(_) => OperationKind::Create,
            WriteRequest::Update { .. } => OperationKind::Update,
            WriteRequest::Delete { .. } => OperationKind::Delete,
        }
    }
}

/// What a resolved intent produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", content = "value", rename_all = "snake_case")]
pub enum WriteOutcome {
    Created(UserRecord),
    Updated(UserRecord),
    Deleted(UserId),
}

impl WriteOutcome {
    /// The row this outcome carries, if any.
    pub fn record(&self) -> Option<&UserRecord> {
        match self {
            WriteOutcome::Created(record) | WriteOutcome::Updated(record) => Some(record),
            WriteOutcome::Deleted(_) => None,
        }
    }

    pub fn into_record(self) -> Option<UserRecord> {
        match self {
            WriteOutcome::Created(record) | WriteOutcome::Updated(record) => Some(record),
            WriteOutcome::Deleted(_) => None,
        }
    }
}
