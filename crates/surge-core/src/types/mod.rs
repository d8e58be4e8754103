pub mod breaker;
pub mod user;
pub mod write;

pub use breaker::BreakerState;
pub use user::{NewUser, UserId, UserPatch, UserRecord};
pub use write::{OperationKind, WriteOutcome, WriteRequest};
