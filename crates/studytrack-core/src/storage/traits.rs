use async_trait::async_trait;

use super::records::{
    ActiveSessionPatch, ActiveSessionRecord, CompletedSessionRecord, NewActiveSession,
    NewCompletedSession, StreakRecord,
};
use crate::error::StoreResult;

/// Durable home of the active-session mirror and completed-session log.
///
/// Keyed by user. The engine treats every call as a remote round trip that
/// may fail; implementations do not need to enforce the one-active-row
/// invariant themselves.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Active rows for the user, most recently updated first.
    async fn list_active(&self, user_id: &str) -> StoreResult<Vec<ActiveSessionRecord>>;

    async fn create_active(&self, record: NewActiveSession) -> StoreResult<ActiveSessionRecord>;

    async fn update_active(&self, id: &str, patch: &ActiveSessionPatch) -> StoreResult<()>;

    async fn delete_active(&self, id: &str) -> StoreResult<()>;

    /// Remove every active row for the user.
    async fn delete_active_for_user(&self, user_id: &str) -> StoreResult<()>;

    async fn create_completed(
        &self,
        record: NewCompletedSession,
    ) -> StoreResult<CompletedSessionRecord>;
}

/// Durable home of per-user streak records.
#[async_trait]
pub trait StreakTracker: Send + Sync {
    async fn get(&self, user_id: &str) -> StoreResult<Option<StreakRecord>>;

    async fn create(&self, user_id: &str, record: &StreakRecord) -> StoreResult<()>;

    async fn update(&self, user_id: &str, record: &StreakRecord) -> StoreResult<()>;
}
