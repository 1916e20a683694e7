//! In-process store.
//!
//! Backs both [`SessionStore`] and [`StreakTracker`] with plain maps. Any
//! operation can be made to fail with [`MemoryStore::fail_on`], which is how
//! the engine's degraded paths are exercised.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use uuid::Uuid;

use super::records::{
    ActiveSessionPatch, ActiveSessionRecord, CompletedSessionRecord, NewActiveSession,
    NewCompletedSession, StreakRecord,
};
use super::traits::{SessionStore, StreakTracker};
use crate::error::{StoreError, StoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    ListActive,
    CreateActive,
    UpdateActive,
    DeleteActive,
    DeleteActiveForUser,
    CreateCompleted,
    StreakGet,
    StreakCreate,
    StreakUpdate,
}

impl StoreOp {
    fn name(self) -> &'static str {
        match self {
            StoreOp::ListActive => "list_active",
            StoreOp::CreateActive => "create_active",
            StoreOp::UpdateActive => "update_active",
            StoreOp::DeleteActive => "delete_active",
            StoreOp::DeleteActiveForUser => "delete_active_for_user",
            StoreOp::CreateCompleted => "create_completed",
            StoreOp::StreakGet => "streak_get",
            StoreOp::StreakCreate => "streak_create",
            StoreOp::StreakUpdate => "streak_update",
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    active: Vec<ActiveSessionRecord>,
    completed: Vec<CompletedSessionRecord>,
    streaks: HashMap<String, StreakRecord>,
    failing: HashSet<StoreOp>,
    calls: HashMap<StoreOp, usize>,
}

/// Cloning shares the underlying maps.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call of `op` fail until [`clear_failures`](Self::clear_failures).
    pub fn fail_on(&self, op: StoreOp) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.failing.insert(op);
        }
    }

    pub fn clear_failures(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.failing.clear();
        }
    }

    /// How many times `op` has been invoked, failed calls included.
    pub fn calls(&self, op: StoreOp) -> usize {
        self.inner
            .lock()
            .map(|inner| inner.calls.get(&op).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Insert a row verbatim, bypassing `create_active`.
    pub fn seed_active(&self, record: ActiveSessionRecord) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.active.push(record);
        }
    }

    pub fn active_rows(&self, user_id: &str) -> Vec<ActiveSessionRecord> {
        self.inner
            .lock()
            .map(|inner| {
                inner
                    .active
                    .iter()
                    .filter(|r| r.fields.user_id == user_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn completed_rows(&self, user_id: &str) -> Vec<CompletedSessionRecord> {
        self.inner
            .lock()
            .map(|inner| {
                inner
                    .completed
                    .iter()
                    .filter(|r| r.fields.user_id == user_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn streak(&self, user_id: &str) -> Option<StreakRecord> {
        self.inner
            .lock()
            .ok()
            .and_then(|inner| inner.streaks.get(user_id).cloned())
    }

    fn enter(&self, op: StoreOp) -> StoreResult<std::sync::MutexGuard<'_, Inner>> {
        let mut inner = self.inner.lock()?;
        *inner.calls.entry(op).or_insert(0) += 1;
        if inner.failing.contains(&op) {
            return Err(StoreError::Injected(op.name()));
        }
        Ok(inner)
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn list_active(&self, user_id: &str) -> StoreResult<Vec<ActiveSessionRecord>> {
        let inner = self.enter(StoreOp::ListActive)?;
        let mut rows: Vec<_> = inner
            .active
            .iter()
            .filter(|r| r.fields.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.fields.last_updated.cmp(&a.fields.last_updated));
        Ok(rows)
    }

    async fn create_active(&self, record: NewActiveSession) -> StoreResult<ActiveSessionRecord> {
        let mut inner = self.enter(StoreOp::CreateActive)?;
        let row = ActiveSessionRecord {
            id: Uuid::new_v4().to_string(),
            fields: record,
        };
        inner.active.push(row.clone());
        Ok(row)
    }

    async fn update_active(&self, id: &str, patch: &ActiveSessionPatch) -> StoreResult<()> {
        let mut inner = self.enter(StoreOp::UpdateActive)?;
        let row = inner
            .active
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        patch.apply(&mut row.fields);
        Ok(())
    }

    async fn delete_active(&self, id: &str) -> StoreResult<()> {
        let mut inner = self.enter(StoreOp::DeleteActive)?;
        inner.active.retain(|r| r.id != id);
        Ok(())
    }

    async fn delete_active_for_user(&self, user_id: &str) -> StoreResult<()> {
        let mut inner = self.enter(StoreOp::DeleteActiveForUser)?;
        inner.active.retain(|r| r.fields.user_id != user_id);
        Ok(())
    }

    async fn create_completed(
        &self,
        record: NewCompletedSession,
    ) -> StoreResult<CompletedSessionRecord> {
        let mut inner = self.enter(StoreOp::CreateCompleted)?;
        let row = CompletedSessionRecord {
            id: inner.completed.len() as i64 + 1,
            fields: record,
        };
        inner.completed.push(row.clone());
        Ok(row)
    }
}

#[async_trait]
impl StreakTracker for MemoryStore {
    async fn get(&self, user_id: &str) -> StoreResult<Option<StreakRecord>> {
        let inner = self.enter(StoreOp::StreakGet)?;
        Ok(inner.streaks.get(user_id).cloned())
    }

    async fn create(&self, user_id: &str, record: &StreakRecord) -> StoreResult<()> {
        let mut inner = self.enter(StoreOp::StreakCreate)?;
        inner.streaks.insert(user_id.to_string(), record.clone());
        Ok(())
    }

    async fn update(&self, user_id: &str, record: &StreakRecord) -> StoreResult<()> {
        let mut inner = self.enter(StoreOp::StreakUpdate)?;
        let existing = inner
            .streaks
            .get_mut(user_id)
            .ok_or_else(|| StoreError::NotFound(user_id.to_string()))?;
        *existing = record.clone();
        Ok(())
    }
}
