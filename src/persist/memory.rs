use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;

use crate::model::{OrderContext, Space, SpaceId, SpacePatch, Task, TaskId, TaskPatch};
use crate::persist::server::ServerState;
use crate::persist::{CreatedTask, NewTask, Persistence, PersistenceError, TaskUpdate};
use crate::store::Store;

/// In-process server emulation with failure injection.
pub struct MemoryBackend {
    state: Mutex<ServerState>,
    faults: Mutex<Faults>,
}

#[derive(Debug, Default)]
struct Faults {
    /// Fail this many upcoming requests, whatever they are
    next: usize,
    /// Fail every request of these kinds until cleared
    kinds: Vec<&'static str>,
    /// Kinds of every request received, failed ones included
    log: Vec<&'static str>,
}

impl MemoryBackend {
    pub fn new(limit: usize) -> Self {
        MemoryBackend {
            state: Mutex::new(ServerState::new(limit)),
            faults: Mutex::new(Faults::default()),
        }
    }

    /// Make the next `n` requests fail
    pub fn fail_next(&self, n: usize) {
        if let Ok(mut f) = self.faults.lock() {
            f.next = n;
        }
    }

    /// Make every request of `kind` (see `Request::kind`) fail until cleared
    pub fn fail_kind(&self, kind: &'static str) {
        if let Ok(mut f) = self.faults.lock() {
            f.kinds.push(kind);
        }
    }

    pub fn clear_faults(&self) {
        if let Ok(mut f) = self.faults.lock() {
            f.next = 0;
            f.kinds.clear();
        }
    }

    /// Kinds of all requests received so far, in arrival order
    pub fn request_log(&self) -> Vec<&'static str> {
        self.faults.lock().map(|f| f.log.clone()).unwrap_or_default()
    }

    /// Copy of the server's store
    pub fn snapshot(&self) -> Store {
        self.state
            .lock()
            .map(|s| s.store().clone())
            .unwrap_or_default()
    }

    fn admit(&self, kind: &'static str) -> Result<MutexGuard<'_, ServerState>, PersistenceError> {
        {
            let mut f = self
                .faults
                .lock()
                .map_err(|_| PersistenceError::Unavailable("fault table poisoned".into()))?;
            f.log.push(kind);
            if f.next > 0 {
                f.next -= 1;
                return Err(PersistenceError::Unavailable(format!("injected failure ({kind})")));
            }
            if f.kinds.contains(&kind) {
                return Err(PersistenceError::Unavailable(format!("injected failure ({kind})")));
            }
        }
        self.state
            .lock()
            .map_err(|_| PersistenceError::Unavailable("server state poisoned".into()))
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        MemoryBackend::new(crate::model::LimitsConfig::default().max_tasks_per_space)
    }
}

#[async_trait]
impl Persistence for MemoryBackend {
    async fn list_spaces(&self) -> Result<Vec<Space>, PersistenceError> {
        Ok(self.admit("list_spaces")?.list_spaces())
    }

    async fn fetch_tasks(&self, space: &SpaceId) -> Result<Vec<Task>, PersistenceError> {
        self.admit("fetch_tasks")?.fetch_tasks(space)
    }

    async fn create_task(&self, tree: NewTask) -> Result<Vec<CreatedTask>, PersistenceError> {
        self.admit("create_task")?.create_task(tree, Utc::now())
    }

    async fn update_task(&self, id: &TaskId, patch: &TaskPatch) -> Result<Task, PersistenceError> {
        self.admit("update_task")?.update_task(id, patch, Utc::now())
    }

    async fn update_tasks(&self, updates: &[TaskUpdate]) -> Result<(), PersistenceError> {
        self.admit("update_tasks")?.update_tasks(updates, Utc::now())
    }

    async fn delete_task(&self, id: &TaskId) -> Result<Vec<TaskId>, PersistenceError> {
        self.admit("delete_task")?.delete_task(id)
    }

    async fn create_space(&self, name: &str, color: &str) -> Result<Space, PersistenceError> {
        self.admit("create_space")?.create_space(name, color)
    }

    async fn update_space(&self, id: &SpaceId, patch: &SpacePatch) -> Result<Space, PersistenceError> {
        self.admit("update_space")?.update_space(id, patch)
    }

    async fn delete_space(&self, id: &SpaceId) -> Result<(), PersistenceError> {
        self.admit("delete_space")?.delete_space(id)
    }

    async fn persist_order(&self, ctx: &OrderContext, ids: &[TaskId]) -> Result<(), PersistenceError> {
        self.admit("persist_order")?.persist_order(ctx, ids)
    }
}
