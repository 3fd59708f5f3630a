use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use crate::io::board_io::{self, BoardIoError};
use crate::io::lock::{self, BoardLock, LockError};
use crate::model::{OrderContext, Space, SpaceId, SpacePatch, Task, TaskId, TaskPatch};
use crate::persist::server::ServerState;
use crate::persist::{CreatedTask, NewTask, Persistence, PersistenceError, TaskUpdate};

/// Board data kept in `board.json`. Every write takes the directory lock,
/// reloads the document, applies the request and saves atomically.
pub struct FileBackend {
    dir: PathBuf,
    limit: usize,
}

impl From<BoardIoError> for PersistenceError {
    fn from(e: BoardIoError) -> Self {
        PersistenceError::Storage(e.to_string())
    }
}

impl From<LockError> for PersistenceError {
    fn from(e: LockError) -> Self {
        PersistenceError::Unavailable(e.to_string())
    }
}

impl FileBackend {
    pub fn open(board_dir: &Path, limit: usize) -> Self {
        FileBackend {
            dir: board_dir.to_path_buf(),
            limit,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn read<T>(&self, f: impl FnOnce(&ServerState) -> Result<T, PersistenceError>) -> Result<T, PersistenceError> {
        let state = ServerState::from_document(board_io::load_document(&self.dir)?, self.limit);
        f(&state)
    }

    fn write<T>(
        &self,
        f: impl FnOnce(&mut ServerState) -> Result<T, PersistenceError>,
    ) -> Result<T, PersistenceError> {
        let _lock = BoardLock::acquire(&self.dir, lock::DEFAULT_WAIT)?;
        let mut state = ServerState::from_document(board_io::load_document(&self.dir)?, self.limit);
        let out = f(&mut state)?;
        board_io::save_document(&self.dir, &state.to_document())?;
        debug!(dir = %self.dir.display(), "board saved");
        Ok(out)
    }
}

#[async_trait]
impl Persistence for FileBackend {
    async fn list_spaces(&self) -> Result<Vec<Space>, PersistenceError> {
        self.read(|s| Ok(s.list_spaces()))
    }

    async fn fetch_tasks(&self, space: &SpaceId) -> Result<Vec<Task>, PersistenceError> {
        self.read(|s| s.fetch_tasks(space))
    }

    async fn create_task(&self, tree: NewTask) -> Result<Vec<CreatedTask>, PersistenceError> {
        self.write(|s| s.create_task(tree, Utc::now()))
    }

    async fn update_task(&self, id: &TaskId, patch: &TaskPatch) -> Result<Task, PersistenceError> {
        self.write(|s| s.update_task(id, patch, Utc::now()))
    }

    async fn update_tasks(&self, updates: &[TaskUpdate]) -> Result<(), PersistenceError> {
        self.write(|s| s.update_tasks(updates, Utc::now()))
    }

    async fn delete_task(&self, id: &TaskId) -> Result<Vec<TaskId>, PersistenceError> {
        self.write(|s| s.delete_task(id))
    }

    async fn create_space(&self, name: &str, color: &str) -> Result<Space, PersistenceError> {
        self.write(|s| s.create_space(name, color))
    }

    async fn update_space(&self, id: &SpaceId, patch: &SpacePatch) -> Result<Space, PersistenceError> {
        self.write(|s| s.update_space(id, patch))
    }

    async fn delete_space(&self, id: &SpaceId) -> Result<(), PersistenceError> {
        self.write(|s| s.delete_space(id))
    }

    async fn persist_order(&self, ctx: &OrderContext, ids: &[TaskId]) -> Result<(), PersistenceError> {
        self.write(|s| s.persist_order(ctx, ids))
    }
}
