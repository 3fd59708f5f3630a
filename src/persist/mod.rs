//! The remote persistence collaborator: an async CRUD contract plus two
//! backends. `MemoryBackend` emulates a server in-process; `FileBackend`
//! keeps the board in a JSON document on disk.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::OpError;
use crate::model::{OrderContext, Position, Space, SpaceId, SpacePatch, Task, TaskId, TaskPatch};

pub mod file;
pub mod memory;
pub mod server;

pub use file::FileBackend;
pub use memory::MemoryBackend;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PersistenceError {
    #[error("request rejected: {0}")]
    Rejected(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

impl From<OpError> for PersistenceError {
    fn from(e: OpError) -> Self {
        match e {
            OpError::Validation(v) => PersistenceError::Rejected(v.to_string()),
            OpError::Reference(r) => PersistenceError::NotFound(r.to_string()),
        }
    }
}

/// A task to create. Children are nested so a whole duplicated subtree is
/// created by one request. `task.id` is the client id, echoed back in the
/// response; `task.parent_task_id` of the tree root names an existing task.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTask {
    pub task: Task,
    /// Where the tree root lands in its context
    pub position: Position,
    pub children: Vec<NewTask>,
}

impl NewTask {
    pub fn leaf(task: Task, position: Position) -> Self {
        NewTask {
            task,
            position,
            children: Vec::new(),
        }
    }

    /// Number of tasks in the tree
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(NewTask::count).sum::<usize>()
    }
}

/// Server record of one created task, keyed by the client id it was sent with
#[derive(Debug, Clone, PartialEq)]
pub struct CreatedTask {
    pub client_id: TaskId,
    pub task: Task,
}

/// One entry of a batch update
#[derive(Debug, Clone, PartialEq)]
pub struct TaskUpdate {
    pub id: TaskId,
    pub patch: TaskPatch,
}

#[async_trait]
pub trait Persistence: Send + Sync {
    async fn list_spaces(&self) -> Result<Vec<Space>, PersistenceError>;

    /// Every task of a space, any depth, archived included
    async fn fetch_tasks(&self, space: &SpaceId) -> Result<Vec<Task>, PersistenceError>;

    /// Create a task tree. Returns one record per created task, pre-order.
    async fn create_task(&self, tree: NewTask) -> Result<Vec<CreatedTask>, PersistenceError>;

    async fn update_task(&self, id: &TaskId, patch: &TaskPatch) -> Result<Task, PersistenceError>;

    /// Apply several updates as one all-or-nothing batch
    async fn update_tasks(&self, updates: &[TaskUpdate]) -> Result<(), PersistenceError>;

    /// Delete a task and its whole subtree. Returns the deleted ids.
    async fn delete_task(&self, id: &TaskId) -> Result<Vec<TaskId>, PersistenceError>;

    async fn create_space(&self, name: &str, color: &str) -> Result<Space, PersistenceError>;

    async fn update_space(&self, id: &SpaceId, patch: &SpacePatch) -> Result<Space, PersistenceError>;

    /// Delete a space and every task in it
    async fn delete_space(&self, id: &SpaceId) -> Result<(), PersistenceError>;

    /// Store the manual order of a context. Ids the server does not list in
    /// that context are ignored; listed ids missing from `ids` keep their
    /// relative order after the given ones.
    async fn persist_order(&self, ctx: &OrderContext, ids: &[TaskId]) -> Result<(), PersistenceError>;
}

/// An owned remote request, produced by applying a command locally
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    CreateTask(NewTask),
    UpdateTask { id: TaskId, patch: TaskPatch },
    UpdateTasks(Vec<TaskUpdate>),
    DeleteTask(TaskId),
    UpdateSpace { id: SpaceId, patch: SpacePatch },
    DeleteSpace(SpaceId),
    PersistOrder { context: OrderContext, ids: Vec<TaskId> },
}

impl Request {
    /// Short name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Request::CreateTask(_) => "create_task",
            Request::UpdateTask { .. } => "update_task",
            Request::UpdateTasks(_) => "update_tasks",
            Request::DeleteTask(_) => "delete_task",
            Request::UpdateSpace { .. } => "update_space",
            Request::DeleteSpace(_) => "delete_space",
            Request::PersistOrder { .. } => "persist_order",
        }
    }
}

/// Result of a request that succeeded
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Created(Vec<CreatedTask>),
    Task(Task),
    Space(Space),
    Deleted(Vec<TaskId>),
    Done,
}

pub type ResponseFuture = Pin<Box<dyn Future<Output = Result<Response, PersistenceError>> + Send>>;

/// Turn a request into an owned future. Nothing is sent until it is polled.
pub fn dispatch(backend: Arc<dyn Persistence>, request: Request) -> ResponseFuture {
    Box::pin(async move {
        match request {
            Request::CreateTask(tree) => backend.create_task(tree).await.map(Response::Created),
            Request::UpdateTask { id, patch } => {
                backend.update_task(&id, &patch).await.map(Response::Task)
            }
            Request::UpdateTasks(updates) => {
                backend.update_tasks(&updates).await.map(|()| Response::Done)
            }
            Request::DeleteTask(id) => backend.delete_task(&id).await.map(Response::Deleted),
            Request::UpdateSpace { id, patch } => {
                backend.update_space(&id, &patch).await.map(Response::Space)
            }
            Request::DeleteSpace(id) => backend.delete_space(&id).await.map(|()| Response::Done),
            Request::PersistOrder { context, ids } => backend
                .persist_order(&context, &ids)
                .await
                .map(|()| Response::Done),
        }
    })
}
