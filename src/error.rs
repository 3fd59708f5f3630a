//! Error types shared by the store operations.
//!
//! - `ValidationError`: the request is refused before anything is applied
//! - `ReferenceError`: the request names an id that is no longer present;
//!   callers treat these as silent no-ops

use crate::model::{OrderContext, SpaceId, TaskId};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("cannot add subtask: maximum nesting depth (3 levels) reached under {0}")]
    MaxDepthReached(TaskId),
    #[error("space {space} already holds the maximum of {limit} tasks")]
    SpaceFull { space: SpaceId, limit: usize },
    #[error("cannot nest {child} under itself or one of its descendants ({parent})")]
    Cycle { child: TaskId, parent: TaskId },
    #[error("cannot move {child} into another space ({space})")]
    CrossSpace { child: TaskId, space: SpaceId },
    #[error("{0} is still awaiting confirmation")]
    Unconfirmed(TaskId),
    #[error("{0} is archived under an archived ancestor; unarchive the ancestor first")]
    ArchivedAncestor(TaskId),
    #[error("name must not be empty")]
    EmptyName,
    #[error("{0}")]
    Rejected(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReferenceError {
    #[error("task not found: {0}")]
    Task(TaskId),
    #[error("space not found: {0}")]
    Space(SpaceId),
    #[error("order context not found: {0}")]
    Context(OrderContext),
    #[error("{item} is not listed in {context}")]
    NotInContext { item: TaskId, context: OrderContext },
}

/// Error returned by store operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OpError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Reference(#[from] ReferenceError),
}

impl OpError {
    pub fn task_not_found(id: &TaskId) -> OpError {
        OpError::Reference(ReferenceError::Task(id.clone()))
    }

    pub fn space_not_found(id: &SpaceId) -> OpError {
        OpError::Reference(ReferenceError::Space(id.clone()))
    }
}
