use std::collections::HashSet;

use serde::Serialize;

use crate::model::{BoardConfig, OrderContext, Space, Task, TaskId};
use crate::ops::hierarchy::MAX_DEPTH;
use crate::store::Store;

/// Structured result from `tsp check`, suitable for --json output.
#[derive(Debug, Default, Serialize)]
pub struct CheckResult {
    pub valid: bool,
    pub errors: Vec<CheckError>,
    pub warnings: Vec<CheckWarning>,
}

/// A broken store invariant.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum CheckError {
    /// `ancestors` does not match the chain of parent links
    #[serde(rename = "broken_chain")]
    BrokenChain {
        task_id: String,
        expected: Vec<String>,
        actual: Vec<String>,
    },
    /// Nested deeper than the allowed three levels
    #[serde(rename = "too_deep")]
    TooDeep { task_id: String, depth: usize },
    /// A parent's `subtasks` differs from the tasks that name it as parent
    #[serde(rename = "subtask_mismatch")]
    SubtaskMismatch {
        parent_id: String,
        missing: Vec<String>,
        extra: Vec<String>,
    },
    /// A space's `task_order` differs from its non-archived roots
    #[serde(rename = "order_mismatch")]
    OrderMismatch {
        space_id: String,
        missing: Vec<String>,
        extra: Vec<String>,
    },
    /// The same id is listed twice in one context
    #[serde(rename = "duplicate_entry")]
    DuplicateEntry { context: String, task_id: String },
    /// A card sits above the space's high-water mark
    #[serde(rename = "z_index_above_max")]
    ZIndexAboveMax {
        space_id: String,
        task_id: String,
        z_index: u64,
        max_z_index: u64,
    },
    /// A task belongs to a space that does not exist
    #[serde(rename = "missing_space")]
    MissingSpace { task_id: String, space_id: String },
    /// A reference to a temporary id that is no longer awaiting confirmation
    #[serde(rename = "stale_temp_id")]
    StaleTempId { task_id: String, referenced_by: String },
}

/// A non-critical finding.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum CheckWarning {
    /// Z values have spread past the configured threshold
    #[serde(rename = "needs_normalize")]
    NeedsNormalize { space_id: String, max_z_index: u64 },
    /// More active tasks than the per-space cap allows
    #[serde(rename = "over_capacity")]
    OverCapacity {
        space_id: String,
        count: usize,
        limit: usize,
    },
    /// Archived task without an archive timestamp (never purged)
    #[serde(rename = "missing_archived_at")]
    MissingArchivedAt { task_id: String },
}

// ---------------------------------------------------------------------------
// Main check entry point
// ---------------------------------------------------------------------------

/// Validate a store and return structured results. Read-only.
///
/// Checks performed:
/// 1. Ancestor chains follow the parent links
/// 2. Nesting depth stays within bounds
/// 3. Parent `subtasks` lists match their children exactly
/// 4. Space `task_order` lists match their non-archived roots exactly
/// 5. No z-index above the space's `max_z_index`
/// 6. No stored reference to a temp id whose task is confirmed
pub fn check_store(store: &Store, config: &BoardConfig) -> CheckResult {
    let mut result = CheckResult::default();

    for task in store.tasks() {
        check_task(store, task, &mut result);
    }
    for space in store.spaces() {
        check_space(store, space, config, &mut result);
    }

    result.valid = result.errors.is_empty();
    result
}

// ---------------------------------------------------------------------------
// Per-task validation
// ---------------------------------------------------------------------------

fn check_task(store: &Store, task: &Task, result: &mut CheckResult) {
    let task_id = task.id.to_string();

    if store.space(&task.space_id).is_none() {
        result.errors.push(CheckError::MissingSpace {
            task_id: task_id.clone(),
            space_id: task.space_id.to_string(),
        });
    }

    let expected = parent_chain(store, task);
    if expected != task.ancestors {
        result.errors.push(CheckError::BrokenChain {
            task_id: task_id.clone(),
            expected: strings(&expected),
            actual: strings(&task.ancestors),
        });
    }
    if task.ancestors.len() > MAX_DEPTH {
        result.errors.push(CheckError::TooDeep {
            task_id: task_id.clone(),
            depth: task.ancestors.len(),
        });
    }

    // Children: exactly the tasks that name this one as parent
    let actual_children: Vec<TaskId> = store
        .tasks()
        .filter(|t| t.parent_task_id.as_ref() == Some(&task.id))
        .map(|t| t.id.clone())
        .collect();
    let (missing, extra) = set_diff(&actual_children, &task.subtasks);
    if !missing.is_empty() || !extra.is_empty() {
        result.errors.push(CheckError::SubtaskMismatch {
            parent_id: task_id.clone(),
            missing,
            extra,
        });
    }
    check_duplicates(&OrderContext::Parent(task.id.clone()), &task.subtasks, result);

    if task.is_archived && task.archived_at.is_none() {
        result.warnings.push(CheckWarning::MissingArchivedAt { task_id });
    }

    // Temp ids may only be referenced while their task is pending
    let references = task
        .parent_task_id
        .iter()
        .chain(task.ancestors.iter())
        .chain(task.subtasks.iter())
        .chain(std::iter::once(&task.id));
    for r in references {
        check_temp_reference(store, r, &task.id.to_string(), result);
    }
}

/// The ancestor chain implied by following parent links (root first)
fn parent_chain(store: &Store, task: &Task) -> Vec<TaskId> {
    let mut chain = Vec::new();
    let mut seen = HashSet::new();
    let mut cursor = task.parent_task_id.clone();
    while let Some(id) = cursor {
        if !seen.insert(id.clone()) {
            break;
        }
        cursor = store.task(&id).and_then(|t| t.parent_task_id.clone());
        chain.push(id);
    }
    chain.reverse();
    chain
}

fn check_temp_reference(store: &Store, id: &TaskId, owner: &str, result: &mut CheckResult) {
    if !id.is_temp() {
        return;
    }
    let pending = store.task(id).is_some_and(|t| t.is_unconfirmed);
    if !pending {
        result.errors.push(CheckError::StaleTempId {
            task_id: id.to_string(),
            referenced_by: owner.to_string(),
        });
    }
}

// ---------------------------------------------------------------------------
// Per-space validation
// ---------------------------------------------------------------------------

fn check_space(store: &Store, space: &Space, config: &BoardConfig, result: &mut CheckResult) {
    let space_id = space.id.to_string();

    let roots: Vec<TaskId> = store
        .tasks_in_space(&space.id)
        .filter(|t| t.is_root() && !t.is_archived)
        .map(|t| t.id.clone())
        .collect();
    let (missing, extra) = set_diff(&roots, &space.task_order);
    if !missing.is_empty() || !extra.is_empty() {
        result.errors.push(CheckError::OrderMismatch {
            space_id: space_id.clone(),
            missing,
            extra,
        });
    }
    check_duplicates(&OrderContext::Space(space.id.clone()), &space.task_order, result);
    for id in &space.task_order {
        check_temp_reference(store, id, &space_id, result);
    }

    for task in store.tasks_in_space(&space.id) {
        if task.z_index > space.max_z_index {
            result.errors.push(CheckError::ZIndexAboveMax {
                space_id: space_id.clone(),
                task_id: task.id.to_string(),
                z_index: task.z_index,
                max_z_index: space.max_z_index,
            });
        }
    }

    if space.max_z_index > config.canvas.normalize_threshold {
        result.warnings.push(CheckWarning::NeedsNormalize {
            space_id: space_id.clone(),
            max_z_index: space.max_z_index,
        });
    }
    let count = store.active_task_count(&space.id);
    let limit = config.limits.max_tasks_per_space;
    if count > limit {
        result.warnings.push(CheckWarning::OverCapacity {
            space_id,
            count,
            limit,
        });
    }
}

fn check_duplicates(ctx: &OrderContext, list: &[TaskId], result: &mut CheckResult) {
    let mut seen = HashSet::new();
    for id in list {
        if !seen.insert(id) {
            result.errors.push(CheckError::DuplicateEntry {
                context: ctx.to_string(),
                task_id: id.to_string(),
            });
        }
    }
}

/// (in `expected` but not `listed`, in `listed` but not `expected`)
fn set_diff(expected: &[TaskId], listed: &[TaskId]) -> (Vec<String>, Vec<String>) {
    let missing = expected
        .iter()
        .filter(|id| !listed.contains(id))
        .map(|id| id.to_string())
        .collect();
    let mut extra: Vec<String> = listed
        .iter()
        .filter(|id| !expected.contains(id))
        .map(|id| id.to_string())
        .collect();
    extra.dedup();
    (missing, extra)
}

fn strings(ids: &[TaskId]) -> Vec<String> {
    ids.iter().map(|id| id.to_string()).collect()
}
