//! Read-only views for presentation: derived sort orders, space filters, and
//! nested trees rebuilt from the flat store. Nothing here mutates the store.

use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::model::{Progress, SortKey, Space, SpaceId, Task, TaskId};
use crate::store::Store;

/// Presentation snapshot of a task. Client bookkeeping is reduced to `pending`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskView {
    pub id: TaskId,
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub z_index: u64,
    pub progress: Progress,
    pub space_id: SpaceId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_task_id: Option<TaskId>,
    pub ancestors: Vec<TaskId>,
    pub subtasks: Vec<TaskId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emoji: Option<String>,
    pub is_archived: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// True while the server has not yet confirmed this task
    pub pending: bool,
}

impl From<&Task> for TaskView {
    fn from(t: &Task) -> Self {
        TaskView {
            id: t.id.clone(),
            name: t.name.clone(),
            description: t.description.clone(),
            x: t.x,
            y: t.y,
            width: t.width,
            height: t.height,
            z_index: t.z_index,
            progress: t.progress,
            space_id: t.space_id.clone(),
            parent_task_id: t.parent_task_id.clone(),
            ancestors: t.ancestors.clone(),
            subtasks: t.subtasks.clone(),
            due_date: t.due_date,
            emoji: t.emoji.clone(),
            is_archived: t.is_archived,
            archived_at: t.archived_at,
            created_at: t.created_at,
            updated_at: t.updated_at,
            pending: t.is_unconfirmed,
        }
    }
}

/// A task with its children, for nested rendering
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskNode {
    #[serde(flatten)]
    pub task: TaskView,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TaskNode>,
}

/// How to derive a view
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ViewOptions {
    pub sort: SortKey,
    pub reversed: bool,
    pub include_archived: bool,
    /// Apply the space's emoji/progress/due-date filters to root tasks
    pub apply_filters: bool,
}

impl ViewOptions {
    /// The options a space has saved as its preference
    pub fn for_space(space: &Space) -> Self {
        ViewOptions {
            sort: space.sort,
            reversed: space.sort_reversed,
            include_archived: false,
            apply_filters: true,
        }
    }
}

fn compare(a: &Task, b: &Task, key: SortKey) -> Ordering {
    match key {
        SortKey::Custom => Ordering::Equal,
        SortKey::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
        SortKey::DueDate => match (a.due_date, b.due_date) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        },
        SortKey::Progress => a.progress.cmp(&b.progress),
        SortKey::CreatedAt => a.created_at.cmp(&b.created_at),
        SortKey::UpdatedAt => a.updated_at.cmp(&b.updated_at),
    }
}

/// Sort a slice already in custom order. Stable, so custom order breaks ties.
pub fn sort_tasks(tasks: &mut [&Task], key: SortKey, reversed: bool) {
    tasks.sort_by(|a, b| compare(a, b, key));
    if reversed {
        tasks.reverse();
    }
}

/// Whether a task passes the space's filter preferences
pub fn matches_filters(space: &Space, task: &Task) -> bool {
    if !space.selected_emojis.is_empty()
        && !task
            .emoji
            .as_ref()
            .is_some_and(|e| space.selected_emojis.contains(e))
    {
        return false;
    }
    if !space.selected_progresses.is_empty() && !space.selected_progresses.contains(&task.progress)
    {
        return false;
    }
    if let Some(range) = &space.selected_due_date_range
        && !task.due_date.is_some_and(|d| range.contains(d))
    {
        return false;
    }
    true
}

/// Root tasks of a space in derived order. Archived roots (which are not in
/// the manual order) follow the listed ones when included.
pub fn root_tasks<'a>(store: &'a Store, space_id: &SpaceId, opts: ViewOptions) -> Vec<&'a Task> {
    let Some(space) = store.space(space_id) else {
        return Vec::new();
    };
    let mut tasks: Vec<&Task> = space
        .task_order
        .iter()
        .filter_map(|id| store.task(id))
        .collect();
    if opts.include_archived {
        tasks.extend(
            store
                .tasks_in_space(space_id)
                .filter(|t| t.is_root() && t.is_archived),
        );
    }
    if opts.apply_filters {
        tasks.retain(|t| matches_filters(space, t));
    }
    sort_tasks(&mut tasks, opts.sort, opts.reversed);
    tasks
}

/// Children of a task in derived order
pub fn child_tasks<'a>(store: &'a Store, parent: &TaskId, opts: ViewOptions) -> Vec<&'a Task> {
    let Some(task) = store.task(parent) else {
        return Vec::new();
    };
    let mut tasks: Vec<&Task> = task
        .subtasks
        .iter()
        .filter_map(|id| store.task(id))
        .filter(|t| opts.include_archived || !t.is_archived)
        .collect();
    sort_tasks(&mut tasks, opts.sort, opts.reversed);
    tasks
}

/// Rebuild the nested view of one task
pub fn subtree(store: &Store, id: &TaskId, opts: ViewOptions) -> Option<TaskNode> {
    let task = store.task(id)?;
    let children = child_tasks(store, id, opts)
        .into_iter()
        .filter_map(|c| subtree(store, &c.id, opts))
        .collect();
    Some(TaskNode {
        task: TaskView::from(task),
        children,
    })
}

/// Rebuild the nested forest of a space
pub fn tree(store: &Store, space_id: &SpaceId, opts: ViewOptions) -> Vec<TaskNode> {
    root_tasks(store, space_id, opts)
        .into_iter()
        .filter_map(|t| subtree(store, &t.id, opts))
        .collect()
}

/// Cards of a space from bottom to top of the stack, for canvas painting
pub fn stacking_order<'a>(store: &'a Store, space_id: &SpaceId) -> Vec<&'a Task> {
    let mut tasks: Vec<&Task> = store
        .tasks_in_space(space_id)
        .filter(|t| t.is_root() && !t.is_archived)
        .collect();
    tasks.sort_by(|a, b| a.z_index.cmp(&b.z_index).then_with(|| a.id.cmp(&b.id)));
    tasks
}
