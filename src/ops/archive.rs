use chrono::{DateTime, Duration, Utc};

use crate::error::{OpError, ValidationError};
use crate::model::{Position, TaskId};
use crate::ops::{hierarchy, order};
use crate::store::Store;

/// How an archive toggle touched the space's root order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderChange {
    Unchanged,
    /// Root removed from `task_order` at this index
    Removed(usize),
    /// Root appended to `task_order`
    Appended,
}

/// Previous archive flags of every task an archive toggle changed
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveChange {
    pub root: TaskId,
    pub flags: Vec<(TaskId, bool, Option<DateTime<Utc>>)>,
    pub order: OrderChange,
}

impl ArchiveChange {
    pub fn is_empty(&self) -> bool {
        self.flags.is_empty() && self.order == OrderChange::Unchanged
    }
}

/// Archive a task and its whole subtree. A root leaves the space order.
pub fn archive(store: &mut Store, id: &TaskId, now: DateTime<Utc>) -> Result<ArchiveChange, OpError> {
    let task = store.task(id).ok_or_else(|| OpError::task_not_found(id))?;
    let space_id = task.space_id.clone();
    let is_root = task.is_root();

    let mut subtree = vec![id.clone()];
    subtree.extend(hierarchy::descendants(store, id));

    let mut change = ArchiveChange {
        root: id.clone(),
        flags: Vec::new(),
        order: OrderChange::Unchanged,
    };
    for tid in &subtree {
        if let Some(t) = store.task_mut(tid)
            && !t.is_archived
        {
            change.flags.push((tid.clone(), t.is_archived, t.archived_at));
            t.is_archived = true;
            t.archived_at = Some(now);
        }
    }
    if is_root
        && let Some(space) = store.space_mut(&space_id)
        && let Some(idx) = order::remove_from(&mut space.task_order, id)
    {
        change.order = OrderChange::Removed(idx);
    }
    Ok(change)
}

/// Bring an archived task and its subtree back. A root rejoins the end of
/// the space order. Refused while an ancestor is still archived or when the
/// restored tasks would overflow the space.
pub fn unarchive(store: &mut Store, id: &TaskId, limit: usize) -> Result<ArchiveChange, OpError> {
    let task = store.task(id).ok_or_else(|| OpError::task_not_found(id))?;
    let space_id = task.space_id.clone();
    let is_root = task.is_root();

    if task
        .ancestors
        .iter()
        .any(|a| store.task(a).is_some_and(|t| t.is_archived))
    {
        return Err(ValidationError::ArchivedAncestor(id.clone()).into());
    }

    let mut subtree = vec![id.clone()];
    subtree.extend(hierarchy::descendants(store, id));
    let returning = subtree
        .iter()
        .filter(|tid| store.task(tid).is_some_and(|t| t.is_archived))
        .count();
    if returning > 0 && store.active_task_count(&space_id) + returning > limit {
        return Err(ValidationError::SpaceFull {
            space: space_id,
            limit,
        }
        .into());
    }

    let mut change = ArchiveChange {
        root: id.clone(),
        flags: Vec::new(),
        order: OrderChange::Unchanged,
    };
    for tid in &subtree {
        if let Some(t) = store.task_mut(tid)
            && t.is_archived
        {
            change.flags.push((tid.clone(), t.is_archived, t.archived_at));
            t.is_archived = false;
            t.archived_at = None;
        }
    }
    if is_root
        && let Some(space) = store.space_mut(&space_id)
        && !space.task_order.contains(id)
    {
        order::insert_at(&mut space.task_order, id.clone(), &Position::End);
        change.order = OrderChange::Appended;
    }
    Ok(change)
}

/// Undo an archive toggle
pub fn revert(store: &mut Store, change: &ArchiveChange) {
    for (tid, archived, at) in &change.flags {
        if let Some(t) = store.task_mut(tid) {
            t.is_archived = *archived;
            t.archived_at = *at;
        }
    }
    let Some(space_id) = store.task(&change.root).map(|t| t.space_id.clone()) else {
        return;
    };
    let Some(space) = store.space_mut(&space_id) else {
        return;
    };
    match change.order {
        OrderChange::Unchanged => {}
        OrderChange::Removed(idx) => {
            order::remove_from(&mut space.task_order, &change.root);
            let idx = idx.min(space.task_order.len());
            space.task_order.insert(idx, change.root.clone());
        }
        OrderChange::Appended => {
            order::remove_from(&mut space.task_order, &change.root);
        }
    }
}

/// Archived tasks older than the retention window. Only the topmost task of
/// each expired subtree is returned, since deleting it cascades.
pub fn expired(store: &Store, now: DateTime<Utc>, retention_days: u32) -> Vec<TaskId> {
    let cutoff = now - Duration::days(i64::from(retention_days));
    let is_expired = |id: &TaskId| {
        store
            .task(id)
            .is_some_and(|t| t.is_archived && t.archived_at.is_some_and(|at| at <= cutoff))
    };
    store
        .tasks()
        .filter(|t| is_expired(&t.id))
        .filter(|t| !t.ancestors.iter().any(|a| is_expired(a)))
        .map(|t| t.id.clone())
        .collect()
}
