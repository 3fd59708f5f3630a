use crate::error::OpError;
use crate::model::{SpaceId, TaskId};
use crate::store::Store;

/// A z-index change produced by `bring_to_front` or `normalize`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZChange {
    pub task_id: TaskId,
    pub old: u64,
    pub new: u64,
}

/// Issue the next stacking key for a space.
pub fn allocate(store: &mut Store, space_id: &SpaceId) -> Result<u64, OpError> {
    let space = store
        .space_mut(space_id)
        .ok_or_else(|| OpError::space_not_found(space_id))?;
    space.max_z_index += 1;
    Ok(space.max_z_index)
}

/// Lift a card above every other card in its space.
pub fn bring_to_front(store: &mut Store, task_id: &TaskId) -> Result<ZChange, OpError> {
    let space_id = store
        .task(task_id)
        .map(|t| t.space_id.clone())
        .ok_or_else(|| OpError::task_not_found(task_id))?;
    let z = allocate(store, &space_id)?;
    let task = store
        .task_mut(task_id)
        .ok_or_else(|| OpError::task_not_found(task_id))?;
    let old = std::mem::replace(&mut task.z_index, z);
    Ok(ZChange {
        task_id: task_id.clone(),
        old,
        new: z,
    })
}

/// Compact the z-index values of a space into `1..=N`, preserving their
/// relative order (ties broken by id), and reset the high-water mark to N.
/// Returns only the tasks whose value changed.
pub fn normalize(store: &mut Store, space_id: &SpaceId) -> Result<Vec<ZChange>, OpError> {
    if store.space(space_id).is_none() {
        return Err(OpError::space_not_found(space_id));
    }
    let mut stack: Vec<(u64, TaskId)> = store
        .tasks_in_space(space_id)
        .map(|t| (t.z_index, t.id.clone()))
        .collect();
    stack.sort();

    let mut changes = Vec::new();
    for (rank, (old, id)) in stack.iter().enumerate() {
        let new = rank as u64 + 1;
        if *old != new {
            if let Some(task) = store.task_mut(id) {
                task.z_index = new;
            }
            changes.push(ZChange {
                task_id: id.clone(),
                old: *old,
                new,
            });
        }
    }
    if let Some(space) = store.space_mut(space_id) {
        space.max_z_index = stack.len() as u64;
    }
    Ok(changes)
}

/// Whether the high-water mark has drifted far enough to compact
pub fn needs_normalize(store: &Store, space_id: &SpaceId, threshold: u64) -> bool {
    store
        .space(space_id)
        .is_some_and(|s| s.max_z_index > threshold)
}
