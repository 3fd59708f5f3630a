use crate::error::{OpError, ReferenceError};
use crate::model::{OrderContext, Position, TaskId};
use crate::store::Store;

/// Index at which an item lands in `list` (which must not contain it).
pub fn insertion_index(list: &[TaskId], position: &Position) -> usize {
    match position {
        Position::Start => 0,
        Position::End => list.len(),
        Position::After(after_id) => list
            .iter()
            .position(|id| id == after_id)
            .map(|idx| idx + 1)
            .unwrap_or(list.len()),
    }
}

/// Remove `id` from `list` if present, returning its former index.
pub fn remove_from(list: &mut Vec<TaskId>, id: &TaskId) -> Option<usize> {
    let idx = list.iter().position(|t| t == id)?;
    list.remove(idx);
    Some(idx)
}

/// Place `id` in `list` at the position. Any existing occurrence is removed
/// first, so the list never holds duplicates. Returns the new index.
pub fn insert_at(list: &mut Vec<TaskId>, id: TaskId, position: &Position) -> usize {
    remove_from(list, &id);
    let idx = insertion_index(list, position);
    list.insert(idx, id);
    idx
}

/// Reposition an item within its own context during a drag. Local only.
///
/// Calling this repeatedly with the same arguments leaves the list unchanged
/// after the first call. Returns whether the list changed.
pub fn move_temporary(
    store: &mut Store,
    item: &TaskId,
    ctx: &OrderContext,
    position: &Position,
) -> Result<bool, OpError> {
    let list = store
        .context_list_mut(ctx)
        .ok_or_else(|| ReferenceError::Context(ctx.clone()))?;
    if !list.contains(item) {
        return Err(ReferenceError::NotInContext {
            item: item.clone(),
            context: ctx.clone(),
        }
        .into());
    }
    // An item placed after itself stays where it is
    if *position == Position::After(item.clone()) {
        return Ok(false);
    }
    let before = list.clone();
    insert_at(list, item.clone(), position);
    Ok(*list != before)
}

/// The directive that reproduces `item`'s slot in `list` using only
/// confirmed ids as anchors: after the nearest preceding confirmed id, or at
/// the start when there is none.
pub fn confirmed_position(list: &[TaskId], item: &TaskId) -> Position {
    let Some(idx) = list.iter().position(|id| id == item) else {
        return Position::End;
    };
    list[..idx]
        .iter()
        .rev()
        .find(|id| !id.is_temp())
        .map(|anchor| Position::After(anchor.clone()))
        .unwrap_or(Position::Start)
}

/// Reorder `list` so ids also present in `prior` follow their prior relative
/// order. Ids missing from `prior` keep their slots at the end, in current order.
pub fn restore_relative_order(list: &mut Vec<TaskId>, prior: &[TaskId]) {
    let mut restored: Vec<TaskId> = prior.iter().filter(|id| list.contains(id)).cloned().collect();
    for id in list.iter() {
        if !restored.contains(id) {
            restored.push(id.clone());
        }
    }
    *list = restored;
}
