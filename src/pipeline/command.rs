use chrono::{DateTime, Utc};

use crate::error::{OpError, ReferenceError, ValidationError};
use crate::model::{
    BoardConfig, OrderContext, Position, Reparent, SpaceId, SpacePatch, Task, TaskId, TaskPatch,
    TempIdGen,
};
use crate::ops::{archive, hierarchy, order, zindex};
use crate::persist::{NewTask, Request, TaskUpdate};
use crate::pipeline::{Applied, Reconciled};
use crate::store::Store;

/// Everything a command needs besides the store
pub struct ApplyCtx<'a> {
    pub now: DateTime<Utc>,
    pub config: &'a BoardConfig,
    pub temp_ids: &'a mut TempIdGen,
}

/// A mutation that is applied locally first and persisted afterwards
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    CreateRoot {
        space: SpaceId,
        name: String,
        x: f64,
        y: f64,
    },
    CreateSubtask {
        parent: TaskId,
        name: String,
        position: Position,
    },
    Duplicate {
        source: TaskId,
    },
    Attach {
        child: TaskId,
        parent: TaskId,
        position: Position,
    },
    Detach {
        id: TaskId,
        x: f64,
        y: f64,
        position: Position,
    },
    Archive {
        id: TaskId,
    },
    Unarchive {
        id: TaskId,
    },
    Delete {
        id: TaskId,
    },
    Update {
        id: TaskId,
        patch: TaskPatch,
    },
    /// A field edit the store already shows (debounced typing). `original`
    /// holds the values it replaced.
    UpdateApplied {
        id: TaskId,
        patch: TaskPatch,
        original: TaskPatch,
        original_updated_at: DateTime<Utc>,
    },
    BringToFront {
        id: TaskId,
    },
    /// Persist the current order of a context; `prior` is the order to
    /// return to if that fails
    CommitOrder {
        context: OrderContext,
        prior: Vec<TaskId>,
    },
    Normalize {
        space: SpaceId,
    },
    UpdateSpace {
        id: SpaceId,
        patch: SpacePatch,
    },
    DeleteSpace {
        id: SpaceId,
    },
}

impl Command {
    pub fn kind(&self) -> &'static str {
        match self {
            Command::CreateRoot { .. } => "create_root",
            Command::CreateSubtask { .. } => "create_subtask",
            Command::Duplicate { .. } => "duplicate",
            Command::Attach { .. } => "attach",
            Command::Detach { .. } => "detach",
            Command::Archive { .. } => "archive",
            Command::Unarchive { .. } => "unarchive",
            Command::Delete { .. } => "delete",
            Command::Update { .. } => "update",
            Command::UpdateApplied { .. } => "edit",
            Command::BringToFront { .. } => "bring_to_front",
            Command::CommitOrder { .. } => "commit_order",
            Command::Normalize { .. } => "normalize",
            Command::UpdateSpace { .. } => "update_space",
            Command::DeleteSpace { .. } => "delete_space",
        }
    }

    /// Apply the full local effect. Validation happens before anything is
    /// touched, so an error leaves the store as it was.
    pub fn apply(self, store: &mut Store, ctx: &mut ApplyCtx<'_>) -> Result<Option<Applied>, OpError> {
        match self {
            Command::CreateRoot { space, name, x, y } => create_root(store, ctx, space, name, x, y),
            Command::CreateSubtask {
                parent,
                name,
                position,
            } => create_subtask(store, ctx, parent, name, position),
            Command::Duplicate { source } => duplicate(store, ctx, source),
            Command::Attach {
                child,
                parent,
                position,
            } => attach(store, child, parent, position),
            Command::Detach { id, x, y, position } => detach(store, id, x, y, position),
            Command::Archive { id } => archive_task(store, ctx, id),
            Command::Unarchive { id } => unarchive_task(store, ctx, id),
            Command::Delete { id } => delete(store, id),
            Command::Update { id, patch } => update(store, ctx, id, patch),
            Command::UpdateApplied {
                id,
                patch,
                original,
                original_updated_at,
            } => update_applied(store, id, patch, original, original_updated_at),
            Command::BringToFront { id } => bring_to_front(store, id),
            Command::CommitOrder { context, prior } => commit_order(store, context, prior),
            Command::Normalize { space } => normalize(store, space),
            Command::UpdateSpace { id, patch } => update_space(store, id, patch),
            Command::DeleteSpace { id } => delete_space(store, id),
        }
    }
}

// ---------------------------------------------------------------------------
// Preconditions
// ---------------------------------------------------------------------------

/// The task must exist and be known to the server
fn confirmed<'a>(store: &'a Store, id: &TaskId) -> Result<&'a Task, OpError> {
    let task = store.task(id).ok_or_else(|| OpError::task_not_found(id))?;
    if task.is_unconfirmed || id.is_temp() {
        return Err(ValidationError::Unconfirmed(id.clone()).into());
    }
    Ok(task)
}

fn confirmed_subtree(store: &Store, id: &TaskId) -> Result<Vec<TaskId>, OpError> {
    confirmed(store, id)?;
    let mut subtree = vec![id.clone()];
    for d in hierarchy::descendants(store, id) {
        confirmed(store, &d)?;
        subtree.push(d);
    }
    Ok(subtree)
}

fn check_cap(store: &Store, space: &SpaceId, adding: usize, limit: usize) -> Result<(), OpError> {
    if store.active_task_count(space) + adding > limit {
        return Err(ValidationError::SpaceFull {
            space: space.clone(),
            limit,
        }
        .into());
    }
    Ok(())
}

fn clean_name(name: &str) -> Result<String, OpError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ValidationError::EmptyName.into());
    }
    Ok(name.to_string())
}

/// Give back an allocated z value if nothing was allocated after it and no
/// card still sits at it (normalize may have moved another card there)
fn release_z(store: &mut Store, space: &SpaceId, allocated: u64) {
    if store.tasks_in_space(space).any(|t| t.z_index >= allocated) {
        return;
    }
    if let Some(s) = store.space_mut(space)
        && s.max_z_index == allocated
    {
        s.max_z_index -= 1;
    }
}

/// Position the server should use for `item` in `ctx`
fn wire_position(store: &Store, ctx: &OrderContext, item: &TaskId) -> Position {
    store
        .context_list(ctx)
        .map(|list| order::confirmed_position(list, item))
        .unwrap_or(Position::End)
}

// ---------------------------------------------------------------------------
// Creation
// ---------------------------------------------------------------------------

fn create_root(
    store: &mut Store,
    ctx: &mut ApplyCtx<'_>,
    space: SpaceId,
    name: String,
    x: f64,
    y: f64,
) -> Result<Option<Applied>, OpError> {
    if store.space(&space).is_none() {
        return Err(OpError::space_not_found(&space));
    }
    let name = clean_name(&name)?;
    check_cap(store, &space, 1, ctx.config.limits.max_tasks_per_space)?;

    let id = ctx.temp_ids.next_id();
    let z = zindex::allocate(store, &space)?;
    let mut task = Task::new(id.clone(), space.clone(), name, ctx.now);
    task.x = x;
    task.y = y;
    task.z_index = z;
    task.is_unconfirmed = true;
    store.insert_task(task.clone());

    let context = OrderContext::Space(space.clone());
    if let Some(list) = store.context_list_mut(&context) {
        order::insert_at(list, id.clone(), &Position::End);
    }
    let position = wire_position(store, &context, &id);

    let created = id.clone();
    Ok(Some(Applied {
        request: Request::CreateTask(NewTask::leaf(task, position)),
        inverse: Box::new(move |store: &mut Store, _: &Reconciled| {
            store.remove_task(&id);
            if let Some(list) = store.context_list_mut(&context) {
                order::remove_from(list, &id);
            }
            release_z(store, &space, z);
        }),
        created: vec![created],
        stale_on_failure: None,
    }))
}

fn create_subtask(
    store: &mut Store,
    ctx: &mut ApplyCtx<'_>,
    parent: TaskId,
    name: String,
    position: Position,
) -> Result<Option<Applied>, OpError> {
    let parent_task = confirmed(store, &parent)?;
    if !hierarchy::can_nest(Some(parent_task)) {
        return Err(ValidationError::MaxDepthReached(parent).into());
    }
    let space = parent_task.space_id.clone();
    let mut ancestors = parent_task.ancestors.clone();
    ancestors.push(parent.clone());
    let name = clean_name(&name)?;
    check_cap(store, &space, 1, ctx.config.limits.max_tasks_per_space)?;

    let id = ctx.temp_ids.next_id();
    let mut task = Task::new(id.clone(), space, name, ctx.now);
    task.parent_task_id = Some(parent.clone());
    task.ancestors = ancestors;
    task.is_unconfirmed = true;
    store.insert_task(task.clone());

    let context = OrderContext::Parent(parent);
    if let Some(list) = store.context_list_mut(&context) {
        order::insert_at(list, id.clone(), &position);
    }
    let wire = wire_position(store, &context, &id);

    let created = id.clone();
    Ok(Some(Applied {
        request: Request::CreateTask(NewTask::leaf(task, wire)),
        inverse: Box::new(move |store: &mut Store, _: &Reconciled| {
            store.remove_task(&id);
            if let Some(list) = store.context_list_mut(&context) {
                order::remove_from(list, &id);
            }
        }),
        created: vec![created],
        stale_on_failure: None,
    }))
}

/// Deep-copy a task's subtree under fresh temp ids, placed right after the
/// source and offset on the canvas. The whole copy is one create request.
fn duplicate(store: &mut Store, ctx: &mut ApplyCtx<'_>, source: TaskId) -> Result<Option<Applied>, OpError> {
    let subtree = confirmed_subtree(store, &source)?;
    let space = store
        .task(&source)
        .map(|t| t.space_id.clone())
        .ok_or_else(|| OpError::task_not_found(&source))?;
    check_cap(store, &space, subtree.len(), ctx.config.limits.max_tasks_per_space)?;

    let mapping: Vec<(TaskId, TaskId)> = subtree
        .iter()
        .map(|old| (old.clone(), ctx.temp_ids.next_id()))
        .collect();
    let map = |id: &TaskId| {
        mapping
            .iter()
            .find(|(old, _)| old == id)
            .map(|(_, new)| new.clone())
            .unwrap_or_else(|| id.clone())
    };

    let context = store
        .context_of(&source)
        .ok_or_else(|| OpError::task_not_found(&source))?;
    let offset = ctx.config.canvas.duplicate_offset;
    let mut copies = Vec::with_capacity(mapping.len());
    for (i, (old, new)) in mapping.iter().enumerate() {
        let Some(original) = store.task(old) else {
            continue;
        };
        let mut copy = original.clone();
        copy.id = new.clone();
        copy.parent_task_id = original.parent_task_id.as_ref().map(&map);
        copy.ancestors = original.ancestors.iter().map(&map).collect();
        copy.subtasks = original.subtasks.iter().map(&map).collect();
        copy.is_archived = false;
        copy.archived_at = None;
        copy.created_at = ctx.now;
        copy.updated_at = ctx.now;
        copy.is_unconfirmed = true;
        if i == 0 {
            copy.x += offset;
            copy.y += offset;
        }
        copies.push(copy);
    }

    let root_copy = map(&source);
    let z = zindex::allocate(store, &space)?;
    if let Some(first) = copies.first_mut() {
        first.z_index = z;
    }
    let Some(mut tree) = build_tree(&copies, &root_copy, Position::End) else {
        release_z(store, &space, z);
        return Err(OpError::task_not_found(&source));
    };
    for copy in &copies {
        store.insert_task(copy.clone());
    }
    if let Some(list) = store.context_list_mut(&context) {
        order::insert_at(list, root_copy.clone(), &Position::After(source.clone()));
    }
    tree.position = wire_position(store, &context, &root_copy);

    let created: Vec<TaskId> = mapping.iter().map(|(_, new)| new.clone()).collect();
    let removed = created.clone();
    Ok(Some(Applied {
        request: Request::CreateTask(tree),
        inverse: Box::new(move |store: &mut Store, _: &Reconciled| {
            for id in &removed {
                store.remove_task(id);
            }
            if let Some(list) = store.context_list_mut(&context) {
                order::remove_from(list, &root_copy);
            }
            release_z(store, &space, z);
        }),
        created,
        stale_on_failure: None,
    }))
}

fn build_tree(copies: &[Task], id: &TaskId, position: Position) -> Option<NewTask> {
    let task = copies.iter().find(|t| &t.id == id)?.clone();
    let children = task
        .subtasks
        .iter()
        .filter_map(|child| build_tree(copies, child, Position::End))
        .collect();
    Some(NewTask {
        task,
        position,
        children,
    })
}

// ---------------------------------------------------------------------------
// Hierarchy moves
// ---------------------------------------------------------------------------

fn attach(store: &mut Store, child: TaskId, parent: TaskId, position: Position) -> Result<Option<Applied>, OpError> {
    confirmed(store, &child)?;
    confirmed(store, &parent)?;
    let prior = hierarchy::attach_child(store, &child, &parent, &position)?;
    let wire = wire_position(store, &OrderContext::Parent(parent.clone()), &child);

    Ok(Some(Applied {
        request: Request::UpdateTask {
            id: child.clone(),
            patch: TaskPatch {
                reparent: Some(Reparent {
                    parent: Some(parent),
                    position: wire,
                }),
                ..Default::default()
            },
        },
        inverse: Box::new(move |store: &mut Store, _: &Reconciled| {
            hierarchy::restore_placement(store, &child, &prior);
        }),
        created: Vec::new(),
        stale_on_failure: None,
    }))
}

fn detach(store: &mut Store, id: TaskId, x: f64, y: f64, position: Position) -> Result<Option<Applied>, OpError> {
    confirmed(store, &id)?;
    let prior = hierarchy::detach_to_root(store, &id, x, y, &position)?;
    let space = store
        .task(&id)
        .map(|t| t.space_id.clone())
        .ok_or_else(|| OpError::task_not_found(&id))?;
    let wire = wire_position(store, &OrderContext::Space(space), &id);

    Ok(Some(Applied {
        request: Request::UpdateTask {
            id: id.clone(),
            patch: TaskPatch {
                x: Some(x),
                y: Some(y),
                reparent: Some(Reparent {
                    parent: None,
                    position: wire,
                }),
                ..Default::default()
            },
        },
        inverse: Box::new(move |store: &mut Store, _: &Reconciled| {
            hierarchy::restore_placement(store, &id, &prior);
        }),
        created: Vec::new(),
        stale_on_failure: None,
    }))
}

// ---------------------------------------------------------------------------
// Archive / delete
// ---------------------------------------------------------------------------

fn archive_request(store: &Store, change: &archive::ArchiveChange) -> Request {
    let updates = change
        .flags
        .iter()
        .filter_map(|(id, _, _)| store.task(id))
        .map(|t| TaskUpdate {
            id: t.id.clone(),
            patch: TaskPatch {
                is_archived: Some(t.is_archived),
                archived_at: Some(t.archived_at),
                ..Default::default()
            },
        })
        .collect();
    Request::UpdateTasks(updates)
}

fn archive_task(store: &mut Store, ctx: &mut ApplyCtx<'_>, id: TaskId) -> Result<Option<Applied>, OpError> {
    confirmed_subtree(store, &id)?;
    let change = archive::archive(store, &id, ctx.now)?;
    if change.is_empty() {
        return Ok(None);
    }
    let request = archive_request(store, &change);
    Ok(Some(Applied {
        request,
        inverse: Box::new(move |store: &mut Store, _: &Reconciled| archive::revert(store, &change)),
        created: Vec::new(),
        stale_on_failure: None,
    }))
}

fn unarchive_task(store: &mut Store, ctx: &mut ApplyCtx<'_>, id: TaskId) -> Result<Option<Applied>, OpError> {
    confirmed_subtree(store, &id)?;
    let change = archive::unarchive(store, &id, ctx.config.limits.max_tasks_per_space)?;
    if change.is_empty() {
        return Ok(None);
    }
    let request = archive_request(store, &change);
    Ok(Some(Applied {
        request,
        inverse: Box::new(move |store: &mut Store, _: &Reconciled| archive::revert(store, &change)),
        created: Vec::new(),
        stale_on_failure: None,
    }))
}

fn delete(store: &mut Store, id: TaskId) -> Result<Option<Applied>, OpError> {
    confirmed_subtree(store, &id)?;
    let space = store
        .task(&id)
        .map(|t| t.space_id.clone())
        .ok_or_else(|| OpError::task_not_found(&id))?;
    let removed = hierarchy::cascade_delete(store, &id)?;
    Ok(Some(Applied {
        request: Request::DeleteTask(id),
        inverse: Box::new(move |store: &mut Store, _: &Reconciled| {
            hierarchy::restore_removed(store, removed);
        }),
        created: Vec::new(),
        stale_on_failure: Some(space),
    }))
}

// ---------------------------------------------------------------------------
// Field edits
// ---------------------------------------------------------------------------

fn check_patch(patch: &TaskPatch) -> Result<(), OpError> {
    if patch.reparent.is_some() {
        return Err(ValidationError::Rejected("reparenting goes through attach or detach".into()).into());
    }
    if patch.is_archived.is_some() || patch.archived_at.is_some() {
        return Err(ValidationError::Rejected("archiving goes through archive or unarchive".into()).into());
    }
    if patch.name.as_ref().is_some_and(|n| n.trim().is_empty()) {
        return Err(ValidationError::EmptyName.into());
    }
    Ok(())
}

/// Keep the space's high-water mark at or above a z set by hand. Returns the
/// prior mark when it moved.
fn raise_max_z(store: &mut Store, id: &TaskId) -> Option<(SpaceId, u64)> {
    let (space, z) = store.task(id).map(|t| (t.space_id.clone(), t.z_index))?;
    let s = store.space_mut(&space)?;
    if z <= s.max_z_index {
        return None;
    }
    let prior = std::mem::replace(&mut s.max_z_index, z);
    Some((space, prior))
}

fn update(store: &mut Store, ctx: &mut ApplyCtx<'_>, id: TaskId, patch: TaskPatch) -> Result<Option<Applied>, OpError> {
    confirmed(store, &id)?;
    check_patch(&patch)?;
    if patch.is_empty() {
        return Ok(None);
    }
    let (original, original_updated_at) = match store.task_mut(&id) {
        Some(task) => {
            let original = patch.apply_to(task);
            let at = std::mem::replace(&mut task.updated_at, ctx.now);
            (original, at)
        }
        None => return Err(OpError::task_not_found(&id)),
    };
    let raised = raise_max_z(store, &id);
    let mut applied = edit_applied(id, patch, original, original_updated_at);
    if let Some((space, prior)) = raised {
        let inverse = applied.inverse;
        applied.inverse = Box::new(move |store: &mut Store, reconciled: &Reconciled| {
            inverse(store, reconciled);
            if let Some(s) = store.space_mut(&space) {
                s.max_z_index = prior;
            }
        });
    }
    Ok(Some(applied))
}

fn update_applied(
    store: &mut Store,
    id: TaskId,
    patch: TaskPatch,
    original: TaskPatch,
    original_updated_at: DateTime<Utc>,
) -> Result<Option<Applied>, OpError> {
    confirmed(store, &id)?;
    if patch.is_empty() {
        return Ok(None);
    }
    Ok(Some(edit_applied(id, patch, original, original_updated_at)))
}

fn edit_applied(
    id: TaskId,
    patch: TaskPatch,
    original: TaskPatch,
    original_updated_at: DateTime<Utc>,
) -> Applied {
    Applied {
        request: Request::UpdateTask {
            id: id.clone(),
            patch,
        },
        inverse: Box::new(move |store: &mut Store, _: &Reconciled| {
            if let Some(task) = store.task_mut(&id) {
                original.apply_to(task);
                task.updated_at = original_updated_at;
            }
        }),
        created: Vec::new(),
        stale_on_failure: None,
    }
}

// ---------------------------------------------------------------------------
// Stacking and order
// ---------------------------------------------------------------------------

/// Unconfirmed cards are lifted locally only; the stacking key is a visual
/// hint and the server copy catches up on the next edit of that card.
fn bring_to_front(store: &mut Store, id: TaskId) -> Result<Option<Applied>, OpError> {
    let change = zindex::bring_to_front(store, &id)?;
    if store.task(&id).is_some_and(|t| t.is_unconfirmed) {
        return Ok(None);
    }
    let zindex::ZChange { task_id, old, new } = change;
    Ok(Some(Applied {
        request: Request::UpdateTask {
            id: task_id.clone(),
            patch: TaskPatch {
                z_index: Some(new),
                ..Default::default()
            },
        },
        inverse: Box::new(move |store: &mut Store, _: &Reconciled| {
            let space = match store.task_mut(&task_id) {
                Some(task) if task.z_index == new => {
                    task.z_index = old;
                    task.space_id.clone()
                }
                _ => return,
            };
            release_z(store, &space, new);
        }),
        created: Vec::new(),
        stale_on_failure: None,
    }))
}

fn commit_order(store: &mut Store, context: OrderContext, prior: Vec<TaskId>) -> Result<Option<Applied>, OpError> {
    if let OrderContext::Parent(parent) = &context {
        confirmed(store, parent)?;
    }
    let list = store
        .context_list(&context)
        .ok_or_else(|| ReferenceError::Context(context.clone()))?;
    // The server places created tasks itself
    let ids: Vec<TaskId> = list.iter().filter(|id| !id.is_temp()).cloned().collect();

    Ok(Some(Applied {
        request: Request::PersistOrder {
            context: context.clone(),
            ids,
        },
        inverse: Box::new(move |store: &mut Store, reconciled: &Reconciled| {
            let prior: Vec<TaskId> = prior.iter().map(|id| reconciled.resolve(id)).collect();
            if let Some(list) = store.context_list_mut(&context) {
                order::restore_relative_order(list, &prior);
            }
        }),
        created: Vec::new(),
        stale_on_failure: None,
    }))
}

/// Compacted values are sent as one batch. A failed batch is not undone:
/// stacking is last-writer-wins, and the local values are still ordered.
fn normalize(store: &mut Store, space: SpaceId) -> Result<Option<Applied>, OpError> {
    let changes = zindex::normalize(store, &space)?;
    let updates: Vec<TaskUpdate> = changes
        .into_iter()
        .filter(|c| !c.task_id.is_temp())
        .map(|c| TaskUpdate {
            id: c.task_id,
            patch: TaskPatch {
                z_index: Some(c.new),
                ..Default::default()
            },
        })
        .collect();
    if updates.is_empty() {
        return Ok(None);
    }
    Ok(Some(Applied {
        request: Request::UpdateTasks(updates),
        inverse: Box::new(|_: &mut Store, _: &Reconciled| {}),
        created: Vec::new(),
        stale_on_failure: None,
    }))
}

// ---------------------------------------------------------------------------
// Spaces
// ---------------------------------------------------------------------------

fn update_space(store: &mut Store, id: SpaceId, patch: SpacePatch) -> Result<Option<Applied>, OpError> {
    if patch.name.as_ref().is_some_and(|n| n.trim().is_empty()) {
        return Err(ValidationError::EmptyName.into());
    }
    let space = store.space_mut(&id).ok_or_else(|| OpError::space_not_found(&id))?;
    let original = patch.apply_to(space);
    if original == SpacePatch::default() {
        return Ok(None);
    }
    Ok(Some(Applied {
        request: Request::UpdateSpace {
            id: id.clone(),
            patch,
        },
        inverse: Box::new(move |store: &mut Store, _: &Reconciled| {
            if let Some(space) = store.space_mut(&id) {
                original.apply_to(space);
            }
        }),
        created: Vec::new(),
        stale_on_failure: None,
    }))
}

fn delete_space(store: &mut Store, id: SpaceId) -> Result<Option<Applied>, OpError> {
    if store.space(&id).is_none() {
        return Err(OpError::space_not_found(&id));
    }
    // A pending create could fail after the space is gone and leave its
    // task restored with nothing left to confirm it
    if let Some(t) = store
        .tasks_in_space(&id)
        .find(|t| t.is_unconfirmed || t.id.is_temp())
    {
        return Err(ValidationError::Unconfirmed(t.id.clone()).into());
    }
    let (space_index, space) = store
        .remove_space(&id)
        .ok_or_else(|| OpError::space_not_found(&id))?;
    let task_ids: Vec<TaskId> = store.tasks_in_space(&id).map(|t| t.id.clone()).collect();
    let mut removed = Vec::with_capacity(task_ids.len());
    for tid in &task_ids {
        if let Some(entry) = store.remove_task(tid) {
            removed.push(entry);
        }
    }

    Ok(Some(Applied {
        request: Request::DeleteSpace(id.clone()),
        inverse: Box::new(move |store: &mut Store, reconciled: &Reconciled| {
            for (index, task) in removed.into_iter().rev() {
                store.restore_task(index, task);
            }
            store.restore_space(space_index, space);
            reconciled.rekey_restored(store, &task_ids);
        }),
        created: Vec::new(),
        stale_on_failure: Some(id),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Space;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    struct Harness {
        store: Store,
        config: BoardConfig,
        temp_ids: TempIdGen,
    }

    impl Harness {
        fn new() -> Self {
            let mut store = Store::new();
            store.insert_space(Space::new("s".into(), "S"));
            Harness {
                store,
                config: BoardConfig::default(),
                temp_ids: TempIdGen::new(),
            }
        }

        fn now() -> DateTime<Utc> {
            Utc.with_ymd_and_hms(2025, 5, 1, 8, 0, 0).unwrap()
        }

        fn apply(&mut self, cmd: Command) -> Result<Option<Applied>, OpError> {
            let mut ctx = ApplyCtx {
                now: Self::now(),
                config: &self.config,
                temp_ids: &mut self.temp_ids,
            };
            cmd.apply(&mut self.store, &mut ctx)
        }

        fn applied(&mut self, cmd: Command) -> Applied {
            self.apply(cmd).unwrap().unwrap()
        }

        fn undo(&mut self, applied: Applied) {
            (applied.inverse)(&mut self.store, &Reconciled::default());
        }

        /// Insert a confirmed root task
        fn root(&mut self, id: &str) {
            let mut t = Task::new(id.into(), "s".into(), id, Self::now());
            t.z_index = zindex::allocate(&mut self.store, &"s".into()).unwrap();
            self.store.insert_task(t);
            self.store
                .space_mut(&"s".into())
                .unwrap()
                .task_order
                .push(id.into());
        }

        /// Insert a confirmed subtask
        fn sub(&mut self, parent: &str, id: &str) {
            let p = self.store.task(&parent.into()).unwrap();
            let mut ancestors = p.ancestors.clone();
            ancestors.push(parent.into());
            let mut t = Task::new(id.into(), "s".into(), id, Self::now());
            t.parent_task_id = Some(parent.into());
            t.ancestors = ancestors;
            self.store.insert_task(t);
            self.store
                .task_mut(&parent.into())
                .unwrap()
                .subtasks
                .push(id.into());
        }

        fn order(&self) -> Vec<TaskId> {
            self.store.space(&"s".into()).unwrap().task_order.clone()
        }
    }

    /// Apply then undo must restore the exact store
    fn assert_round_trip(h: &mut Harness, cmd: Command) {
        let before = h.store.clone();
        let applied = h.applied(cmd.clone());
        assert_ne!(h.store, before, "{} changed nothing", cmd.kind());
        h.undo(applied);
        assert_eq!(h.store, before, "{} did not roll back", cmd.kind());
    }

    #[test]
    fn every_command_rolls_back_completely() {
        let mut h = Harness::new();
        h.root("A");
        h.root("B");
        h.root("C");
        h.sub("A", "A1");
        h.sub("A1", "A2");

        let commands = vec![
            Command::CreateRoot {
                space: "s".into(),
                name: "new".into(),
                x: 1.0,
                y: 2.0,
            },
            Command::CreateSubtask {
                parent: "A".into(),
                name: "child".into(),
                position: Position::Start,
            },
            Command::Duplicate { source: "A".into() },
            Command::Attach {
                child: "C".into(),
                parent: "B".into(),
                position: Position::End,
            },
            Command::Detach {
                id: "A1".into(),
                x: 5.0,
                y: 6.0,
                position: Position::Start,
            },
            Command::Archive { id: "A".into() },
            Command::Delete { id: "A".into() },
            Command::Update {
                id: "B".into(),
                patch: TaskPatch {
                    name: Some("renamed".into()),
                    z_index: Some(99),
                    ..Default::default()
                },
            },
            Command::BringToFront { id: "A".into() },
            Command::UpdateSpace {
                id: "s".into(),
                patch: SpacePatch {
                    name: Some("Renamed".into()),
                    ..Default::default()
                },
            },
            Command::DeleteSpace { id: "s".into() },
        ];
        for cmd in commands {
            assert_round_trip(&mut h, cmd);
        }
    }

    #[test]
    fn commit_order_rolls_back_to_prior() {
        let mut h = Harness::new();
        for id in ["A", "B", "C"] {
            h.root(id);
        }
        let prior = h.order();
        crate::ops::order::move_temporary(
            &mut h.store,
            &"C".into(),
            &OrderContext::Space("s".into()),
            &Position::After("A".into()),
        )
        .unwrap();
        let applied = h.applied(Command::CommitOrder {
            context: OrderContext::Space("s".into()),
            prior: prior.clone(),
        });
        assert_eq!(
            applied.request,
            Request::PersistOrder {
                context: OrderContext::Space("s".into()),
                ids: vec!["A".into(), "C".into(), "B".into()],
            }
        );
        h.undo(applied);
        assert_eq!(h.order(), prior);
    }

    #[test]
    fn create_subtask_at_max_depth_is_rejected_without_changes() {
        // A → B → C, then create under C
        let mut h = Harness::new();
        h.root("A");
        h.sub("A", "B");
        h.sub("B", "C");
        let before = h.store.clone();
        let err = h
            .apply(Command::CreateSubtask {
                parent: "C".into(),
                name: "too deep".into(),
                position: Position::End,
            })
            .err()
            .unwrap();
        assert_eq!(err, OpError::Validation(ValidationError::MaxDepthReached("C".into())));
        assert_eq!(h.store, before);
    }

    #[test]
    fn cap_is_checked_before_apply() {
        let mut h = Harness::new();
        h.config.limits.max_tasks_per_space = 2;
        h.root("A");
        h.root("B");
        let before = h.store.clone();
        let err = h
            .apply(Command::CreateRoot {
                space: "s".into(),
                name: "x".into(),
                x: 0.0,
                y: 0.0,
            })
            .err()
            .unwrap();
        assert!(matches!(err, OpError::Validation(ValidationError::SpaceFull { .. })));
        assert!(matches!(
            h.apply(Command::Duplicate { source: "A".into() }),
            Err(OpError::Validation(ValidationError::SpaceFull { .. }))
        ));
        assert_eq!(h.store, before);
    }

    #[test]
    fn mutations_naming_unconfirmed_tasks_are_rejected() {
        let mut h = Harness::new();
        h.applied(Command::CreateRoot {
            space: "s".into(),
            name: "pending".into(),
            x: 0.0,
            y: 0.0,
        });
        let err = h
            .apply(Command::CreateSubtask {
                parent: "tmp-1".into(),
                name: "child".into(),
                position: Position::End,
            })
            .err()
            .unwrap();
        assert_eq!(err, OpError::Validation(ValidationError::Unconfirmed("tmp-1".into())));
        assert!(matches!(
            h.apply(Command::Delete { id: "tmp-1".into() }),
            Err(OpError::Validation(ValidationError::Unconfirmed(_)))
        ));
        // Stacking still works locally, without a request
        assert!(h.apply(Command::BringToFront { id: "tmp-1".into() }).unwrap().is_none());
    }

    #[test]
    fn duplicate_copies_subtree_after_source() {
        let mut h = Harness::new();
        h.root("A");
        h.root("B");
        h.sub("A", "A1");
        h.sub("A1", "A2");
        let applied = h.applied(Command::Duplicate { source: "A".into() });
        assert_eq!(applied.created.len(), 3);
        assert_eq!(h.order(), vec![TaskId::from("A"), "tmp-1".into(), "B".into()]);

        let copy = h.store.task(&"tmp-1".into()).unwrap();
        assert_eq!(copy.subtasks, vec![TaskId::from("tmp-2")]);
        assert_eq!((copy.x, copy.y), (20.0, 20.0));
        assert!(copy.z_index > h.store.task(&"B".into()).unwrap().z_index);
        let grandchild = h.store.task(&"tmp-3".into()).unwrap();
        assert_eq!(grandchild.ancestors, vec![TaskId::from("tmp-1"), "tmp-2".into()]);

        let Request::CreateTask(tree) = &applied.request else {
            panic!("expected a create request");
        };
        assert_eq!(tree.count(), 3);
        assert_eq!(tree.position, Position::After("A".into()));
        // The source is untouched
        assert_eq!(
            h.store.task(&"A".into()).unwrap().subtasks,
            vec![TaskId::from("A1")]
        );
    }

    #[test]
    fn attach_request_carries_confirmed_anchor() {
        let mut h = Harness::new();
        h.root("P");
        h.root("X");
        h.sub("P", "K");
        let applied = h.applied(Command::Attach {
            child: "X".into(),
            parent: "P".into(),
            position: Position::End,
        });
        assert_eq!(
            applied.request,
            Request::UpdateTask {
                id: "X".into(),
                patch: TaskPatch {
                    reparent: Some(Reparent {
                        parent: Some("P".into()),
                        position: Position::After("K".into()),
                    }),
                    ..Default::default()
                },
            }
        );
    }

    #[test]
    fn delete_marks_space_for_reload_on_failure() {
        let mut h = Harness::new();
        h.root("A");
        let applied = h.applied(Command::Delete { id: "A".into() });
        assert_eq!(applied.stale_on_failure, Some(SpaceId::from("s")));
    }

    #[test]
    fn update_rejects_structural_fields() {
        let mut h = Harness::new();
        h.root("A");
        for patch in [
            TaskPatch {
                is_archived: Some(true),
                ..Default::default()
            },
            TaskPatch {
                name: Some("   ".into()),
                ..Default::default()
            },
        ] {
            assert!(h
                .apply(Command::Update {
                    id: "A".into(),
                    patch
                })
                .is_err());
        }
    }

    #[test]
    fn normalize_is_not_rolled_back() {
        let mut h = Harness::new();
        h.root("A");
        h.root("B");
        h.store.task_mut(&"A".into()).unwrap().z_index = 70;
        h.store.space_mut(&"s".into()).unwrap().max_z_index = 70;
        let applied = h.applied(Command::Normalize { space: "s".into() });
        let after = h.store.clone();
        h.undo(applied);
        assert_eq!(h.store, after);
        assert_eq!(h.store.space(&"s".into()).unwrap().max_z_index, 2);
    }

    #[test]
    fn failed_create_keeps_mark_reused_by_normalize() {
        let mut h = Harness::new();
        h.root("A");
        h.root("B");
        let create = h.applied(Command::CreateRoot {
            space: "s".into(),
            name: "new".into(),
            x: 0.0,
            y: 0.0,
        });
        h.applied(Command::BringToFront { id: "B".into() });
        h.applied(Command::Normalize { space: "s".into() });
        assert_eq!(h.store.task(&"B".into()).unwrap().z_index, 3);

        h.undo(create);
        let max = h.store.space(&"s".into()).unwrap().max_z_index;
        let highest = h.store.tasks().map(|t| t.z_index).max().unwrap();
        assert_eq!(max, 3);
        assert!(max >= highest);
    }

    #[test]
    fn delete_space_waits_for_pending_creates() {
        let mut h = Harness::new();
        h.root("A");
        h.applied(Command::CreateRoot {
            space: "s".into(),
            name: "new".into(),
            x: 0.0,
            y: 0.0,
        });
        let before = h.store.clone();

        let err = h.apply(Command::DeleteSpace { id: "s".into() }).err().unwrap();
        assert!(matches!(
            err,
            OpError::Validation(ValidationError::Unconfirmed(ref id)) if id.as_str() == "tmp-1"
        ));
        assert_eq!(h.store, before);
    }
}
