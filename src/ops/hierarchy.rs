use crate::error::{OpError, ReferenceError, ValidationError};
use crate::model::{OrderContext, Position, Task, TaskId};
use crate::ops::order;
use crate::store::Store;

/// Deepest allowed ancestor chain: root (0), subtask (1), sub-subtask (2).
pub const MAX_DEPTH: usize = 2;

/// Whether a subtask may be created under `parent`.
pub fn can_nest(parent: Option<&Task>) -> bool {
    match parent {
        None => false,
        Some(p) => p.ancestors.len() < MAX_DEPTH,
    }
}

/// Where a task sat before a hierarchy move, enough to put it back.
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    pub context: OrderContext,
    /// Index in the context list; None when the task was not listed
    /// (an archived root task)
    pub index: Option<usize>,
    pub parent: Option<TaskId>,
    pub ancestors: Vec<TaskId>,
    pub x: f64,
    pub y: f64,
}

/// Everything removed by a cascade delete, in removal order
#[derive(Debug, Clone, PartialEq)]
pub struct Removed {
    pub root: TaskId,
    /// (arena index, task)
    pub tasks: Vec<(usize, Task)>,
    /// (context, index, id) for every list entry that was dropped
    pub list_entries: Vec<(OrderContext, usize, TaskId)>,
}

impl Removed {
    pub fn ids(&self) -> impl Iterator<Item = &TaskId> {
        self.tasks.iter().map(|(_, t)| &t.id)
    }
}

/// Descendants of `id` in pre-order (children in list order), excluding `id`.
pub fn descendants(store: &Store, id: &TaskId) -> Vec<TaskId> {
    let mut out = Vec::new();
    collect_descendants(store, id, &mut out);
    out
}

fn collect_descendants(store: &Store, id: &TaskId, out: &mut Vec<TaskId>) {
    let Some(task) = store.task(id) else {
        return;
    };
    for child in &task.subtasks {
        if out.contains(child) {
            continue;
        }
        out.push(child.clone());
        collect_descendants(store, child, out);
    }
}

/// Levels below `id` (0 for a leaf)
pub fn subtree_height(store: &Store, id: &TaskId) -> usize {
    store
        .task(id)
        .map(|t| {
            t.subtasks
                .iter()
                .map(|c| 1 + subtree_height(store, c))
                .max()
                .unwrap_or(0)
        })
        .unwrap_or(0)
}

/// Check that `child` may be attached under `parent` without breaking the
/// depth bound, forming a cycle, or crossing spaces.
pub fn validate_attach(store: &Store, child: &TaskId, parent: &TaskId) -> Result<(), OpError> {
    let child_task = store.task(child).ok_or_else(|| OpError::task_not_found(child))?;
    let parent_task = store
        .task(parent)
        .ok_or_else(|| OpError::task_not_found(parent))?;

    if child == parent || parent_task.ancestors.contains(child) {
        return Err(ValidationError::Cycle {
            child: child.clone(),
            parent: parent.clone(),
        }
        .into());
    }
    if child_task.space_id != parent_task.space_id {
        return Err(ValidationError::CrossSpace {
            child: child.clone(),
            space: parent_task.space_id.clone(),
        }
        .into());
    }
    if !can_nest(Some(parent_task)) {
        return Err(ValidationError::MaxDepthReached(parent.clone()).into());
    }
    let new_depth = parent_task.ancestors.len() + 1;
    if new_depth + subtree_height(store, child) > MAX_DEPTH {
        return Err(ValidationError::MaxDepthReached(parent.clone()).into());
    }
    Ok(())
}

/// Record where a task currently sits
pub fn placement_of(store: &Store, id: &TaskId) -> Result<Placement, OpError> {
    let task = store.task(id).ok_or_else(|| OpError::task_not_found(id))?;
    let context = store
        .context_of(id)
        .ok_or_else(|| OpError::task_not_found(id))?;
    let index = store
        .context_list(&context)
        .and_then(|list| list.iter().position(|t| t == id));
    Ok(Placement {
        context,
        index,
        parent: task.parent_task_id.clone(),
        ancestors: task.ancestors.clone(),
        x: task.x,
        y: task.y,
    })
}

/// Move `child` under `new_parent` at `position`. Descendant ancestor chains
/// are rewritten. Returns the prior placement.
pub fn attach_child(
    store: &mut Store,
    child: &TaskId,
    new_parent: &TaskId,
    position: &Position,
) -> Result<Placement, OpError> {
    validate_attach(store, child, new_parent)?;
    let prior = placement_of(store, child)?;

    if let Some(list) = store.context_list_mut(&prior.context) {
        order::remove_from(list, child);
    }

    let mut ancestors = store
        .task(new_parent)
        .map(|p| p.ancestors.clone())
        .unwrap_or_default();
    ancestors.push(new_parent.clone());
    if let Some(task) = store.task_mut(child) {
        task.parent_task_id = Some(new_parent.clone());
        task.ancestors = ancestors;
    }
    rewrite_descendant_ancestors(store, child);

    if let Some(parent) = store.task_mut(new_parent) {
        order::insert_at(&mut parent.subtasks, child.clone(), position);
    }
    Ok(prior)
}

/// Promote `id` to a root task of its space at canvas position (x, y).
/// Returns the prior placement.
pub fn detach_to_root(
    store: &mut Store,
    id: &TaskId,
    x: f64,
    y: f64,
    position: &Position,
) -> Result<Placement, OpError> {
    let prior = placement_of(store, id)?;
    let space_id = store
        .task(id)
        .map(|t| t.space_id.clone())
        .ok_or_else(|| OpError::task_not_found(id))?;
    if store.space(&space_id).is_none() {
        return Err(ReferenceError::Space(space_id).into());
    }

    if let Some(list) = store.context_list_mut(&prior.context) {
        order::remove_from(list, id);
    }
    let archived = match store.task_mut(id) {
        Some(task) => {
            task.parent_task_id = None;
            task.ancestors.clear();
            task.x = x;
            task.y = y;
            task.is_archived
        }
        None => false,
    };
    rewrite_descendant_ancestors(store, id);

    if !archived && let Some(space) = store.space_mut(&space_id) {
        order::insert_at(&mut space.task_order, id.clone(), position);
    }
    Ok(prior)
}

/// Put a task back where `placement` says it was, undoing attach/detach.
pub fn restore_placement(store: &mut Store, id: &TaskId, placement: &Placement) {
    let Some(current) = store.context_of(id) else {
        return;
    };
    if let Some(list) = store.context_list_mut(&current) {
        order::remove_from(list, id);
    }
    if let Some(task) = store.task_mut(id) {
        task.parent_task_id = placement.parent.clone();
        task.ancestors = placement.ancestors.clone();
        task.x = placement.x;
        task.y = placement.y;
    }
    rewrite_descendant_ancestors(store, id);

    if let Some(index) = placement.index
        && let Some(list) = store.context_list_mut(&placement.context)
    {
        order::remove_from(list, id);
        let idx = index.min(list.len());
        list.insert(idx, id.clone());
    }
}

/// Recompute `ancestors` for every descendant of `id` from `id`'s own chain.
pub fn rewrite_descendant_ancestors(store: &mut Store, id: &TaskId) {
    let Some(task) = store.task(id) else {
        return;
    };
    let mut chain = task.ancestors.clone();
    chain.push(id.clone());
    let children = task.subtasks.clone();
    for child in children {
        if let Some(c) = store.task_mut(&child) {
            c.parent_task_id = Some(id.clone());
            c.ancestors = chain.clone();
        }
        rewrite_descendant_ancestors(store, &child);
    }
}

/// Delete `id` and its entire subtree, dropping every list entry that
/// references any of them. One local step; see `restore_removed`.
pub fn cascade_delete(store: &mut Store, id: &TaskId) -> Result<Removed, OpError> {
    if !store.contains_task(id) {
        return Err(OpError::task_not_found(id));
    }
    let mut doomed = vec![id.clone()];
    doomed.extend(descendants(store, id));

    let mut removed = Removed {
        root: id.clone(),
        tasks: Vec::new(),
        list_entries: Vec::new(),
    };

    // Sweep every list in the store, not only the owning context
    let mut contexts: Vec<OrderContext> =
        store.spaces().map(|s| OrderContext::Space(s.id.clone())).collect();
    contexts.extend(
        store
            .tasks()
            .filter(|t| !doomed.contains(&t.id))
            .map(|t| OrderContext::Parent(t.id.clone())),
    );
    for ctx in contexts {
        if let Some(list) = store.context_list_mut(&ctx) {
            while let Some(idx) = list.iter().position(|t| doomed.contains(t)) {
                let entry = list.remove(idx);
                removed.list_entries.push((ctx.clone(), idx, entry));
            }
        }
    }

    for doomed_id in &doomed {
        if let Some(entry) = store.remove_task(doomed_id) {
            removed.tasks.push(entry);
        }
    }
    Ok(removed)
}

/// Undo a cascade delete exactly: tasks and list entries go back in
/// reverse removal order so every index lines up again.
pub fn restore_removed(store: &mut Store, removed: Removed) {
    for (index, task) in removed.tasks.into_iter().rev() {
        store.restore_task(index, task);
    }
    for (ctx, idx, id) in removed.list_entries.into_iter().rev() {
        if let Some(list) = store.context_list_mut(&ctx) {
            if list.contains(&id) {
                continue;
            }
            let idx = idx.min(list.len());
            list.insert(idx, id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Space, SpaceId};
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    fn sid() -> SpaceId {
        SpaceId::from("s")
    }

    fn root(store: &mut Store, id: &str) {
        store.insert_task(Task::new(TaskId::from(id), sid(), id, Utc::now()));
        store
            .space_mut(&sid())
            .unwrap()
            .task_order
            .push(TaskId::from(id));
    }

    fn sub(store: &mut Store, parent: &str, id: &str) {
        let parent_task = store.task(&TaskId::from(parent)).unwrap();
        assert!(can_nest(Some(parent_task)));
        let mut ancestors = parent_task.ancestors.clone();
        ancestors.push(TaskId::from(parent));
        let mut task = Task::new(TaskId::from(id), sid(), id, Utc::now());
        task.parent_task_id = Some(TaskId::from(parent));
        task.ancestors = ancestors;
        store.insert_task(task);
        store
            .task_mut(&TaskId::from(parent))
            .unwrap()
            .subtasks
            .push(TaskId::from(id));
    }

    fn base() -> Store {
        let mut store = Store::new();
        store.insert_space(Space::new(sid(), "S"));
        store
    }

    fn t(store: &Store, id: &str) -> Task {
        store.task(&TaskId::from(id)).unwrap().clone()
    }

    fn ids(list: &[&str]) -> Vec<TaskId> {
        list.iter().map(|s| TaskId::from(*s)).collect()
    }

    #[test]
    fn can_nest_respects_depth() {
        // A (root) → B → C; C is at the maximum depth
        let mut store = base();
        root(&mut store, "A");
        sub(&mut store, "A", "B");
        sub(&mut store, "B", "C");

        assert_eq!(t(&store, "C").ancestors, ids(&["A", "B"]));
        assert!(can_nest(store.task(&"A".into())));
        assert!(can_nest(store.task(&"B".into())));
        assert!(!can_nest(store.task(&"C".into())));
        assert!(!can_nest(None));

        root(&mut store, "D");
        let err = attach_child(&mut store, &"D".into(), &"C".into(), &Position::End).unwrap_err();
        assert_eq!(err, OpError::Validation(ValidationError::MaxDepthReached("C".into())));
        assert_eq!(t(&store, "D").ancestors, Vec::<TaskId>::new());
    }

    #[test]
    fn attach_moves_between_contexts() {
        let mut store = base();
        root(&mut store, "A");
        root(&mut store, "B");
        root(&mut store, "C");

        let prior = attach_child(&mut store, &"C".into(), &"A".into(), &Position::Start).unwrap();
        assert_eq!(prior.context, OrderContext::Space(sid()));
        assert_eq!(prior.index, Some(2));

        assert_eq!(store.space(&sid()).unwrap().task_order, ids(&["A", "B"]));
        assert_eq!(t(&store, "A").subtasks, ids(&["C"]));
        assert_eq!(t(&store, "C").parent_task_id, Some("A".into()));
        assert_eq!(t(&store, "C").ancestors, ids(&["A"]));

        attach_child(&mut store, &"B".into(), &"A".into(), &Position::After("C".into())).unwrap();
        assert_eq!(t(&store, "A").subtasks, ids(&["C", "B"]));
    }

    #[test]
    fn attach_rewrites_descendant_ancestors() {
        let mut store = base();
        root(&mut store, "A");
        root(&mut store, "X");
        sub(&mut store, "X", "Y");

        attach_child(&mut store, &"X".into(), &"A".into(), &Position::End).unwrap();
        assert_eq!(t(&store, "X").ancestors, ids(&["A"]));
        assert_eq!(t(&store, "Y").ancestors, ids(&["A", "X"]));
        assert_eq!(t(&store, "Y").parent_task_id, Some("X".into()));
    }

    #[test]
    fn attach_rejects_subtree_that_would_overflow() {
        let mut store = base();
        root(&mut store, "A");
        sub(&mut store, "A", "B");
        root(&mut store, "X");
        sub(&mut store, "X", "Y");

        // X has height 1; under B (depth 1) X lands at 2 and Y at 3
        let err = attach_child(&mut store, &"X".into(), &"B".into(), &Position::End).unwrap_err();
        assert!(matches!(err, OpError::Validation(ValidationError::MaxDepthReached(_))));
    }

    #[test]
    fn attach_rejects_cycles() {
        let mut store = base();
        root(&mut store, "A");
        sub(&mut store, "A", "B");

        let err = attach_child(&mut store, &"A".into(), &"B".into(), &Position::End).unwrap_err();
        assert!(matches!(err, OpError::Validation(ValidationError::Cycle { .. })));
        let err = attach_child(&mut store, &"A".into(), &"A".into(), &Position::End).unwrap_err();
        assert!(matches!(err, OpError::Validation(ValidationError::Cycle { .. })));
    }

    #[test]
    fn depth_bound_holds_after_attach_sequences() {
        let mut store = base();
        for id in ["A", "B", "C", "D", "E"] {
            root(&mut store, id);
        }
        let attempts = [
            ("B", "A"),
            ("C", "B"),
            ("D", "C"),
            ("E", "D"),
            ("A", "E"),
            ("E", "A"),
            ("D", "B"),
            ("C", "E"),
        ];
        for (child, parent) in attempts {
            let _ = attach_child(&mut store, &child.into(), &parent.into(), &Position::End);
            for task in store.tasks() {
                assert!(task.ancestors.len() <= MAX_DEPTH, "{} too deep", task.id);
                assert_eq!(task.ancestors.last(), task.parent_task_id.as_ref());
            }
        }
    }

    #[test]
    fn detach_to_root_clears_chain() {
        let mut store = base();
        root(&mut store, "A");
        sub(&mut store, "A", "B");
        sub(&mut store, "B", "C");

        detach_to_root(&mut store, &"B".into(), 40.0, 80.0, &Position::Start).unwrap();
        let b = t(&store, "B");
        assert_eq!(b.parent_task_id, None);
        assert!(b.ancestors.is_empty());
        assert_eq!((b.x, b.y), (40.0, 80.0));
        assert_eq!(t(&store, "C").ancestors, ids(&["B"]));
        assert!(t(&store, "A").subtasks.is_empty());
        assert_eq!(store.space(&sid()).unwrap().task_order, ids(&["B", "A"]));
    }

    #[test]
    fn restore_placement_undoes_attach() {
        let mut store = base();
        root(&mut store, "A");
        root(&mut store, "B");
        sub(&mut store, "B", "C");
        let before = store.clone();

        let prior = attach_child(&mut store, &"B".into(), &"A".into(), &Position::End).unwrap();
        restore_placement(&mut store, &"B".into(), &prior);
        assert_eq!(store, before);
    }

    #[test]
    fn cascade_delete_removes_whole_subtree() {
        // A with 2 subtasks and 1 grandchild
        let mut store = base();
        root(&mut store, "A");
        root(&mut store, "Z");
        sub(&mut store, "A", "B");
        sub(&mut store, "A", "C");
        sub(&mut store, "B", "D");

        let removed = cascade_delete(&mut store, &"A".into()).unwrap();
        assert_eq!(removed.tasks.len(), 4);
        for id in ["A", "B", "C", "D"] {
            assert!(!store.references(&id.into()), "{id} still referenced");
        }
        assert_eq!(store.space(&sid()).unwrap().task_order, ids(&["Z"]));
    }

    #[test]
    fn restore_removed_is_exact() {
        let mut store = base();
        root(&mut store, "Z");
        root(&mut store, "A");
        root(&mut store, "Y");
        sub(&mut store, "A", "B");
        sub(&mut store, "B", "C");
        let before = store.clone();

        let removed = cascade_delete(&mut store, &"A".into()).unwrap();
        restore_removed(&mut store, removed);
        assert_eq!(store, before);
        let arena: Vec<&str> = store.tasks().map(|t| t.id.as_str()).collect();
        assert_eq!(arena, vec!["Z", "A", "Y", "B", "C"]);
    }

    #[test]
    fn cascade_delete_of_missing_task_is_reference_error() {
        let mut store = base();
        let err = cascade_delete(&mut store, &"nope".into()).unwrap_err();
        assert!(matches!(err, OpError::Reference(ReferenceError::Task(_))));
    }
}
