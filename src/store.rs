//! Flat, id-keyed entity store. The single source of truth for tasks and
//! spaces; every relationship is an id reference into these maps.

use indexmap::IndexMap;

use crate::model::{OrderContext, Space, SpaceId, Task, TaskId};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Store {
    tasks: IndexMap<TaskId, Task>,
    spaces: IndexMap<SpaceId, Space>,
}

impl Store {
    pub fn new() -> Self {
        Store::default()
    }

    // ---------------------------------------------------------------------
    // Tasks
    // ---------------------------------------------------------------------

    pub fn task(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.get(id)
    }

    pub fn task_mut(&mut self, id: &TaskId) -> Option<&mut Task> {
        self.tasks.get_mut(id)
    }

    pub fn contains_task(&self, id: &TaskId) -> bool {
        self.tasks.contains_key(id)
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// All tasks (any depth, archived or not) belonging to a space
    pub fn tasks_in_space<'a>(&'a self, space_id: &SpaceId) -> impl Iterator<Item = &'a Task> + 'a {
        let space_id = space_id.clone();
        self.tasks.values().filter(move |t| t.space_id == space_id)
    }

    /// Number of non-archived tasks in a space, the quantity the per-space cap limits
    pub fn active_task_count(&self, space_id: &SpaceId) -> usize {
        self.tasks_in_space(space_id)
            .filter(|t| !t.is_archived)
            .count()
    }

    /// Insert (or replace) a task. Returns its index in the arena.
    pub fn insert_task(&mut self, task: Task) -> usize {
        let (index, _) = self.tasks.insert_full(task.id.clone(), task);
        index
    }

    /// Remove a task, returning its arena index so it can be restored in place
    pub fn remove_task(&mut self, id: &TaskId) -> Option<(usize, Task)> {
        let (index, _, task) = self.tasks.shift_remove_full(id)?;
        Some((index, task))
    }

    /// Put a previously removed task back at its original arena index
    pub fn restore_task(&mut self, index: usize, task: Task) {
        let index = index.min(self.tasks.len());
        self.tasks.shift_insert(index, task.id.clone(), task);
    }

    // ---------------------------------------------------------------------
    // Spaces
    // ---------------------------------------------------------------------

    pub fn space(&self, id: &SpaceId) -> Option<&Space> {
        self.spaces.get(id)
    }

    pub fn space_mut(&mut self, id: &SpaceId) -> Option<&mut Space> {
        self.spaces.get_mut(id)
    }

    pub fn spaces(&self) -> impl Iterator<Item = &Space> {
        self.spaces.values()
    }

    pub fn insert_space(&mut self, space: Space) -> usize {
        let (index, _) = self.spaces.insert_full(space.id.clone(), space);
        index
    }

    pub fn remove_space(&mut self, id: &SpaceId) -> Option<(usize, Space)> {
        let (index, _, space) = self.spaces.shift_remove_full(id)?;
        Some((index, space))
    }

    pub fn restore_space(&mut self, index: usize, space: Space) {
        let index = index.min(self.spaces.len());
        self.spaces.shift_insert(index, space.id.clone(), space);
    }

    /// Replace every task of a space with a freshly fetched set
    pub fn replace_space_tasks(&mut self, space_id: &SpaceId, tasks: Vec<Task>) {
        self.tasks.retain(|_, t| &t.space_id != space_id);
        for task in tasks {
            self.insert_task(task);
        }
    }

    // ---------------------------------------------------------------------
    // Order contexts
    // ---------------------------------------------------------------------

    /// The ordered id list owned by a context
    pub fn context_list(&self, ctx: &OrderContext) -> Option<&Vec<TaskId>> {
        match ctx {
            OrderContext::Space(id) => self.spaces.get(id).map(|s| &s.task_order),
            OrderContext::Parent(id) => self.tasks.get(id).map(|t| &t.subtasks),
        }
    }

    pub fn context_list_mut(&mut self, ctx: &OrderContext) -> Option<&mut Vec<TaskId>> {
        match ctx {
            OrderContext::Space(id) => self.spaces.get_mut(id).map(|s| &mut s.task_order),
            OrderContext::Parent(id) => self.tasks.get_mut(id).map(|t| &mut t.subtasks),
        }
    }

    /// The context a task is listed in: its parent, or its space when root.
    pub fn context_of(&self, id: &TaskId) -> Option<OrderContext> {
        let task = self.tasks.get(id)?;
        Some(match &task.parent_task_id {
            Some(parent) => OrderContext::Parent(parent.clone()),
            None => OrderContext::Space(task.space_id.clone()),
        })
    }

    /// The space that owns a context
    pub fn space_of_context(&self, ctx: &OrderContext) -> Option<SpaceId> {
        match ctx {
            OrderContext::Space(id) => self.spaces.contains_key(id).then(|| id.clone()),
            OrderContext::Parent(id) => self.tasks.get(id).map(|t| t.space_id.clone()),
        }
    }

    // ---------------------------------------------------------------------
    // Id reconciliation
    // ---------------------------------------------------------------------

    /// Rewrite every occurrence of `from` to `to`: the arena key, the task's
    /// own id, every parent/ancestor/subtask reference and every space order.
    /// Returns false if `from` is not a stored task.
    pub fn rekey_task(&mut self, from: &TaskId, to: &TaskId) -> bool {
        let Some((index, mut task)) = self.remove_task(from) else {
            return false;
        };
        task.id = to.clone();
        self.restore_task(index, task);

        let swap = |id: &mut TaskId| {
            if id == from {
                *id = to.clone();
            }
        };
        for task in self.tasks.values_mut() {
            if let Some(parent) = task.parent_task_id.as_mut() {
                swap(parent);
            }
            task.ancestors.iter_mut().for_each(swap);
            task.subtasks.iter_mut().for_each(swap);
        }
        for space in self.spaces.values_mut() {
            space.task_order.iter_mut().for_each(swap);
        }
        true
    }

    /// True if `id` is stored or referenced anywhere in the store
    pub fn references(&self, id: &TaskId) -> bool {
        self.tasks.contains_key(id)
            || self.tasks.values().any(|t| {
                t.parent_task_id.as_ref() == Some(id)
                    || t.ancestors.contains(id)
                    || t.subtasks.contains(id)
            })
            || self.spaces.values().any(|s| s.task_order.contains(id))
    }
}
