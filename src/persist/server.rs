//! Server-side semantics shared by the memory and file backends.
//!
//! The server issues `srv-N` ids, applies every request atomically (a failed
//! request leaves its state untouched) and enforces the nesting depth and
//! per-space cap regardless of what the client checked.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{OpError, ValidationError};
use crate::model::{OrderContext, Space, SpaceId, SpacePatch, Task, TaskId, TaskPatch};
use crate::ops::{hierarchy, order};
use crate::persist::{CreatedTask, NewTask, PersistenceError, TaskUpdate};
use crate::store::Store;

/// Serialized form of the server state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoardDocument {
    #[serde(default)]
    pub next_id: u64,
    #[serde(default)]
    pub spaces: Vec<Space>,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

#[derive(Debug, Clone)]
pub struct ServerState {
    store: Store,
    next_id: u64,
    limit: usize,
}

impl ServerState {
    pub fn new(limit: usize) -> Self {
        ServerState {
            store: Store::new(),
            next_id: 0,
            limit,
        }
    }

    pub fn from_document(doc: BoardDocument, limit: usize) -> Self {
        let mut store = Store::new();
        for space in doc.spaces {
            store.insert_space(space);
        }
        for task in doc.tasks {
            store.insert_task(task);
        }
        ServerState {
            store,
            next_id: doc.next_id,
            limit,
        }
    }

    pub fn to_document(&self) -> BoardDocument {
        BoardDocument {
            next_id: self.next_id,
            spaces: self.store.spaces().cloned().collect(),
            tasks: self.store.tasks().cloned().collect(),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    fn issue_id(&mut self) -> String {
        self.next_id += 1;
        format!("srv-{}", self.next_id)
    }

    // ---------------------------------------------------------------------
    // Spaces
    // ---------------------------------------------------------------------

    pub fn list_spaces(&self) -> Vec<Space> {
        self.store.spaces().cloned().collect()
    }

    pub fn create_space(&mut self, name: &str, color: &str) -> Result<Space, PersistenceError> {
        if name.trim().is_empty() {
            return Err(OpError::from(ValidationError::EmptyName).into());
        }
        let mut space = Space::new(SpaceId::new(self.issue_id()), name.trim());
        space.color = color.to_string();
        self.store.insert_space(space.clone());
        Ok(space)
    }

    pub fn update_space(&mut self, id: &SpaceId, patch: &SpacePatch) -> Result<Space, PersistenceError> {
        if patch.name.as_ref().is_some_and(|n| n.trim().is_empty()) {
            return Err(OpError::from(ValidationError::EmptyName).into());
        }
        let space = self
            .store
            .space_mut(id)
            .ok_or_else(|| OpError::space_not_found(id))?;
        patch.apply_to(space);
        Ok(space.clone())
    }

    pub fn delete_space(&mut self, id: &SpaceId) -> Result<(), PersistenceError> {
        self.store
            .remove_space(id)
            .ok_or_else(|| OpError::space_not_found(id))?;
        self.store.replace_space_tasks(id, Vec::new());
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Tasks
    // ---------------------------------------------------------------------

    pub fn fetch_tasks(&self, space: &SpaceId) -> Result<Vec<Task>, PersistenceError> {
        if self.store.space(space).is_none() {
            return Err(OpError::space_not_found(space).into());
        }
        Ok(self.store.tasks_in_space(space).cloned().collect())
    }

    pub fn create_task(
        &mut self,
        tree: NewTask,
        now: DateTime<Utc>,
    ) -> Result<Vec<CreatedTask>, PersistenceError> {
        let space_id = tree.task.space_id.clone();
        if self.store.space(&space_id).is_none() {
            return Err(OpError::space_not_found(&space_id).into());
        }

        let parent = match &tree.task.parent_task_id {
            Some(pid) => {
                let p = self
                    .store
                    .task(pid)
                    .ok_or_else(|| OpError::task_not_found(pid))?;
                if p.space_id != space_id {
                    return Err(OpError::from(ValidationError::CrossSpace {
                        child: tree.task.id.clone(),
                        space: p.space_id.clone(),
                    })
                    .into());
                }
                if p.ancestors.len() + 1 + tree_height(&tree) > hierarchy::MAX_DEPTH {
                    return Err(OpError::from(ValidationError::MaxDepthReached(pid.clone())).into());
                }
                Some((pid.clone(), p.ancestors.clone()))
            }
            None => {
                if tree_height(&tree) > hierarchy::MAX_DEPTH {
                    return Err(OpError::from(ValidationError::MaxDepthReached(
                        tree.task.id.clone(),
                    ))
                    .into());
                }
                None
            }
        };

        let adding = count_active(&tree);
        if self.store.active_task_count(&space_id) + adding > self.limit {
            return Err(OpError::from(ValidationError::SpaceFull {
                space: space_id,
                limit: self.limit,
            })
            .into());
        }

        let mut created = Vec::new();
        let (parent_id, mut ancestors) = match parent {
            Some((pid, chain)) => (Some(pid), chain),
            None => (None, Vec::new()),
        };
        if let Some(pid) = &parent_id {
            ancestors.push(pid.clone());
        }
        let position = tree.position.clone();
        let root_archived = tree.task.is_archived;
        let root_id = self.insert_tree(tree, parent_id.clone(), ancestors, now, &mut created);

        match parent_id {
            Some(pid) => {
                if let Some(p) = self.store.task_mut(&pid) {
                    order::insert_at(&mut p.subtasks, root_id, &position);
                }
            }
            None if !root_archived => {
                if let Some(space) = self.store.space_mut(&space_id) {
                    order::insert_at(&mut space.task_order, root_id, &position);
                }
            }
            None => {}
        }

        let top_z = created.iter().map(|c| c.task.z_index).max().unwrap_or(0);
        if let Some(space) = self.store.space_mut(&space_id) {
            space.max_z_index = space.max_z_index.max(top_z);
        }
        Ok(created)
    }

    fn insert_tree(
        &mut self,
        tree: NewTask,
        parent: Option<TaskId>,
        ancestors: Vec<TaskId>,
        now: DateTime<Utc>,
        out: &mut Vec<CreatedTask>,
    ) -> TaskId {
        let id = TaskId::new(self.issue_id());
        let client_id = tree.task.id.clone();
        let mut task = tree.task;
        task.id = id.clone();
        task.parent_task_id = parent;
        task.ancestors = ancestors.clone();
        task.subtasks = Vec::new();
        task.created_at = now;
        task.updated_at = now;
        task.is_unconfirmed = false;

        let slot = out.len();
        out.push(CreatedTask {
            client_id,
            task: task.clone(),
        });

        let mut chain = ancestors;
        chain.push(id.clone());
        for child in tree.children {
            let child_id = self.insert_tree(child, Some(id.clone()), chain.clone(), now, out);
            task.subtasks.push(child_id);
        }
        out[slot].task.subtasks = task.subtasks.clone();
        self.store.insert_task(task);
        id
    }

    pub fn update_task(
        &mut self,
        id: &TaskId,
        patch: &TaskPatch,
        now: DateTime<Utc>,
    ) -> Result<Task, PersistenceError> {
        let mut next = self.store.clone();
        apply_update(&mut next, id, patch, now, self.limit)?;
        let task = next
            .task(id)
            .cloned()
            .ok_or_else(|| OpError::task_not_found(id))?;
        self.store = next;
        Ok(task)
    }

    pub fn update_tasks(
        &mut self,
        updates: &[TaskUpdate],
        now: DateTime<Utc>,
    ) -> Result<(), PersistenceError> {
        let mut next = self.store.clone();
        for update in updates {
            apply_update(&mut next, &update.id, &update.patch, now, self.limit)?;
        }
        self.store = next;
        Ok(())
    }

    pub fn delete_task(&mut self, id: &TaskId) -> Result<Vec<TaskId>, PersistenceError> {
        let removed = hierarchy::cascade_delete(&mut self.store, id)?;
        Ok(removed.ids().cloned().collect())
    }

    pub fn persist_order(&mut self, ctx: &OrderContext, ids: &[TaskId]) -> Result<(), PersistenceError> {
        let list = self
            .store
            .context_list_mut(ctx)
            .ok_or_else(|| OpError::from(crate::error::ReferenceError::Context(ctx.clone())))?;
        order::restore_relative_order(list, ids);
        Ok(())
    }
}

fn tree_height(tree: &NewTask) -> usize {
    tree.children
        .iter()
        .map(|c| 1 + tree_height(c))
        .max()
        .unwrap_or(0)
}

fn count_active(tree: &NewTask) -> usize {
    usize::from(!tree.task.is_archived) + tree.children.iter().map(count_active).sum::<usize>()
}

/// Apply one partial update on the server's store
fn apply_update(
    store: &mut Store,
    id: &TaskId,
    patch: &TaskPatch,
    now: DateTime<Utc>,
    limit: usize,
) -> Result<(), OpError> {
    let task = store.task(id).ok_or_else(|| OpError::task_not_found(id))?;
    if patch.name.as_ref().is_some_and(|n| n.trim().is_empty()) {
        return Err(ValidationError::EmptyName.into());
    }
    let space_id = task.space_id.clone();
    let was_archived = task.is_archived;

    if let Some(reparent) = &patch.reparent {
        match &reparent.parent {
            Some(parent) => {
                hierarchy::attach_child(store, id, parent, &reparent.position)?;
            }
            None => {
                let (x, y) = match store.task(id) {
                    Some(t) => (patch.x.unwrap_or(t.x), patch.y.unwrap_or(t.y)),
                    None => return Err(OpError::task_not_found(id)),
                };
                hierarchy::detach_to_root(store, id, x, y, &reparent.position)?;
            }
        }
    }

    let (is_root, is_archived, z) = match store.task_mut(id) {
        Some(task) => {
            patch.apply_to(task);
            task.updated_at = now;
            (task.is_root(), task.is_archived, task.z_index)
        }
        None => return Err(OpError::task_not_found(id)),
    };

    if let Some(space) = store.space_mut(&space_id) {
        space.max_z_index = space.max_z_index.max(z);
        if is_root && is_archived != was_archived {
            if is_archived {
                order::remove_from(&mut space.task_order, id);
            } else if !space.task_order.contains(id) {
                space.task_order.push(id.clone());
            }
        }
    }
    if was_archived && !is_archived && store.active_task_count(&space_id) > limit {
        return Err(ValidationError::SpaceFull {
            space: space_id,
            limit,
        }
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Position, Reparent};
    use pretty_assertions::assert_eq;

    fn state_with_space() -> (ServerState, SpaceId) {
        let mut state = ServerState::new(50);
        let space = state.create_space("Work", "#fff").unwrap();
        (state, space.id)
    }

    fn new_task(client: &str, space: &SpaceId, parent: Option<&str>) -> Task {
        let mut t = Task::new(client.into(), space.clone(), client, Utc::now());
        t.parent_task_id = parent.map(TaskId::from);
        t.is_unconfirmed = true;
        t
    }

    #[test]
    fn create_issues_server_ids_and_places_root() {
        let (mut state, sid) = state_with_space();
        let created = state
            .create_task(NewTask::leaf(new_task("tmp-1", &sid, None), Position::End), Utc::now())
            .unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].client_id.as_str(), "tmp-1");
        assert_eq!(created[0].task.id.as_str(), "srv-2");
        assert!(!created[0].task.is_unconfirmed);
        assert_eq!(
            state.store().space(&sid).unwrap().task_order,
            vec![TaskId::from("srv-2")]
        );
    }

    #[test]
    fn create_tree_wires_children() {
        let (mut state, sid) = state_with_space();
        let tree = NewTask {
            task: new_task("tmp-1", &sid, None),
            position: Position::End,
            children: vec![
                NewTask::leaf(new_task("tmp-2", &sid, Some("tmp-1")), Position::End),
                NewTask::leaf(new_task("tmp-3", &sid, Some("tmp-1")), Position::End),
            ],
        };
        let created = state.create_task(tree, Utc::now()).unwrap();
        let ids: Vec<(&str, &str)> = created
            .iter()
            .map(|c| (c.client_id.as_str(), c.task.id.as_str()))
            .collect();
        assert_eq!(ids, vec![("tmp-1", "srv-2"), ("tmp-2", "srv-3"), ("tmp-3", "srv-4")]);
        assert_eq!(
            created[0].task.subtasks,
            vec![TaskId::from("srv-3"), TaskId::from("srv-4")]
        );
        let child = state.store().task(&"srv-4".into()).unwrap();
        assert_eq!(child.ancestors, vec![TaskId::from("srv-2")]);
    }

    #[test]
    fn create_enforces_depth_and_cap() {
        let mut state = ServerState::new(2);
        let sid = state.create_space("S", "#000").unwrap().id;
        let a = state
            .create_task(NewTask::leaf(new_task("tmp-1", &sid, None), Position::End), Utc::now())
            .unwrap()[0]
            .task
            .id
            .clone();
        let b = state
            .create_task(
                NewTask::leaf(new_task("tmp-2", &sid, Some(a.as_str())), Position::End),
                Utc::now(),
            )
            .unwrap()[0]
            .task
            .id
            .clone();
        // Cap of 2 reached
        let err = state
            .create_task(NewTask::leaf(new_task("tmp-3", &sid, None), Position::End), Utc::now())
            .unwrap_err();
        assert!(matches!(err, PersistenceError::Rejected(_)));

        state.limit = 10;
        let c = state
            .create_task(
                NewTask::leaf(new_task("tmp-4", &sid, Some(b.as_str())), Position::End),
                Utc::now(),
            )
            .unwrap()[0]
            .task
            .id
            .clone();
        let err = state
            .create_task(
                NewTask::leaf(new_task("tmp-5", &sid, Some(c.as_str())), Position::End),
                Utc::now(),
            )
            .unwrap_err();
        assert!(matches!(err, PersistenceError::Rejected(_)));
    }

    #[test]
    fn failed_batch_leaves_state_untouched() {
        let (mut state, sid) = state_with_space();
        state
            .create_task(NewTask::leaf(new_task("tmp-1", &sid, None), Position::End), Utc::now())
            .unwrap();
        let before = state.to_document();
        let updates = vec![
            TaskUpdate {
                id: "srv-2".into(),
                patch: TaskPatch {
                    z_index: Some(7),
                    ..Default::default()
                },
            },
            TaskUpdate {
                id: "srv-99".into(),
                patch: TaskPatch::default(),
            },
        ];
        let err = state.update_tasks(&updates, Utc::now()).unwrap_err();
        assert!(matches!(err, PersistenceError::NotFound(_)));
        assert_eq!(state.to_document(), before);
    }

    #[test]
    fn update_reparents_and_maintains_order() {
        let (mut state, sid) = state_with_space();
        for client in ["tmp-1", "tmp-2"] {
            state
                .create_task(NewTask::leaf(new_task(client, &sid, None), Position::End), Utc::now())
                .unwrap();
        }
        let patch = TaskPatch {
            reparent: Some(Reparent {
                parent: Some("srv-2".into()),
                position: Position::Start,
            }),
            ..Default::default()
        };
        state.update_task(&"srv-3".into(), &patch, Utc::now()).unwrap();
        let store = state.store();
        assert_eq!(store.space(&sid).unwrap().task_order, vec![TaskId::from("srv-2")]);
        assert_eq!(
            store.task(&"srv-2".into()).unwrap().subtasks,
            vec![TaskId::from("srv-3")]
        );

        let archive = TaskPatch {
            is_archived: Some(true),
            archived_at: Some(Some(Utc::now())),
            ..Default::default()
        };
        state.update_task(&"srv-2".into(), &archive, Utc::now()).unwrap();
        assert!(state.store().space(&sid).unwrap().task_order.is_empty());
    }

    #[test]
    fn document_round_trip() {
        let (mut state, sid) = state_with_space();
        state
            .create_task(NewTask::leaf(new_task("tmp-1", &sid, None), Position::End), Utc::now())
            .unwrap();
        let doc = state.to_document();
        let json = serde_json::to_string(&doc).unwrap();
        let back: BoardDocument = serde_json::from_str(&json).unwrap();
        let restored = ServerState::from_document(back, 50);
        assert_eq!(restored.to_document(), doc);
        assert_eq!(restored.next_id, 2);
    }
}
