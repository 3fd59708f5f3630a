//! The presentation-facing facade.
//!
//! `Board` owns the store, the mutation pipeline, and a handle to the
//! persistence backend. Mutating entry points apply locally and return an
//! [`Outcome`]; a sent outcome carries an owned future that does not borrow
//! the board, so the caller may keep interacting while it is in flight and
//! hand the result back through [`Board::settle`]. [`Board::run`] does both
//! steps for callers that simply wait.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::error::{OpError, ValidationError};
use crate::model::{
    BoardConfig, OrderContext, Position, Space, SpaceId, SpacePatch, TaskId, TaskPatch,
    TeardownPolicy,
};
use crate::ops::{archive, order, view, zindex};
use crate::persist::{self, Persistence, PersistenceError, Request, Response, ResponseFuture};
use crate::pipeline::{Command, Confirmation, Pipeline, Ticket};
use crate::store::Store;
use crate::util::timing::Debouncer;

#[derive(Debug, thiserror::Error)]
pub enum BoardError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// A request on its way to the backend
pub struct InFlight {
    pub ticket: Ticket,
    /// Temp id of the task a create request introduced
    pub created: Option<TaskId>,
    pub future: ResponseFuture,
}

impl std::fmt::Debug for InFlight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InFlight")
            .field("ticket", &self.ticket)
            .field("created", &self.created)
            .finish_non_exhaustive()
    }
}

/// What a mutating entry point did
#[derive(Debug)]
pub enum Outcome {
    /// Applied locally and sent
    Sent(InFlight),
    /// Applied locally, nothing to persist
    Local,
    /// Named an id that is gone; nothing happened
    Ignored,
}

impl Outcome {
    pub fn is_ignored(&self) -> bool {
        matches!(self, Outcome::Ignored)
    }

    pub fn created(&self) -> Option<&TaskId> {
        match self {
            Outcome::Sent(in_flight) => in_flight.created.as_ref(),
            _ => None,
        }
    }
}

/// A debounced field edit already visible in the store
#[derive(Debug, Clone)]
struct PendingEdit {
    patch: TaskPatch,
    /// Values the edit replaced, captured on the first keystroke
    original: TaskPatch,
    original_updated_at: DateTime<Utc>,
}

pub struct Board {
    store: Store,
    pipeline: Pipeline,
    backend: Arc<dyn Persistence>,
    config: BoardConfig,
    /// Spaces whose local copy must be reloaded before it is trusted again
    stale: HashSet<SpaceId>,
    edits: Debouncer<TaskId, PendingEdit>,
}

impl Board {
    pub fn new(backend: Arc<dyn Persistence>, config: BoardConfig) -> Self {
        let delay = Duration::from_millis(config.edit.debounce_ms);
        Board {
            store: Store::new(),
            pipeline: Pipeline::new(),
            backend,
            config,
            stale: HashSet::new(),
            edits: Debouncer::new(delay),
        }
    }

    pub fn config(&self) -> &BoardConfig {
        &self.config
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    // -----------------------------------------------------------------------
    // Pipeline plumbing
    // -----------------------------------------------------------------------

    fn begin(&mut self, command: Command) -> Result<Outcome, BoardError> {
        let kind = command.kind();
        match self
            .pipeline
            .begin(&mut self.store, command, &self.config, Utc::now())
        {
            Ok(Some((ticket, request))) => Ok(Outcome::Sent(self.send(ticket, request))),
            Ok(None) => Ok(Outcome::Local),
            Err(OpError::Reference(e)) => {
                debug!(kind, error = %e, "stale reference ignored");
                Ok(Outcome::Ignored)
            }
            Err(OpError::Validation(e)) => Err(e.into()),
        }
    }

    fn send(&self, ticket: Ticket, request: Request) -> InFlight {
        let created = match &request {
            Request::CreateTask(tree) => Some(tree.task.id.clone()),
            _ => None,
        };
        InFlight {
            ticket,
            created,
            future: persist::dispatch(Arc::clone(&self.backend), request),
        }
    }

    /// Hand back the result of an in-flight request
    pub fn settle(
        &mut self,
        ticket: Ticket,
        result: Result<Response, PersistenceError>,
    ) -> Result<Confirmation, BoardError> {
        match result {
            Ok(response) => {
                let confirmation = self.pipeline.confirm(&mut self.store, ticket, response);
                for (temp, server) in &confirmation.rekeyed {
                    self.edits.rekey(temp, server.clone());
                }
                Ok(confirmation)
            }
            Err(e) => {
                if let Some(space) = self.pipeline.fail(&mut self.store, ticket, &e) {
                    warn!(space = %space, "space marked stale after failed request");
                    self.stale.insert(space);
                }
                Err(e.into())
            }
        }
    }

    /// Wait for an outcome's request, if any, and settle it
    pub async fn run(&mut self, outcome: Outcome) -> Result<Confirmation, BoardError> {
        match outcome {
            Outcome::Sent(InFlight { ticket, future, .. }) => {
                let result = future.await;
                self.settle(ticket, result)
            }
            Outcome::Local | Outcome::Ignored => Ok(Confirmation::default()),
        }
    }

    /// Number of requests not yet settled
    pub fn in_flight(&self) -> usize {
        self.pipeline.in_flight()
    }

    /// Current id of a task that may have been confirmed since `id` was seen
    pub fn resolve(&self, id: &TaskId) -> TaskId {
        self.pipeline.resolve(id)
    }

    pub fn is_stale(&self, space: &SpaceId) -> bool {
        self.stale.contains(space)
    }

    // -----------------------------------------------------------------------
    // Loading
    // -----------------------------------------------------------------------

    /// Replace the local store with everything the backend holds
    pub async fn load_all(&mut self) -> Result<(), BoardError> {
        self.ensure_idle()?;
        let spaces = self.backend.list_spaces().await?;
        let mut store = Store::new();
        for space in spaces {
            let tasks = self.backend.fetch_tasks(&space.id).await?;
            let id = space.id.clone();
            store.insert_space(space);
            store.replace_space_tasks(&id, tasks);
        }
        info!(spaces = store.spaces().count(), tasks = store.task_count(), "board loaded");
        self.store = store;
        self.stale.clear();
        Ok(())
    }

    /// Reload one space and its tasks from the backend
    pub async fn load_space(&mut self, id: &SpaceId) -> Result<(), BoardError> {
        self.ensure_idle()?;
        let space = self
            .backend
            .list_spaces()
            .await?
            .into_iter()
            .find(|s| &s.id == id)
            .ok_or_else(|| PersistenceError::NotFound(format!("space {id}")))?;
        let tasks = self.backend.fetch_tasks(id).await?;
        match self.store.space_mut(id) {
            Some(local) => *local = space,
            None => {
                self.store.insert_space(space);
            }
        }
        self.store.replace_space_tasks(id, tasks);
        self.stale.remove(id);
        debug!(space = %id, "space reloaded");
        Ok(())
    }

    /// A reload would discard the local effect of unsettled requests
    fn ensure_idle(&self) -> Result<(), BoardError> {
        if self.pipeline.in_flight() > 0 {
            return Err(ValidationError::Rejected(format!(
                "{} request(s) still in flight",
                self.pipeline.in_flight()
            ))
            .into());
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Task entry points
    // -----------------------------------------------------------------------

    pub fn create_root_task(&mut self, space: &SpaceId, name: &str, x: f64, y: f64) -> Result<Outcome, BoardError> {
        self.begin(Command::CreateRoot {
            space: space.clone(),
            name: name.to_string(),
            x,
            y,
        })
    }

    pub fn create_subtask(&mut self, parent: &TaskId, name: &str, position: Position) -> Result<Outcome, BoardError> {
        self.begin(Command::CreateSubtask {
            parent: parent.clone(),
            name: name.to_string(),
            position,
        })
    }

    pub fn duplicate_task(&mut self, source: &TaskId) -> Result<Outcome, BoardError> {
        self.begin(Command::Duplicate {
            source: source.clone(),
        })
    }

    /// Reposition within a context during a drag. Local only; returns
    /// whether the order changed.
    pub fn move_temporary(&mut self, item: &TaskId, ctx: &OrderContext, position: &Position) -> Result<bool, BoardError> {
        match order::move_temporary(&mut self.store, item, ctx, position) {
            Ok(changed) => Ok(changed),
            Err(OpError::Reference(e)) => {
                debug!(error = %e, "stale reference ignored");
                Ok(false)
            }
            Err(OpError::Validation(e)) => Err(e.into()),
        }
    }

    /// Persist a context's current order. `prior` is the order captured when
    /// the gesture began, restored if the request fails.
    pub fn commit_order(&mut self, context: &OrderContext, prior: Vec<TaskId>) -> Result<Outcome, BoardError> {
        if self.store.context_list(context) == Some(&prior) {
            return Ok(Outcome::Local);
        }
        self.begin(Command::CommitOrder {
            context: context.clone(),
            prior,
        })
    }

    pub fn attach_child(&mut self, child: &TaskId, parent: &TaskId, position: Position) -> Result<Outcome, BoardError> {
        self.begin(Command::Attach {
            child: child.clone(),
            parent: parent.clone(),
            position,
        })
    }

    pub fn detach_to_root(&mut self, id: &TaskId, x: f64, y: f64, position: Position) -> Result<Outcome, BoardError> {
        self.begin(Command::Detach {
            id: id.clone(),
            x,
            y,
            position,
        })
    }

    pub fn archive_task(&mut self, id: &TaskId) -> Result<Outcome, BoardError> {
        self.begin(Command::Archive { id: id.clone() })
    }

    pub fn unarchive_task(&mut self, id: &TaskId) -> Result<Outcome, BoardError> {
        self.begin(Command::Unarchive { id: id.clone() })
    }

    pub fn delete_task_cascading(&mut self, id: &TaskId) -> Result<Outcome, BoardError> {
        self.edits.cancel(id);
        self.begin(Command::Delete { id: id.clone() })
    }

    /// Apply and send a field update at once
    pub fn update_task(&mut self, id: &TaskId, patch: TaskPatch) -> Result<Outcome, BoardError> {
        self.begin(Command::Update {
            id: id.clone(),
            patch,
        })
    }

    pub fn bring_to_front(&mut self, id: &TaskId) -> Result<Outcome, BoardError> {
        self.begin(Command::BringToFront { id: id.clone() })
    }

    pub fn normalize_z(&mut self, space: &SpaceId) -> Result<Outcome, BoardError> {
        self.begin(Command::Normalize {
            space: space.clone(),
        })
    }

    /// True once a space's stacking keys have grown past the configured threshold
    pub fn needs_normalize(&self, space: &SpaceId) -> bool {
        zindex::needs_normalize(&self.store, space, self.config.canvas.normalize_threshold)
    }

    /// Delete archived subtrees older than the retention window
    pub fn purge_expired_archives(&mut self, now: DateTime<Utc>) -> Result<Vec<InFlight>, BoardError> {
        let expired = archive::expired(&self.store, now, self.config.archive.retention_days);
        let mut sent = Vec::with_capacity(expired.len());
        for id in expired {
            match self.delete_task_cascading(&id) {
                Ok(Outcome::Sent(in_flight)) => sent.push(in_flight),
                Ok(_) => {}
                Err(BoardError::Validation(e)) => debug!(task = %id, error = %e, "expired task skipped"),
                Err(e) => return Err(e),
            }
        }
        info!(count = sent.len(), "expired archives purged");
        Ok(sent)
    }

    // -----------------------------------------------------------------------
    // Debounced field edits
    // -----------------------------------------------------------------------

    /// Show an edit immediately and send it once the task's edits have been
    /// quiet for the debounce delay. Later edits supersede earlier ones;
    /// rollback returns to the values from before the first.
    pub fn edit_field(&mut self, id: &TaskId, patch: TaskPatch, now: Instant) -> Result<(), BoardError> {
        if patch.reparent.is_some() || patch.is_archived.is_some() || patch.archived_at.is_some() {
            return Err(ValidationError::Rejected("only plain fields can be edited in place".into()).into());
        }
        // Stacking moves through bring_to_front or update_task, which keep the
        // space's z mark above every card
        if patch.z_index.is_some() {
            return Err(ValidationError::Rejected("z-index cannot be edited in place".into()).into());
        }
        if patch.name.as_ref().is_some_and(|n| n.trim().is_empty()) {
            return Err(ValidationError::EmptyName.into());
        }
        let Some(task) = self.store.task_mut(id) else {
            debug!(task = %id, "edit of missing task ignored");
            return Ok(());
        };
        let replaced = patch.apply_to(task);
        let replaced_at = std::mem::replace(&mut task.updated_at, Utc::now());
        self.edits.upsert(id.clone(), now, |prior| match prior {
            Some(mut pending) => {
                let first = std::mem::take(&mut pending.original);
                pending.original = replaced;
                pending.original.merge(first);
                pending.patch.merge(patch);
                pending
            }
            None => PendingEdit {
                patch,
                original: replaced,
                original_updated_at: replaced_at,
            },
        });
        Ok(())
    }

    /// Earliest instant at which `tick` has edits to send
    pub fn next_edit_deadline(&self) -> Option<Instant> {
        self.edits.next_deadline()
    }

    pub fn has_pending_edit(&self, id: &TaskId) -> bool {
        self.edits.is_pending(id)
    }

    /// Send every edit whose quiet period has elapsed
    pub fn tick(&mut self, now: Instant) -> Vec<InFlight> {
        let due = self.edits.drain_due(now);
        self.send_edits(due, now)
    }

    /// A view showing these tasks went away: flush or drop their edits per
    /// the teardown policy
    pub fn teardown_view(&mut self, ids: &[TaskId], now: Instant) -> Vec<InFlight> {
        let edits: Vec<(TaskId, PendingEdit)> = ids
            .iter()
            .filter_map(|id| self.edits.flush(id).map(|e| (id.clone(), e)))
            .collect();
        self.finish_edits(edits, now)
    }

    /// Flush or drop every pending edit per the teardown policy
    pub fn shutdown(&mut self, now: Instant) -> Vec<InFlight> {
        let edits = self.edits.flush_all();
        self.finish_edits(edits, now)
    }

    fn finish_edits(&mut self, edits: Vec<(TaskId, PendingEdit)>, now: Instant) -> Vec<InFlight> {
        match self.config.edit.on_teardown {
            TeardownPolicy::Flush => self.send_edits(edits, now),
            TeardownPolicy::Drop => {
                for (id, edit) in edits {
                    if let Some(task) = self.store.task_mut(&id) {
                        edit.original.apply_to(task);
                        task.updated_at = edit.original_updated_at;
                    }
                    debug!(task = %id, "pending edit dropped");
                }
                Vec::new()
            }
        }
    }

    fn send_edits(&mut self, edits: Vec<(TaskId, PendingEdit)>, now: Instant) -> Vec<InFlight> {
        let mut sent = Vec::new();
        for (id, edit) in edits {
            let Some(task) = self.store.task(&id) else {
                debug!(task = %id, "edit of removed task dropped");
                continue;
            };
            // Wait for the create to be confirmed before naming the task
            if task.is_unconfirmed || id.is_temp() {
                self.edits.push(id, edit, now);
                continue;
            }
            let command = Command::UpdateApplied {
                id: id.clone(),
                patch: edit.patch,
                original: edit.original,
                original_updated_at: edit.original_updated_at,
            };
            match self.begin(command) {
                Ok(Outcome::Sent(in_flight)) => sent.push(in_flight),
                Ok(_) => {}
                Err(e) => warn!(task = %id, error = %e, "edit could not be sent"),
            }
        }
        sent
    }

    // -----------------------------------------------------------------------
    // Spaces
    // -----------------------------------------------------------------------

    /// Spaces are created on the backend first since their id is the
    /// server's; the local copy appears once the backend answers.
    pub async fn create_space(&mut self, name: &str, color: Option<&str>) -> Result<SpaceId, BoardError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyName.into());
        }
        let color = color.unwrap_or(crate::model::DEFAULT_COLOR);
        let space = self.backend.create_space(name, color).await?;
        let id = space.id.clone();
        self.store.insert_space(space);
        info!(space = %id, "space created");
        Ok(id)
    }

    pub fn update_space(&mut self, id: &SpaceId, patch: SpacePatch) -> Result<Outcome, BoardError> {
        self.begin(Command::UpdateSpace {
            id: id.clone(),
            patch,
        })
    }

    pub fn delete_space(&mut self, id: &SpaceId) -> Result<Outcome, BoardError> {
        let ids: Vec<TaskId> = self.store.tasks_in_space(id).map(|t| t.id.clone()).collect();
        let outcome = self.begin(Command::DeleteSpace { id: id.clone() })?;
        if !outcome.is_ignored() {
            for task in &ids {
                self.edits.cancel(task);
            }
        }
        Ok(outcome)
    }

    // -----------------------------------------------------------------------
    // Snapshots
    // -----------------------------------------------------------------------

    pub fn spaces(&self) -> Vec<Space> {
        self.store.spaces().cloned().collect()
    }

    pub fn space(&self, id: &SpaceId) -> Option<&Space> {
        self.store.space(id)
    }

    /// Find a space by id or case-insensitive name
    pub fn find_space(&self, key: &str) -> Option<&Space> {
        self.store
            .spaces()
            .find(|s| s.id.as_str() == key)
            .or_else(|| self.store.spaces().find(|s| s.name.eq_ignore_ascii_case(key)))
    }

    pub fn task(&self, id: &TaskId) -> Option<view::TaskView> {
        self.store.task(id).map(view::TaskView::from)
    }

    /// Current order of a context
    pub fn order_of(&self, ctx: &OrderContext) -> Option<Vec<TaskId>> {
        self.store.context_list(ctx).cloned()
    }

    pub fn root_tasks(&self, space: &SpaceId, opts: view::ViewOptions) -> Vec<view::TaskView> {
        view::root_tasks(&self.store, space, opts)
            .into_iter()
            .map(view::TaskView::from)
            .collect()
    }

    pub fn child_tasks(&self, parent: &TaskId, opts: view::ViewOptions) -> Vec<view::TaskView> {
        view::child_tasks(&self.store, parent, opts)
            .into_iter()
            .map(view::TaskView::from)
            .collect()
    }

    pub fn tree(&self, space: &SpaceId, opts: view::ViewOptions) -> Vec<view::TaskNode> {
        view::tree(&self.store, space, opts)
    }

    pub fn subtree(&self, id: &TaskId, opts: view::ViewOptions) -> Option<view::TaskNode> {
        view::subtree(&self.store, id, opts)
    }

    /// Cards of a space from bottom to top
    pub fn stacking_order(&self, space: &SpaceId) -> Vec<view::TaskView> {
        view::stacking_order(&self.store, space)
            .into_iter()
            .map(view::TaskView::from)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::MemoryBackend;
    use pretty_assertions::assert_eq;

    async fn board_with_space() -> (Board, Arc<MemoryBackend>, SpaceId) {
        let backend = Arc::new(MemoryBackend::default());
        let mut board = Board::new(backend.clone(), BoardConfig::default());
        let space = board.create_space("Work", None).await.unwrap();
        (board, backend, space)
    }

    async fn add_root(board: &mut Board, space: &SpaceId, name: &str) -> TaskId {
        let outcome = board.create_root_task(space, name, 0.0, 0.0).unwrap();
        let confirmation = board.run(outcome).await.unwrap();
        confirmation.rekeyed[0].1.clone()
    }

    #[tokio::test]
    async fn create_is_visible_before_confirmation() {
        let (mut board, _, space) = board_with_space().await;
        let outcome = board.create_root_task(&space, "draft", 5.0, 5.0).unwrap();
        let temp = outcome.created().cloned().unwrap();
        assert!(board.task(&temp).unwrap().pending);
        assert_eq!(board.in_flight(), 1);

        let confirmation = board.run(outcome).await.unwrap();
        let (_, server) = &confirmation.rekeyed[0];
        assert!(board.task(&temp).is_none());
        assert!(!board.task(server).unwrap().pending);
        assert_eq!(board.resolve(&temp), *server);
    }

    #[tokio::test]
    async fn failed_request_rolls_back_and_reports() {
        let (mut board, backend, space) = board_with_space().await;
        let a = add_root(&mut board, &space, "A").await;
        let before = board.store().clone();

        backend.fail_next(1);
        let outcome = board.archive_task(&a).unwrap();
        assert!(board.task(&a).unwrap().is_archived);
        let err = board.run(outcome).await.unwrap_err();
        assert!(matches!(err, BoardError::Persistence(_)));
        assert_eq!(board.store(), &before);
    }

    #[tokio::test]
    async fn failed_delete_marks_space_stale_until_reloaded() {
        let (mut board, backend, space) = board_with_space().await;
        let a = add_root(&mut board, &space, "A").await;
        backend.fail_kind("delete_task");
        let outcome = board.delete_task_cascading(&a).unwrap();
        assert!(board.task(&a).is_none());
        assert!(board.run(outcome).await.is_err());
        assert!(board.task(&a).is_some());
        assert!(board.is_stale(&space));

        board.load_space(&space).await.unwrap();
        assert!(!board.is_stale(&space));
    }

    #[tokio::test]
    async fn stale_reference_is_ignored() {
        let (mut board, _, _) = board_with_space().await;
        let outcome = board.archive_task(&"srv-404".into()).unwrap();
        assert!(outcome.is_ignored());
        assert!(!board.move_temporary(
            &"srv-404".into(),
            &OrderContext::Space("nope".into()),
            &Position::Start
        )
        .unwrap());
    }

    #[tokio::test]
    async fn debounced_edits_coalesce_into_one_request() {
        let (mut board, backend, space) = board_with_space().await;
        let a = add_root(&mut board, &space, "A").await;
        let t0 = Instant::now();
        for (i, name) in ["Ap", "App", "Apple"].iter().enumerate() {
            let patch = TaskPatch {
                name: Some(name.to_string()),
                ..Default::default()
            };
            board
                .edit_field(&a, patch, t0 + Duration::from_millis(100 * i as u64))
                .unwrap();
        }
        assert_eq!(board.task(&a).unwrap().name, "Apple");
        assert!(board.tick(t0 + Duration::from_millis(800)).is_empty());

        let sent = board.tick(t0 + Duration::from_millis(950));
        assert_eq!(sent.len(), 1);
        for in_flight in sent {
            board.run(Outcome::Sent(in_flight)).await.unwrap();
        }
        let updates = backend
            .request_log()
            .iter()
            .filter(|k| **k == "update_task")
            .count();
        assert_eq!(updates, 1);
        assert_eq!(backend.snapshot().task(&a).unwrap().name, "Apple");
    }

    #[tokio::test]
    async fn in_place_edit_of_z_index_is_refused() {
        let (mut board, _, space) = board_with_space().await;
        let a = add_root(&mut board, &space, "A").await;
        let patch = TaskPatch {
            z_index: Some(500),
            ..Default::default()
        };
        let err = board.edit_field(&a, patch, Instant::now()).unwrap_err();
        assert!(matches!(err, BoardError::Validation(ValidationError::Rejected(_))));
        assert_eq!(board.task(&a).unwrap().z_index, 1);
        assert!(!board.has_pending_edit(&a));
        assert!(board.space(&space).unwrap().max_z_index >= 1);
    }

    #[tokio::test]
    async fn failed_edit_restores_value_before_first_keystroke() {
        let (mut board, backend, space) = board_with_space().await;
        let a = add_root(&mut board, &space, "A").await;
        let t0 = Instant::now();
        for name in ["B", "C"] {
            let patch = TaskPatch {
                name: Some(name.into()),
                ..Default::default()
            };
            board.edit_field(&a, patch, t0).unwrap();
        }
        backend.fail_next(1);
        for in_flight in board.shutdown(t0) {
            assert!(board.run(Outcome::Sent(in_flight)).await.is_err());
        }
        assert_eq!(board.task(&a).unwrap().name, "A");
    }

    #[tokio::test]
    async fn edits_on_unconfirmed_tasks_wait_for_confirmation() {
        let (mut board, backend, space) = board_with_space().await;
        let outcome = board.create_root_task(&space, "draft", 0.0, 0.0).unwrap();
        let temp = outcome.created().cloned().unwrap();
        let t0 = Instant::now();
        board
            .edit_field(
                &temp,
                TaskPatch {
                    description: Some("notes".into()),
                    ..Default::default()
                },
                t0,
            )
            .unwrap();
        assert!(board.tick(t0 + Duration::from_secs(1)).is_empty());
        assert!(board.has_pending_edit(&temp));

        let confirmation = board.run(outcome).await.unwrap();
        let server = confirmation.rekeyed[0].1.clone();
        assert!(board.has_pending_edit(&server));
        for in_flight in board.tick(t0 + Duration::from_secs(3)) {
            board.run(Outcome::Sent(in_flight)).await.unwrap();
        }
        assert_eq!(backend.snapshot().task(&server).unwrap().description, "notes");
    }

    #[tokio::test]
    async fn teardown_drop_policy_reverts_local_edit() {
        let backend = Arc::new(MemoryBackend::default());
        let mut config = BoardConfig::default();
        config.edit.on_teardown = TeardownPolicy::Drop;
        let mut board = Board::new(backend.clone(), config);
        let space = board.create_space("Work", None).await.unwrap();
        let a = add_root(&mut board, &space, "A").await;

        let t0 = Instant::now();
        board
            .edit_field(
                &a,
                TaskPatch {
                    name: Some("changed".into()),
                    ..Default::default()
                },
                t0,
            )
            .unwrap();
        assert!(board.teardown_view(&[a.clone()], t0).is_empty());
        assert_eq!(board.task(&a).unwrap().name, "A");
        assert!(!board.has_pending_edit(&a));
    }

    #[tokio::test]
    async fn reload_refused_while_requests_are_in_flight() {
        let (mut board, _, space) = board_with_space().await;
        let outcome = board.create_root_task(&space, "x", 0.0, 0.0).unwrap();
        assert!(matches!(
            board.load_space(&space).await,
            Err(BoardError::Validation(ValidationError::Rejected(_)))
        ));
        board.run(outcome).await.unwrap();
        board.load_space(&space).await.unwrap();
        assert_eq!(board.root_tasks(&space, Default::default()).len(), 1);
    }

    #[tokio::test]
    async fn purge_deletes_only_expired_archives() {
        let (mut board, backend, space) = board_with_space().await;
        let old = add_root(&mut board, &space, "old").await;
        let fresh = add_root(&mut board, &space, "fresh").await;
        for id in [&old, &fresh] {
            let outcome = board.archive_task(id).unwrap();
            board.run(outcome).await.unwrap();
        }
        let later = Utc::now() + chrono::Duration::days(31);
        // Pretend `fresh` was archived just now, a month from today
        if let Some(t) = board.store.task_mut(&fresh) {
            t.archived_at = Some(later);
        }

        let sent = board.purge_expired_archives(later).unwrap();
        assert_eq!(sent.len(), 1);
        for in_flight in sent {
            board.run(Outcome::Sent(in_flight)).await.unwrap();
        }
        assert!(board.task(&old).is_none());
        assert!(board.task(&fresh).is_some());
        assert!(backend.snapshot().task(&old).is_none());
    }
}
