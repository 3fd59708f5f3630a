//! Optimistic mutation pipeline.
//!
//! A command is applied to the local store at once and yields the inverse
//! that undoes it plus the remote request that persists it. The pipeline
//! files the inverse under a ticket; `confirm` reconciles temp ids with the
//! server's and discards the inverse, `fail` runs it.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::error::OpError;
use crate::model::{BoardConfig, SpaceId, TaskId, TempIdGen};
use crate::persist::{PersistenceError, Request, Response};
use crate::store::Store;

pub mod command;

pub use command::Command;

pub type Ticket = u64;

/// Undo closure recorded when a command is applied
pub type Inverse = Box<dyn FnOnce(&mut Store, &Reconciled) + Send>;

/// Temp ids already confirmed, mapped to their server ids. Inverses resolve
/// captured ids through this so they still find entities confirmed after the
/// inverse was recorded.
#[derive(Debug, Default)]
pub struct Reconciled(HashMap<TaskId, TaskId>);

impl Reconciled {
    pub fn resolve(&self, id: &TaskId) -> TaskId {
        self.0.get(id).cloned().unwrap_or_else(|| id.clone())
    }

    fn record(&mut self, temp: TaskId, server: TaskId) {
        self.0.insert(temp, server);
    }

    /// Rename any restored temp ids whose entity has since been confirmed
    pub fn rekey_restored(&self, store: &mut Store, ids: &[TaskId]) {
        for id in ids {
            if let Some(server) = self.0.get(id)
                && store.rekey_task(id, server)
                && let Some(task) = store.task_mut(server)
            {
                task.is_unconfirmed = false;
            }
        }
    }
}

/// Result of applying a command locally
pub struct Applied {
    pub request: Request,
    pub inverse: Inverse,
    /// Temp ids introduced by the command
    pub created: Vec<TaskId>,
    /// Space whose local state can no longer be trusted if the request fails
    pub stale_on_failure: Option<SpaceId>,
}

/// What a confirmation changed locally
#[derive(Debug, Default, PartialEq)]
pub struct Confirmation {
    /// (temp id, server id) pairs rewritten in the store
    pub rekeyed: Vec<(TaskId, TaskId)>,
}

struct Pending {
    kind: &'static str,
    inverse: Inverse,
    created: Vec<TaskId>,
    stale_on_failure: Option<SpaceId>,
}

#[derive(Default)]
pub struct Pipeline {
    next_ticket: Ticket,
    pending: HashMap<Ticket, Pending>,
    reconciled: Reconciled,
    temp_ids: TempIdGen,
}

impl Pipeline {
    pub fn new() -> Self {
        Pipeline::default()
    }

    /// Apply `command` to the store. Returns None when the command changed
    /// nothing that needs persisting.
    pub fn begin(
        &mut self,
        store: &mut Store,
        command: Command,
        config: &BoardConfig,
        now: DateTime<Utc>,
    ) -> Result<Option<(Ticket, Request)>, OpError> {
        let kind = command.kind();
        let mut ctx = command::ApplyCtx {
            now,
            config,
            temp_ids: &mut self.temp_ids,
        };
        let Some(applied) = command.apply(store, &mut ctx)? else {
            debug!(kind, "nothing to persist");
            return Ok(None);
        };
        Ok(Some(self.register(kind, applied)))
    }

    /// File an already-applied mutation under a new ticket
    pub fn register(&mut self, kind: &'static str, applied: Applied) -> (Ticket, Request) {
        self.next_ticket += 1;
        let ticket = self.next_ticket;
        debug!(ticket, kind, request = applied.request.kind(), "mutation applied locally");
        self.pending.insert(
            ticket,
            Pending {
                kind,
                inverse: applied.inverse,
                created: applied.created,
                stale_on_failure: applied.stale_on_failure,
            },
        );
        (ticket, applied.request)
    }

    /// The server accepted the request behind `ticket`.
    pub fn confirm(&mut self, store: &mut Store, ticket: Ticket, response: Response) -> Confirmation {
        let Some(pending) = self.pending.remove(&ticket) else {
            debug!(ticket, "confirmation for unknown ticket ignored");
            return Confirmation::default();
        };
        let mut confirmation = Confirmation::default();
        match response {
            Response::Created(records) => {
                for record in records {
                    if !pending.created.contains(&record.client_id) {
                        debug!(ticket, client_id = %record.client_id, "unexpected record ignored");
                        continue;
                    }
                    let server_id = record.task.id.clone();
                    if record.client_id != server_id {
                        if !store.rekey_task(&record.client_id, &server_id) {
                            // Removed locally while the create was in flight
                            debug!(ticket, client_id = %record.client_id, "created task no longer present");
                            self.reconciled.record(record.client_id, server_id);
                            continue;
                        }
                        self.reconciled
                            .record(record.client_id.clone(), server_id.clone());
                        confirmation
                            .rekeyed
                            .push((record.client_id.clone(), server_id.clone()));
                    }
                    if let Some(task) = store.task_mut(&server_id) {
                        task.is_unconfirmed = false;
                        task.created_at = record.task.created_at;
                        task.updated_at = record.task.updated_at;
                    }
                }
            }
            Response::Task(server) => {
                if let Some(task) = store.task_mut(&server.id) {
                    task.updated_at = server.updated_at;
                }
            }
            Response::Space(_) | Response::Deleted(_) | Response::Done => {}
        }
        info!(ticket, kind = pending.kind, rekeyed = confirmation.rekeyed.len(), "mutation confirmed");
        confirmation
    }

    /// The request behind `ticket` failed: restore the pre-mutation state.
    /// Returns the space to mark stale, if the command asked for one.
    pub fn fail(
        &mut self,
        store: &mut Store,
        ticket: Ticket,
        error: &PersistenceError,
    ) -> Option<SpaceId> {
        let Some(pending) = self.pending.remove(&ticket) else {
            debug!(ticket, "failure for unknown ticket ignored");
            return None;
        };
        (pending.inverse)(store, &self.reconciled);
        warn!(ticket, kind = pending.kind, %error, "mutation rolled back");
        pending.stale_on_failure
    }

    /// Number of mutations awaiting a response
    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }

    /// Server id for a confirmed temp id, or the id itself
    pub fn resolve(&self, id: &TaskId) -> TaskId {
        self.reconciled.resolve(id)
    }
}
