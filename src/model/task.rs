use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::id::{SpaceId, TaskId};
use super::position::Position;

/// Default card size for newly created tasks
pub const DEFAULT_WIDTH: f64 = 240.0;
pub const DEFAULT_HEIGHT: f64 = 120.0;

/// Task progress state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Progress {
    NotStarted,
    InProgress,
    Blocked,
    Complete,
}

impl Progress {
    /// The character used inside the checkbox `[ ]` in listings
    pub fn checkbox_char(self) -> char {
        match self {
            Progress::NotStarted => ' ',
            Progress::InProgress => '>',
            Progress::Blocked => '-',
            Progress::Complete => 'x',
        }
    }

    pub fn parse(s: &str) -> Option<Progress> {
        match s {
            "not_started" | "todo" => Some(Progress::NotStarted),
            "in_progress" | "active" => Some(Progress::InProgress),
            "blocked" => Some(Progress::Blocked),
            "complete" | "done" => Some(Progress::Complete),
            _ => None,
        }
    }
}

/// A task card. Relationships are id references into the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub z_index: u64,
    pub progress: Progress,
    pub space_id: SpaceId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_task_id: Option<TaskId>,
    /// Root first, immediate parent last, never self
    #[serde(default)]
    pub ancestors: Vec<TaskId>,
    /// Child ids in display order
    #[serde(default)]
    pub subtasks: Vec<TaskId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emoji: Option<String>,
    #[serde(default)]
    pub is_archived: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    // --- Client bookkeeping ---
    /// Set while a create is awaiting server confirmation
    #[serde(skip)]
    pub is_unconfirmed: bool,
}

impl Task {
    /// Create a root-level task at the given canvas coordinates
    pub fn new(id: TaskId, space_id: SpaceId, name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Task {
            id,
            name: name.into(),
            description: String::new(),
            x: 0.0,
            y: 0.0,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            z_index: 0,
            progress: Progress::NotStarted,
            space_id,
            parent_task_id: None,
            ancestors: Vec::new(),
            subtasks: Vec::new(),
            due_date: None,
            emoji: None,
            is_archived: false,
            archived_at: None,
            created_at: now,
            updated_at: now,
            is_unconfirmed: false,
        }
    }

    /// Nesting depth (0 = root)
    pub fn depth(&self) -> usize {
        self.ancestors.len()
    }

    pub fn is_root(&self) -> bool {
        self.parent_task_id.is_none()
    }
}

/// Reparent request carried inside a patch
#[derive(Debug, Clone, PartialEq)]
pub struct Reparent {
    /// None = promote to a root task of the space
    pub parent: Option<TaskId>,
    pub position: Position,
}

/// Partial update of a task. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub progress: Option<Progress>,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub z_index: Option<u64>,
    pub due_date: Option<Option<NaiveDate>>,
    pub emoji: Option<Option<String>>,
    pub is_archived: Option<bool>,
    pub archived_at: Option<Option<DateTime<Utc>>>,
    pub reparent: Option<Reparent>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        *self == TaskPatch::default()
    }

    /// Merge `later` over `self`; fields set in `later` win.
    pub fn merge(&mut self, later: TaskPatch) {
        macro_rules! take {
            ($($field:ident),*) => {
                $(if later.$field.is_some() { self.$field = later.$field; })*
            };
        }
        take!(
            name,
            description,
            progress,
            x,
            y,
            width,
            height,
            z_index,
            due_date,
            emoji,
            is_archived,
            archived_at,
            reparent
        );
    }

    /// Apply the plain field changes to a task and return a patch holding the
    /// previous values of exactly those fields. `reparent` is not applied
    /// here; hierarchy moves go through the hierarchy ops.
    pub fn apply_to(&self, task: &mut Task) -> TaskPatch {
        let mut old = TaskPatch::default();
        macro_rules! swap {
            ($($field:ident),*) => {
                $(if let Some(v) = &self.$field {
                    old.$field = Some(std::mem::replace(&mut task.$field, v.clone()));
                })*
            };
        }
        swap!(
            name,
            description,
            progress,
            x,
            y,
            width,
            height,
            z_index,
            due_date,
            emoji,
            is_archived,
            archived_at
        );
        old
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Task {
        Task::new(
            TaskId::from("srv-1"),
            SpaceId::from("home"),
            "Write docs",
            Utc::now(),
        )
    }

    #[test]
    fn new_task_is_root_with_defaults() {
        let task = sample();
        assert!(task.is_root());
        assert_eq!(task.depth(), 0);
        assert_eq!(task.progress, Progress::NotStarted);
        assert_eq!(task.width, DEFAULT_WIDTH);
    }

    #[test]
    fn patch_apply_returns_previous_values() {
        let mut task = sample();
        let patch = TaskPatch {
            name: Some("Renamed".into()),
            progress: Some(Progress::Blocked),
            emoji: Some(Some("🔥".into())),
            ..Default::default()
        };
        let old = patch.apply_to(&mut task);
        assert_eq!(task.name, "Renamed");
        assert_eq!(task.progress, Progress::Blocked);
        assert_eq!(old.name.as_deref(), Some("Write docs"));
        assert_eq!(old.emoji, Some(None));
        assert!(old.x.is_none());

        old.apply_to(&mut task);
        assert_eq!(task, sample_with_time(&task));
    }

    fn sample_with_time(task: &Task) -> Task {
        let mut t = sample();
        t.created_at = task.created_at;
        t.updated_at = task.updated_at;
        t
    }

    #[test]
    fn patch_merge_keeps_latest() {
        let mut first = TaskPatch {
            name: Some("a".into()),
            x: Some(1.0),
            ..Default::default()
        };
        first.merge(TaskPatch {
            name: Some("b".into()),
            ..Default::default()
        });
        assert_eq!(first.name.as_deref(), Some("b"));
        assert_eq!(first.x, Some(1.0));
    }

    #[test]
    fn progress_parse_accepts_aliases() {
        assert_eq!(Progress::parse("done"), Some(Progress::Complete));
        assert_eq!(Progress::parse("in_progress"), Some(Progress::InProgress));
        assert_eq!(Progress::parse("nope"), None);
    }

    #[test]
    fn unconfirmed_flag_is_not_serialized() {
        let mut task = sample();
        task.is_unconfirmed = true;
        let json = serde_json::to_string(&task).unwrap();
        assert!(!json.contains("is_unconfirmed"));
        let back: Task = serde_json::from_str(&json).unwrap();
        assert!(!back.is_unconfirmed);
    }
}
