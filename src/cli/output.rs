use serde::Serialize;

use crate::model::{Progress, Space, SpaceId};
use crate::ops::search::{MatchField, SearchHit};
use crate::ops::view::{TaskNode, TaskView};

// ---------------------------------------------------------------------------
// JSON output structs
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct SpaceJson {
    pub id: SpaceId,
    pub name: String,
    pub color: String,
    pub tasks: usize,
    pub archived: usize,
    pub max_z_index: u64,
}

#[derive(Serialize)]
pub struct TaskListJson {
    pub space: SpaceId,
    pub tasks: Vec<TaskView>,
}

#[derive(Serialize)]
pub struct TaskTreeJson {
    pub space: SpaceId,
    pub tasks: Vec<TaskNode>,
}

#[derive(Serialize)]
pub struct SearchHitJson {
    pub space: String,
    pub task_id: String,
    pub name: String,
    pub field: MatchField,
}

/// Result of a mutating command
#[derive(Serialize)]
pub struct MutationJson {
    pub action: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub created: Vec<String>,
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

pub fn space_to_json(space: &Space, tasks: usize, archived: usize) -> SpaceJson {
    SpaceJson {
        id: space.id.clone(),
        name: space.name.clone(),
        color: space.color.clone(),
        tasks,
        archived,
        max_z_index: space.max_z_index,
    }
}

pub fn hit_to_json(hit: &SearchHit, name: &str) -> SearchHitJson {
    SearchHitJson {
        space: hit.space_id.clone(),
        task_id: hit.task_id.clone(),
        name: name.to_string(),
        field: hit.field,
    }
}

// ---------------------------------------------------------------------------
// Text formatting
// ---------------------------------------------------------------------------

/// Format a task as a single line: `[x] srv-3 Name  🚀 due:2025-05-01`
pub fn format_task_line(task: &TaskView) -> String {
    let mut line = format!(
        "[{}] {} {}",
        task.progress.checkbox_char(),
        task.id,
        task.name
    );
    let mut extras = Vec::new();
    if let Some(emoji) = &task.emoji {
        extras.push(emoji.clone());
    }
    if let Some(due) = task.due_date {
        extras.push(format!("due:{}", due));
    }
    if task.is_archived {
        extras.push("(archived)".to_string());
    }
    if task.pending {
        extras.push("(pending)".to_string());
    }
    if !extras.is_empty() {
        line.push_str("  ");
        line.push_str(&extras.join(" "));
    }
    line
}

/// Format a task tree with box-drawing connectors
pub fn format_tree(nodes: &[TaskNode]) -> Vec<String> {
    let mut lines = Vec::new();
    for node in nodes {
        lines.push(format_task_line(&node.task));
        format_children(&node.children, "", &mut lines);
    }
    lines
}

fn format_children(children: &[TaskNode], prefix: &str, lines: &mut Vec<String>) {
    for (i, child) in children.iter().enumerate() {
        let last = i + 1 == children.len();
        let connector = if last { "└ " } else { "├ " };
        lines.push(format!("{}{}{}", prefix, connector, format_task_line(&child.task)));
        let next = format!("{}{}", prefix, if last { "  " } else { "│ " });
        format_children(&child.children, &next, lines);
    }
}

/// Format the full detail block for `tsp show`
pub fn format_task_detail(task: &TaskView) -> Vec<String> {
    let mut lines = vec![format!("{} {}", task.id, task.name)];
    lines.push(format!("space: {}", task.space_id));
    if let Some(parent) = &task.parent_task_id {
        lines.push(format!("parent: {}", parent));
    }
    lines.push(format!("progress: {}", progress_label(task.progress)));
    lines.push(format!(
        "card: x={} y={} w={} h={} z={}",
        task.x, task.y, task.width, task.height, task.z_index
    ));
    if let Some(due) = task.due_date {
        lines.push(format!("due: {}", due));
    }
    if let Some(emoji) = &task.emoji {
        lines.push(format!("emoji: {}", emoji));
    }
    if !task.subtasks.is_empty() {
        let ids: Vec<String> = task.subtasks.iter().map(|id| id.to_string()).collect();
        lines.push(format!("subtasks: {}", ids.join(", ")));
    }
    if let Some(at) = task.archived_at {
        lines.push(format!("archived: {}", at.format("%Y-%m-%d %H:%M")));
    }
    lines.push(format!("created: {}", task.created_at.format("%Y-%m-%d %H:%M")));
    lines.push(format!("updated: {}", task.updated_at.format("%Y-%m-%d %H:%M")));
    if !task.description.is_empty() {
        lines.push(String::new());
        lines.extend(task.description.lines().map(|l| format!("  {}", l)));
    }
    lines
}

pub fn progress_label(progress: Progress) -> &'static str {
    match progress {
        Progress::NotStarted => "not_started",
        Progress::InProgress => "in_progress",
        Progress::Blocked => "blocked",
        Progress::Complete => "complete",
    }
}

pub fn format_space_line(space: &SpaceJson) -> String {
    let archived = if space.archived > 0 {
        format!(", {} archived", space.archived)
    } else {
        String::new()
    };
    format!(
        "{}  {}  ({} tasks{})",
        space.id, space.name, space.tasks, archived
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Task;
    use chrono::{NaiveDate, TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn view(id: &str, name: &str) -> TaskView {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 9, 30, 0).unwrap();
        TaskView::from(&Task::new(id.into(), "s".into(), name, now))
    }

    #[test]
    fn task_line_shows_progress_and_extras() {
        let mut t = view("srv-3", "Ship it");
        t.progress = Progress::Complete;
        t.emoji = Some("🚀".into());
        t.due_date = NaiveDate::from_ymd_opt(2025, 5, 1);
        assert_eq!(format_task_line(&t), "[x] srv-3 Ship it  🚀 due:2025-05-01");
    }

    #[test]
    fn tree_uses_connectors() {
        let leaf = |id: &str| TaskNode {
            task: view(id, id),
            children: Vec::new(),
        };
        let nodes = vec![TaskNode {
            task: view("a", "a"),
            children: vec![
                TaskNode {
                    task: view("b", "b"),
                    children: vec![leaf("c")],
                },
                leaf("d"),
            ],
        }];
        assert_eq!(
            format_tree(&nodes),
            vec!["[ ] a a", "├ [ ] b b", "│ └ [ ] c c", "└ [ ] d d"]
        );
    }
}
