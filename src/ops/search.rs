use std::ops::Range;

use regex::Regex;
use serde::Serialize;

use crate::model::{SpaceId, Task};
use crate::store::Store;

/// Which field of a task matched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchField {
    Id,
    Name,
    Description,
    Emoji,
}

/// A search hit for a task field
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub space_id: String,
    pub task_id: String,
    pub field: MatchField,
    pub spans: Vec<Range<usize>>,
}

/// Collect all non-overlapping match byte-ranges for a regex in the given text.
fn find_matches(re: &Regex, text: &str) -> Vec<Range<usize>> {
    re.find_iter(text).map(|m| m.start()..m.end()).collect()
}

/// Search tasks across the store.
///
/// If `space_filter` is `Some`, only that space is searched. Archived tasks
/// are skipped unless `include_archived` is set.
pub fn search_tasks(
    store: &Store,
    re: &Regex,
    space_filter: Option<&SpaceId>,
    include_archived: bool,
) -> Vec<SearchHit> {
    let mut hits = Vec::new();
    for space in store.spaces() {
        if space_filter.is_some_and(|f| *f != space.id) {
            continue;
        }
        for task in store.tasks_in_space(&space.id) {
            if task.is_archived && !include_archived {
                continue;
            }
            search_task(re, task, &mut hits);
        }
    }
    hits
}

fn search_task(re: &Regex, task: &Task, hits: &mut Vec<SearchHit>) {
    let mut push = |field, text: &str| {
        let spans = find_matches(re, text);
        if !spans.is_empty() {
            hits.push(SearchHit {
                space_id: task.space_id.to_string(),
                task_id: task.id.to_string(),
                field,
                spans,
            });
        }
    };

    // Temp ids are client bookkeeping, not something a user searches for
    if !task.id.is_temp() {
        push(MatchField::Id, task.id.as_str());
    }
    push(MatchField::Name, &task.name);
    push(MatchField::Description, &task.description);
    if let Some(emoji) = &task.emoji {
        push(MatchField::Emoji, emoji);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Space;
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    fn sample_store() -> Store {
        let mut store = Store::new();
        store.insert_space(Space::new("work".into(), "Work"));
        store.insert_space(Space::new("home".into(), "Home"));

        let mut t = Task::new("w1".into(), "work".into(), "Add handler syntax", Utc::now());
        t.description = "Parser needs a handler keyword.".into();
        store.insert_task(t);
        store.insert_task(Task::new("w2".into(), "work".into(), "Write docs", Utc::now()));
        let mut archived = Task::new("w3".into(), "work".into(), "Old handler", Utc::now());
        archived.is_archived = true;
        store.insert_task(archived);
        store.insert_task(Task::new("h1".into(), "home".into(), "Add shelf", Utc::now()));
        store
    }

    #[test]
    fn test_search_name_match() {
        let store = sample_store();
        let re = Regex::new("handler").unwrap();
        let hits = search_tasks(&store, &re, None, false);
        let names: Vec<_> = hits.iter().filter(|h| h.field == MatchField::Name).collect();
        assert_eq!(names.len(), 1);
        assert_eq!(names[0].task_id, "w1");
        assert_eq!(names[0].spans, vec![4..11]); // "Add [handler] syntax"
    }

    #[test]
    fn test_search_description() {
        let store = sample_store();
        let re = Regex::new("keyword").unwrap();
        let hits = search_tasks(&store, &re, None, false);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].field, MatchField::Description);
    }

    #[test]
    fn test_search_across_spaces_and_filter() {
        let store = sample_store();
        let re = Regex::new("(?i)^add").unwrap();
        assert_eq!(search_tasks(&store, &re, None, false).len(), 2);

        let home = SpaceId::from("home");
        let hits = search_tasks(&store, &re, Some(&home), false);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].space_id, "home");
    }

    #[test]
    fn test_search_archived_opt_in() {
        let store = sample_store();
        let re = Regex::new("Old").unwrap();
        assert!(search_tasks(&store, &re, None, false).is_empty());
        assert_eq!(search_tasks(&store, &re, None, true).len(), 1);
    }

    #[test]
    fn test_search_skips_temp_ids() {
        let mut store = sample_store();
        store.insert_task(Task::new("tmp-1".into(), "home".into(), "pending", Utc::now()));
        let re = Regex::new("tmp").unwrap();
        assert!(search_tasks(&store, &re, None, false).is_empty());
    }
}
