use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::id::{SpaceId, TaskId};
use super::task::Progress;

/// Default color for spaces created without one
pub const DEFAULT_COLOR: &str = "#6366f1";

/// Derived-view sort keys. `Custom` is the authoritative manual order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    Custom,
    Name,
    DueDate,
    Progress,
    CreatedAt,
    UpdatedAt,
}

impl SortKey {
    pub fn parse(s: &str) -> Option<SortKey> {
        match s {
            "custom" => Some(SortKey::Custom),
            "name" => Some(SortKey::Name),
            "due" | "due_date" => Some(SortKey::DueDate),
            "progress" => Some(SortKey::Progress),
            "created" | "created_at" => Some(SortKey::CreatedAt),
            "updated" | "updated_at" => Some(SortKey::UpdatedAt),
            _ => None,
        }
    }
}

/// Inclusive due-date window used by the space filter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DueDateRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<NaiveDate>,
}

impl DueDateRange {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from.is_none_or(|from| date >= from) && self.to.is_none_or(|to| date <= to)
    }
}

/// A container of tasks plus its ordering and filter preferences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Space {
    pub id: SpaceId,
    pub name: String,
    pub color: String,
    /// High-water mark of issued z-index values
    #[serde(default)]
    pub max_z_index: u64,
    /// Non-archived root tasks in manual order
    #[serde(default)]
    pub task_order: Vec<TaskId>,

    // --- Filter preferences ---
    #[serde(default)]
    pub selected_emojis: Vec<String>,
    #[serde(default)]
    pub selected_progresses: Vec<Progress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_due_date_range: Option<DueDateRange>,

    // --- View preferences ---
    #[serde(default)]
    pub sort: SortKey,
    #[serde(default)]
    pub sort_reversed: bool,
}

impl Space {
    pub fn new(id: SpaceId, name: impl Into<String>) -> Self {
        Space {
            id,
            name: name.into(),
            color: DEFAULT_COLOR.to_string(),
            max_z_index: 0,
            task_order: Vec::new(),
            selected_emojis: Vec::new(),
            selected_progresses: Vec::new(),
            selected_due_date_range: None,
            sort: SortKey::Custom,
            sort_reversed: false,
        }
    }

    pub fn has_filters(&self) -> bool {
        !self.selected_emojis.is_empty()
            || !self.selected_progresses.is_empty()
            || self.selected_due_date_range.is_some()
    }
}

/// Partial update of a space
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpacePatch {
    pub name: Option<String>,
    pub color: Option<String>,
    pub selected_emojis: Option<Vec<String>>,
    pub selected_progresses: Option<Vec<Progress>>,
    pub selected_due_date_range: Option<Option<DueDateRange>>,
    pub sort: Option<SortKey>,
    pub sort_reversed: Option<bool>,
}

impl SpacePatch {
    /// Apply and return the previous values of the touched fields
    pub fn apply_to(&self, space: &mut Space) -> SpacePatch {
        let mut old = SpacePatch::default();
        macro_rules! swap {
            ($($field:ident),*) => {
                $(if let Some(v) = &self.$field {
                    old.$field = Some(std::mem::replace(&mut space.$field, v.clone()));
                })*
            };
        }
        swap!(
            name,
            color,
            selected_emojis,
            selected_progresses,
            selected_due_date_range,
            sort,
            sort_reversed
        );
        old
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn due_date_range_bounds_are_inclusive() {
        let range = DueDateRange {
            from: NaiveDate::from_ymd_opt(2025, 1, 1),
            to: NaiveDate::from_ymd_opt(2025, 1, 31),
        };
        assert!(range.contains(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()));
        assert!(range.contains(NaiveDate::from_ymd_opt(2025, 1, 31).unwrap()));
        assert!(!range.contains(NaiveDate::from_ymd_opt(2025, 2, 1).unwrap()));

        let open = DueDateRange { from: None, to: None };
        assert!(open.contains(NaiveDate::from_ymd_opt(1999, 5, 5).unwrap()));
    }

    #[test]
    fn space_patch_round_trips_previous_values() {
        let mut space = Space::new(SpaceId::from("s"), "Work");
        let patch = SpacePatch {
            name: Some("Home".into()),
            sort: Some(SortKey::Name),
            ..Default::default()
        };
        let old = patch.apply_to(&mut space);
        assert_eq!(space.name, "Home");
        old.apply_to(&mut space);
        assert_eq!(space, Space::new(SpaceId::from("s"), "Work"));
    }

    #[test]
    fn space_deserializes_with_defaults() {
        let space: Space =
            serde_json::from_str(r##"{"id":"s1","name":"Work","color":"#fff"}"##).unwrap();
        assert_eq!(space.max_z_index, 0);
        assert!(space.task_order.is_empty());
        assert_eq!(space.sort, SortKey::Custom);
        assert!(!space.has_filters());
    }
}
