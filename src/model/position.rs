use std::fmt;
use std::str::FromStr;

use super::id::{SpaceId, TaskId};

/// Where to place an item in an ordered list
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Position {
    /// Prepend
    Start,
    /// Insert immediately after this id; append if it is not in the list
    After(TaskId),
    /// Append
    End,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Position::Start => write!(f, "start"),
            Position::After(id) => write!(f, "after:{}", id),
            Position::End => write!(f, "end"),
        }
    }
}

/// An ordered list owner: a space's root list or a parent's subtask list
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OrderContext {
    Space(SpaceId),
    Parent(TaskId),
}

impl fmt::Display for OrderContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderContext::Space(id) => write!(f, "space:{}", id),
            OrderContext::Parent(id) => write!(f, "task:{}", id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid position '{0}': expected start, end or after:<id>")]
pub struct ParsePositionError(String);

impl FromStr for Position {
    type Err = ParsePositionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" | "top" => Ok(Position::Start),
            "end" | "bottom" => Ok(Position::End),
            _ => match s.strip_prefix("after:") {
                Some(id) if !id.is_empty() => Ok(Position::After(TaskId::from(id))),
                _ => Err(ParsePositionError(s.to_string())),
            },
        }
    }
}
