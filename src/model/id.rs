use std::fmt;

use serde::{Deserialize, Serialize};

/// Prefix reserved for client-generated ids. Servers never issue ids with it.
pub const TEMP_PREFIX: &str = "tmp-";

/// Identifier of a task, either server-assigned or a client temp id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        TaskId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for ids generated locally that still await server confirmation
    pub fn is_temp(&self) -> bool {
        self.0.starts_with(TEMP_PREFIX)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        TaskId(s.to_string())
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        TaskId(s)
    }
}

/// Identifier of a space
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpaceId(String);

impl SpaceId {
    pub fn new(id: impl Into<String>) -> Self {
        SpaceId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SpaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SpaceId {
    fn from(s: &str) -> Self {
        SpaceId(s.to_string())
    }
}

impl From<String> for SpaceId {
    fn from(s: String) -> Self {
        SpaceId(s)
    }
}

/// Issues `tmp-1`, `tmp-2`, ... for the lifetime of one client session.
#[derive(Debug, Default)]
pub struct TempIdGen {
    next: u64,
}

impl TempIdGen {
    pub fn new() -> Self {
        TempIdGen { next: 0 }
    }

    pub fn next_id(&mut self) -> TaskId {
        self.next += 1;
        TaskId(format!("{}{}", TEMP_PREFIX, self.next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_ids_are_sequential_and_namespaced() {
        let mut ids = TempIdGen::new();
        assert_eq!(ids.next_id().as_str(), "tmp-1");
        let second = ids.next_id();
        assert_eq!(second.as_str(), "tmp-2");
        assert!(second.is_temp());
    }

    #[test]
    fn server_ids_are_not_temp() {
        assert!(!TaskId::from("srv-42").is_temp());
        assert!(!TaskId::from("tmp").is_temp());
    }

    #[test]
    fn ids_serialize_as_plain_strings() {
        let json = serde_json::to_string(&TaskId::from("srv-1")).unwrap();
        assert_eq!(json, "\"srv-1\"");
        let space: SpaceId = serde_json::from_str("\"home\"").unwrap();
        assert_eq!(space.as_str(), "home");
    }
}
