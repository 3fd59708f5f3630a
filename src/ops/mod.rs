//! Synchronous store operations. Each mutating function applies its effect
//! to a `Store` and returns what is needed to undo it.

pub mod archive;
pub mod check;
pub mod hierarchy;
pub mod order;
pub mod search;
pub mod view;
pub mod zindex;
