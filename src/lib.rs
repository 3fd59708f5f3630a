//! taskspace: task cards on per-space canvases, nested up to three levels
//! deep, with a custom order per list and optimistic persistence.
//!
//! Mutations go through [`board::Board`], which applies them to the local
//! [`store::Store`] at once and reconciles or rolls back when the backend
//! answers.

pub mod board;
pub mod cli;
pub mod drag;
pub mod error;
pub mod io;
pub mod model;
pub mod ops;
pub mod persist;
pub mod pipeline;
pub mod store;
pub mod util;
