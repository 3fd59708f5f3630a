pub mod config;
pub mod id;
pub mod position;
pub mod space;
pub mod task;

pub use config::*;
pub use id::*;
pub use position::*;
pub use space::*;
pub use task::*;
