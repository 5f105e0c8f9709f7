//! Shared Types

mod entity;
mod permission;
mod system;

pub use entity::*;
pub use permission::*;
pub use system::*;
