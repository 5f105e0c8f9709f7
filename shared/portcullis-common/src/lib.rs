//! Portcullis Common Library
//!
//! Entity and permission types shared by the authorization core and the
//! services that host it.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::*;
