//! Database models split into domain-specific modules.

pub mod common;
pub mod rating;
pub mod ride;
pub mod stats;
pub mod user;
pub mod wallet;

pub use common::*;
pub use rating::*;
pub use ride::*;
pub use stats::*;
pub use user::*;
pub use wallet::*;
