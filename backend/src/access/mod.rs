//! Role-scoped visibility and authorization.
//!
//! Every read path asks [`visible_rows`] which rows the caller may see and every
//! write path goes through [`authorize`] / [`enforce`]. Both are driven by the
//! same [`Ownership`] chain so the two cannot drift apart.

pub mod guard;
pub mod identity;
pub mod ownership;
pub mod scope;

pub use guard::{authorize, enforce, Operation};
pub use identity::Identity;
pub use ownership::Ownership;
pub use scope::{visible_rows, EntityKind, Scope};
