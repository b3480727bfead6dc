//! User profiles — the stored record and its text renderings.

pub mod model;

pub use model::{UserField, UserId, UserRecord, append_project};
