//! Local record cache.
//!
//! Record metadata lives in a SQLite table; payload bytes are stored inline
//! or, above a size threshold, as files in a blob directory.

pub mod models;
pub mod schema;
pub mod store;

pub use models::LocalItem;
pub use store::LocalStore;
