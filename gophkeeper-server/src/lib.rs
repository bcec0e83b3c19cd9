//! GophKeeper sync server
//!
//! Authoritative store for vault records shared across a user's devices.
//! Payloads arrive already encrypted; the server stores and returns them
//! verbatim and only reconciles their timestamps.

pub mod auth;
pub mod cleanup;
pub mod config;
pub mod deadline;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod server;
pub mod storage;

pub use config::ServerConfig;
pub use error::ServerError;
pub use server::{build_router, AppState, Server};
pub use storage::{SqliteStorage, Storage, StorageError};
