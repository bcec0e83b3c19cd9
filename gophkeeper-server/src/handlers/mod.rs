//! HTTP handlers: decode the wire message, run the call against the store
//! under its deadline, encode the answer.

pub mod items;
pub mod users;
