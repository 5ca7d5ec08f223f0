//! HTTP transport for the dev server operations.

pub mod handler;
pub mod schemas;

pub use handler::{router, AppState};
