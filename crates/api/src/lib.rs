//! HTTP API: admin routes, bearer authentication and integration route
//! mounting.

pub mod app;
pub mod context;
pub mod middleware;

pub use app::{AppServices, build_app};
