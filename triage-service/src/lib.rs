pub mod models;
pub mod service;
pub mod stages;

pub use service::{AppState, build_router, create_app};
