pub mod api;
pub mod config;
pub mod moderation;

pub use api::{api_router, AppState};
