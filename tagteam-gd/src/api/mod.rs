//! HTTP surface: the text query protocol plus JSON health/status

pub mod health;
pub mod query;

pub use health::{health_check, health_routes, pipeline_status};
pub use query::{answer_query, handle_query, NOT_READY};
