//! HTTP extractors and the RouteModule trait for organizing routes.

pub mod extract;
pub mod routes;

pub use extract::{ValidatedJson, ValidatedQuery};
pub use routes::RouteModule;
