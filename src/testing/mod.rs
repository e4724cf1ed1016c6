//! Testing utilities for the relay
//!
//! - Alba-style HTTP endpoint testing without running a server
//! - A recording [`FakeProcessor`] that replays idempotency keys like Square
//! - [`TestApp`] wiring both to an in-memory store
//! - SQLite in-memory databases for the SeaORM store

mod app;
#[cfg(feature = "database")]
mod database;
mod fake_processor;
mod scenario;

pub use app::TestApp;
#[cfg(feature = "database")]
pub use database::TestDb;
pub use fake_processor::FakeProcessor;
pub use scenario::{Scenario, ScenarioAssert, delete, get, post};
