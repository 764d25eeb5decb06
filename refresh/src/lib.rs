//! Data refresh pipeline rebuilding the dormant donor database against a new HLA nomenclature.
//!
//! [`orchestrator::DataRefreshOrchestrator`] decides whether a refresh starts,
//! [`runner::DataRefreshRunner`] executes the ordered stages and
//! [`cleanup::DataRefreshCleanupService`] tears down refreshes whose process died. Progress is
//! recorded in a [`store::HistoryStore`] so an interrupted refresh resumes at the right stage.

pub mod cleanup;
pub mod concurrency;
pub mod database;
pub mod error;
pub mod failpoints;
mod macros;
pub mod notification;
pub mod orchestrator;
pub mod record;
pub mod runner;
pub mod stage;
pub mod store;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod version;
pub mod workers;
