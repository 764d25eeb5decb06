//! Persistence of refresh history records.

pub mod base;
pub mod memory;
pub mod postgres;

pub use base::{BoxedHistoryStore, HistoryStore};
