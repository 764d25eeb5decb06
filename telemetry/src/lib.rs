//! Tracing initialization shared by the refresher binary and the test suites.

pub mod tracing;
