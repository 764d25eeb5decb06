//! Concurrency utilities used to coordinate a data refresh run with the rest of the process.
//!
//! A run executes its stages sequentially. The only coordination it needs is a shutdown signal,
//! checked at stage boundaries and by the heartbeat task.

pub mod shutdown;
