pub mod base;
pub mod heartbeat;
