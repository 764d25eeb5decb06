//! Postgres access for the data refresh history table.

pub mod db;
pub mod history;
