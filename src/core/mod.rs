//! Core optimizer logic

pub mod areas;
pub mod capabilities;
pub mod config;
pub mod control_block;
pub mod error;
pub mod exclusions;
pub mod optimizer;
pub mod reclaim;
pub mod snapshot;
