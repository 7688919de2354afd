//! Terminal time tracker. Start a timer on a case and an activity, stop it, and every session
//! ends up in a per-day history that can be browsed, summarized and corrected later.
//!

pub mod aggregation;
pub mod cli;
pub mod config;
pub mod entries;
pub mod timer;
pub mod utils;
