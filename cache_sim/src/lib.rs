//! Trace-driven simulation of set-associative caches with sub-line
//! residency tracking and LRU replacement.

mod bin;
pub mod cache;
pub mod config;
pub mod geometry;
pub mod record;
pub mod set;
pub mod sim;
pub mod stat;
pub mod trace;
