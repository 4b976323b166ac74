//! Profiler agent
//!
//! Host process for the profiling trigger pipeline: loads settings, wires
//! the library components together and serves health and metrics.

pub mod api;
pub mod config;
