//! Sweepmod command line library
//!
//! This module exports the internals of the `sweepmod` binary for testing purposes.

pub mod check;
pub mod cli;
pub mod config;
pub mod watch;
