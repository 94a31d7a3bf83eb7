//! Command-line interface module.
//!
//! Provides argument parsing, command handlers and text rendering.

pub mod args;
pub mod commands;
pub mod report;
