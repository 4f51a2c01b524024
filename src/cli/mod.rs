//! Command line interface for the side-car launcher
//!
//! This module contains argument parsing and the command handlers.

pub mod args;
pub mod commands;

pub use args::{Args, BuildConfig, ExecutionMode, ProfileKind, UpConfig};
