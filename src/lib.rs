//! Command-line front end for the trigger tool.

pub mod cli;
pub mod scenario;
