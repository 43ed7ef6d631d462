//! Shared plumbing for the acquisition engines
//!
//! Configuration, errors, HTTP access, progress reporting and console output.

pub mod config;
pub mod error;
pub mod http;
pub mod output;
pub mod progress;
