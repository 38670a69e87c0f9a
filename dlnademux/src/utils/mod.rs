//! Utility functions and supporting infrastructure.
//!
//! Provides bitstream I/O, configuration and error handling.

pub mod bitstream_io;
pub mod config;
pub mod errors;
