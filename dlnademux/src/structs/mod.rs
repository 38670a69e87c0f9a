//! Data structures shared by the demuxing stages.
//!
//! Contains the clock types, container packets, stream declarations, the
//! per-stream state kept by the demuxer and the buffers it produces.

pub mod buffer;
pub mod codec;
pub mod context;
pub mod packet;
pub mod stream;
pub mod time;
