mod demux_impl;
pub mod demux_thread;
pub mod handler;
pub mod output;
pub mod progress;

pub use demux_impl::cmd_demux;
