//! The container/codec backend the demuxer reads from.

pub mod memory;

use std::sync::atomic::{AtomicU64, Ordering};

use crate::structs::packet::Packet;
use crate::structs::stream::{Chapter, StreamDescriptor};
use crate::structs::time::Time;
use crate::utils::errors::EngineError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeekFlags(u32);

impl SeekFlags {
    /// Land on the last candidate at or before the target.
    pub const BACKWARD: SeekFlags = SeekFlags(0x0001);
    /// Any packet is a candidate, not only key frames.
    pub const ANY: SeekFlags = SeekFlags(0x0002);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn contains(self, other: SeekFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn union(self, other: SeekFlags) -> Self {
        Self(self.0 | other.0)
    }
}

/// Identity of a codec context, shared by readers and writers that were
/// built on the same backend state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

impl ContextId {
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Capability of backend-specific readers and writers to hand buffers over
/// without re-deriving codec parameters.
pub trait SharesContextWith {
    fn context_id(&self) -> ContextId;

    fn shares_context_with(&self, other: &dyn SharesContextWith) -> bool {
        self.context_id() == other.context_id()
    }
}

/// A packet-level container reader.
pub trait CodecEngine {
    /// Long name of the container format.
    fn format_name(&self) -> &str;

    /// Probes the container for its streams. `fast` trades probing depth
    /// for start-up latency.
    fn find_stream_info(&mut self, fast: bool) -> Result<(), EngineError>;

    fn streams(&self) -> &[StreamDescriptor];

    /// Next packet in container order, `None` at end of stream.
    fn read_packet(&mut self) -> Result<Option<Packet>, EngineError>;

    fn seek(&mut self, target: Time, flags: SeekFlags) -> Result<(), EngineError>;

    fn duration(&self) -> Option<Time>;

    fn chapters(&self) -> Vec<Chapter> {
        Vec::new()
    }

    /// Releases backend resources. Reads after closing return end of stream.
    fn close(&mut self) {}

    fn shared_context(&self) -> Option<&dyn SharesContextWith> {
        None
    }
}
