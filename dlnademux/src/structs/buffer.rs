//! Typed buffers handed to downstream consumers.

use std::sync::Arc;

use crate::structs::codec::{CodecDescriptor, MediaKind};
use crate::structs::time::Time;

/// Encoded audio, either one packet or one reframed DTS frame.
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    pub stream_index: usize,
    pub codec: Arc<CodecDescriptor>,
    pub data: Arc<[u8]>,
    pub pts: Option<Time>,
    pub dts: Option<Time>,
    pub duration: Time,
}

#[derive(Debug, Clone)]
pub struct VideoBuffer {
    pub stream_index: usize,
    pub codec: Arc<CodecDescriptor>,
    pub data: Arc<[u8]>,
    pub pts: Option<Time>,
    pub dts: Option<Time>,
    pub duration: Time,
    pub key_frame: bool,
}

/// Subtitle or other timed data.
#[derive(Debug, Clone)]
pub struct DataBuffer {
    pub stream_index: usize,
    pub codec: Arc<CodecDescriptor>,
    pub data: Arc<[u8]>,
    pub pts: Option<Time>,
    pub dts: Option<Time>,
    pub duration: Time,
}

/// Outcome of demultiplexing one media packet.
#[derive(Debug, Clone)]
pub enum Produced {
    /// Zero or more buffers: a DTS stream may need several packets per frame.
    Audio(Vec<AudioBuffer>),
    Video(VideoBuffer),
    Subtitle(DataBuffer),
    /// The packet belongs to an unselected, unknown or unsupported stream.
    Dropped,
}

impl Produced {
    pub fn kind(&self) -> Option<MediaKind> {
        match self {
            Produced::Audio(_) => Some(MediaKind::Audio),
            Produced::Video(_) => Some(MediaKind::Video),
            Produced::Subtitle(_) => Some(MediaKind::Subtitle),
            Produced::Dropped => None,
        }
    }

    pub fn stream_index(&self) -> Option<usize> {
        match self {
            Produced::Audio(buffers) => buffers.first().map(|b| b.stream_index),
            Produced::Video(buffer) => Some(buffer.stream_index),
            Produced::Subtitle(buffer) => Some(buffer.stream_index),
            Produced::Dropped => None,
        }
    }

    pub fn is_dropped(&self) -> bool {
        matches!(self, Produced::Dropped)
    }
}
